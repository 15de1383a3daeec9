use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Service instance used when nothing else is configured.
pub const DEFAULT_URL: &str = "http://fetchclimate2.cloudapp.net";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base service URL, e.g. `http://fetchclimate2.cloudapp.net`.
    pub url: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            verify: true,
        }
    }
}

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    verify: Option<bool>,
}

/// Resolves the client configuration. Precedence, highest first:
/// explicit arguments, `FETCHCLIMATE_URL` / `FETCHCLIMATE_VERIFY`,
/// the rc file, then [`DEFAULT_URL`].
pub(crate) fn load_config(url: Option<String>, verify: Option<bool>) -> Result<ClientConfig> {
    let env_verify = match std::env::var("FETCHCLIMATE_VERIFY") {
        Ok(v) => Some(parse_verify(&v)),
        Err(_) => None,
    };
    let url = url.or_else(|| std::env::var("FETCHCLIMATE_URL").ok());
    let verify = verify.or(env_verify);

    let rc = if url.is_none() || verify.is_none() {
        find_rc(&rc_candidates())?
    } else {
        None
    };
    let (rc_url, rc_verify) = match rc {
        Some(cfg) => (cfg.url, cfg.verify),
        None => (None, None),
    };

    let url = url
        .or(rc_url)
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    if url.trim().is_empty() {
        return Err(Error::Config {
            message: "service url is empty".to_string(),
        });
    }

    Ok(ClientConfig {
        url,
        verify: verify.or(rc_verify).unwrap_or(true),
    })
}

fn find_rc(candidates: &[PathBuf]) -> Result<Option<RcConfig>> {
    for rc_path in candidates {
        if rc_path.exists() {
            let cfg = read_rc(rc_path).map_err(|e| Error::Config {
                message: format!(
                    "failed to read configuration file {}: {}",
                    rc_path.display(),
                    e
                ),
            })?;
            tracing::debug!(path = %rc_path.display(), "loaded rc file");
            return Ok(Some(cfg));
        }
    }
    Ok(None)
}

fn read_rc(path: &Path) -> std::io::Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // `url:` may carry its value on the following line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            // Continuation lines for urls contain `:` in the scheme, so only a
            // known key prefix ends the continuation.
            if !is_key_line(line) {
                let v = strip_quotes(line);
                match pk {
                    "url" => cfg.url = Some(v.to_string()),
                    "verify" => cfg.verify = Some(parse_verify(v)),
                    _ => {}
                }
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            match k {
                "url" => {
                    if !v.is_empty() {
                        cfg.url = Some(v.to_string());
                    } else {
                        pending_key = Some("url");
                    }
                }
                "verify" => {
                    if !v.is_empty() {
                        cfg.verify = Some(parse_verify(v));
                    } else {
                        pending_key = Some("verify");
                    }
                }
                _ => {}
            }
        }
    }

    cfg
}

fn is_key_line(line: &str) -> bool {
    line.split_once(':')
        .map(|(k, _)| matches!(k.trim(), "url" | "verify"))
        .unwrap_or(false)
}

fn parse_verify(v: &str) -> bool {
    !matches!(v.trim(), "0" | "false" | "no")
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) FETCHCLIMATE_RC (explicit)
    // 2) ./.fetchclimaterc
    // 3) ~/.fetchclimaterc
    if let Ok(p) = std::env::var("FETCHCLIMATE_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".fetchclimaterc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".fetchclimaterc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_inline_values() {
        let cfg = parse_rc("# comment\nurl: \"http://localhost:8080\"\nverify: 0\n");
        assert_eq!(cfg.url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(cfg.verify, Some(false));
    }

    #[test]
    fn parses_value_on_next_line() {
        let cfg = parse_rc("url:\n  'https://example.org/fc'\nverify: 1\n");
        assert_eq!(cfg.url.as_deref(), Some("https://example.org/fc"));
        assert_eq!(cfg.verify, Some(true));
    }

    #[test]
    fn key_line_ends_continuation() {
        let cfg = parse_rc("url:\nverify: false\n");
        assert_eq!(cfg.url, None);
        assert_eq!(cfg.verify, Some(false));
    }

    #[test]
    fn first_existing_rc_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let present = dir.path().join("present");
        let mut f = std::fs::File::create(&present).unwrap();
        writeln!(f, "url: http://rc.example").unwrap();

        let cfg = find_rc(&[missing, present]).unwrap().unwrap();
        assert_eq!(cfg.url.as_deref(), Some("http://rc.example"));
    }

    #[test]
    fn explicit_arguments_take_precedence() {
        let cfg = load_config(Some("http://explicit".to_string()), Some(false)).unwrap();
        assert_eq!(
            cfg,
            ClientConfig {
                url: "http://explicit".to_string(),
                verify: false,
            }
        );
    }

    #[test]
    fn empty_explicit_url_is_rejected() {
        assert!(matches!(
            load_config(Some("  ".to_string()), Some(true)),
            Err(Error::Config { .. })
        ));
    }
}
