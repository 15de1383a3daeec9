use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::payload::RawPayload;
use crate::request::ComputeRequest;
use crate::transport::{HttpRequest, Transport};
use crate::util::{excerpt, urljoin};

/// Default pause between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// State of a compute job, decoded from the service's tagged text replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending { hash: String },
    InProgress { hash: String },
    /// `locator` is the msds URI the result payload is read from.
    Completed { locator: String },
    Failed { message: String },
}

impl JobStatus {
    pub fn parse(reply: &str) -> Result<Self> {
        let text = reply.trim().trim_matches('"').trim();

        if let Some(rest) = strip_tag(text, "pending") {
            return Ok(JobStatus::Pending {
                hash: extract_hash(rest, text)?,
            });
        }
        if let Some(rest) = strip_tag(text, "progress") {
            return Ok(JobStatus::InProgress {
                hash: extract_hash(rest, text)?,
            });
        }
        if let Some(rest) = strip_tag(text, "completed") {
            let locator = strip_separator(rest).trim();
            if locator.is_empty() {
                return Err(Error::Protocol {
                    message: format!("completed reply without result locator: {:?}", text),
                });
            }
            return Ok(JobStatus::Completed {
                locator: locator.to_string(),
            });
        }
        if let Some(rest) = strip_tag(text, "failed") {
            let message = strip_separator(rest).trim();
            return Ok(JobStatus::Failed {
                message: if message.is_empty() {
                    "no details given".to_string()
                } else {
                    message.to_string()
                },
            });
        }

        Err(Error::Protocol {
            message: format!("unrecognized job status {:?}", excerpt(text, 200)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Pending { .. } => "pending",
            JobStatus::InProgress { .. } => "progress",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

fn strip_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let head = text.get(..tag.len())?;
    if head.eq_ignore_ascii_case(tag) {
        Some(&text[tag.len()..])
    } else {
        None
    }
}

fn strip_separator(rest: &str) -> &str {
    rest.strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest)
}

fn extract_hash(rest: &str, whole: &str) -> Result<String> {
    let missing = || Error::Protocol {
        message: format!("status reply without job hash: {:?}", whole),
    };
    let idx = rest.find("hash=").ok_or_else(missing)?;
    let hash: String = rest[idx + "hash=".len()..]
        .chars()
        .take_while(|c| !matches!(c, ';' | ',' | '&') && !c.is_whitespace())
        .collect();
    if hash.is_empty() {
        return Err(missing());
    }
    Ok(hash)
}

/// Cooperative cancellation for a running poll. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocks between two status polls.
pub trait Sleeper: fmt::Debug + Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Total time spent sleeping before giving up. `None` polls until a
    /// terminal state.
    pub max_wait: Option<Duration>,
    pub cancel: Option<CancelFlag>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            cancel: None,
        }
    }
}

impl PollOptions {
    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Drives one job from submission to its result payload.
pub(crate) struct JobPoller<'a, T> {
    pub(crate) transport: &'a T,
    pub(crate) base_url: &'a str,
    pub(crate) options: &'a PollOptions,
    pub(crate) sleeper: &'a dyn Sleeper,
    pub(crate) progress: bool,
}

impl<T: Transport> JobPoller<'_, T> {
    /// Submit, wait for completion, then read the `fields` of the result.
    pub(crate) fn run(&self, request: &ComputeRequest, fields: &str) -> Result<RawPayload> {
        let status = self.submit(request)?;
        let locator = self.wait(status)?;
        self.fetch_data(&locator, fields)
    }

    pub(crate) fn submit(&self, request: &ComputeRequest) -> Result<JobStatus> {
        let body = serde_json::to_value(request)?;
        let req = HttpRequest::post_json(urljoin(self.base_url, "/api/compute"), body)
            .header("accept", "text/plain");
        let reply = self.transport.send(&req)?;
        let status = JobStatus::parse(&reply)?;
        tracing::debug!(
            variable = %request.environment_variable_name,
            status = status.name(),
            "submitted compute request"
        );
        Ok(status)
    }

    /// Polls `/api/status` until `status` reaches a terminal state and returns
    /// the result locator.
    pub(crate) fn wait(&self, mut status: JobStatus) -> Result<String> {
        let pb = self.spinner();
        let mut waited = Duration::ZERO;
        let mut last_state: Option<&'static str> = None;

        let outcome = loop {
            if last_state != Some(status.name()) {
                last_state = Some(status.name());
                tracing::info!(state = status.name(), "job state");
            }

            let hash = match status {
                JobStatus::Completed { locator } => break Ok(locator),
                JobStatus::Failed { message } => break Err(Error::JobFailed { message }),
                JobStatus::Pending { hash } | JobStatus::InProgress { hash } => hash,
            };

            if self.options.cancelled() {
                break Err(Error::Cancelled);
            }
            if let Some(max_wait) = self.options.max_wait {
                if waited + self.options.interval > max_wait {
                    break Err(Error::Timeout { waited });
                }
            }

            if let Some(pb) = &pb {
                pb.set_message(format!("job {} ({})", hash, last_state.unwrap_or("")));
                pb.tick();
            }
            self.sleeper.sleep(self.options.interval);
            waited += self.options.interval;
            if self.options.cancelled() {
                break Err(Error::Cancelled);
            }

            let req = HttpRequest::get(urljoin(self.base_url, "/api/status"))
                .query("hash", hash)
                .header("accept", "text/plain");
            status = match self.transport.send(&req).and_then(|r| JobStatus::parse(&r)) {
                Ok(s) => s,
                Err(e) => break Err(e),
            };
        };

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, waited_s = waited.as_secs_f64(), "job did not complete");
        }
        outcome
    }

    pub(crate) fn fetch_data(&self, locator: &str, fields: &str) -> Result<RawPayload> {
        let req = HttpRequest::get(urljoin(self.base_url, "/jsproxy/data"))
            .query("uri", locator)
            .query("variables", fields)
            .header("accept-encoding", "identity");
        let text = self.transport.send(&req)?;
        let payload: RawPayload = serde_json::from_str(&text)
            .map_err(|e| Error::decode("result payload", e.to_string()))?;
        tracing::debug!(locator, fields, "retrieved result payload");
        Ok(payload)
    }

    fn spinner(&self) -> Option<ProgressBar> {
        if !self.progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {elapsed} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Some(pb)
    }
}
