//! Decoding of `/jsproxy/data` replies.
//!
//! The service returns nested JSON arrays with `null` for missing elements.
//! Nulls become `None` here, once, so nothing downstream can mistake a
//! missing value for a number.

use serde::Deserialize;

/// An arbitrarily nested JSON array with nullable leaves.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Nested<T> {
    List(Vec<Nested<T>>),
    Leaf(Option<T>),
}

impl<T: Copy> Nested<T> {
    /// Leaves in row-major order.
    pub fn flatten(&self) -> Vec<Option<T>> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Option<T>>) {
        match self {
            Nested::Leaf(v) => out.push(*v),
            Nested::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    /// Top-level entries. A bare leaf counts as a single entry.
    pub fn rows(&self) -> Vec<&Nested<T>> {
        match self {
            Nested::List(items) => items.iter().collect(),
            leaf @ Nested::Leaf(_) => vec![leaf],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Nested::List(items) => items.len(),
            Nested::Leaf(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Nested::List(items) if items.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPayload {
    pub values: Nested<f64>,
    pub sd: Nested<f64>,
    /// Data source ids; only present when provenance was requested.
    #[serde(default)]
    pub provenance: Option<Nested<i32>>,
}
