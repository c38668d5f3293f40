//! Correlation record moved through the outbound and inbound queues

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An identifier paired with a payload.
///
/// The identifier is chosen by the submitter and must stay unique while the
/// request is outstanding. Workers publish their result under the same
/// identifier they received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord<T = Value> {
    identifier: String,
    payload: T,
}

impl<T> CorrelationRecord<T> {
    pub fn new(identifier: impl Into<String>, payload: T) -> Self {
        Self {
            identifier: identifier.into(),
            payload,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Split into `(identifier, payload)`
    pub fn into_parts(self) -> (String, T) {
        (self.identifier, self.payload)
    }
}
