//! Response envelope delivered to session callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LinkStatus, SampleSet, SampleValue};

/// One delivered unit: link status, an optional error and the decoded values.
///
/// Envelopes produced by the supervisor carry a sequence number starting at
/// 1; replies built by the session itself carry 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Production sequence number
    #[serde(default)]
    pub seq: u64,
    pub connected: bool,
    pub engine_on: bool,
    pub timestamp: DateTime<Utc>,
    /// Empty when there is no error
    #[serde(default)]
    pub error: String,
    /// Populated only while the engine is on
    #[serde(default)]
    pub values: Vec<SampleValue>,
}

impl ResponseEnvelope {
    /// Envelope reflecting a link status, stamped now
    pub fn status(link: LinkStatus) -> Self {
        Self {
            seq: 0,
            connected: link.connected,
            engine_on: link.engine_on,
            timestamp: Utc::now(),
            error: String::new(),
            values: Vec::new(),
        }
    }

    /// Envelope for a rejected request: link down, error set
    pub fn rejected(error: impl Into<String>) -> Self {
        Self::status(LinkStatus::default()).with_error(error)
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// Attach sampled values. They are dropped when the engine is off.
    pub fn with_values(mut self, values: SampleSet) -> Self {
        if self.engine_on {
            self.values = values.into_values();
        }
        self
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}
