//! Diagnostic sample models

use serde::{Deserialize, Serialize};

/// Kind of a decoded reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Numeric,
    Text,
}

/// Decoded payload of one diagnostic command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Reading {
    /// A physical quantity (e.g. `42.0 kph`)
    Numeric { magnitude: f64, unit: String },
    /// Anything without a unit (fuel type, status bits, ...)
    Text { text: String },
}

/// One diagnostic reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleValue {
    /// Command name, unique within a sample set (e.g. "SPEED")
    pub command: String,
    #[serde(flatten)]
    pub reading: Reading,
}

impl SampleValue {
    /// Create a numeric reading
    pub fn numeric(command: impl Into<String>, magnitude: f64, unit: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            reading: Reading::Numeric {
                magnitude,
                unit: unit.into(),
            },
        }
    }

    /// Create a text reading
    pub fn text(command: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            reading: Reading::Text { text: text.into() },
        }
    }

    pub fn kind(&self) -> SampleKind {
        match self.reading {
            Reading::Numeric { .. } => SampleKind::Numeric,
            Reading::Text { .. } => SampleKind::Text,
        }
    }

    /// Magnitude of a numeric reading
    pub fn magnitude(&self) -> Option<f64> {
        match self.reading {
            Reading::Numeric { magnitude, .. } => Some(magnitude),
            Reading::Text { .. } => None,
        }
    }
}

/// Values decoded during one sampling cycle, in query order.
///
/// A command appears at most once; inserting a value for a command that is
/// already present replaces it in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleSet {
    values: Vec<SampleValue>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: SampleValue) {
        match self.values.iter_mut().find(|v| v.command == value.command) {
            Some(existing) => *existing = value,
            None => self.values.push(value),
        }
    }

    pub fn get(&self, command: &str) -> Option<&SampleValue> {
        self.values.iter().find(|v| v.command == command)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleValue> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<SampleValue> {
        self.values
    }
}

impl FromIterator<SampleValue> for SampleSet {
    fn from_iter<I: IntoIterator<Item = SampleValue>>(iter: I) -> Self {
        let mut set = SampleSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}
