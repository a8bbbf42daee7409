mod enrichment;
mod response_parser;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use enrichment::{merge, IDENTIFICATION_KEYS};
pub use response_parser::{
    parse_response, parse_response_detailed, parse_shape, Degradation, Identification,
    ParseOutcome, ParsedShape,
};

/// Placeholder for identification fields the model did not produce.
pub const UNKNOWN: &str = "Unknown";

pub fn is_unknown(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN)
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl BoundingBox {
    /// Returns `None` unless the box has positive width and height.
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Option<Self> {
        let candidate = Self { x1, y1, x2, y2 };
        candidate.is_valid().then_some(candidate)
    }

    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    #[serde(default = "unknown")]
    pub year: String,
    #[serde(default = "unknown")]
    pub make: String,
    #[serde(default = "unknown")]
    pub model: String,
    #[serde(default = "unknown")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Map<String, Value>>,
}

impl VehicleRecord {
    /// Blank identification fields fall back to [`UNKNOWN`].
    pub fn new(
        year: impl Into<String>,
        make: impl Into<String>,
        model: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            year: or_unknown(year.into()),
            make: or_unknown(make.into()),
            model: or_unknown(model.into()),
            color: or_unknown(color.into()),
            bounding_box: None,
            enrichment: None,
        }
    }

    /// Attaches the box only when it is valid; an invalid box leaves the record unboxed.
    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box.is_valid().then_some(bounding_box);
        self
    }

    pub fn title(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }

    pub fn enrichment_value(&self, key: &str) -> Option<&Value> {
        self.enrichment.as_ref()?.get(key)
    }

    pub fn is_identified(&self) -> bool {
        !is_unknown(&self.year) && !is_unknown(&self.make) && !is_unknown(&self.model)
    }
}

fn or_unknown(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return unknown();
    }
    trimmed.to_string()
}
