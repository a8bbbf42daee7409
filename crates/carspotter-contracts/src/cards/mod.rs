mod classifier;
mod logos;

use std::path::PathBuf;

use serde::Serialize;

use crate::records::{is_unknown, VehicleRecord};

pub use classifier::{
    classify, is_electric, missing_fields, Powertrain, RenderVariant, RequiredField, SpecSheet,
};
pub use logos::LogoCatalog;

/// Accent used when the record carries no usable color.
pub const DEFAULT_ACCENT: &str = "#cccccc";

/// Everything a renderer needs for one gallery tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub key: String,
    pub image_path: PathBuf,
    pub title: String,
    pub accent_color: String,
    pub logo_url: Option<String>,
    pub variant: RenderVariant,
    pub record: VehicleRecord,
}

impl Card {
    pub fn build(
        key: &str,
        image_path: PathBuf,
        record: VehicleRecord,
        logos: &LogoCatalog,
    ) -> Self {
        let accent_color = if is_unknown(&record.color) {
            DEFAULT_ACCENT.to_string()
        } else {
            record.color.trim().to_string()
        };
        Self {
            key: key.to_string(),
            image_path,
            title: record.title(),
            accent_color,
            logo_url: logos.logo_for(&record.make).map(str::to_string),
            variant: classify(&record),
            record,
        }
    }
}
