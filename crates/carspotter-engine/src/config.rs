use std::path::{Path, PathBuf};

use crate::util::non_empty_env;

pub const DEFAULT_COLLECTION_DIR: &str = "car_collection";
pub const DEFAULT_IDENTIFIER: &str = "gemini";
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_LOGO_CATALOG: &str = "logo_icons.json";
pub const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub collection_dir: PathBuf,
    pub events_path: Option<PathBuf>,
    pub identifier: String,
    pub vision_model: String,
    pub logo_catalog: PathBuf,
}

impl CollectionConfig {
    pub fn new(collection_dir: impl Into<PathBuf>) -> Self {
        Self {
            collection_dir: collection_dir.into(),
            events_path: None,
            identifier: DEFAULT_IDENTIFIER.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            logo_catalog: PathBuf::from(DEFAULT_LOGO_CATALOG),
        }
    }

    pub fn from_env() -> Self {
        Self::from_vars(non_empty_env)
    }

    /// Resolves settings through `var`, which returns `None` for unset or blank keys.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(
            var("CARSPOTTER_COLLECTION_DIR").unwrap_or_else(|| DEFAULT_COLLECTION_DIR.to_string()),
        );
        config.events_path = var("CARSPOTTER_EVENTS").map(PathBuf::from);
        if let Some(identifier) = var("CARSPOTTER_IDENTIFIER") {
            config.identifier = identifier;
        }
        if let Some(model) = var("CARSPOTTER_VISION_MODEL") {
            config.vision_model = model;
        }
        if let Some(path) = var("CARSPOTTER_LOGOS") {
            config.logo_catalog = PathBuf::from(path);
        }
        config
    }

    pub fn events_path(&self) -> PathBuf {
        self.events_path
            .clone()
            .unwrap_or_else(|| self.collection_dir.join(EVENTS_FILE))
    }

    pub fn collection_dir(&self) -> &Path {
        &self.collection_dir
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION_DIR)
    }
}
