use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::records::BoundingBox;

/// Something that happened to a collection, one line in `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionEvent {
    VehicleIdentified {
        identifier: String,
        raw: String,
        title: String,
        bounding_box: Option<BoundingBox>,
        box_dropped: bool,
    },
    EnrichmentMerged {
        lookup: String,
        title: String,
        fields: Vec<String>,
    },
    EnrichmentUnavailable {
        title: String,
        reason: String,
    },
    RecordSaved {
        key: String,
        title: String,
        enriched: bool,
        image_sha256: String,
    },
    RecordsPruned {
        removed: Vec<String>,
    },
    GalleryRendered {
        cards: usize,
        full_spec: usize,
    },
    ImageAnnotated {
        key: String,
        label: String,
        path: PathBuf,
    },
}

#[derive(Serialize)]
struct EventLine<'a> {
    #[serde(flatten)]
    event: &'a CollectionEvent,
    session_id: &'a str,
    ts: String,
}

/// Append-only JSON-lines trail for one session against a collection.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    session_id: String,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
        }
    }

    pub fn append(&self, event: &CollectionEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(&EventLine {
            event,
            session_id: &self.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        })?;
        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
