mod record_store;

pub use record_store::{newest_first, PruneOutcome, RecordMap, RecordStore, METADATA_FILE};
