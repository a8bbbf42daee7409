mod annotate;
mod config;
mod identify;
mod specs;
mod util;

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use carspotter_contracts::cards::{Card, LogoCatalog};
use carspotter_contracts::events::{CollectionEvent, EventLog};
use carspotter_contracts::records::{merge, parse_response_detailed, Degradation, VehicleRecord};
use carspotter_contracts::store::{newest_first, RecordMap, RecordStore};
use log::{info, warn};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub use annotate::{annotated_path, draw_box, write_annotated};
pub use config::{
    CollectionConfig, DEFAULT_COLLECTION_DIR, DEFAULT_IDENTIFIER, DEFAULT_LOGO_CATALOG,
    DEFAULT_VISION_MODEL, EVENTS_FILE,
};
pub use identify::{
    default_identifier_registry, identification_instruction, DryrunIdentifier, GeminiIdentifier,
    IdentifierRegistry, VehicleIdentifier,
};
pub use specs::{ApiNinjasLookup, SpecLookup, StaticLookup};

const DEFAULT_IMAGE_EXTENSION: &str = "png";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions {
    pub want_bbox: bool,
    pub enrich: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddedVehicle {
    pub key: String,
    pub image_path: PathBuf,
    pub record: VehicleRecord,
    pub degradation: Option<Degradation>,
    pub enriched: bool,
}

/// One user's photographed vehicles: images plus their record store.
///
/// Every operation runs to completion against the backing files; see
/// [`RecordStore`] for the single-writer precondition. The event trail is
/// best effort and never fails an operation.
pub struct Collection {
    store: RecordStore,
    identifier: Box<dyn VehicleIdentifier>,
    lookup: Option<Box<dyn SpecLookup>>,
    logos: LogoCatalog,
    events: EventLog,
}

impl Collection {
    pub fn new(config: &CollectionConfig, identifier: Box<dyn VehicleIdentifier>) -> Self {
        Self {
            store: RecordStore::in_collection(config.collection_dir()),
            identifier,
            lookup: None,
            logos: LogoCatalog::default(),
            events: EventLog::new(config.events_path(), Uuid::new_v4().to_string()),
        }
    }

    /// Wires the configured identifier, the API Ninjas lookup and the logo catalog.
    pub fn from_config(config: &CollectionConfig) -> Result<Self> {
        let mut registry = default_identifier_registry(&config.vision_model);
        let names = registry.names();
        let Some(identifier) = registry.take(&config.identifier) else {
            bail!(
                "unknown identifier '{}' (available: {})",
                config.identifier,
                names.join(", ")
            );
        };
        let logos = LogoCatalog::load(&config.logo_catalog)?;
        Ok(Self::new(config, identifier)
            .with_lookup(Box::new(ApiNinjasLookup::new()))
            .with_logos(logos))
    }

    pub fn with_lookup(mut self, lookup: Box<dyn SpecLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_logos(mut self, logos: LogoCatalog) -> Self {
        self.logos = logos;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Identifies, optionally enriches, then persists image and record.
    ///
    /// Nothing is written when identification or parsing fails.
    pub fn add_vehicle(&self, image: &[u8], options: AddOptions) -> Result<AddedVehicle> {
        if image.is_empty() {
            bail!("image is empty");
        }
        let raw = self
            .identifier
            .identify(image, options.want_bbox)
            .with_context(|| format!("vehicle identification via {} failed", self.identifier.name()))?;
        let outcome = parse_response_detailed(&raw, options.want_bbox)?;
        self.record_event(CollectionEvent::VehicleIdentified {
            identifier: self.identifier.name().to_string(),
            title: outcome.record.title(),
            bounding_box: outcome.record.bounding_box,
            box_dropped: outcome.degradation.is_some(),
            raw,
        });

        let (record, enriched) = if options.enrich {
            self.enrich(outcome.record)
        } else {
            (outcome.record, false)
        };

        let key = format!("{}.{}", Uuid::new_v4().simple(), image_extension(image));
        let image_path = self.store.image_path(&key);
        fs::create_dir_all(self.store.image_dir())
            .with_context(|| format!("failed creating {}", self.store.image_dir().display()))?;
        fs::write(&image_path, image)
            .with_context(|| format!("failed writing {}", image_path.display()))?;
        if let Err(err) = self.store.put(&key, record.clone()) {
            if let Err(cleanup) = fs::remove_file(&image_path) {
                warn!("failed removing orphaned image {}: {cleanup}", image_path.display());
            }
            return Err(err.into());
        }

        info!("added {} as {key}", record.title());
        self.record_event(CollectionEvent::RecordSaved {
            key: key.clone(),
            title: record.title(),
            enriched,
            image_sha256: hex::encode(Sha256::digest(image)),
        });
        Ok(AddedVehicle {
            key,
            image_path,
            record,
            degradation: outcome.degradation,
            enriched,
        })
    }

    /// Prunes records whose image vanished, then lists cards newest first.
    pub fn gallery(&self) -> Result<Vec<Card>> {
        let records = self.prune_records()?;
        let cards = newest_first(&records)
            .map(|(key, record)| {
                Card::build(key, self.store.image_path(key), record.clone(), &self.logos)
            })
            .collect::<Vec<Card>>();
        self.record_event(CollectionEvent::GalleryRendered {
            cards: cards.len(),
            full_spec: cards
                .iter()
                .filter(|card| card.variant.spec_sheet().is_some())
                .count(),
        });
        Ok(cards)
    }

    /// Returns the keys dropped because their image is gone.
    pub fn prune(&self) -> Result<Vec<String>> {
        let outcome = self.store.prune()?;
        self.record_pruned(&outcome.removed);
        Ok(outcome.removed)
    }

    /// Writes `annotated_<key>` for a boxed record; `None` when it has no box.
    pub fn annotate(&self, key: &str) -> Result<Option<PathBuf>> {
        let Some(record) = self.store.get(key)? else {
            bail!("no record stored under '{key}'");
        };
        let Some(bounding_box) = record.bounding_box else {
            warn!("{key} has no bounding box to annotate");
            return Ok(None);
        };
        let out = write_annotated(&self.store.image_path(key), &bounding_box)?;
        self.record_event(CollectionEvent::ImageAnnotated {
            key: key.to_string(),
            label: record.title(),
            path: out.clone(),
        });
        Ok(Some(out))
    }

    /// Annotates every boxed record, skipping images that cannot be decoded.
    pub fn annotate_all(&self) -> Result<Vec<PathBuf>> {
        let records = self.store.load()?;
        let mut written = Vec::new();
        for (key, record) in &records {
            if record.bounding_box.is_none() {
                continue;
            }
            match self.annotate(key) {
                Ok(Some(path)) => written.push(path),
                Ok(None) => {}
                Err(err) => warn!("skipping annotation of {key}: {err:#}"),
            }
        }
        Ok(written)
    }

    fn prune_records(&self) -> Result<RecordMap> {
        let outcome = self.store.prune()?;
        self.record_pruned(&outcome.removed);
        Ok(outcome.records)
    }

    fn record_pruned(&self, removed: &[String]) {
        if !removed.is_empty() {
            self.record_event(CollectionEvent::RecordsPruned {
                removed: removed.to_vec(),
            });
        }
    }

    fn enrich(&self, record: VehicleRecord) -> (VehicleRecord, bool) {
        let Some(lookup) = self.lookup.as_ref() else {
            self.enrichment_unavailable(&record, "no spec lookup configured");
            return (record, false);
        };
        if !record.is_identified() {
            self.enrichment_unavailable(&record, "record is not fully identified");
            return (record, false);
        }
        match lookup.lookup_specs(&record.make, &record.model, &record.year) {
            Ok(specs) if specs.is_empty() => {
                self.enrichment_unavailable(&record, "no matching specification");
                (record, false)
            }
            Ok(specs) => {
                let fields = specs.keys().cloned().collect::<Vec<String>>();
                let merged = merge(record, specs);
                self.record_event(CollectionEvent::EnrichmentMerged {
                    lookup: lookup.name().to_string(),
                    title: merged.title(),
                    fields,
                });
                (merged, true)
            }
            Err(err) => {
                warn!("spec lookup via {} failed: {err:#}", lookup.name());
                self.enrichment_unavailable(&record, &format!("{err:#}"));
                (record, false)
            }
        }
    }

    fn enrichment_unavailable(&self, record: &VehicleRecord, reason: &str) {
        warn!("enrichment unavailable for {}: {reason}", record.title());
        self.record_event(CollectionEvent::EnrichmentUnavailable {
            title: record.title(),
            reason: reason.to_string(),
        });
    }

    fn record_event(&self, event: CollectionEvent) {
        if let Err(err) = self.events.append(&event) {
            warn!("event trail write failed: {err:#}");
        }
    }
}

fn image_extension(image: &[u8]) -> &'static str {
    image::guess_format(image)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(DEFAULT_IMAGE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;

    use anyhow::{anyhow, Result};
    use carspotter_contracts::cards::{LogoCatalog, Powertrain, RenderVariant};
    use carspotter_contracts::records::{BoundingBox, Degradation};
    use image::{ImageFormat, RgbImage};
    use serde_json::{json, Map, Value};

    use super::{
        image_extension, AddOptions, Collection, CollectionConfig, DryrunIdentifier, SpecLookup,
        StaticLookup, VehicleIdentifier,
    };

    struct FailingIdentifier;

    impl VehicleIdentifier for FailingIdentifier {
        fn name(&self) -> &str {
            "failing"
        }

        fn identify(&self, _image: &[u8], _want_bbox: bool) -> Result<String> {
            Err(anyhow!("quota exceeded"))
        }
    }

    struct FailingLookup;

    impl SpecLookup for FailingLookup {
        fn name(&self) -> &str {
            "failing"
        }

        fn lookup_specs(&self, _make: &str, _model: &str, _year: &str) -> Result<Map<String, Value>> {
            Err(anyhow!("lookup service unreachable"))
        }
    }

    fn png_bytes(size: u32) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        RgbImage::new(size, size).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    fn tesla_specs() -> Map<String, Value> {
        json!({
            "make": "tesla",
            "model": "model s",
            "year": 2023,
            "drive": "awd",
            "displacement": 0,
            "city_mpg": 124,
            "highway_mpg": 115,
            "fuel_type": "electricity",
            "cylinders": 0,
            "class": "large car",
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    fn event_types(path: &Path) -> Result<Vec<String>> {
        let raw = fs::read_to_string(path)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    fn image_files(dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name.ends_with(".png") {
                names.push(name);
            }
        }
        Ok(names)
    }

    #[test]
    fn add_vehicle_persists_image_and_record() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path().join("cars"));
        let collection = Collection::new(&config, Box::new(DryrunIdentifier::default()));

        let added = collection.add_vehicle(&png_bytes(8)?, AddOptions::default())?;
        assert!(added.key.ends_with(".png"));
        assert!(added.image_path.exists());
        assert_eq!(added.record.title(), "2023 Tesla Model S");
        assert_eq!(added.record.bounding_box, None);
        assert!(!added.enriched);

        let stored = collection.store().load()?;
        assert_eq!(stored.get(&added.key), Some(&added.record));
        assert_eq!(
            event_types(&config.events_path())?,
            vec!["vehicle_identified", "record_saved"]
        );
        Ok(())
    }

    #[test]
    fn boxed_and_enriched_vehicle_renders_full_spec() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path());
        let mut lookup = StaticLookup::new();
        lookup.insert("Tesla", "Model S", "2023", tesla_specs());
        let collection = Collection::new(&config, Box::new(DryrunIdentifier::default()))
            .with_lookup(Box::new(lookup))
            .with_logos(LogoCatalog::from_pairs([(
                "Tesla".to_string(),
                "https://logos.example/tesla.png".to_string(),
            )]));

        let added = collection.add_vehicle(
            &png_bytes(8)?,
            AddOptions {
                want_bbox: true,
                enrich: true,
            },
        )?;
        assert!(added.enriched);
        assert_eq!(added.record.make, "Tesla");
        assert_eq!(added.record.bounding_box, BoundingBox::new(10, 20, 300, 250));
        assert_eq!(added.record.enrichment_value("make"), None);

        let cards = collection.gallery()?;
        assert_eq!(cards.len(), 1);
        assert_eq!(
            cards[0].logo_url.as_deref(),
            Some("https://logos.example/tesla.png")
        );
        let RenderVariant::FullSpec(sheet) = &cards[0].variant else {
            return Err(anyhow!("expected full spec card"));
        };
        assert_eq!(sheet.powertrain, Powertrain::Electric);
        assert_eq!(sheet.average_mpg, 119.5);
        Ok(())
    }

    #[test]
    fn malformed_reply_persists_nothing() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path());
        let collection = Collection::new(&config, Box::new(DryrunIdentifier::with_reply("2023, Tesla")));

        let err = collection
            .add_vehicle(&png_bytes(8)?, AddOptions::default())
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("2023, Tesla"));
        assert!(collection.store().load()?.is_empty());
        assert!(image_files(temp.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn failed_identification_persists_nothing() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path());
        let collection = Collection::new(&config, Box::new(FailingIdentifier));

        let err = collection
            .add_vehicle(&png_bytes(8)?, AddOptions::default())
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(err.contains("quota exceeded"));
        assert!(collection.store().load()?.is_empty());
        assert!(image_files(temp.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_box_degrades_but_still_saves() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path());
        let collection = Collection::new(
            &config,
            Box::new(DryrunIdentifier::with_reply(
                "(2023, Tesla, Model S, #000000), (300, 20, 10, 250)",
            )),
        );

        let added = collection.add_vehicle(
            &png_bytes(8)?,
            AddOptions {
                want_bbox: true,
                enrich: false,
            },
        )?;
        assert_eq!(added.record.bounding_box, None);
        assert_eq!(
            added.degradation,
            Some(Degradation::InvalidBoundingBox([300, 20, 10, 250]))
        );
        assert_eq!(collection.store().load()?.len(), 1);
        Ok(())
    }

    #[test]
    fn unavailable_enrichment_is_not_an_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path());
        let options = AddOptions {
            want_bbox: false,
            enrich: true,
        };

        let failing = Collection::new(&config, Box::new(DryrunIdentifier::default()))
            .with_lookup(Box::new(FailingLookup));
        let added = failing.add_vehicle(&png_bytes(8)?, options)?;
        assert!(!added.enriched);
        assert_eq!(added.record.enrichment, None);

        let empty = Collection::new(&config, Box::new(DryrunIdentifier::default()))
            .with_lookup(Box::new(StaticLookup::new()));
        assert!(!empty.add_vehicle(&png_bytes(8)?, options)?.enriched);

        let unconfigured = Collection::new(&config, Box::new(DryrunIdentifier::default()));
        assert!(!unconfigured.add_vehicle(&png_bytes(8)?, options)?.enriched);

        let types = event_types(&config.events_path())?;
        assert_eq!(
            types
                .iter()
                .filter(|kind| kind.as_str() == "enrichment_unavailable")
                .count(),
            3
        );
        assert_eq!(failing.store().load()?.len(), 3);
        Ok(())
    }

    #[test]
    fn unwritable_event_trail_does_not_block_adds() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut config = CollectionConfig::new(temp.path().join("cars"));
        config.events_path = Some(temp.path().to_path_buf());
        let collection = Collection::new(&config, Box::new(DryrunIdentifier::default()));

        let added = collection.add_vehicle(&png_bytes(8)?, AddOptions::default())?;
        assert!(added.image_path.exists());
        assert_eq!(collection.store().get(&added.key)?, Some(added.record));
        assert_eq!(collection.gallery()?.len(), 1);
        Ok(())
    }

    #[test]
    fn gallery_lists_newest_first_and_prunes_missing_images() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path());
        let first = Collection::new(
            &config,
            Box::new(DryrunIdentifier::with_reply("1967, Ford, Mustang, #ff0000")),
        );
        let second = Collection::new(
            &config,
            Box::new(DryrunIdentifier::with_reply("1998, Toyota, Supra, #ffffff")),
        );
        let third = Collection::new(
            &config,
            Box::new(DryrunIdentifier::with_reply("2005, Honda, S2000, #000000")),
        );
        let mustang = first.add_vehicle(&png_bytes(8)?, AddOptions::default())?;
        let supra = second.add_vehicle(&png_bytes(8)?, AddOptions::default())?;
        let s2000 = third.add_vehicle(&png_bytes(8)?, AddOptions::default())?;
        fs::remove_file(&supra.image_path)?;

        let cards = first.gallery()?;
        let keys = cards.iter().map(|card| card.key.clone()).collect::<Vec<String>>();
        assert_eq!(keys, vec![s2000.key.clone(), mustang.key.clone()]);
        assert_eq!(cards[0].accent_color, "#000000");
        assert_eq!(cards[1].variant, RenderVariant::Minimal);
        assert!(first.store().get(&supra.key)?.is_none());
        assert!(first.prune()?.is_empty());
        assert!(event_types(&config.events_path())?.contains(&"records_pruned".to_string()));
        Ok(())
    }

    #[test]
    fn annotate_writes_copy_for_boxed_records_only() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = CollectionConfig::new(temp.path());
        let boxed = Collection::new(
            &config,
            Box::new(DryrunIdentifier::with_reply("(2023, Tesla, Model S, #000000), (2, 2, 12, 12)")),
        );
        let plain = Collection::new(&config, Box::new(DryrunIdentifier::default()));
        let with_box = boxed.add_vehicle(
            &png_bytes(16)?,
            AddOptions {
                want_bbox: true,
                enrich: false,
            },
        )?;
        let without_box = plain.add_vehicle(&png_bytes(16)?, AddOptions::default())?;

        let out = boxed.annotate(&with_box.key)?;
        assert_eq!(
            out.as_deref(),
            Some(temp.path().join(format!("annotated_{}", with_box.key)).as_path())
        );
        assert_eq!(boxed.annotate(&without_box.key)?, None);
        assert!(boxed.annotate("missing.png").is_err());
        assert_eq!(boxed.annotate_all()?.len(), 1);
        Ok(())
    }

    #[test]
    fn unknown_bytes_default_to_png_extension() -> Result<()> {
        assert_eq!(image_extension(b"not an image"), "png");
        assert_eq!(image_extension(&png_bytes(2)?), "png");
        Ok(())
    }
}
