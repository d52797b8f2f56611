//! Pipeline stage that filters DICOM items with a match script.
//!
//! Items that satisfy the script continue downstream unchanged. Items that
//! do not are handed to the quarantine sink, if one is configured, and the
//! stage returns nothing for them. Items without attributes always pass.

use crate::attributes::AttributeExtractor;
use crate::config::StageConfig;
use crate::error::{Result, ScriptError, StageError};
use crate::item::Item;
use crate::quarantine::{DirectoryQuarantine, QuarantineSink};
use crate::script::{ReloadPolicy, ScriptSource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// The capability a host pipeline needs from a stage.
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the item to pass downstream, or `None` to stop it here.
    fn process(&self, item: Item) -> Result<Option<Item>>;

    /// Script files the stage depends on, for display and editing.
    fn script_files(&self) -> Vec<PathBuf>;

    fn status(&self) -> StageStatus;
}

/// Telemetry snapshot.
///
/// Egress fields describe the last item that actually continued downstream;
/// they are left untouched when an item is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageStatus {
    pub last_file_in: Option<PathBuf>,
    pub last_time_in: Option<DateTime<Utc>>,
    pub last_file_out: Option<PathBuf>,
    pub last_time_out: Option<DateTime<Utc>>,
    pub received: u64,
    pub passed: u64,
    pub rejected: u64,
    pub quarantine_failures: u64,
}

#[derive(Debug)]
pub enum FilterOutcome {
    Pass(Item),
    Reject(Item),
}

pub struct FilterStage {
    name: String,
    script: ScriptSource,
    extractor: AttributeExtractor,
    quarantine: Option<Arc<dyn QuarantineSink>>,
    status: Mutex<StageStatus>,
}

impl FilterStage {
    pub fn new(name: impl Into<String>, script: ScriptSource) -> Self {
        FilterStage {
            name: name.into(),
            script,
            extractor: AttributeExtractor::default(),
            quarantine: None,
            status: Mutex::new(StageStatus::default()),
        }
    }

    /// Loads and parses the script up front; a stage is never built around a
    /// script that cannot be read or parsed.
    pub fn open(
        name: impl Into<String>,
        script: impl Into<PathBuf>,
        policy: ReloadPolicy,
    ) -> std::result::Result<Self, ScriptError> {
        Ok(Self::new(name, ScriptSource::load(script, policy)?))
    }

    pub fn from_config(config: &StageConfig) -> Result<Self> {
        let mut stage = Self::open(&config.name, &config.script, config.reload)?;
        if let Some(dir) = &config.quarantine {
            let sink = DirectoryQuarantine::new(dir).map_err(|source| StageError::Quarantine {
                file: dir.clone(),
                source,
            })?;
            stage = stage.with_quarantine(Arc::new(sink));
        }
        Ok(stage)
    }

    pub fn with_quarantine(mut self, sink: Arc<dyn QuarantineSink>) -> Self {
        self.quarantine = Some(sink);
        self
    }

    pub fn with_extractor(mut self, extractor: AttributeExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn script(&self) -> &ScriptSource {
        &self.script
    }

    /// Forces the script file to be re-read.
    pub fn reload(&self) -> std::result::Result<bool, ScriptError> {
        self.script.reload()
    }

    /// Routing decision for one item. Touches neither telemetry nor the
    /// quarantine.
    pub fn filter(&self, item: Item) -> FilterOutcome {
        let Some(attributes) = self.extractor.extract_item(&item) else {
            return FilterOutcome::Pass(item);
        };
        let script = self.script.current();
        let matched = script.matches(&attributes);
        log::debug!(
            "[{}] {} script result: {matched}",
            self.name,
            item.file().display()
        );
        if matched {
            FilterOutcome::Pass(item)
        } else {
            FilterOutcome::Reject(item)
        }
    }

    fn update_status(&self, update: impl FnOnce(&mut StageStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut status);
    }

    fn record_egress(&self, file: &Path, at: DateTime<Utc>) {
        self.update_status(|s| {
            s.last_file_out = Some(file.to_path_buf());
            s.last_time_out = Some(at);
            s.passed += 1;
        });
    }

    fn dispatch_rejected(&self, item: Item) -> Result<()> {
        self.update_status(|s| s.rejected += 1);

        let Some(sink) = &self.quarantine else {
            log::info!(
                "[{}] Dropping {} (no quarantine configured)",
                self.name,
                item.file().display()
            );
            return Ok(());
        };

        let file = item.file().to_path_buf();
        sink.insert(item).map_err(|source| {
            log::error!("[{}] Failed to quarantine {}: {source}", self.name, file.display());
            self.update_status(|s| s.quarantine_failures += 1);
            StageError::Quarantine { file, source }
        })
    }
}

impl PipelineStage for FilterStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, item: Item) -> Result<Option<Item>> {
        let received_at = Utc::now();
        self.update_status(|s| {
            s.last_file_in = Some(item.file().to_path_buf());
            s.last_time_in = Some(received_at);
            s.received += 1;
        });

        if item.dataset().is_none() {
            self.record_egress(item.file(), received_at);
            return Ok(Some(item));
        }

        match self.filter(item) {
            FilterOutcome::Pass(item) => {
                self.record_egress(item.file(), Utc::now());
                Ok(Some(item))
            }
            FilterOutcome::Reject(item) => {
                self.dispatch_rejected(item)?;
                Ok(None)
            }
        }
    }

    fn script_files(&self) -> Vec<PathBuf> {
        vec![self.script.path().to_path_buf()]
    }

    fn status(&self) -> StageStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarantineError;
    use crate::item::{DicomDataset, Element, Tag, Vr};
    use tempfile::TempDir;

    struct Recording(Mutex<Vec<Item>>);

    impl QuarantineSink for Recording {
        fn insert(&self, item: Item) -> std::result::Result<(), QuarantineError> {
            self.0.lock().unwrap().push(item);
            Ok(())
        }
    }

    fn stage(dir: &TempDir, script: &str) -> FilterStage {
        let path = dir.path().join("filter.script");
        std::fs::write(&path, script).unwrap();
        FilterStage::open("TestFilter", path, ReloadPolicy::Never).unwrap()
    }

    fn ct(file: &str) -> Item {
        let dataset = DicomDataset::new().with(Tag(0x0008, 0x0060), Element::text(Vr::CS, "CT"));
        Item::dicom(file, dataset)
    }

    #[test]
    fn test_filter_outcome_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let stage = stage(&dir, r#"Modality = "MR""#);

        assert!(matches!(stage.filter(ct("/a.dcm")), FilterOutcome::Reject(_)));
        assert!(matches!(
            stage.filter(Item::plain("/a.zip")),
            FilterOutcome::Pass(_)
        ));
        assert_eq!(stage.status(), StageStatus::default());
    }

    #[test]
    fn test_rejected_without_quarantine_is_dropped() {
        let dir = TempDir::new().unwrap();
        let stage = stage(&dir, r#"Modality = "MR""#);

        assert!(stage.process(ct("/a.dcm")).unwrap().is_none());
        let status = stage.status();
        assert_eq!(status.rejected, 1);
        assert_eq!(status.quarantine_failures, 0);
        assert!(status.last_file_out.is_none());
    }

    #[test]
    fn test_counters() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(Recording(Mutex::new(Vec::new())));
        let stage = stage(&dir, r#"Modality = "CT""#).with_quarantine(sink.clone());

        stage.process(ct("/1.dcm")).unwrap();
        stage.process(Item::plain("/2.zip")).unwrap();
        stage
            .process(Item::dicom("/3.dcm", DicomDataset::new()))
            .unwrap();

        let status = stage.status();
        assert_eq!(
            (status.received, status.passed, status.rejected),
            (3, 2, 1)
        );
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_extractor_depth_limits_sequence_paths() {
        let dir = TempDir::new().unwrap();
        let code = DicomDataset::new().with(Tag(0x0008, 0x0100), Element::text(Vr::SH, "T-04000"));
        let dataset =
            DicomDataset::new().with(Tag(0x0040, 0xA730), Element::sequence(vec![code]));
        let script = r#"ContentSequence::CodeValue = "T-04000""#;

        let deep = stage(&dir, script);
        assert!(matches!(
            deep.filter(Item::dicom("/sr.dcm", dataset.clone())),
            FilterOutcome::Pass(_)
        ));

        let flat = stage(&dir, script).with_extractor(AttributeExtractor::new(0));
        assert!(matches!(
            flat.filter(Item::dicom("/sr.dcm", dataset)),
            FilterOutcome::Reject(_)
        ));
    }

    #[test]
    fn test_script_files_and_name() {
        let dir = TempDir::new().unwrap();
        let stage = stage(&dir, "TRUE");
        assert_eq!(stage.name(), "TestFilter");
        assert_eq!(stage.script_files(), vec![dir.path().join("filter.script")]);
    }

    #[test]
    fn test_from_config_creates_quarantine_dir() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("filter.script");
        std::fs::write(&script, "TRUE").unwrap();
        let config = StageConfig {
            name: "Configured".to_string(),
            script,
            quarantine: Some(dir.path().join("quarantine")),
            reload: ReloadPolicy::Never,
        };

        let stage = FilterStage::from_config(&config).unwrap();
        assert_eq!(stage.name(), "Configured");
        assert!(dir.path().join("quarantine").is_dir());
    }
}
