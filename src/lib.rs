pub mod attributes;
pub mod config;
pub mod descriptor;
pub mod dictionary;
pub mod error;
pub mod item;
pub mod quarantine;
pub mod script;
pub mod stage;

pub use attributes::{AttrValue, AttributeExtractor, AttributeMap, AttributePath};
pub use config::StageConfig;
pub use error::{QuarantineError, ScriptError, StageError};
pub use item::{DicomDataset, Item, ItemKind, Tag};
pub use quarantine::{DirectoryQuarantine, QuarantineSink};
pub use script::{CompiledScript, ReloadPolicy, ScriptSource};
pub use stage::{FilterOutcome, FilterStage, PipelineStage, StageStatus};
