use super::expr::Expr;
use super::parser::parse;
use crate::attributes::AttributeMap;
use crate::error::ScriptError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadPolicy {
    /// Keep the tree parsed at construction for the lifetime of the stage.
    Never,
    /// Re-parse when the file's content signature changes.
    #[default]
    OnChange,
}

/// An immutable parsed script together with the signature of the text it
/// was parsed from.
#[derive(Debug)]
pub struct CompiledScript {
    expr: Expr,
    signature: blake3::Hash,
    loaded_at: DateTime<Utc>,
}

impl CompiledScript {
    pub fn compile(text: &str) -> Result<Self, ScriptError> {
        Ok(CompiledScript {
            expr: parse(text)?,
            signature: blake3::hash(text.as_bytes()),
            loaded_at: Utc::now(),
        })
    }

    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        self.expr.evaluate(attributes)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn signature(&self) -> String {
        self.signature.to_hex().to_string()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self, ScriptError> {
        let metadata = fs::metadata(path).map_err(|source| ScriptError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

/// A script file and the most recently published tree parsed from it.
///
/// Readers clone the published `Arc` and evaluate outside any lock, so a
/// reload never disturbs an evaluation already in flight. Only one caller
/// checks the file at a time; everyone else keeps the published tree.
pub struct ScriptSource {
    path: PathBuf,
    policy: ReloadPolicy,
    current: RwLock<Arc<CompiledScript>>,
    /// Last observed file state; `None` while the file cannot be stat'ed.
    stamp: Mutex<Option<FileStamp>>,
}

impl ScriptSource {
    pub fn load(path: impl Into<PathBuf>, policy: ReloadPolicy) -> Result<Self, ScriptError> {
        let path = path.into();
        let stamp = FileStamp::of(&path)?;
        let text = read_script(&path)?;
        let compiled = CompiledScript::compile(&text)?;
        log::info!(
            "Loaded script {} (signature {})",
            path.display(),
            &compiled.signature()[..12]
        );

        Ok(ScriptSource {
            path,
            policy,
            current: RwLock::new(Arc::new(compiled)),
            stamp: Mutex::new(Some(stamp)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// The tree to evaluate the next item against. Under
    /// [`ReloadPolicy::OnChange`] the file is checked first unless another
    /// caller is already checking it; a broken edit leaves the previous tree
    /// in place.
    pub fn current(&self) -> Arc<CompiledScript> {
        if self.policy == ReloadPolicy::OnChange {
            let last_stamp = match self.stamp.try_lock() {
                Ok(guard) => Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => None,
            };
            if let Some(mut last_stamp) = last_stamp {
                if let Err(e) = self.refresh(&mut last_stamp, false) {
                    log::warn!(
                        "Keeping previous script for {}: {e}",
                        self.path.display()
                    );
                }
            }
        }
        self.published()
    }

    /// Re-reads the file regardless of its metadata. Returns whether a new
    /// tree was published.
    pub fn reload(&self) -> Result<bool, ScriptError> {
        let mut last_stamp = self.stamp.lock().unwrap_or_else(PoisonError::into_inner);
        self.refresh(&mut last_stamp, true)
    }

    fn published(&self) -> Arc<CompiledScript> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn refresh(
        &self,
        last_stamp: &mut Option<FileStamp>,
        force: bool,
    ) -> Result<bool, ScriptError> {
        let stamp = FileStamp::of(&self.path);
        let observed = stamp.as_ref().ok().copied();
        if !force && observed == *last_stamp {
            return Ok(false);
        }
        // Recorded before parsing so a broken or missing file is reported
        // once per change rather than once per item
        *last_stamp = observed;
        stamp?;

        let text = read_script(&self.path)?;
        let signature = blake3::hash(text.as_bytes());
        if signature == self.published().signature {
            log::debug!("Script {} touched but content unchanged", self.path.display());
            return Ok(false);
        }

        let compiled = Arc::new(CompiledScript::compile(&text)?);
        log::info!(
            "Reloaded script {} (signature {}, loaded at {})",
            self.path.display(),
            &compiled.signature()[..12],
            compiled.loaded_at().to_rfc3339()
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = compiled;
        Ok(true)
    }
}

fn read_script(path: &Path) -> Result<String, ScriptError> {
    fs::read_to_string(path).map_err(|source| ScriptError::Load {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttrValue, AttributePath};
    use crate::item::Tag;
    use tempfile::TempDir;

    fn modality(value: &str) -> AttributeMap {
        [(
            AttributePath::from(Tag(0x0008, 0x0060)),
            AttrValue::Text(value.to_string()),
        )]
        .into_iter()
        .collect()
    }

    fn write_script(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("filter.script");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let result = ScriptSource::load(dir.path().join("absent.script"), ReloadPolicy::Never);
        assert!(matches!(result, Err(ScriptError::Load { .. })));
    }

    #[test]
    fn test_signature_identifies_content() {
        let a = CompiledScript::compile(r#"Modality = "CT""#).unwrap();
        let b = CompiledScript::compile(r#"Modality = "CT""#).unwrap();
        let c = CompiledScript::compile(r#"Modality = "MR""#).unwrap();
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert_eq!(a.signature().len(), 64);
    }

    #[test]
    fn test_on_change_publishes_new_tree() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, r#"Modality = "CT""#);
        let source = ScriptSource::load(&path, ReloadPolicy::OnChange).unwrap();
        let before = source.current();

        // Different length so the change is visible even with coarse mtimes
        fs::write(&path, r#"Modality = "CT" OR Modality = "MR""#).unwrap();
        let after = source.current();

        assert!(!before.matches(&modality("MR")));
        assert!(after.matches(&modality("MR")));
        assert_ne!(before.signature(), after.signature());
        assert!(after.loaded_at() >= before.loaded_at());
    }

    #[test]
    fn test_never_policy_pins_tree() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, r#"Modality = "CT""#);
        let source = ScriptSource::load(&path, ReloadPolicy::Never).unwrap();

        fs::write(&path, r#"Modality = "CT" OR Modality = "MR""#).unwrap();
        assert!(!source.current().matches(&modality("MR")));

        // An explicit reload still picks the edit up
        assert!(source.reload().unwrap());
        assert!(source.current().matches(&modality("MR")));
    }

    #[test]
    fn test_broken_edit_keeps_previous_tree() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, r#"Modality = "CT""#);
        let source = ScriptSource::load(&path, ReloadPolicy::OnChange).unwrap();

        fs::write(&path, "Modality = ").unwrap();
        assert!(source.current().matches(&modality("CT")));
        assert!(matches!(source.reload(), Err(ScriptError::Parse { .. })));

        fs::remove_file(&path).unwrap();
        assert!(source.current().matches(&modality("CT")));
        assert!(matches!(source.reload(), Err(ScriptError::Load { .. })));
    }

    #[test]
    fn test_missing_file_reported_once_per_change() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, r#"Modality = "CT""#);
        let source = ScriptSource::load(&path, ReloadPolicy::OnChange).unwrap();
        fs::remove_file(&path).unwrap();

        let mut stamp = source.stamp.lock().unwrap();
        assert!(matches!(
            source.refresh(&mut stamp, false),
            Err(ScriptError::Load { .. })
        ));
        assert_eq!(*stamp, None);
        // Still missing: nothing new to report
        assert!(!source.refresh(&mut stamp, false).unwrap());
        drop(stamp);

        fs::write(&path, r#"Modality = "MR""#).unwrap();
        assert!(source.current().matches(&modality("MR")));
    }

    #[test]
    fn test_readers_skip_check_while_another_is_reloading() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, r#"Modality = "CT""#);
        let source = ScriptSource::load(&path, ReloadPolicy::OnChange).unwrap();
        fs::write(&path, r#"Modality = "CT" OR Modality = "MR""#).unwrap();

        // Stands in for a worker that is in the middle of a reload
        let checking = source.stamp.lock().unwrap();
        std::thread::scope(|s| {
            let reader = s.spawn(|| source.current());
            let script = reader.join().unwrap();
            assert!(!script.matches(&modality("MR")));
        });
        drop(checking);

        assert!(source.current().matches(&modality("MR")));
    }

    #[test]
    fn test_unchanged_content_is_not_republished() {
        let dir = TempDir::new().unwrap();
        let path = write_script(&dir, r#"Modality = "CT""#);
        let source = ScriptSource::load(&path, ReloadPolicy::OnChange).unwrap();
        let before = source.current();

        assert!(!source.reload().unwrap());
        assert!(Arc::ptr_eq(&before, &source.current()));
    }
}
