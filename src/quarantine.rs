use crate::error::QuarantineError;
use crate::item::Item;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Destination for items a stage refuses to pass downstream.
pub trait QuarantineSink: Send + Sync {
    /// Takes ownership of the item.
    fn insert(&self, item: Item) -> Result<(), QuarantineError>;
}

/// Copies each quarantined item's file into a directory.
///
/// A file keeps its own name unless that name is taken, in which case it
/// gets the next suffix from a counter shared by the whole directory.
pub struct DirectoryQuarantine {
    dir: PathBuf,
    next_suffix: AtomicU32,
}

impl DirectoryQuarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, QuarantineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DirectoryQuarantine {
            dir,
            next_suffix: AtomicU32::new(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claims a file name that no other insert can take.
    fn reserve(&self, file: &Path) -> Result<PathBuf, QuarantineError> {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "item".to_string());
        let extension = file.extension().map(|e| e.to_string_lossy().into_owned());

        let name = |n: u32| match &extension {
            Some(ext) if n == 0 => format!("{stem}.{ext}"),
            None if n == 0 => stem.clone(),
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };

        if let Some(claimed) = self.claim(name(0))? {
            return Ok(claimed);
        }
        for _ in 0..u32::MAX {
            let n = self.next_suffix.fetch_add(1, Ordering::Relaxed);
            if n == 0 {
                continue;
            }
            if let Some(claimed) = self.claim(name(n))? {
                return Ok(claimed);
            }
        }
        Err(QuarantineError::Rejected(format!(
            "no free name for {} in {}",
            file.display(),
            self.dir.display()
        )))
    }

    fn claim(&self, name: String) -> Result<Option<PathBuf>, QuarantineError> {
        let candidate = self.dir.join(name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => Ok(Some(candidate)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl QuarantineSink for DirectoryQuarantine {
    fn insert(&self, item: Item) -> Result<(), QuarantineError> {
        let target = self.reserve(item.file())?;
        if let Err(e) = fs::copy(item.file(), &target) {
            let _ = fs::remove_file(&target);
            return Err(e.into());
        }
        log::info!(
            "Quarantined {} as {}",
            item.file().display(),
            target.display()
        );
        Ok(())
    }
}
