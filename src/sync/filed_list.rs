//! Cross-process mutable lists persisted as single files, guarded by
//! exclusive advisory locks on a `<path>.lock` sibling.
//!
//! Two flavors, chosen once per file: a JSON array of records (`FiledList`,
//! used for in-flight torrent descriptors) and one integer per line
//! (`ProcessedSet`, used for per-strategy processed-id sets). A scope is:
//! acquire the lock, parse, mutate in memory, `commit()` to flush. Dropping
//! the guard without committing discards the changes; either way the lock is
//! released.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

fn acquire_lock(path: &Path) -> Result<File> {
    let lock_path = PathBuf::from(format!("{}.lock", path.display()));
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("opening lock file {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| format!("locking {}", lock_path.display()))?;
    Ok(lock_file)
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    {
        let mut f = File::create(&tmp)?;
        f.write_all(contents)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// JSON-array flavor. The guard owns the lock for its whole lifetime.
pub struct FiledList<T> {
    path: PathBuf,
    lock_file: File,
    readonly: bool,
    pub items: Vec<T>,
}

impl<T: Serialize + DeserializeOwned> FiledList<T> {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_inner(path, false)
    }

    /// Never flushes, even through `commit()`.
    pub fn open_readonly(path: &Path) -> Result<Self> {
        Self::open_inner(path, true)
    }

    fn open_inner(path: &Path, readonly: bool) -> Result<Self> {
        let lock_file = acquire_lock(path)?;
        let items = match std::fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
            readonly,
            items,
        })
    }

    /// Flush the in-memory list back to the file and release the lock.
    pub fn commit(self) -> Result<()> {
        if !self.readonly {
            let bytes = serde_json::to_vec_pretty(&self.items)?;
            write_atomically(&self.path, &bytes)?;
        }
        FileExt::unlock(&self.lock_file).ok();
        Ok(())
    }
}

impl<T> Drop for FiledList<T> {
    fn drop(&mut self) {
        // Dropped without commit: discard changes, release the lock.
        FileExt::unlock(&self.lock_file).ok();
    }
}

/// Integer-per-line flavor, used as a persistent "already processed" set.
pub struct ProcessedSet {
    path: PathBuf,
    lock_file: File,
    order: Vec<i32>,
    seen: HashSet<i32>,
}

impl ProcessedSet {
    pub fn open(path: &Path) -> Result<Self> {
        let lock_file = acquire_lock(path)?;
        let mut order = Vec::new();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let id: i32 = line
                        .parse()
                        .with_context(|| format!("parsing {}: bad line {line:?}", path.display()))?;
                    order.push(id);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let seen = order.iter().copied().collect();
        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
            order,
            seen,
        })
    }

    #[must_use]
    pub fn contains(&self, id: i32) -> bool {
        self.seen.contains(&id)
    }

    pub fn insert(&mut self, id: i32) {
        if self.seen.insert(id) {
            self.order.push(id);
        }
    }

    #[must_use]
    pub fn ids(&self) -> &HashSet<i32> {
        &self.seen
    }

    pub fn commit(self) -> Result<()> {
        let mut out = String::with_capacity(self.order.len() * 8);
        for id in &self.order {
            out.push_str(&id.to_string());
            out.push('\n');
        }
        write_atomically(&self.path, out.as_bytes())?;
        FileExt::unlock(&self.lock_file).ok();
        Ok(())
    }
}

impl Drop for ProcessedSet {
    fn drop(&mut self) {
        FileExt::unlock(&self.lock_file).ok();
    }
}
