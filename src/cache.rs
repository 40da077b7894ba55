//! Script cache for plotgen
//!
//! Persists synthesized scripts and their lookup index under the
//! per-user cache root (`~/.cache/plotgen` on Linux) so structurally
//! similar data never pays for a second synthesis.
//!
//! # Error Handling
//!
//! Loading is best-effort: a missing or corrupt `metadata.json` means
//! "start fresh", never a fatal error, because everything in the cache
//! can be regenerated. Writes go through a lock file plus an atomic
//! temp-file rename so concurrent invocations degrade to last-writer-
//! wins instead of torn files.

use fs2::FileExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const METADATA_FILE: &str = "metadata.json";
const SCRIPTS_DIR: &str = "scripts";
const CACHE_LOCK_TIMEOUT_SECS: u64 = 5;
const CACHE_LOCK_RETRY_MS: u64 = 50;

/// The persistent index: instruction text -> pattern -> script id.
///
/// `IndexMap` keeps insertion order, which is also the matcher's probe
/// order: the oldest stored pattern for an instruction is tried first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(rename = "instructionsToRegexToScriptId", default)]
    pub patterns_by_instruction: IndexMap<String, IndexMap<String, String>>,
}

/// Content identifier for a script body (sha256 hex digest).
pub fn script_id(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The cache manager
pub struct CacheStore {
    cache_dir: PathBuf,
}

struct CacheLock {
    file: std::fs::File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl CacheStore {
    /// Create a store rooted at an explicit directory (tests use this).
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Create a store at the conventional per-user location.
    pub fn open_default() -> anyhow::Result<Self> {
        let root = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?;
        Ok(Self::new(root.join("plotgen")))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where a script with the given content id lives (or would live).
    pub fn script_path(&self, id: &str) -> PathBuf {
        self.cache_dir.join(SCRIPTS_DIR).join(format!("{}.py", id))
    }

    fn metadata_path(&self) -> PathBuf {
        self.cache_dir.join(METADATA_FILE)
    }

    fn ensure_dir(&self) -> anyhow::Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> anyhow::Result<CacheLock> {
        if exclusive {
            self.ensure_dir()?;
        } else if !self.cache_dir.exists() {
            return Err(anyhow::anyhow!("Cache directory missing"));
        }

        let lock_path = self.cache_dir.join(".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // Lock file content doesn't matter, just the lock
            .open(&lock_path)?;

        let start = Instant::now();
        loop {
            let result = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match result {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(err.into());
                    }
                    if start.elapsed() >= Duration::from_secs(CACHE_LOCK_TIMEOUT_SECS) {
                        return Err(anyhow::anyhow!(
                            "Timed out waiting for cache lock ({}s)",
                            CACHE_LOCK_TIMEOUT_SECS
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(CACHE_LOCK_RETRY_MS));
                }
            }
        }

        Ok(CacheLock { file })
    }

    /// Load the persisted index; missing or unreadable means empty.
    pub fn load(&self) -> CacheMetadata {
        let path = self.metadata_path();
        if !path.exists() {
            return CacheMetadata::default();
        }
        let _lock = match self.lock(false) {
            Ok(lock) => lock,
            Err(_) => return CacheMetadata::default(),
        };
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(metadata) => metadata,
                Err(err) => {
                    eprintln!(
                        "  Warning: Cache metadata was corrupted ({}). Starting with an empty cache.",
                        err
                    );
                    CacheMetadata::default()
                }
            },
            Err(_) => CacheMetadata::default(),
        }
    }

    /// Persist the full index.
    pub fn save(&self, metadata: &CacheMetadata) -> anyhow::Result<()> {
        let _lock = self.lock(true)?;
        let content = serde_json::to_string_pretty(metadata)?;
        write_atomic(&self.metadata_path(), &content)?;
        Ok(())
    }

    /// Store an accepted script and index it under (instructions, pattern).
    ///
    /// The script lands at `scripts/<sha256>.py`, marked executable.
    /// Committing identical content twice hits the same path with the
    /// same bytes, so the write is skipped; the index entry for the
    /// pattern is overwritten either way (last write wins).
    pub fn commit(
        &self,
        body: &str,
        instructions: &str,
        pattern: &str,
        metadata: &mut CacheMetadata,
    ) -> anyhow::Result<PathBuf> {
        let id = script_id(body);
        let path = self.script_path(&id);

        {
            let _lock = self.lock(true)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            let already_current = fs::read_to_string(&path)
                .map(|existing| existing == body)
                .unwrap_or(false);
            if !already_current {
                write_atomic(&path, body)?;
            }
            mark_executable(&path)?;
        }

        metadata
            .patterns_by_instruction
            .entry(instructions.to_string())
            .or_default()
            .insert(pattern.to_string(), id);
        self.save(metadata)?;

        Ok(path)
    }
}

fn mark_executable(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Write content atomically by writing to a temp file first, then renaming.
fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
