// Holder Cache Store, spec §4.1.
//
// Keyed by `(chain, token)`. The source material's on-disk key omits chain
// id, so two tokens sharing an address across chains would collide (spec
// §9 Open Questions); we prefix filenames with chain id to resolve that.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use alloy_primitives::Address;
use ww_common::error::CacheError;
use ww_common::time::{get_current_time_in_seconds, TimestampSeconds};

use crate::state::{CachedHolderSet, HolderEntry};

pub struct CacheMetadata {
    pub updated_at: TimestampSeconds,
    pub source: String,
    pub count: usize,
}

/// Crash-safe on-disk key -> document store. All file operations are
/// serialized behind one process-local lock (spec §5: Cache Store lock);
/// reads take the same lock as writes to avoid torn reads on platforms
/// without atomic rename guarantees for concurrent readers.
pub struct HolderCacheStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl HolderCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn path_for(&self, chain: &str, token: Address) -> PathBuf {
        let addr_hex = format!("{:x}", token).trim_start_matches("0x").to_string();
        self.dir.join(format!("holders_{}_{}.json", chain, addr_hex))
    }

    pub fn save(
        &self,
        chain: &str,
        token: Address,
        holders: &[HolderEntry],
        symbol: &str,
        source: &str,
        decimals: u8,
    ) -> Result<(), CacheError> {
        let _guard = self.lock.lock().unwrap();

        let doc = CachedHolderSet {
            token_address: format!("{:#x}", token),
            chain: Some(chain.to_string()),
            symbol: symbol.to_string(),
            decimals,
            updated_at: get_current_time_in_seconds() as f64,
            source: source.to_string(),
            holders: holders.to_vec(),
        };

        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;

        let target = self.path_for(chain, token);
        let tmp = tmp_path(&target);
        let serialized = serde_json::to_vec_pretty(&doc)?;

        fs::write(&tmp, &serialized).map_err(|source| CacheError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &target).map_err(|source| CacheError::Io {
            path: target.display().to_string(),
            source,
        })?;

        Ok(())
    }

    /// Returns `None` on any I/O error or missing file (spec §4.1: "I/O
    /// errors are swallowed and reported as none"). With `max_age` set,
    /// also returns `None` if the document is older than the horizon.
    pub fn load(
        &self,
        chain: &str,
        token: Address,
        max_age: Option<std::time::Duration>,
    ) -> Option<CachedHolderSet> {
        let _guard = self.lock.lock().unwrap();
        let doc = read_doc(&self.path_for(chain, token))?;

        if let Some(max_age) = max_age {
            let age = get_current_time_in_seconds() as f64 - doc.updated_at;
            if age > max_age.as_secs_f64() {
                return None;
            }
        }

        Some(doc)
    }

    pub fn metadata(&self, chain: &str, token: Address) -> Option<CacheMetadata> {
        let _guard = self.lock.lock().unwrap();
        let doc = read_doc(&self.path_for(chain, token))?;
        Some(CacheMetadata {
            updated_at: doc.updated_at as TimestampSeconds,
            source: doc.source,
            count: doc.holders.len(),
        })
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!("{file_name}.tmp"))
}

fn read_doc(path: &Path) -> Option<CachedHolderSet> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
