// ── In-memory backend ────────────────────────────────────────────────────────
//
// A `RemoteFs` held entirely in process memory. Used by the engine and runner
// tests, and handy for dry runs. Paths are normalized without a leading `/`
// so `"/out/a.edi"` and `"out/a.edi"` name the same object.

use crate::fs::{FsError, FsResult, RemoteEntry, RemoteFs};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, Vec<u8>>,
    /// Path → number of upcoming reads that deliver one byte too few.
    short_reads: HashMap<String, u32>,
    failing_writes: HashSet<String>,
    reads: HashMap<String, u32>,
}

#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<MemoryState>,
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').trim_end_matches('/').to_string()
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: &str, contents: impl Into<Vec<u8>>) {
        self.lock().files.insert(normalize(path), contents.into());
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&normalize(path)).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().files.contains_key(&normalize(path))
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// The next `times` reads of `path` deliver one byte less than stored.
    pub fn truncate_reads(&self, path: &str, times: u32) {
        self.lock().short_reads.insert(normalize(path), times);
    }

    /// Every write to `path` fails until the backend is dropped.
    pub fn fail_writes(&self, path: &str) {
        self.lock().failing_writes.insert(normalize(path));
    }

    /// How many times `path` has been read.
    pub fn read_count(&self, path: &str) -> u32 {
        self.lock().reads.get(&normalize(path)).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn list(&self, path: &str) -> FsResult<Vec<RemoteEntry>> {
        let dir = normalize(path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let state = self.lock();
        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for (key, data) in state.files.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    dirs.insert(format!("{}{}", prefix, child));
                }
                None => files.push(RemoteEntry::file(key.clone(), data.len() as u64)),
            }
        }
        if files.is_empty() && dirs.is_empty() && !dir.is_empty() {
            return Err(FsError::NotFound(dir));
        }
        files.extend(dirs.into_iter().map(RemoteEntry::directory));
        Ok(files)
    }

    async fn read_stream(&self, path: &str, sink: &mut (dyn Write + Send)) -> FsResult<u64> {
        let key = normalize(path);
        let data = {
            let mut state = self.lock();
            let Some(stored) = state.files.get(&key).cloned() else {
                return Err(FsError::NotFound(key));
            };
            *state.reads.entry(key.clone()).or_insert(0) += 1;
            let mut data = stored;
            if let Some(remaining) = state.short_reads.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    data.pop();
                }
            }
            data
        };
        sink.write_all(&data)?;
        Ok(data.len() as u64)
    }

    async fn write_stream(&self, path: &str, source: &mut (dyn Read + Send)) -> FsResult<u64> {
        let key = normalize(path);
        if self.lock().failing_writes.contains(&key) {
            return Err(FsError::operation("write", key, "injected write failure"));
        }
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        let written = data.len() as u64;
        self.lock().files.insert(key, data);
        Ok(written)
    }

    async fn delete(&self, path: &str) -> FsResult<()> {
        let key = normalize(path);
        match self.lock().files.remove(&key) {
            Some(_) => Ok(()),
            None => Err(FsError::NotFound(key)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from = normalize(from);
        let mut state = self.lock();
        let Some(data) = state.files.remove(&from) else {
            return Err(FsError::NotFound(from));
        };
        state.files.insert(normalize(to), data);
        Ok(())
    }
}
