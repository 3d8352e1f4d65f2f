use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::AnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Unchanged,
}

/// Persistence collaborator for finalized results. Keys are
/// `(test_id, version)` and stored versions are never rewritten.
pub trait ResultStore: Send + Sync {
    /// Idempotent: writing the same content under an existing key is a no-op,
    /// writing different content is a [`EngineError::VersionConflict`].
    fn upsert_result(&self, result: &AnalysisResult) -> Result<UpsertOutcome>;

    fn get_result(&self, test_id: &str, version: u32) -> Result<Option<AnalysisResult>>;

    fn latest_result(&self, test_id: &str) -> Result<Option<AnalysisResult>>;

    /// Latest version of every test in `cohort`, as stored when called.
    fn read_cohort(&self, cohort: &str) -> Result<Vec<AnalysisResult>>;
}

fn check_existing(existing: &AnalysisResult, incoming: &AnalysisResult) -> Result<UpsertOutcome> {
    if existing.content_hash == incoming.content_hash {
        Ok(UpsertOutcome::Unchanged)
    } else {
        Err(EngineError::VersionConflict {
            test_id: incoming.test_id.clone(),
            version: incoming.version,
        })
    }
}

fn lock_poisoned() -> EngineError {
    EngineError::Storage("result store lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: RwLock<BTreeMap<(String, u32), AnalysisResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn upsert_result(&self, result: &AnalysisResult) -> Result<UpsertOutcome> {
        let mut results = self.results.write().map_err(|_| lock_poisoned())?;
        let key = (result.test_id.clone(), result.version);
        if let Some(existing) = results.get(&key) {
            return check_existing(existing, result);
        }
        results.insert(key, result.clone());
        Ok(UpsertOutcome::Inserted)
    }

    fn get_result(&self, test_id: &str, version: u32) -> Result<Option<AnalysisResult>> {
        let results = self.results.read().map_err(|_| lock_poisoned())?;
        Ok(results.get(&(test_id.to_string(), version)).cloned())
    }

    fn latest_result(&self, test_id: &str) -> Result<Option<AnalysisResult>> {
        let results = self.results.read().map_err(|_| lock_poisoned())?;
        Ok(results
            .range((test_id.to_string(), 0)..=(test_id.to_string(), u32::MAX))
            .next_back()
            .map(|(_, result)| result.clone()))
    }

    fn read_cohort(&self, cohort: &str) -> Result<Vec<AnalysisResult>> {
        let results = self.results.read().map_err(|_| lock_poisoned())?;
        let mut latest: BTreeMap<&str, &AnalysisResult> = BTreeMap::new();
        for ((test_id, _), result) in results.iter() {
            if result.cohort.as_deref() == Some(cohort) {
                // keys are ordered, so later versions overwrite earlier ones
                latest.insert(test_id.as_str(), result);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }
}

/// JSON files at `<root>/<test_id>/v<version>.json`.
#[derive(Debug, Clone)]
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn test_dir(&self, test_id: &str) -> Result<PathBuf> {
        let valid = !test_id.is_empty()
            && test_id != "."
            && test_id != ".."
            && !test_id.contains(['/', '\\']);
        if !valid {
            return Err(EngineError::InvalidInput(format!(
                "test id '{test_id}' cannot be used as a storage key"
            )));
        }
        Ok(self.root.join(test_id))
    }

    fn version_path(dir: &Path, version: u32) -> PathBuf {
        dir.join(format!("v{version}.json"))
    }

    fn read_file(path: &Path) -> Result<AnalysisResult> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn versions(dir: &Path) -> Result<Vec<u32>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let parsed = name
                .to_str()
                .and_then(|n| n.strip_prefix('v'))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(version) = parsed {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

impl ResultStore for FsResultStore {
    fn upsert_result(&self, result: &AnalysisResult) -> Result<UpsertOutcome> {
        let dir = self.test_dir(&result.test_id)?;
        let path = Self::version_path(&dir, result.version);
        if path.exists() {
            let existing = Self::read_file(&path)?;
            return check_existing(&existing, result);
        }

        fs::create_dir_all(&dir)?;
        let tmp = dir.join(format!(".v{}.json.tmp", result.version));
        fs::write(&tmp, serde_json::to_vec_pretty(result)?)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "result written");
        Ok(UpsertOutcome::Inserted)
    }

    fn get_result(&self, test_id: &str, version: u32) -> Result<Option<AnalysisResult>> {
        let path = Self::version_path(&self.test_dir(test_id)?, version);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    fn latest_result(&self, test_id: &str) -> Result<Option<AnalysisResult>> {
        let dir = self.test_dir(test_id)?;
        match Self::versions(&dir)?.last() {
            Some(&version) => Self::read_file(&Self::version_path(&dir, version)).map(Some),
            None => Ok(None),
        }
    }

    fn read_cohort(&self, cohort: &str) -> Result<Vec<AnalysisResult>> {
        let mut test_ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    test_ids.push(name.to_string());
                }
            }
        }
        test_ids.sort();

        let mut results = Vec::new();
        for test_id in test_ids {
            if let Some(result) = self.latest_result(&test_id)? {
                if result.cohort.as_deref() == Some(cohort) {
                    results.push(result);
                }
            }
        }
        Ok(results)
    }
}

/// Explicit cache of finalized results keyed by `(test_id, version)`.
/// Stored versions are immutable, so entries never go stale. A poisoned lock
/// is recovered: every entry is a complete immutable result.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<(String, u32), Arc<AnalysisResult>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<(String, u32), Arc<AnalysisResult>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, test_id: &str, version: u32) -> Option<Arc<AnalysisResult>> {
        self.entries().get(&(test_id.to_string(), version)).cloned()
    }

    pub fn insert(&self, result: AnalysisResult) -> Arc<AnalysisResult> {
        let key = (result.test_id.clone(), result.version);
        let result = Arc::new(result);
        self.entries().insert(key, Arc::clone(&result));
        result
    }

    /// Cached value, or the stored version loaded once and kept.
    pub fn load(
        &self,
        store: &dyn ResultStore,
        test_id: &str,
        version: u32,
    ) -> Result<Option<Arc<AnalysisResult>>> {
        if let Some(hit) = self.get(test_id, version) {
            return Ok(Some(hit));
        }
        match store.get_result(test_id, version)? {
            Some(result) => Ok(Some(self.insert(result))),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
