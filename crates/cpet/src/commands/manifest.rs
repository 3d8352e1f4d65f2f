use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cpet_core::pipelines::SessionInput;
use cpet_core::types::SubjectInfo;
use cpet_parser::ProtocolType;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default, rename = "session")]
    sessions: Vec<SessionEntry>,
}

/// One `[[session]]` table of a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    pub test_id: String,
    pub path: PathBuf,
    pub protocol: ProtocolType,
    pub body_mass_kg: f64,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub cohort: Option<String>,
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
}

impl SessionEntry {
    /// Reads the export and builds the in-memory session the engine expects.
    pub fn to_input(&self) -> Result<SessionInput> {
        let export = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read export '{}'", self.path.display()))?;
        let subject = SubjectInfo::new(self.body_mass_kg, self.height_cm)
            .with_context(|| format!("Invalid subject data for test '{}'", self.test_id))?;
        Ok(SessionInput {
            test_id: self.test_id.clone(),
            cohort: self.cohort.clone(),
            groups: self.groups.clone(),
            protocol: self.protocol,
            subject,
            export,
        })
    }
}

/// Parses one manifest. Relative export paths resolve against the manifest's
/// directory.
pub fn load_manifest(path: &Path) -> Result<Vec<SessionEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest at '{}'", path.display()))?;
    let file: ManifestFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest TOML from '{}'", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(file
        .sessions
        .into_iter()
        .map(|mut entry| {
            if entry.path.is_relative() {
                entry.path = base.join(&entry.path);
            }
            entry
        })
        .collect())
}

/// Expands a glob of manifest files and concatenates their sessions. A test id
/// may appear only once across the whole batch.
pub fn load_manifests(pattern: &str) -> Result<Vec<SessionEntry>> {
    let mut paths: Vec<PathBuf> = glob::glob(pattern)
        .with_context(|| format!("Invalid manifest pattern '{pattern}'"))?
        .collect::<std::result::Result<_, _>>()
        .context("Could not read a manifest path")?;
    if paths.is_empty() {
        bail!("No manifest matches '{pattern}'");
    }
    paths.sort();

    let mut sessions = Vec::new();
    let mut seen = HashSet::new();
    for path in paths {
        for entry in load_manifest(&path)? {
            if !seen.insert(entry.test_id.clone()) {
                bail!(
                    "Test '{}' is listed more than once (last in '{}')",
                    entry.test_id,
                    path.display()
                );
            }
            sessions.push(entry);
        }
    }
    Ok(sessions)
}
