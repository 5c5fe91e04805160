//! Merges eligible fragments into the target configuration tree.
//!
//! Output layout, relative to the target directory:
//!
//! ```text
//! prometheus.yml                          base document + merged lists
//! rule_files/<namespace>/<name>/<key>     one file per auxiliary entry
//! ```
//!
//! The rule directory is deleted and rebuilt on every run, so files of
//! fragments that were deleted or opted out never survive a cycle.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use serde_yaml_ng::{Sequence, Value};
use thiserror::Error;

use crate::config::{OutputConfig, Settings};
use crate::document::{Document, DocumentError};
use crate::fragment::{Fragment, FragmentId};

/// Base document key receiving the written auxiliary file paths.
pub const RULE_FILES_KEY: &str = "rule_files";
/// Key whose sequence is concatenated across fragments.
pub const SCRAPE_CONFIGS_KEY: &str = "scrape_configs";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("clearing {}: {source}", path.display())]
    ClearRuleDir { path: PathBuf, source: io::Error },

    #[error("creating {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("writing {}: {source}", path.display())]
    WriteFile { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Serialize(#[from] DocumentError),
}

/// What one generation cycle produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateReport {
    /// Eligible fragments that were merged, in merge order.
    pub fragments: Vec<FragmentId>,
    /// Relative paths written to the base document's `rule_files`.
    pub rule_files: Vec<String>,
    /// Number of entries in the merged `scrape_configs`.
    pub scrape_configs: usize,
    /// Entries left out because they could not be used.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    target_dir: PathBuf,
    annotation: String,
    output: OutputConfig,
}

impl ConfigGenerator {
    pub fn new(target_dir: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            target_dir: target_dir.into(),
            annotation: settings.source.annotation.clone(),
            output: settings.output.clone(),
        }
    }

    /// Path of the generated primary document.
    pub fn config_path(&self) -> PathBuf {
        self.target_dir.join(&self.output.primary_file)
    }

    /// Run one generation cycle.
    ///
    /// `base` gets its `rule_files` and `scrape_configs` keys overwritten.
    /// Errors are fatal for the cycle and nothing already written is rolled
    /// back; the next cycle rebuilds everything.
    pub fn generate(
        &self,
        base: &mut Document,
        fragments: &[Fragment],
    ) -> Result<GenerateReport, GenerateError> {
        crate::log_event!("generate", "generating configuration");

        let rule_root = self.target_dir.join(&self.output.rule_dir);
        reset_dir(&rule_root)?;

        let mut report = GenerateReport::default();
        let mut rule_files = Sequence::new();
        let mut scrape_configs = Sequence::new();

        for fragment in fragments.iter().filter(|f| f.is_eligible(&self.annotation)) {
            if !is_plain_component(&fragment.id.namespace) || !is_plain_component(&fragment.id.name)
            {
                tracing::warn!("[generate] skipping {}: unusable identity", fragment.id);
                report.skipped += fragment.data.len();
                continue;
            }

            crate::log_event!("generate", "including", "{}", fragment.id);
            report.fragments.push(fragment.id.clone());

            for (key, content) in &fragment.data {
                if *key == self.output.primary_file {
                    match primary_scrape_configs(fragment, key, content) {
                        Some(items) => scrape_configs.extend(items),
                        None => report.skipped += 1,
                    }
                    continue;
                }

                if !is_plain_component(key) {
                    tracing::warn!("[generate] skipping {}/{key}: not a plain file name", fragment.id);
                    report.skipped += 1;
                    continue;
                }

                let relative = self.write_rule_file(&rule_root, fragment, key, content)?;
                rule_files.push(Value::String(relative.clone()));
                report.rule_files.push(relative);
            }
        }

        report.scrape_configs = scrape_configs.len();
        base.set_sequence(RULE_FILES_KEY, rule_files);
        base.set_sequence(SCRAPE_CONFIGS_KEY, scrape_configs);
        self.write_config(base)?;

        crate::log_event!(
            "generate",
            "done",
            "{} fragments, {} rule files, {} scrape configs, {} skipped",
            report.fragments.len(),
            report.rule_files.len(),
            report.scrape_configs,
            report.skipped
        );
        Ok(report)
    }

    /// Write one auxiliary entry and return its path relative to the target dir.
    fn write_rule_file(
        &self,
        rule_root: &Path,
        fragment: &Fragment,
        key: &str,
        content: &str,
    ) -> Result<String, GenerateError> {
        let FragmentId { namespace, name } = &fragment.id;
        let dir = rule_root.join(namespace).join(name);
        fs::create_dir_all(&dir).map_err(|source| GenerateError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(key);
        fs::write(&path, content).map_err(|source| GenerateError::WriteFile {
            path: path.clone(),
            source,
        })?;
        crate::debug_event!("generate", "wrote", "{}", path.display());

        Ok(format!("{}/{namespace}/{name}/{key}", self.output.rule_dir))
    }

    /// Atomically replace the primary document: write a sibling temp file,
    /// then rename it over the target.
    fn write_config(&self, base: &Document) -> Result<(), GenerateError> {
        let yaml = base.to_yaml()?;
        let path = self.config_path();
        let write_err = |source| GenerateError::WriteFile {
            path: path.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.target_dir).map_err(write_err)?;
        tmp.write_all(yaml.as_bytes()).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))
                .map_err(write_err)?;
        }
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        crate::debug_event!("generate", "wrote", "{}", path.display());
        Ok(())
    }
}

/// Delete `dir` with everything below it, then create it empty.
fn reset_dir(dir: &Path) -> Result<(), GenerateError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(GenerateError::ClearRuleDir {
                path: dir.to_path_buf(),
                source,
            });
        }
    }
    fs::create_dir_all(dir).map_err(|source| GenerateError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Scrape configs contributed by a fragment's primary entry.
///
/// `None` when the entry is unusable; the caller counts it as skipped.
fn primary_scrape_configs(fragment: &Fragment, key: &str, content: &str) -> Option<Sequence> {
    let doc = match Document::parse(content) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("[generate] skipping {}/{key}: {e}", fragment.id);
            return None;
        }
    };

    match doc.get(SCRAPE_CONFIGS_KEY) {
        None => Some(Sequence::new()),
        Some(Value::Sequence(items)) => Some(items.clone()),
        Some(_) => {
            tracing::warn!(
                "[generate] {}/{key}: {SCRAPE_CONFIGS_KEY} is not a list, ignoring it",
                fragment.id
            );
            Some(Sequence::new())
        }
    }
}

/// A single normal path component: no separators, not empty, not `.` or `..`.
fn is_plain_component(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
