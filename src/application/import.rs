use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::application::replay::{replay_raw, BlockFilterReplayer};
use crate::domain::fingerprint::file_fingerprint;
use crate::domain::group::{Selection, TableGroup};
use crate::domain::ports::DataSource;
use crate::domain::report::{FileImport, ImportReport};
use crate::infrastructure::fs::{list_sql_files, part_index, MANIFEST_FILE};

// ─── Run manifest (read side) ────────────────────────────────────────────────

#[derive(Deserialize)]
struct RunManifest {
    groups: Vec<ManifestGroup>,
}

#[derive(Deserialize)]
struct ManifestGroup {
    group: TableGroup,
    #[serde(default)]
    files: Vec<ManifestFile>,
}

#[derive(Deserialize)]
struct ManifestFile {
    path: PathBuf,
    #[serde(default)]
    sha256: Option<String>,
}

impl RunManifest {
    /// Manifest at the root of a run directory. `None` when there is none
    /// or it cannot be parsed.
    fn read(root: &Path) -> Option<Self> {
        let path = root.join(MANIFEST_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                debug!("No manifest at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Listed part files of `group`, by file name, with their digests.
    fn files_of(&self, group: TableGroup) -> Option<BTreeMap<String, Option<String>>> {
        let entry = self.groups.iter().find(|g| g.group == group)?;
        Some(
            entry
                .files
                .iter()
                .filter_map(|f| {
                    let name = f.path.file_name()?.to_string_lossy().into_owned();
                    Some((name, f.sha256.clone()))
                })
                .collect(),
        )
    }
}

fn file_name_of(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Where import reads its statements from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// A run directory: each group reads `<root>/<group>/*.sql`.
    Directory(PathBuf),
    /// Loose files, assigned to groups by name.
    Files(Vec<PathBuf>),
}

/// Replays exported files against one destination, group by group.
pub struct ImportRunner {
    selection: Selection,
}

impl ImportRunner {
    pub fn new(selection: Selection) -> Self {
        Self { selection }
    }

    /// Replay every selected group, in run order. Statements are executed
    /// best-effort: failures are counted and later statements still run.
    pub async fn run(&self, source: &ImportSource, dest: &dyn DataSource) -> ImportReport {
        let mut report = ImportReport::default();
        let assignments = match source {
            ImportSource::Directory(root) => self.from_directory(root, &mut report),
            ImportSource::Files(files) => self.from_files(files, &mut report),
        };

        for (group, path) in assignments {
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    warn!("Cannot read {}: {}", path.display(), e);
                    report.unreadable.push(format!("{}: {}", path.display(), e));
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&bytes);
            let mut file = FileImport::new(group, Some(path.clone()));
            self.replay_into(group, &text, dest, &mut file).await;
            info!(
                group = %group,
                executed = file.outcome.executed,
                failed = file.outcome.failures.len(),
                "Imported {}",
                path.display()
            );
            report.files.push(file);
        }
        report
    }

    /// Replay a raw statement stream as if it were one file of `group`.
    pub async fn replay_text(&self, group: TableGroup, text: &str, dest: &dyn DataSource) -> FileImport {
        let mut file = FileImport::new(group, None);
        self.replay_into(group, text, dest, &mut file).await;
        file
    }

    async fn replay_into(&self, group: TableGroup, text: &str, dest: &dyn DataSource, file: &mut FileImport) {
        match group {
            TableGroup::Taxonomies => {
                BlockFilterReplayer::new(self.selection.taxonomy_blocks())
                    .replay(text, dest, file)
                    .await
            }
            _ => replay_raw(text, dest, file).await,
        }
    }

    /// Files of each selected group under `root`. When the run directory
    /// carries a manifest, only the parts it lists are replayed: anything
    /// else on disk is skipped, and a listed part whose digest changed is
    /// reported.
    fn from_directory(&self, root: &Path, report: &mut ImportReport) -> Vec<(TableGroup, PathBuf)> {
        let manifest = RunManifest::read(root);
        let mut out = Vec::new();
        for group in self.selection.groups() {
            let dir = root.join(group.dir_name());
            let files = match list_sql_files(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Cannot list {}: {}", dir.display(), e);
                    report.unreadable.push(format!("{}: {}", dir.display(), e));
                    continue;
                }
            };
            let files = match manifest.as_ref().and_then(|m| m.files_of(group)) {
                Some(listed) => Self::check_against_manifest(files, &listed, &dir, report),
                None => files,
            };
            if files.is_empty() {
                warn!("No files for {} in {}", group, dir.display());
                report.missing_groups.push(group);
                continue;
            }
            out.extend(files.into_iter().map(|f| (group, f)));
        }
        out
    }

    fn check_against_manifest(
        files: Vec<PathBuf>,
        listed: &BTreeMap<String, Option<String>>,
        dir: &Path,
        report: &mut ImportReport,
    ) -> Vec<PathBuf> {
        let mut kept = Vec::new();
        for f in files {
            let Some(expected) = listed.get(&file_name_of(&f)) else {
                warn!("{} is not listed in the run manifest, skipping", f.display());
                report.skipped.push(f);
                continue;
            };
            if let Some(expected) = expected {
                match file_fingerprint(&f) {
                    Ok(actual) if actual.as_str() == expected.as_str() => {}
                    Ok(_) => {
                        warn!("{} does not match its manifest checksum", f.display());
                        report.checksum_mismatches.push(f.clone());
                    }
                    Err(e) => warn!("Cannot fingerprint {}: {}", f.display(), e),
                }
            }
            kept.push(f);
        }
        for name in listed.keys() {
            let path = dir.join(name);
            if !kept.contains(&path) {
                warn!("{} is listed in the run manifest but missing", path.display());
                report
                    .unreadable
                    .push(format!("{}: listed in manifest but missing", path.display()));
            }
        }
        kept
    }

    /// A file may match more than one group (`products_and_orders.sql`); it
    /// is then replayed once per group.
    fn from_files(&self, files: &[PathBuf], report: &mut ImportReport) -> Vec<(TableGroup, PathBuf)> {
        let groups = self.selection.groups();
        let name_of = |p: &PathBuf| file_name_of(p);

        for f in files {
            let name = name_of(f);
            if !groups.iter().any(|g| g.matches_file_name(&name)) {
                warn!("{} matches no selected group, skipping", f.display());
                report.skipped.push(f.clone());
            }
        }

        let mut out = Vec::new();
        for group in groups {
            let mut matched: Vec<&PathBuf> = files
                .iter()
                .filter(|f| group.matches_file_name(&name_of(f)))
                .collect();
            if matched.is_empty() {
                report.missing_groups.push(group);
                continue;
            }
            matched.sort_by_key(|f| part_index(&name_of(f)).unwrap_or(0));
            out.extend(matched.into_iter().map(|f| (group, f.clone())));
        }
        out
    }
}
