use crate::dataid::{DataId, LegacyDataId};
use crate::datasets::DatasetAccumulator;
use crate::walk::handler::PathHandler;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Drives one level of directory traversal with two rank-ordered handler
/// pools, one for files and one for subdirectories.
pub struct DirectoryScanner {
    files: Vec<PathHandler>,
    subdirectories: Vec<PathHandler>,
}

impl DirectoryScanner {
    /// Partition handlers into the two pools and sort each by ascending
    /// rank. Sorting happens once here, never per scan, so exact-literal
    /// handlers are always tried before field-capturing ones.
    pub fn new(handlers: Vec<PathHandler>) -> Self {
        let mut files = Vec::new();
        let mut subdirectories = Vec::new();
        for handler in handlers {
            if handler.is_for_file() {
                files.push(handler);
            } else {
                subdirectories.push(handler);
            }
        }
        files.sort_by_key(PathHandler::rank);
        subdirectories.sort_by_key(PathHandler::rank);
        Self {
            files,
            subdirectories,
        }
    }

    pub fn handlers(&self) -> impl Iterator<Item = &PathHandler> {
        self.files.iter().chain(self.subdirectories.iter())
    }

    /// Process one directory: try handlers on each entry in ascending rank
    /// order, stopping at the first match. Entries no handler recognizes
    /// are reported once per directory to bound log volume under deep trees.
    pub fn scan(
        &self,
        path: &Path,
        parent_id: &LegacyDataId,
        accumulator: &mut DatasetAccumulator,
        predicate: &dyn Fn(&DataId) -> bool,
    ) -> Result<()> {
        let mut entries = fs::read_dir(path)
            .with_context(|| format!("failed to read directory {}", path.display()))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to enumerate {}", path.display()))?;
        // Deterministic order keeps diagnostics and ledger output stable
        // across filesystems.
        entries.sort_by_key(|entry| entry.file_name());

        let mut unrecognized = Vec::new();
        for entry in entries {
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?;
            let pool = if file_type.is_file() {
                &self.files
            } else if file_type.is_dir() {
                &self.subdirectories
            } else {
                continue;
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let mut matched = false;
            for handler in pool {
                if handler.handle(&entry.path(), &name, parent_id, accumulator, predicate)? {
                    matched = true;
                    break;
                }
            }
            if !matched {
                unrecognized.push(name.into_owned());
            }
        }
        if !unrecognized.is_empty() {
            warn!(
                "skipped unrecognized entries in {}: {:?}",
                path.display(),
                unrecognized
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataid::{DimensionMapTranslator, FieldValue};
    use crate::datasets::DatasetType;
    use crate::template::PathTemplate;
    use crate::walk::handler::{SubdirectoryHandler, TargetFileHandler, WalkTarget};
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn target(name: &str, template: &str, dimensions: &[&str]) -> Arc<WalkTarget> {
        let template = PathTemplate::parse(template).expect("template");
        let dimensions: BTreeSet<String> = dimensions.iter().map(|d| d.to_string()).collect();
        let mut key_map = BTreeMap::new();
        key_map.insert("ccd".to_string(), "detector".to_string());
        Arc::new(WalkTarget {
            dataset_type: DatasetType {
                name: name.to_string(),
                dimensions: dimensions.clone(),
                is_calibration: template.has_field("calibDate"),
            },
            translator: Box::new(DimensionMapTranslator::new("TestCam", key_map, dimensions)),
            template,
            table: None,
        })
    }

    fn file_handler(segment_template: &str, target: &Arc<WalkTarget>) -> PathHandler {
        let parsed = PathTemplate::parse(segment_template).expect("segment");
        PathHandler::TargetFile(TargetFileHandler::new(&parsed.segments[0], target.clone()))
    }

    #[test]
    fn scanner_orders_handlers_by_ascending_rank() {
        let t = target("bias", "bias-{ccd:int}.fits", &["instrument", "detector"]);
        let scanner = DirectoryScanner::new(vec![
            file_handler("bias-{ccd:int}_{tag:str}.fits", &t),
            file_handler("bias-1.fits", &t),
            file_handler("bias-{ccd:int}.fits", &t),
        ]);
        let ranks = scanner.handlers().map(PathHandler::rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn first_matching_handler_wins_and_stops_dispatch() {
        // Both handlers can match "bias-1.fits"; the literal (rank 0) must
        // claim it and only one record may be accumulated.
        let literal = target("bias_literal", "{tag:str}", &["instrument", "tag"]);
        let capture = target("bias_capture", "bias-{ccd:int}.fits", &["instrument", "detector"]);

        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("bias-1.fits"), b"x").expect("write");

        let scanner = DirectoryScanner::new(vec![
            file_handler("bias-{ccd:int}.fits", &capture),
            file_handler("bias-1.fits", &literal),
        ]);
        // The literal handler captures nothing, so its translator sees only
        // ancestor context; give it the tag through the parent id.
        let mut parent = LegacyDataId::new();
        parent.insert("tag".to_string(), FieldValue::from("night1"));

        let mut acc = DatasetAccumulator::new();
        scanner
            .scan(tmp.path(), &parent, &mut acc, &|_| true)
            .expect("scan");

        assert_eq!(acc.total_records(), 1);
        assert_eq!(acc.records_for("bias_literal").count(), 1);
        assert_eq!(acc.records_for("bias_capture").count(), 0);
    }

    #[test]
    fn unmatched_entries_do_not_touch_the_accumulator() {
        let t = target("bias", "bias-{ccd:int}.fits", &["instrument", "detector"]);
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("README.txt"), b"x").expect("write");
        fs::write(tmp.path().join("bias-3.fits"), b"x").expect("write");

        let scanner = DirectoryScanner::new(vec![file_handler("bias-{ccd:int}.fits", &t)]);
        let mut acc = DatasetAccumulator::new();
        scanner
            .scan(tmp.path(), &LegacyDataId::new(), &mut acc, &|_| true)
            .expect("scan");
        assert_eq!(acc.total_records(), 1);
    }

    #[test]
    fn predicate_excludes_but_still_recognizes() {
        let t = target("bias", "bias-{ccd:int}.fits", &["instrument", "detector"]);
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("bias-3.fits"), b"x").expect("write");

        let scanner = DirectoryScanner::new(vec![file_handler("bias-{ccd:int}.fits", &t)]);
        let mut acc = DatasetAccumulator::new();
        scanner
            .scan(tmp.path(), &LegacyDataId::new(), &mut acc, &|id| {
                id.get("detector") != Some(&FieldValue::Int(3))
            })
            .expect("scan");
        assert_eq!(acc.total_records(), 0);
    }

    #[test]
    fn directory_handler_recurses_with_extended_context() {
        let t = target(
            "flat",
            "{filter:str}/flat-{ccd:int}.fits",
            &["instrument", "detector", "filter"],
        );
        let tmp = tempdir().expect("tempdir");
        fs::create_dir(tmp.path().join("g")).expect("mkdir");
        fs::write(tmp.path().join("g").join("flat-2.fits"), b"x").expect("write");

        let leaf = DirectoryScanner::new(vec![file_handler("flat-{ccd:int}.fits", &t)]);
        let dir_segment = PathTemplate::parse("{filter:str}").expect("segment").segments[0].clone();
        let scanner = DirectoryScanner::new(vec![PathHandler::Subdirectory(
            SubdirectoryHandler::new(&dir_segment, leaf),
        )]);

        let mut acc = DatasetAccumulator::new();
        scanner
            .scan(tmp.path(), &LegacyDataId::new(), &mut acc, &|_| true)
            .expect("scan");
        let record = acc.records_for("flat").next().expect("record");
        assert_eq!(record.data_id.get("filter"), Some(&FieldValue::from("g")));
        assert_eq!(record.data_id.get("detector"), Some(&FieldValue::Int(2)));
    }
}
