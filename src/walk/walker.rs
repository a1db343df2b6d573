use crate::dataid::{DataId, LegacyDataId};
use crate::datasets::DatasetAccumulator;
use crate::error::MigrateError;
use crate::template::SegmentPattern;
use crate::walk::handler::{PathHandler, SubdirectoryHandler, TargetFileHandler, WalkTarget};
use crate::walk::scanner::DirectoryScanner;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Walks an entire repository tree with one scanner per directory depth.
///
/// Templates are statically partitioned by depth at construction: targets
/// whose templates share a leading segment share the subtree scanner built
/// for it, so a single pass discovers every dataset type at once.
pub struct RepoWalker {
    root_scanner: DirectoryScanner,
}

struct TrieNode {
    files: Vec<(SegmentPattern, Arc<WalkTarget>)>,
    subdirectories: BTreeMap<String, (SegmentPattern, TrieNode)>,
}

impl TrieNode {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            subdirectories: BTreeMap::new(),
        }
    }

    fn insert(&mut self, segments: &[SegmentPattern], target: Arc<WalkTarget>) {
        match segments {
            [] => {}
            [leaf] => self.files.push((leaf.clone(), target)),
            [head, rest @ ..] => {
                let (_, child) = self
                    .subdirectories
                    .entry(head.source.clone())
                    .or_insert_with(|| (head.clone(), TrieNode::new()));
                child.insert(rest, target);
            }
        }
    }

    fn into_scanner(self) -> DirectoryScanner {
        let mut handlers = Vec::new();
        for (segment, target) in self.files {
            handlers.push(PathHandler::TargetFile(TargetFileHandler::new(
                &segment, target,
            )));
        }
        for (_, (segment, child)) in self.subdirectories {
            let scanner = child.into_scanner();
            handlers.push(PathHandler::Subdirectory(SubdirectoryHandler::new(
                &segment, scanner,
            )));
        }
        DirectoryScanner::new(handlers)
    }
}

impl RepoWalker {
    pub fn new(targets: Vec<Arc<WalkTarget>>) -> Result<Self, MigrateError> {
        let mut root = TrieNode::new();
        for target in targets {
            if target.template.segments.is_empty() {
                return Err(MigrateError::invalid_template(
                    &target.template.source,
                    "template has no segments",
                ));
            }
            let segments = target.template.segments.clone();
            root.insert(&segments, target);
        }
        Ok(Self {
            root_scanner: root.into_scanner(),
        })
    }

    /// Run a full top-down traversal from `root`, threading the inclusion
    /// predicate and the shared accumulator through every recursive call.
    pub fn walk(
        &self,
        root: &Path,
        accumulator: &mut DatasetAccumulator,
        predicate: &dyn Fn(&DataId) -> bool,
    ) -> Result<()> {
        self.root_scanner
            .scan(root, &LegacyDataId::new(), accumulator, predicate)
    }
}
