use crate::dataid::{DataId, IdTranslator, LegacyDataId};
use crate::datasets::{DatasetAccumulator, DatasetType, DiscoveredRecord};
use crate::error::MigrateError;
use crate::template::{PathTemplate, SegmentPart, SegmentPattern};
use crate::walk::scanner::DirectoryScanner;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// One dataset type to discover during a walk: its compiled template, the
/// translator that lifts captured legacy ids into the destination schema,
/// and the legacy side-database table (calibration types only).
pub struct WalkTarget {
    pub dataset_type: DatasetType,
    pub template: PathTemplate,
    pub translator: Box<dyn IdTranslator + Send + Sync>,
    pub table: Option<String>,
}

/// Matches a single path segment name. The closed variant set mirrors how
/// flexible each matcher is: a literal admits exactly one name, a
/// single-field pattern a family of names, a multi-field pattern the
/// broadest set.
#[derive(Debug, Clone)]
pub enum SegmentMatcher {
    Literal { text: String },
    SingleField { parts: Vec<SegmentPart> },
    MultiField { parts: Vec<SegmentPart> },
}

impl SegmentMatcher {
    pub fn compile(segment: &SegmentPattern) -> Self {
        match segment.field_count() {
            0 => Self::Literal {
                text: segment.source.clone(),
            },
            1 => Self::SingleField {
                parts: segment.parts.clone(),
            },
            _ => Self::MultiField {
                parts: segment.parts.clone(),
            },
        }
    }

    /// Matching flexibility; scanners try handlers in ascending rank so the
    /// least flexible matcher wins ties.
    pub fn rank(&self) -> usize {
        match self {
            Self::Literal { .. } => 0,
            Self::SingleField { .. } => 1,
            Self::MultiField { parts } => parts
                .iter()
                .filter(|p| matches!(p, SegmentPart::Field(_)))
                .count(),
        }
    }

    pub fn match_name(&self, name: &str) -> Option<LegacyDataId> {
        match self {
            Self::Literal { text } => (name == text).then(LegacyDataId::new),
            Self::SingleField { parts } | Self::MultiField { parts } => {
                crate::template::match_parts(parts, name)
            }
        }
    }
}

/// A handler for one path element (file or directory) at one tree depth.
///
/// Handlers never mutate the accumulator unless they recognize the entry,
/// and recognition is reported by returning `true` so the scanner stops
/// trying less specific handlers.
pub enum PathHandler {
    TargetFile(TargetFileHandler),
    Subdirectory(SubdirectoryHandler),
}

impl PathHandler {
    pub fn is_for_file(&self) -> bool {
        matches!(self, Self::TargetFile(_))
    }

    pub fn rank(&self) -> usize {
        match self {
            Self::TargetFile(h) => h.matcher.rank(),
            Self::Subdirectory(h) => h.matcher.rank(),
        }
    }

    /// Translate a resolved legacy id for this handler's dataset type.
    /// Handlers that do not terminate a template cannot translate.
    pub fn translate(
        &self,
        legacy: &LegacyDataId,
        partial: bool,
    ) -> Result<Option<(DataId, Option<String>)>, MigrateError> {
        match self {
            Self::TargetFile(h) => h.target.translator.translate(legacy, partial).map(Some),
            Self::Subdirectory(_) => Ok(None),
        }
    }

    /// Apply the handler to one directory entry. `parent_id` holds the
    /// identifier components resolved from ancestor path segments; it is
    /// owned by the walk's call stack, never by the handler.
    pub fn handle(
        &self,
        path: &Path,
        name: &str,
        parent_id: &LegacyDataId,
        accumulator: &mut DatasetAccumulator,
        predicate: &dyn Fn(&DataId) -> bool,
    ) -> Result<bool> {
        match self {
            Self::TargetFile(h) => h.handle(path, name, parent_id, accumulator, predicate),
            Self::Subdirectory(h) => h.handle(path, name, parent_id, accumulator, predicate),
        }
    }
}

/// Terminal handler: a matched file completes one template and yields a
/// discovered record.
pub struct TargetFileHandler {
    matcher: SegmentMatcher,
    target: Arc<WalkTarget>,
}

impl TargetFileHandler {
    pub fn new(segment: &SegmentPattern, target: Arc<WalkTarget>) -> Self {
        Self {
            matcher: SegmentMatcher::compile(segment),
            target,
        }
    }

    fn handle(
        &self,
        path: &Path,
        name: &str,
        parent_id: &LegacyDataId,
        accumulator: &mut DatasetAccumulator,
        predicate: &dyn Fn(&DataId) -> bool,
    ) -> Result<bool> {
        let Some(captured) = self.matcher.match_name(name) else {
            return Ok(false);
        };
        let mut legacy = parent_id.clone();
        legacy.extend(captured);
        let (data_id, calib_date) = self.target.translator.translate(&legacy, false)?;
        if predicate(&data_id) {
            accumulator.push(
                DiscoveredRecord {
                    data_id,
                    dataset_type: self.target.dataset_type.name.clone(),
                    path: path.to_path_buf(),
                },
                calib_date,
            );
        }
        Ok(true)
    }
}

/// A matched directory extends the resolved partial identifier and recurses
/// with the scanner built for the next tree depth.
pub struct SubdirectoryHandler {
    matcher: SegmentMatcher,
    scanner: DirectoryScanner,
}

impl SubdirectoryHandler {
    pub fn new(segment: &SegmentPattern, scanner: DirectoryScanner) -> Self {
        Self {
            matcher: SegmentMatcher::compile(segment),
            scanner,
        }
    }

    fn handle(
        &self,
        path: &Path,
        name: &str,
        parent_id: &LegacyDataId,
        accumulator: &mut DatasetAccumulator,
        predicate: &dyn Fn(&DataId) -> bool,
    ) -> Result<bool> {
        let Some(captured) = self.matcher.match_name(name) else {
            return Ok(false);
        };
        let mut resolved = parent_id.clone();
        resolved.extend(captured);
        self.scanner.scan(path, &resolved, accumulator, predicate)?;
        Ok(true)
    }
}
