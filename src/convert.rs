use crate::calib::{CalibReconciler, ReconcileOutcome};
use crate::config::ScanConfig;
use crate::dataid::{CALIB_DATE_KEY, DataId, DimensionMapTranslator};
use crate::datasets::{DatasetAccumulator, DatasetType};
use crate::registry::Registry;
use crate::template::PathTemplate;
use crate::walk::{RepoWalker, WalkTarget};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Summary of one repository conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOutcome {
    pub discovered: usize,
    pub ingested: usize,
    pub joined_records: usize,
    pub certified_timespans: usize,
    pub gap_messages: usize,
    pub overlap_messages: usize,
}

/// Build walk targets from the scan config. A dataset type is a calibration
/// type exactly when its template captures the calibration date.
pub fn build_targets(cfg: &ScanConfig) -> Result<Vec<Arc<WalkTarget>>> {
    let mut targets = Vec::new();
    for dt in &cfg.dataset_types {
        let template = PathTemplate::parse(&dt.template)?;
        let dimensions = dt.dimensions.iter().cloned().collect();
        let translator = DimensionMapTranslator::new(
            cfg.instrument.clone(),
            cfg.key_map.clone(),
            dt.dimensions.iter().cloned().collect(),
        );
        targets.push(Arc::new(WalkTarget {
            dataset_type: DatasetType {
                name: dt.name.clone(),
                dimensions,
                is_calibration: template.has_field(CALIB_DATE_KEY),
            },
            template,
            translator: Box::new(translator),
            table: dt.table.clone(),
        }));
    }
    Ok(targets)
}

/// Convert one repository: walk the tree once for all dataset types, commit
/// non-calibration discoveries directly, then reconcile calibration validity
/// intervals against the legacy side-database.
pub fn convert_repo(
    cfg: &ScanConfig,
    root: &Path,
    registry: &mut dyn Registry,
    predicate: &dyn Fn(&DataId) -> bool,
) -> Result<ConvertOutcome> {
    let targets = build_targets(cfg)?;
    let walker = RepoWalker::new(targets.clone())?;

    let mut accumulator = DatasetAccumulator::new();
    walker.walk(root, &mut accumulator, predicate)?;
    info!(
        "discovered {} dataset records under {}",
        accumulator.total_records(),
        root.display()
    );

    let mut outcome = ConvertOutcome {
        discovered: accumulator.total_records(),
        ..Default::default()
    };

    let calibration: std::collections::BTreeSet<&str> = targets
        .iter()
        .filter(|t| t.dataset_type.is_calibration)
        .map(|t| t.dataset_type.name.as_str())
        .collect();

    for (type_name, by_calib_date) in accumulator.iter() {
        if calibration.contains(type_name.as_str()) {
            continue;
        }
        for records in by_calib_date.values() {
            registry.ingest(&cfg.collection, records)?;
            outcome.ingested += records.len();
        }
    }

    if !calibration.is_empty() {
        let reconciler = CalibReconciler::new(root, &cfg.collection, &cfg.ccd_key, &targets);
        let ReconcileOutcome {
            joined_records,
            certified_timespans,
            gap_messages,
            overlap_messages,
        } = reconciler.finish(&accumulator, registry)?;
        outcome.joined_records = joined_records;
        outcome.certified_timespans = certified_timespans;
        outcome.gap_messages = gap_messages;
        outcome.overlap_messages = overlap_messages;
    }
    Ok(outcome)
}

/// Convenience for discovery-only callers; used by tests and dry runs.
pub fn discover(
    cfg: &ScanConfig,
    root: &Path,
    predicate: &dyn Fn(&DataId) -> bool,
) -> Result<DatasetAccumulator> {
    let walker = RepoWalker::new(build_targets(cfg)?)?;
    let mut accumulator = DatasetAccumulator::new();
    walker.walk(root, &mut accumulator, predicate)?;
    Ok(accumulator)
}
