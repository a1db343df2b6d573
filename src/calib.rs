use crate::dataid::{DataId, FieldValue, LegacyDataId};
use crate::datasets::{DatasetAccumulator, DiscoveredRecord};
use crate::error::MigrateError;
use crate::registry::Registry;
use crate::timespan::{Timespan, fuzzy_day};
use crate::walk::WalkTarget;
use anyhow::{Result, bail};
use chrono::Duration;
use rusqlite::{Connection, OpenFlags};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CALIB_REGISTRY_FILE: &str = "calibRegistry.sqlite3";

/// A validity row recovered from the legacy side-database. Detector and
/// filter columns are selected as NULL when the dataset type's dimensions
/// do not include them.
#[derive(Debug, Clone)]
pub struct ValidityRow {
    pub valid_start: String,
    pub valid_end: String,
    pub detector: Option<i64>,
    pub filter: Option<String>,
}

/// Summary of one reconciliation pass, reported by the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOutcome {
    pub joined_records: usize,
    pub certified_timespans: usize,
    pub gap_messages: usize,
    pub overlap_messages: usize,
}

/// Reconstructs validity intervals for calibration datasets discovered by a
/// walk: joins them to legacy side-database rows, corrects the intervals,
/// and certifies them into the destination collection.
pub struct CalibReconciler<'a> {
    root: &'a Path,
    collection: &'a str,
    ccd_key: &'a str,
    targets: &'a [Arc<WalkTarget>],
}

impl<'a> CalibReconciler<'a> {
    pub fn new(
        root: &'a Path,
        collection: &'a str,
        ccd_key: &'a str,
        targets: &'a [Arc<WalkTarget>],
    ) -> Self {
        Self {
            root,
            collection,
            ccd_key,
            targets,
        }
    }

    /// Post-processing step for calibration repositories: runs the full
    /// query / translate / group / correct / commit / report sequence over
    /// everything the walk accumulated.
    pub fn finish(
        &self,
        datasets: &DatasetAccumulator,
        registry: &mut dyn Registry,
    ) -> Result<ReconcileOutcome> {
        let db_path = self.root.join(CALIB_REGISTRY_FILE);
        // Check explicitly: sqlite would otherwise create the missing file,
        // and a missing registry is a configuration problem, not data
        // variance.
        if !db_path.exists() {
            return Err(MigrateError::MissingCalibRegistry(self.root.to_path_buf()).into());
        }
        let db = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let targets_by_type: BTreeMap<&str, &Arc<WalkTarget>> = self
            .targets
            .iter()
            .map(|t| (t.dataset_type.name.as_str(), t))
            .collect();

        // Registry::certify operates on one timespan and multiple refs at a
        // time, so gather joined rows in a map keyed by timespan first.
        let mut refs_by_timespan: BTreeMap<Timespan, Vec<DiscoveredRecord>> = BTreeMap::new();
        let mut joined_records = 0usize;

        for (type_name, by_calib_date) in datasets.iter() {
            let Some(&target) = targets_by_type.get(type_name.as_str()) else {
                continue;
            };
            if !target.dataset_type.is_calibration {
                continue;
            }
            for (calib_date, records) in by_calib_date {
                let Some(calib_date) = calib_date else {
                    // Calibration-ness is defined by the presence of the
                    // calibration date in the template, so this cannot
                    // happen for a correctly built walk target.
                    bail!(
                        "calibration dataset type {type_name} discovered without a calibration date"
                    );
                };
                let mut refs_by_data_id: BTreeMap<&DataId, &DiscoveredRecord> = BTreeMap::new();
                for record in records {
                    refs_by_data_id.insert(&record.data_id, record);
                }
                for row in self.query_validity_rows(&db, target, calib_date) {
                    let timespan = match Timespan::from_legacy_row(&row.valid_start, &row.valid_end)
                    {
                        Ok(timespan) => timespan,
                        Err(err) => {
                            warn!(
                                "skipping malformed validity row for {type_name} at calibDate={calib_date}: {err:#}"
                            );
                            continue;
                        }
                    };
                    let Some(legacy) = self.legacy_id_from_row(target, &row) else {
                        debug!(
                            "validity row for {type_name} at calibDate={calib_date} is missing an expected column"
                        );
                        continue;
                    };
                    let (data_id, _) = target.translator.translate(&legacy, false)?;
                    if let Some(record) = refs_by_data_id.get(&data_id) {
                        refs_by_timespan
                            .entry(timespan)
                            .or_default()
                            .push((*record).clone());
                        joined_records += 1;
                    } else {
                        // The side-database mentions a dataset we did not
                        // discover. Usually someone is converting a subset
                        // of the repository, and the volume can be large,
                        // so this stays at debug severity.
                        debug!(
                            "legacy validity entry has no discovered dataset: {type_name} for calibDate={calib_date}, {data_id}"
                        );
                    }
                }
            }
        }

        // Intervals are corrected independently per (data id, dataset type)
        // group; the same boundary anomaly recurs across many detectors and
        // filters, so messages are deduplicated globally instead.
        let mut timespans_by_data_id: BTreeMap<(DataId, String), Vec<(Timespan, DiscoveredRecord)>> =
            BTreeMap::new();
        for (timespan, refs) in &refs_by_timespan {
            for record in refs {
                timespans_by_data_id
                    .entry((record.data_id.clone(), record.dataset_type.clone()))
                    .or_default()
                    .push((*timespan, record.clone()));
            }
        }

        let mut info_messages = BTreeSet::new();
        let mut warn_messages = BTreeSet::new();
        let mut corrected_by_timespan: BTreeMap<Timespan, Vec<DiscoveredRecord>> = BTreeMap::new();
        for (_, pairs) in timespans_by_data_id {
            for (timespan, record) in
                correct_validity_intervals(pairs, &mut info_messages, &mut warn_messages)?
            {
                corrected_by_timespan
                    .entry(timespan)
                    .or_default()
                    .push(record);
            }
        }

        // BTreeSet iteration gives the lexicographic order the report
        // promises.
        for message in &info_messages {
            info!("{message}");
        }
        for message in &warn_messages {
            warn!("{message}");
        }

        let mut outcome = ReconcileOutcome {
            joined_records,
            gap_messages: info_messages.len(),
            overlap_messages: warn_messages.len(),
            ..Default::default()
        };
        for (timespan, refs) in &corrected_by_timespan {
            registry.certify(self.collection, refs, *timespan)?;
            outcome.certified_timespans += 1;
        }
        Ok(outcome)
    }

    /// Query the legacy side-database for the distinct validity rows of one
    /// dataset type and calibration date. Schemas vary across repositories:
    /// a missing or malformed table is logged and treated as zero rows.
    fn query_validity_rows(
        &self,
        db: &Connection,
        target: &WalkTarget,
        calib_date: &str,
    ) -> Vec<ValidityRow> {
        let type_name = &target.dataset_type.name;
        let Some(table) = target.table.as_deref() else {
            warn!(
                "could not extract calibration ranges for {type_name} in {}: no side-database table configured",
                self.root.display()
            );
            return Vec::new();
        };
        let mut fields = vec!["validStart".to_string(), "validEnd".to_string()];
        if target.dataset_type.has_dimension("detector") {
            fields.push(self.ccd_key.to_string());
        } else {
            fields.push(format!("NULL AS {}", self.ccd_key));
        }
        if target.dataset_type.has_dimension("physical_filter") {
            fields.push("filter".to_string());
        } else {
            fields.push("NULL AS filter".to_string());
        }
        let sql = format!(
            "SELECT DISTINCT {} FROM {table} WHERE calibDate = ?1",
            fields.join(", ")
        );
        match Self::run_validity_query(db, &sql, calib_date) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    "could not extract calibration ranges for {type_name} in {} from table {table}: {err}",
                    self.root.display()
                );
                Vec::new()
            }
        }
    }

    fn run_validity_query(
        db: &Connection,
        sql: &str,
        calib_date: &str,
    ) -> Result<Vec<ValidityRow>, rusqlite::Error> {
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map([calib_date], |row| {
            Ok(ValidityRow {
                valid_start: row.get(0)?,
                valid_end: row.get(1)?,
                detector: row.get(2)?,
                filter: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Rebuild the legacy identifier fragment carried by a validity row.
    /// Returns `None` when a dimension the dataset type requires came back
    /// NULL, which means the row cannot be joined.
    fn legacy_id_from_row(&self, target: &WalkTarget, row: &ValidityRow) -> Option<LegacyDataId> {
        let mut legacy = LegacyDataId::new();
        if target.dataset_type.has_dimension("detector") {
            legacy.insert(self.ccd_key.to_string(), FieldValue::Int(row.detector?));
        }
        if target.dataset_type.has_dimension("physical_filter") {
            legacy.insert(
                "filter".to_string(),
                FieldValue::Str(row.filter.clone()?),
            );
        }
        Some(legacy)
    }
}

/// Correct one group's validity intervals, sorted by begin ascending.
///
/// Gaps and overlaps smaller than a day plus fuzz are legacy day-convention
/// artifacts: gaps are closed and overlaps trimmed by adjusting the previous
/// interval's end to the current begin, always trusting validity-start.
/// Larger discontinuities pass through untouched. Messages are accumulated
/// into caller-owned sets so deduplication spans all groups.
pub fn correct_validity_intervals(
    mut pairs: Vec<(Timespan, DiscoveredRecord)>,
    info_messages: &mut BTreeSet<String>,
    warn_messages: &mut BTreeSet<String>,
) -> Result<Vec<(Timespan, DiscoveredRecord)>> {
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let mut pairs = pairs.into_iter();
    let Some((mut prev_timespan, mut prev_record)) = pairs.next() else {
        return Ok(Vec::new());
    };
    let mut corrected = Vec::new();
    for (timespan, record) in pairs {
        let delta = timespan.begin() - prev_timespan.end();
        if delta.abs() < fuzzy_day() {
            if delta > Duration::zero() {
                info_messages.insert(format!(
                    "calibration validity gap closed from {} to {}",
                    prev_timespan.end(),
                    timespan.begin()
                ));
            } else {
                warn_messages.insert(format!(
                    "calibration validity overlap of {}s removed for period {} to {}",
                    delta.abs().num_seconds(),
                    timespan.begin(),
                    prev_timespan.end()
                ));
            }
            // The divergence is down to inconsistent inclusive/exclusive
            // day conventions; validity-start is trusted, so the previous
            // interval is refit to end at the current begin.
            prev_timespan = Timespan::new(prev_timespan.begin(), timespan.begin())?;
        }
        corrected.push((prev_timespan, prev_record));
        prev_timespan = timespan;
        prev_record = record;
    }
    corrected.push((prev_timespan, prev_record));
    Ok(corrected)
}
