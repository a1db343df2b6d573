use crate::dataid::DataId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A destination dataset type. Calibration-ness is determined upstream by
/// the presence of a calibration-date field in the type's path template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetType {
    pub name: String,
    pub dimensions: BTreeSet<String>,
    pub is_calibration: bool,
}

impl DatasetType {
    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.contains(name)
    }
}

/// A dataset discovered during the walk: structured identifier, dataset
/// type, and the file that backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRecord {
    pub data_id: DataId,
    pub dataset_type: String,
    pub path: PathBuf,
}

/// Discovered records for one dataset type, keyed by the auxiliary
/// calibration-date grouping key (`None` for non-calibration datasets).
pub type RecordsByCalibDate = BTreeMap<Option<String>, Vec<DiscoveredRecord>>;

/// Accumulates discoveries for every dataset type evaluated against a shared
/// tree; a single walk populates all types at once.
#[derive(Debug, Default)]
pub struct DatasetAccumulator {
    by_type: BTreeMap<String, RecordsByCalibDate>,
}

impl DatasetAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: DiscoveredRecord, calib_date: Option<String>) {
        self.by_type
            .entry(record.dataset_type.clone())
            .or_default()
            .entry(calib_date)
            .or_default()
            .push(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordsByCalibDate)> {
        self.by_type.iter()
    }

    pub fn records_for(&self, dataset_type: &str) -> impl Iterator<Item = &DiscoveredRecord> {
        self.by_type
            .get(dataset_type)
            .into_iter()
            .flat_map(|by_date| by_date.values().flatten())
    }

    pub fn total_records(&self) -> usize {
        self.by_type
            .values()
            .flat_map(|by_date| by_date.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataid::{DataId, FieldValue};
    use std::collections::BTreeMap;

    fn record(dataset_type: &str, detector: i64) -> DiscoveredRecord {
        let mut values = BTreeMap::new();
        values.insert("detector".to_string(), FieldValue::Int(detector));
        DiscoveredRecord {
            data_id: DataId::partial(values),
            dataset_type: dataset_type.to_string(),
            path: PathBuf::from(format!("{dataset_type}-{detector}.fits")),
        }
    }

    #[test]
    fn accumulator_groups_by_type_and_date() {
        let mut acc = DatasetAccumulator::new();
        acc.push(record("flat", 1), Some("2020-01-01".to_string()));
        acc.push(record("flat", 2), Some("2020-01-01".to_string()));
        acc.push(record("raw", 1), None);

        assert_eq!(acc.total_records(), 3);
        assert_eq!(acc.records_for("flat").count(), 2);
        let (_, by_date) = acc.iter().next().expect("has flat");
        assert_eq!(by_date[&Some("2020-01-01".to_string())].len(), 2);
    }
}
