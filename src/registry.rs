use crate::datasets::DiscoveredRecord;
use crate::timespan::Timespan;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One committed association between a dataset record and a collection,
/// carrying the validity interval for calibration datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAssociation {
    pub collection: String,
    pub record: DiscoveredRecord,
    pub timespan: Option<Timespan>,
}

/// The destination store's narrow contract. `certify` associates a set of
/// records with a collection for exactly one validity interval and is
/// assumed to reject conflicting overlaps on its side; `ingest` is the
/// direct commit used for non-calibration datasets.
pub trait Registry {
    fn certify(
        &mut self,
        collection: &str,
        refs: &[DiscoveredRecord],
        timespan: Timespan,
    ) -> Result<()>;

    fn ingest(&mut self, collection: &str, refs: &[DiscoveredRecord]) -> Result<()>;

    fn query_dataset_associations(
        &self,
        dataset_type: &str,
        collections: &[String],
    ) -> Result<Vec<DatasetAssociation>>;
}

/// Append-only JSONL-backed registry used by the binary.
pub struct JsonlRegistry {
    path: PathBuf,
}

impl JsonlRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, associations: &[DatasetAssociation]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = String::new();
        for association in associations {
            out.push_str(&serde_json::to_string(association)?);
            out.push('\n');
        }
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(out.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<DatasetAssociation>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut out = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let association: DatasetAssociation = serde_json::from_str(trimmed)
                .with_context(|| format!("failed to parse ledger line in {}", self.path.display()))?;
            out.push(association);
        }
        Ok(out)
    }
}

impl Registry for JsonlRegistry {
    fn certify(
        &mut self,
        collection: &str,
        refs: &[DiscoveredRecord],
        timespan: Timespan,
    ) -> Result<()> {
        let associations = refs
            .iter()
            .map(|record| DatasetAssociation {
                collection: collection.to_string(),
                record: record.clone(),
                timespan: Some(timespan),
            })
            .collect::<Vec<_>>();
        self.append(&associations)
    }

    fn ingest(&mut self, collection: &str, refs: &[DiscoveredRecord]) -> Result<()> {
        let associations = refs
            .iter()
            .map(|record| DatasetAssociation {
                collection: collection.to_string(),
                record: record.clone(),
                timespan: None,
            })
            .collect::<Vec<_>>();
        self.append(&associations)
    }

    fn query_dataset_associations(
        &self,
        dataset_type: &str,
        collections: &[String],
    ) -> Result<Vec<DatasetAssociation>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|a| a.record.dataset_type == dataset_type)
            .filter(|a| collections.is_empty() || collections.contains(&a.collection))
            .collect())
    }
}

/// In-memory registry for tests and library callers that inspect results
/// without touching disk.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    associations: Vec<DatasetAssociation>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn associations(&self) -> &[DatasetAssociation] {
        &self.associations
    }

    pub fn certified(&self) -> impl Iterator<Item = &DatasetAssociation> {
        self.associations.iter().filter(|a| a.timespan.is_some())
    }
}

impl Registry for MemoryRegistry {
    fn certify(
        &mut self,
        collection: &str,
        refs: &[DiscoveredRecord],
        timespan: Timespan,
    ) -> Result<()> {
        for record in refs {
            self.associations.push(DatasetAssociation {
                collection: collection.to_string(),
                record: record.clone(),
                timespan: Some(timespan),
            });
        }
        Ok(())
    }

    fn ingest(&mut self, collection: &str, refs: &[DiscoveredRecord]) -> Result<()> {
        for record in refs {
            self.associations.push(DatasetAssociation {
                collection: collection.to_string(),
                record: record.clone(),
                timespan: None,
            });
        }
        Ok(())
    }

    fn query_dataset_associations(
        &self,
        dataset_type: &str,
        collections: &[String],
    ) -> Result<Vec<DatasetAssociation>> {
        Ok(self
            .associations
            .iter()
            .filter(|a| a.record.dataset_type == dataset_type)
            .filter(|a| collections.is_empty() || collections.contains(&a.collection))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataid::{DataId, FieldValue};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(detector: i64) -> DiscoveredRecord {
        let mut values = BTreeMap::new();
        values.insert("detector".to_string(), FieldValue::Int(detector));
        DiscoveredRecord {
            data_id: DataId::partial(values),
            dataset_type: "bias".to_string(),
            path: PathBuf::from(format!("bias-{detector}.fits")),
        }
    }

    #[test]
    fn jsonl_registry_round_trips_associations() {
        let tmp = tempdir().expect("tempdir");
        let mut registry = JsonlRegistry::new(tmp.path().join("ledger.jsonl"));
        let span = Timespan::from_legacy_row("2020-01-01", "2020-01-05").expect("span");

        registry
            .certify("calib/run1", &[record(1), record(2)], span)
            .expect("certify");
        registry.ingest("raw/run1", &[record(3)]).expect("ingest");

        let certified = registry
            .query_dataset_associations("bias", &["calib/run1".to_string()])
            .expect("query");
        assert_eq!(certified.len(), 2);
        assert_eq!(certified[0].timespan, Some(span));

        let all = registry
            .query_dataset_associations("bias", &[])
            .expect("query all");
        assert_eq!(all.len(), 3);
    }
}
