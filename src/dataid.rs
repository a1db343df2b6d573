use crate::error::MigrateError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single captured or translated identifier value.
///
/// Untagged serde representation keeps ledger lines readable: integers stay
/// integers, everything else is a plain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// An untyped key/value mapping as produced by the legacy repository's
/// naming convention.
pub type LegacyDataId = BTreeMap<String, FieldValue>;

pub fn render_legacy_id(id: &LegacyDataId) -> String {
    let parts = id
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>();
    format!("{{{}}}", parts.join(", "))
}

/// A fully-typed, dimension-validated identifier in the destination schema.
///
/// Value equality, total order, and hashing are derived from the sorted
/// dimension/value pairs only, so data ids are usable as grouping keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId {
    values: BTreeMap<String, FieldValue>,
}

impl DataId {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a raw mapping against a dimension set: every dimension must
    /// be present and no extraneous keys are allowed.
    pub fn standardize(
        values: BTreeMap<String, FieldValue>,
        dimensions: &BTreeSet<String>,
    ) -> Result<Self, MigrateError> {
        for dim in dimensions {
            if !values.contains_key(dim) {
                return Err(MigrateError::UntranslatableDataId(format!(
                    "missing dimension `{dim}` in {}",
                    render_legacy_id(&values)
                )));
            }
        }
        for key in values.keys() {
            if !dimensions.contains(key) {
                return Err(MigrateError::UntranslatableDataId(format!(
                    "extraneous key `{key}` for dimensions {dimensions:?}"
                )));
            }
        }
        Ok(Self { values })
    }

    /// Build a partial data id without dimension validation; used when only
    /// ancestor path segments have been resolved so far.
    pub fn partial(values: BTreeMap<String, FieldValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Converts a legacy flat identifier into a structured identifier plus, for
/// calibration templates, the auxiliary calibration-date grouping key.
///
/// Implementations must be total over any legacy identifier the side
/// database can produce for their dataset type.
pub trait IdTranslator {
    fn translate(
        &self,
        legacy: &LegacyDataId,
        partial: bool,
    ) -> Result<(DataId, Option<String>), MigrateError>;
}

/// Default translator: renames legacy keys to destination dimension names,
/// pins the instrument dimension to a constant, and pulls the calibration
/// date out of the mapping as the auxiliary key.
#[derive(Debug, Clone)]
pub struct DimensionMapTranslator {
    instrument: String,
    key_map: BTreeMap<String, String>,
    dimensions: BTreeSet<String>,
    calib_date_key: String,
}

pub const CALIB_DATE_KEY: &str = "calibDate";

impl DimensionMapTranslator {
    pub fn new(
        instrument: impl Into<String>,
        key_map: BTreeMap<String, String>,
        dimensions: BTreeSet<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            key_map,
            dimensions,
            calib_date_key: CALIB_DATE_KEY.to_string(),
        }
    }
}

impl IdTranslator for DimensionMapTranslator {
    fn translate(
        &self,
        legacy: &LegacyDataId,
        partial: bool,
    ) -> Result<(DataId, Option<String>), MigrateError> {
        let mut calib_date = None;
        let mut values = BTreeMap::new();
        for (key, value) in legacy {
            if key == &self.calib_date_key {
                calib_date = Some(value.to_string());
                continue;
            }
            let dim = self.key_map.get(key).cloned().unwrap_or_else(|| key.clone());
            values.insert(dim, value.clone());
        }
        if self.dimensions.contains("instrument") {
            values.insert(
                "instrument".to_string(),
                FieldValue::Str(self.instrument.clone()),
            );
        }
        let data_id = if partial {
            DataId::partial(values)
        } else {
            DataId::standardize(values, &self.dimensions)?
        };
        Ok((data_id, calib_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> DimensionMapTranslator {
        let mut key_map = BTreeMap::new();
        key_map.insert("ccd".to_string(), "detector".to_string());
        key_map.insert("filter".to_string(), "physical_filter".to_string());
        let dimensions = ["instrument", "detector", "physical_filter"]
            .into_iter()
            .map(str::to_string)
            .collect();
        DimensionMapTranslator::new("TestCam", key_map, dimensions)
    }

    #[test]
    fn translate_renames_keys_and_extracts_calib_date() {
        let mut legacy = LegacyDataId::new();
        legacy.insert("ccd".to_string(), FieldValue::Int(12));
        legacy.insert("filter".to_string(), FieldValue::from("g"));
        legacy.insert("calibDate".to_string(), FieldValue::from("2020-01-01"));

        let (data_id, calib_date) = translator().translate(&legacy, false).expect("translate");
        assert_eq!(calib_date.as_deref(), Some("2020-01-01"));
        assert_eq!(data_id.get("detector"), Some(&FieldValue::Int(12)));
        assert_eq!(
            data_id.get("physical_filter"),
            Some(&FieldValue::from("g"))
        );
        assert_eq!(data_id.get("instrument"), Some(&FieldValue::from("TestCam")));
    }

    #[test]
    fn translate_rejects_incomplete_full_id() {
        let mut legacy = LegacyDataId::new();
        legacy.insert("ccd".to_string(), FieldValue::Int(12));
        let err = translator().translate(&legacy, false).unwrap_err();
        assert!(err.to_string().contains("physical_filter"));
    }

    #[test]
    fn translate_partial_skips_validation() {
        let mut legacy = LegacyDataId::new();
        legacy.insert("ccd".to_string(), FieldValue::Int(3));
        let (data_id, _) = translator().translate(&legacy, true).expect("partial");
        assert_eq!(data_id.get("detector"), Some(&FieldValue::Int(3)));
    }

    #[test]
    fn data_ids_group_by_value() {
        let mut a = BTreeMap::new();
        a.insert("detector".to_string(), FieldValue::Int(1));
        let mut b = BTreeMap::new();
        b.insert("detector".to_string(), FieldValue::Int(1));
        assert_eq!(DataId::partial(a), DataId::partial(b));
    }
}
