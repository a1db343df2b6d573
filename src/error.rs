use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("calibration registry database not found in {0}")]
    MissingCalibRegistry(PathBuf),
    #[error("invalid path template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },
    #[error("scan config invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("cannot translate legacy data id: {0}")]
    UntranslatableDataId(String),
}

impl MigrateError {
    pub fn invalid_template(template: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}
