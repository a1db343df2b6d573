//! Migrates datasets between two generations of an astronomical data
//! repository: template-driven directory scanning discovers legacy dataset
//! files, and calibration validity intervals are reconstructed from the
//! legacy side-database, corrected, and certified into the destination
//! store.

pub mod calib;
pub mod config;
pub mod convert;
pub mod dataid;
pub mod datasets;
pub mod error;
pub mod filters;
pub mod registry;
pub mod template;
pub mod timespan;
pub mod walk;

pub use convert::{ConvertOutcome, convert_repo, discover};
pub use error::MigrateError;
