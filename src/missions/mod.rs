//! Mission-specific query building, file selection and validation.

pub mod sentinel1;
pub mod sentinel2;

pub use sentinel1::Sentinel1;
pub use sentinel2::Sentinel2;

use crate::dates::DateWindow;
use crate::error::Result;
use std::path::Path;

/// The parts of a download run that differ between product families.
pub trait Mission {
    /// Areas of interest to sweep, in configuration order.
    fn areas(&self) -> Vec<String>;

    /// Builds the catalog filter query for one area and date window.
    fn build_query(&self, area: &str, window: &DateWindow) -> Result<String>;

    /// Keeps the manifest entries worth downloading, preserving their order.
    fn filter_files(&self, files: &[String]) -> Vec<String>;

    /// Structural check of a downloaded file. Files the mission does not
    /// recognise by extension pass unchecked.
    fn validate_file(&self, path: &Path) -> Result<()>;

    /// One line describing the run for the log.
    fn summary(&self) -> String;
}

/// Only online products are worth asking for, oldest first so a re-run
/// resumes where the previous one stopped.
pub(crate) fn assemble_query(clauses: &[String], page_size: u32) -> String {
    format!(
        "{} and Online eq True&$top={}&$orderby=ContentDate/Start asc",
        clauses.join(" and "),
        page_size
    )
}

pub(crate) fn date_clauses(window: &DateWindow) -> [String; 2] {
    [
        format!("ContentDate/Start ge {}", window.start_timestamp()),
        format!("ContentDate/End le {}", window.end_timestamp()),
    ]
}
