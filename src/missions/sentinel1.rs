//! Sentinel-1 radar products: footprint-addressed queries and GeoTIFF
//! structure checks.

use super::{assemble_query, date_clauses, Mission};
use crate::config::{FootprintSpec, Sentinel1Config};
use crate::dates::DateWindow;
use crate::error::{FetchError, Result};
use std::fs::File;
use std::path::Path;
use tiff::decoder::Decoder;

pub struct Sentinel1 {
    config: Sentinel1Config,
}

impl Sentinel1 {
    pub fn new(config: Sentinel1Config) -> Sentinel1 {
        Sentinel1 { config }
    }

    fn footprint(&self, name: &str) -> Result<&FootprintSpec> {
        self.config
            .footprints
            .iter()
            .find(|footprint| footprint.name == name)
            .ok_or_else(|| FetchError::Input(format!("unknown footprint {name:?}")))
    }
}

impl Mission for Sentinel1 {
    fn areas(&self) -> Vec<String> {
        self.config
            .footprints
            .iter()
            .map(|footprint| footprint.name.clone())
            .collect()
    }

    fn build_query(&self, area: &str, window: &DateWindow) -> Result<String> {
        let footprint = self.footprint(area)?;
        let [start, end] = date_clauses(window);
        let ring = footprint.ring.join(", ");
        let clauses = vec![
            "Collection/Name eq 'SENTINEL-1'".to_string(),
            start,
            end,
            format!("OData.CSC.Intersects(area=geography'SRID=4326;POLYGON(({ring}))')"),
            format!(
                "Attributes/OData.CSC.StringAttribute/any(att:att/Name eq 'orbitDirection' \
                 and att/OData.CSC.StringAttribute/Value eq '{}')",
                self.config.orbit_direction
            ),
            format!("contains(Name,'{}')", self.config.product_type),
            "not (contains(Name, 'COG'))".to_string(),
        ];
        Ok(assemble_query(&clauses, self.config.page_size))
    }

    /// Radar products bundle annotation and calibration next to the
    /// measurements and all of it is kept.
    fn filter_files(&self, files: &[String]) -> Vec<String> {
        files.to_vec()
    }

    fn validate_file(&self, path: &Path) -> Result<()> {
        let is_measurement = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tiff"));
        if !is_measurement {
            return Ok(());
        }
        check_tiff_structure(path).map_err(|reason| FetchError::ValidationFailed {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn summary(&self) -> String {
        let polarisations = if self.config.polarisations.is_empty() {
            String::new()
        } else {
            format!(" [{}]", self.config.polarisations.join(", "))
        };
        format!(
            "Sentinel-1 {} {}{} over {} footprint(s)",
            self.config.product_type,
            self.config.orbit_direction,
            polarisations,
            self.config.footprints.len()
        )
    }
}

fn check_tiff_structure(path: &Path) -> std::result::Result<(), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut decoder = Decoder::new(file).map_err(|e| e.to_string())?;
    let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;
    if width == 0 || height == 0 {
        return Err("image dimensions are zero".to_string());
    }
    Ok(())
}
