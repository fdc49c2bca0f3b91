//! Run configuration loaded from a toml file.

use crate::dates::WindowUnit;
use crate::error::{FetchError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
    pub sentinel1: Option<Sentinel1Config>,
    pub sentinel2: Option<Sentinel2Config>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    pub initial_date: String,
    pub last_date: String,
    pub window: WindowUnit,
    pub output_dir: PathBuf,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DownloadConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_batch_delay")]
    pub batch_delay_secs: u64,
    #[serde(default)]
    pub retry_delay_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            max_retries: default_max_retries(),
            batch_delay_secs: default_batch_delay(),
            retry_delay_secs: 0,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Endpoints {
    #[serde(default = "default_catalog_url")]
    pub catalog_url: Url,
    #[serde(default = "default_download_url")]
    pub download_url: Url,
    #[serde(default = "default_token_url")]
    pub token_url: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            catalog_url: default_catalog_url(),
            download_url: default_download_url(),
            token_url: default_token_url(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Sentinel2Config {
    pub product_level: String,
    pub bands: Vec<String>,
    #[serde(default = "default_s2_page_size")]
    pub page_size: u32,
    pub tiles: Vec<TileSpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TileSpec {
    pub id: String,
    pub orbit: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Sentinel1Config {
    pub orbit_direction: String,
    pub product_type: String,
    /// Echoed in the run summary; the catalog query does not constrain
    /// polarisation.
    #[serde(default)]
    pub polarisations: Vec<String>,
    #[serde(default = "default_s1_page_size")]
    pub page_size: u32,
    pub footprints: Vec<FootprintSpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FootprintSpec {
    pub name: String,
    /// Closed polygon ring as "lon lat" pairs, first and last point equal.
    pub ring: Vec<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_delay() -> u64 {
    10
}

fn default_s2_page_size() -> u32 {
    500
}

fn default_s1_page_size() -> u32 {
    20
}

fn default_catalog_url() -> Url {
    Url::parse("https://catalogue.dataspace.copernicus.eu/odata/v1").expect("valid catalog url")
}

fn default_download_url() -> Url {
    Url::parse("https://download.dataspace.copernicus.eu/odata/v1").expect("valid download url")
}

fn default_token_url() -> Url {
    Url::parse("https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token")
        .expect("valid token url")
}

impl RunConfig {
    pub fn read(path: &Path) -> Result<RunConfig> {
        let content = fs::read_to_string(path)?;
        RunConfig::parse(&content)
    }

    pub fn parse(content: &str) -> Result<RunConfig> {
        let config: RunConfig = toml::from_str(content)
            .map_err(|e| FetchError::Input(format!("configuration error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.download.max_retries == 0 {
            return Err(FetchError::Input(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if let Some(sentinel2) = &self.sentinel2 {
            sentinel2.validate()?;
        }
        if let Some(sentinel1) = &self.sentinel1 {
            sentinel1.validate()?;
        }
        Ok(())
    }
}

impl Sentinel2Config {
    fn validate(&self) -> Result<()> {
        if self.product_level.is_empty() {
            return Err(FetchError::Input("product_level must not be empty".to_string()));
        }
        if self.bands.is_empty() {
            return Err(FetchError::Input("bands must not be empty".to_string()));
        }
        if self.tiles.is_empty() {
            return Err(FetchError::Input("tiles must not be empty".to_string()));
        }
        let tile_pattern = Regex::new(r"^T\d{2}[A-Z]{3}$").expect("valid tile pattern");
        let orbit_pattern = Regex::new(r"^R\d{3}$").expect("valid orbit pattern");
        let mut seen = HashSet::new();
        for tile in &self.tiles {
            if !tile_pattern.is_match(&tile.id) {
                return Err(FetchError::Input(format!(
                    "tile id {:?} does not match T<2 digits><3 letters>",
                    tile.id
                )));
            }
            if !orbit_pattern.is_match(&tile.orbit) {
                return Err(FetchError::Input(format!(
                    "orbit {:?} does not match R<3 digits>",
                    tile.orbit
                )));
            }
            if !seen.insert(tile.id.as_str()) {
                return Err(FetchError::Input(format!("duplicate tile id {:?}", tile.id)));
            }
        }
        Ok(())
    }
}

impl Sentinel1Config {
    fn validate(&self) -> Result<()> {
        if self.orbit_direction != "ASCENDING" && self.orbit_direction != "DESCENDING" {
            return Err(FetchError::Input(format!(
                "orbit_direction {:?} must be ASCENDING or DESCENDING",
                self.orbit_direction
            )));
        }
        if self.product_type.is_empty() {
            return Err(FetchError::Input("product_type must not be empty".to_string()));
        }
        if self.footprints.is_empty() {
            return Err(FetchError::Input("footprints must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for footprint in &self.footprints {
            if footprint.ring.len() < 4 || footprint.ring.first() != footprint.ring.last() {
                return Err(FetchError::Input(format!(
                    "footprint {:?} ring must be a closed polygon",
                    footprint.name
                )));
            }
            if !seen.insert(footprint.name.as_str()) {
                return Err(FetchError::Input(format!(
                    "duplicate footprint name {:?}",
                    footprint.name
                )));
            }
        }
        Ok(())
    }
}
