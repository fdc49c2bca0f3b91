//! The download engine. Sweeps every area of interest through every date
//! window, resolves catalogued products to their manifest files and fetches
//! whatever is not already on disk.

use crate::auth::{Credentials, Session};
use crate::catalog::{self, ProductDescriptor};
use crate::config::{CampaignConfig, DownloadConfig, Endpoints};
use crate::dates::{split_date_range, DateWindow};
use crate::error::{FetchError, Result};
use crate::manifest;
use crate::missions::Mission;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, warn};
use url::Url;

const MANIFEST_NAME: &str = "manifest.safe";

#[derive(Default)]
struct RunTotals {
    products: usize,
    fetched: usize,
    skipped: usize,
}

pub struct Downloader<M: Mission> {
    mission: M,
    campaign: CampaignConfig,
    download: DownloadConfig,
    endpoints: Endpoints,
    credentials: Credentials,
    windows: Vec<DateWindow>,
    client: reqwest::Client,
}

impl<M: Mission> Downloader<M> {
    /// Fails before any network traffic when the campaign dates are
    /// malformed.
    pub fn new(
        mission: M,
        campaign: CampaignConfig,
        download: DownloadConfig,
        endpoints: Endpoints,
        credentials: Credentials,
    ) -> Result<Downloader<M>> {
        let windows =
            split_date_range(&campaign.initial_date, &campaign.last_date, campaign.window)?;
        Ok(Downloader {
            mission,
            campaign,
            download,
            endpoints,
            credentials,
            windows,
            client: reqwest::Client::new(),
        })
    }

    pub async fn run(&self) -> Result<()> {
        info!("{}", self.mission.summary());
        info!(
            windows = self.windows.len(),
            output = %self.campaign.output_dir.display(),
            "covering {} to {}", self.campaign.initial_date, self.campaign.last_date
        );
        let mut totals = RunTotals::default();
        for area in self.mission.areas() {
            for window in &self.windows {
                self.run_batch(&area, window, &mut totals).await?;
                tokio::time::sleep(Duration::from_secs(self.download.batch_delay_secs)).await;
            }
        }
        info!(
            products = totals.products,
            fetched = totals.fetched,
            skipped = totals.skipped,
            "run complete"
        );
        Ok(())
    }

    async fn run_batch(
        &self,
        area: &str,
        window: &DateWindow,
        totals: &mut RunTotals,
    ) -> Result<()> {
        let query = self.mission.build_query(area, window)?;
        let products = catalog::search(&self.client, &self.endpoints.catalog_url, &query).await?;
        if products.is_empty() {
            info!(%area, %window, "nothing catalogued");
            return Ok(());
        }

        // One token per batch, and only when there is work to spend it on.
        let session = Session::acquire(&self.endpoints.token_url, &self.credentials).await?;

        let bar = ProgressBar::new(products.len() as u64);
        bar.set_style(progress_style());
        bar.set_message(format!("{area} {window}"));
        for product in &products {
            self.download_product(&session, product, totals).await?;
            bar.inc(1);
        }
        bar.finish_with_message(format!("{area} {window} done"));
        Ok(())
    }

    async fn download_product(
        &self,
        session: &Session,
        product: &ProductDescriptor,
        totals: &mut RunTotals,
    ) -> Result<()> {
        totals.products += 1;
        let product_dir = self.campaign.output_dir.join(&product.name);
        fs::create_dir_all(&product_dir).await?;

        let manifest_path = product_dir.join(MANIFEST_NAME);
        if !fs::try_exists(&manifest_path).await.unwrap_or(false) {
            let url = node_url(
                &self.endpoints.download_url,
                &product.id,
                &product.name,
                MANIFEST_NAME,
            );
            fetch_to_path(session, &url, &manifest_path, &product.name).await?;
        }

        let tree = manifest::parse_manifest(&manifest_path)?;
        let files = manifest::extract_file_paths(&tree)?;
        let wanted = self.mission.filter_files(&files);
        info!(product = %product.name, files = wanted.len(), "manifest resolved");

        for relative in &wanted {
            let destination = product_dir.join(relative);
            if already_present(&destination).await {
                info!(file = %relative, "already on disk, skipping");
                totals.skipped += 1;
                continue;
            }
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).await?;
            }
            let url = node_url(
                &self.endpoints.download_url,
                &product.id,
                &product.name,
                relative,
            );
            self.fetch_with_retry(session, &url, &destination, &product.name)
                .await?;
            totals.fetched += 1;
        }
        Ok(())
    }

    async fn fetch_with_retry(
        &self,
        session: &Session,
        url: &str,
        destination: &Path,
        product_name: &str,
    ) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_validated(session, url, destination, product_name).await {
                Ok(()) => return Ok(()),
                // An offline product will not come back within this run.
                Err(offline @ FetchError::ProductOffline { .. }) => return Err(offline),
                Err(e) => {
                    warn!(attempt, max = self.download.max_retries, error = %e, "fetch failed");
                    if attempt >= self.download.max_retries {
                        error!(file = %destination.display(), "giving up after {attempt} attempts");
                        return Err(e);
                    }
                    if self.download.retry_delay_secs > 0 {
                        tokio::time::sleep(Duration::from_secs(self.download.retry_delay_secs))
                            .await;
                    }
                }
            }
        }
    }

    /// Fetches one file and checks its structure. A file that fails the
    /// check is removed so the next attempt starts clean.
    async fn fetch_validated(
        &self,
        session: &Session,
        url: &str,
        destination: &Path,
        product_name: &str,
    ) -> Result<()> {
        fetch_to_path(session, url, destination, product_name).await?;
        if let Err(invalid) = self.mission.validate_file(destination) {
            let _ = fs::remove_file(destination).await;
            return Err(invalid);
        }
        Ok(())
    }
}

/// Streams into a sibling .partial file and renames on completion, so an
/// interrupted run never leaves a plausible-looking final file behind.
async fn fetch_to_path(
    session: &Session,
    url: &str,
    destination: &Path,
    product_name: &str,
) -> Result<()> {
    let partial = partial_path(destination);
    let result = async {
        stream_to_file(session, url, &partial, product_name).await?;
        fs::rename(&partial, destination).await?;
        Ok(())
    }
    .await;
    if result.is_err() {
        let _ = fs::remove_file(&partial).await;
        let _ = fs::remove_file(destination).await;
    }
    result
}

async fn stream_to_file(
    session: &Session,
    url: &str,
    path: &Path,
    product_name: &str,
) -> Result<()> {
    let response = session.get(url).await?;
    let status = response.status();
    if status == StatusCode::ACCEPTED {
        return Err(FetchError::ProductOffline {
            name: product_name.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let file = fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        writer.write_all(&chunk?).await?;
    }
    writer.flush().await?;
    Ok(())
}

async fn already_present(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

fn node_url(download_url: &Url, product_id: &str, product_name: &str, relative_path: &str) -> String {
    let mut url = format!("{download_url}/Products({product_id})/Nodes({product_name})");
    for segment in relative_path.split('/') {
        url.push_str(&format!("/Nodes({segment})"));
    }
    url.push_str("/$value");
    url
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} [{wide_bar}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_url_addresses_nested_segments() {
        let download_url = Url::parse("https://download.dataspace.copernicus.eu/odata/v1").unwrap();
        let url = node_url(
            &download_url,
            "f3a3f437",
            "S2B_MSIL2A_20230214.SAFE",
            "GRANULE/L2A_T19HCC/IMG_DATA/T19HCC_B02.jp2",
        );
        assert_eq!(
            url,
            "https://download.dataspace.copernicus.eu/odata/v1\
             /Products(f3a3f437)\
             /Nodes(S2B_MSIL2A_20230214.SAFE)\
             /Nodes(GRANULE)/Nodes(L2A_T19HCC)/Nodes(IMG_DATA)/Nodes(T19HCC_B02.jp2)\
             /$value"
        );
    }

    #[test]
    fn test_node_url_for_a_top_level_file() {
        let download_url = Url::parse("https://download.dataspace.copernicus.eu/odata/v1").unwrap();
        let url = node_url(&download_url, "id", "PRODUCT.SAFE", "manifest.safe");
        assert_eq!(
            url,
            "https://download.dataspace.copernicus.eu/odata/v1\
             /Products(id)/Nodes(PRODUCT.SAFE)/Nodes(manifest.safe)/$value"
        );
    }

    #[test]
    fn test_partial_path_appends_the_suffix() {
        let partial = partial_path(Path::new("/data/out/band.jp2"));
        assert_eq!(partial, PathBuf::from("/data/out/band.jp2.partial"));
    }

    #[tokio::test]
    async fn test_an_empty_file_does_not_count_as_present() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.jp2");
        fs::File::create(&empty).await.unwrap();
        assert!(!already_present(&empty).await);

        let full = dir.path().join("full.jp2");
        fs::write(&full, b"bytes").await.unwrap();
        assert!(already_present(&full).await);

        assert!(!already_present(&dir.path().join("missing.jp2")).await);
    }
}
