//! Pretrained asset fetcher
//!
//! Missing catalogue entries are downloaded concurrently. Each transfer
//! streams into `<destination>.part` and is renamed into place only after the
//! last byte is written, so an interrupted download never looks present.

use futures::future::join_all;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::assets::{AssetCatalogue, PretrainedAsset};
use crate::core::error::{Result, VcError};

/// Outcome of [`AssetFetcher::ensure_assets_present`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Destinations that were already on disk
    pub skipped: Vec<PathBuf>,
    /// Destinations downloaded by this call
    pub fetched: Vec<PathBuf>,
}

/// Downloads catalogue entries over HTTP(S)
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    client: reqwest::Client,
}

impl AssetFetcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch every missing asset of `catalogue`, waiting for all transfers.
    ///
    /// Present files are skipped without any integrity check. When several
    /// transfers fail, the first failure in catalogue order is returned after
    /// the others have finished.
    pub async fn ensure_assets_present(&self, catalogue: &AssetCatalogue) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        let mut pending = Vec::new();
        for asset in catalogue.assets() {
            if asset.is_present() {
                debug!("Asset present: {:?}", asset.destination);
                report.skipped.push(asset.destination.clone());
            } else {
                pending.push(asset);
            }
        }

        if pending.is_empty() {
            info!("All {} pretrained assets present", catalogue.len());
            return Ok(report);
        }
        info!("Fetching {} missing pretrained assets", pending.len());

        let results = join_all(pending.iter().map(|asset| self.fetch(asset))).await;

        let mut first_error = None;
        for (asset, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => report.fetched.push(asset.destination.clone()),
                Err(e) => {
                    warn!("Failed to fetch {}: {}", asset.url, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Download one asset to its destination
    pub async fn fetch(&self, asset: &PretrainedAsset) -> Result<()> {
        let transfer_error = |message: String| VcError::Transfer {
            url: asset.url.clone(),
            message,
        };

        if let Some(parent) = asset.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| transfer_error(format!("cannot create {:?}: {}", parent, e)))?;
        }

        let partial = partial_path(&asset.destination);
        let result = self.stream_to(&asset.url, &partial).await;
        match result {
            Ok(bytes) => {
                tokio::fs::rename(&partial, &asset.destination)
                    .await
                    .map_err(|e| transfer_error(format!("cannot move download into place: {}", e)))?;
                info!("Fetched {} ({} bytes)", asset.file_name(), bytes);
                Ok(())
            }
            Err(message) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(transfer_error(message))
            }
        }
    }

    async fn stream_to(&self, url: &str, partial: &Path) -> std::result::Result<u64, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| format!("cannot create {:?}: {}", partial, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| e.to_string())?;
        Ok(written)
    }
}

impl Default for AssetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// `<destination>.part`
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
