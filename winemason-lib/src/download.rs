//! Download collaborator with caching and checksum verification

use crate::error::{Result, WinemasonError};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::Path;
use tracing::warn;

/// Transfer seam used by the cache; fakes stand in for it in tests
pub trait Downloader {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// HTTP downloader
pub struct HttpDownloader {
    client: Client,
    progress: bool,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent("Winemason/0.1").build()?;
        Ok(Self {
            client,
            progress: true,
        })
    }

    pub fn without_progress(mut self) -> Self {
        self.progress = false;
        self
    }

    /// Download with SHA256 verification.
    ///
    /// An already-present destination whose checksum matches is left alone;
    /// a mismatching one is removed and re-downloaded.
    pub fn fetch_verified(
        &self,
        url: &str,
        destination: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<()> {
        if destination.exists() {
            match expected_sha256 {
                Some(expected) if verify_checksum(destination, expected)? => return Ok(()),
                Some(_) => std::fs::remove_file(destination)?,
                None => return Ok(()),
            }
        }

        let mut response = self
            .client
            .get(url)
            .send()?
            .error_for_status()
            .map_err(|e| WinemasonError::Download(format!("{}: {}", url, e)))?;

        let total_size = response.content_length().unwrap_or(0);
        let pb = if self.progress && total_size > 0 {
            let pb = ProgressBar::new(total_size);
            let style = ProgressStyle::default_bar()
                .template("{msg} {bar:40.cyan/blue} {bytes}/{total_bytes} {eta}")
                .map_err(|e| WinemasonError::Download(format!("progress template: {}", e)))?;
            pb.set_style(style);
            pb.set_message("Downloading");
            Some(pb)
        } else {
            None
        };

        let mut file = std::fs::File::create(destination)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = response.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])?;
            hasher.update(&buffer[..read]);
            if let Some(ref pb) = pb {
                pb.inc(read as u64);
            }
        }
        if let Some(pb) = pb {
            pb.finish_with_message("Downloaded");
        }

        if let Some(expected) = expected_sha256 {
            let computed = format!("{:x}", hasher.finalize());
            if computed != expected {
                std::fs::remove_file(destination)?;
                return Err(WinemasonError::ChecksumMismatch {
                    expected: expected.to_string(),
                    got: computed,
                });
            }
        }

        Ok(())
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        self.fetch_verified(url, destination, None)
    }
}

/// Try the primary URL, then the backup exactly once
pub fn fetch_with_backup(
    downloader: &dyn Downloader,
    primary_url: &str,
    backup_url: &str,
    destination: &Path,
) -> Result<()> {
    match downloader.fetch(primary_url, destination) {
        Ok(()) => Ok(()),
        Err(primary_error) => {
            warn!(
                "download from {} failed ({}), trying backup {}",
                primary_url, primary_error, backup_url
            );
            downloader.fetch(backup_url, destination)
        }
    }
}

fn verify_checksum(path: &Path, expected: &str) -> Result<bool> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    let computed = format!("{:x}", hasher.finalize());
    Ok(computed == expected)
}
