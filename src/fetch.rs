//! Downloads the EPG feed into the local cache

use crate::config::AppConfig;
use crate::error::{EpgError, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum attempts, first one included
    pub max_retries: u32,
    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds
    pub read_timeout_secs: u64,
    /// Chunk size for reading (bytes)
    pub chunk_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
            chunk_size: 64 * 1024,
        }
    }
}

/// What ended up in the cache
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub raw_path: PathBuf,
    pub xml_path: PathBuf,
    pub downloaded_bytes: u64,
    pub xml_bytes: u64,
}

/// EPG Downloader with HTTPS support
pub struct EpgDownloader;

impl EpgDownloader {
    /// Create a configured ureq agent
    fn create_agent(config: &DownloadConfig) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.read_timeout_secs)))
            .timeout_connect(Some(Duration::from_secs(config.connect_timeout_secs)))
            .build()
            .new_agent()
    }

    /// Download the configured feed and unpack it next to the raw file.
    /// Nothing is unpacked when the download fails.
    pub fn fetch_to_cache(config: &AppConfig) -> Result<FetchReport> {
        let raw_path = config.raw_epg_gz_path();
        let xml_path = config.raw_epg_path();

        fs::create_dir_all(&config.cache_dir).map_err(|e| EpgError::io(&config.cache_dir, e))?;

        info!(url = %config.epg_url, "downloading EPG");
        let downloaded_bytes =
            Self::download_to_file(&config.epg_url, &raw_path, &config.download, &config.user_agent)?;
        info!(
            path = %raw_path.display(),
            size_mb = %format!("{:.2}", downloaded_bytes as f64 / (1024.0 * 1024.0)),
            "downloaded"
        );

        let xml_bytes = unpack(&raw_path, &xml_path)?;
        info!(
            path = %xml_path.display(),
            size_mb = %format!("{:.2}", xml_bytes as f64 / (1024.0 * 1024.0)),
            "unpacked"
        );

        Ok(FetchReport {
            raw_path,
            xml_path,
            downloaded_bytes,
            xml_bytes,
        })
    }

    /// Download to file with retry support (supports HTTP and HTTPS)
    pub fn download_to_file(
        url: &str,
        output_path: &Path,
        config: &DownloadConfig,
        user_agent: &str,
    ) -> Result<u64> {
        let agent = Self::create_agent(config);
        let attempts_allowed = config.max_retries.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::try_download(&agent, url, output_path, config, user_agent) {
                Ok(total) => return Ok(total),
                Err(e) => {
                    if attempts >= attempts_allowed {
                        return Err(EpgError::DownloadFailed {
                            attempts,
                            last: e.to_string(),
                        });
                    }
                    warn!(attempt = attempts, error = %e, "download failed, retrying");
                    std::thread::sleep(Duration::from_millis(config.retry_delay_ms));
                }
            }
        }
    }

    fn try_download(
        agent: &ureq::Agent,
        url: &str,
        output_path: &Path,
        config: &DownloadConfig,
        user_agent: &str,
    ) -> Result<u64> {
        let response = agent
            .get(url)
            .header("User-Agent", user_agent)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7")
            .call()
            .map_err(|e| EpgError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EpgError::Http(format!("HTTP error: {}", status)));
        }

        // Written beside the target and renamed, so a broken transfer never
        // replaces the previous download
        let part_path = output_path.with_extension("part");
        let mut file = BufWriter::new(File::create(&part_path).map_err(|e| EpgError::io(&part_path, e))?);

        let mut reader = response.into_body().into_reader();
        let mut buffer = vec![0u8; config.chunk_size.max(1024)];
        let mut downloaded: u64 = 0;

        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    file.write_all(&buffer[..n])
                        .map_err(|e| EpgError::io(&part_path, e))?;
                    downloaded += n as u64;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EpgError::Http(format!("Read failed: {}", e))),
            }
        }

        file.flush().map_err(|e| EpgError::io(&part_path, e))?;
        drop(file);
        fs::rename(&part_path, output_path).map_err(|e| EpgError::io(output_path, e))?;

        debug!(bytes = downloaded, "transfer complete");
        Ok(downloaded)
    }
}

/// Gunzip `raw` into `xml`, or copy it through when it is not gzip
pub fn unpack(raw: &Path, xml: &Path) -> Result<u64> {
    let mut magic = [0u8; 2];
    let is_gzip = {
        let mut file = File::open(raw).map_err(|e| EpgError::io(raw, e))?;
        matches!(file.read(&mut magic), Ok(2)) && magic == [0x1f, 0x8b]
    };

    let input = BufReader::new(File::open(raw).map_err(|e| EpgError::io(raw, e))?);
    let mut output = BufWriter::new(File::create(xml).map_err(|e| EpgError::io(xml, e))?);

    let written = if is_gzip {
        io::copy(&mut GzDecoder::new(input), &mut output)
    } else {
        let mut input = input;
        io::copy(&mut input, &mut output)
    }
    .map_err(|e| EpgError::io(raw, e))?;

    output.flush().map_err(|e| EpgError::io(xml, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn test_unpack_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("epg_raw.xml.gz");
        let xml = dir.path().join("epg_raw.xml");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<tv></tv>").unwrap();
        fs::write(&raw, encoder.finish().unwrap()).unwrap();

        assert_eq!(unpack(&raw, &xml).unwrap(), 9);
        assert_eq!(fs::read_to_string(&xml).unwrap(), "<tv></tv>");
    }

    #[test]
    fn test_unpack_plain_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("epg_raw.xml.gz");
        let xml = dir.path().join("epg_raw.xml");
        fs::write(&raw, "<tv/>").unwrap();

        unpack(&raw, &xml).unwrap();
        assert_eq!(fs::read_to_string(&xml).unwrap(), "<tv/>");
    }

    #[test]
    fn test_unpack_missing_raw() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(&dir.path().join("nope.gz"), &dir.path().join("out.xml")).unwrap_err();
        assert!(matches!(err, EpgError::Io { .. }));
    }

    #[test]
    fn test_default_download_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 2000);
    }
}
