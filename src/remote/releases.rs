// Release archives
//
// Known releases come from two places: archives already downloaded into the versions
// directory (named `<version>.zip`) and the latest release offered on the license page of
// the client area. The latest release can only be fetched by posting the page's download
// form, so a release carries either a local path, a download request, or both.

use crate::error::{InstallError, Result};
use crate::installation::progress::ProgressReporter;
use crate::models::version::Version;
use crate::remote::extractor::extract_download_form;
use crate::remote::session::{Download, HttpSession};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMeta {
    pub version: Version,
    pub filepath: Option<PathBuf>,
    pub request: Option<DownloadRequest>,
}

pub struct ReleaseManager {
    dir: PathBuf,
    releases: BTreeMap<Version, ReleaseMeta>,
}

impl ReleaseManager {
    /// Index the archives already present in `dir` (missing directory = no archives).
    pub fn scan(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut releases = BTreeMap::new();

        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                    continue;
                }
                let Some(version) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(Version::parse)
                else {
                    warn!(
                        "[PHASE: releases] [STEP: scan] Ignoring archive with no version in its name: {:?}",
                        path
                    );
                    continue;
                };
                debug!(
                    "[PHASE: releases] [STEP: scan] Cached release {} at {:?}",
                    version, path
                );
                releases.insert(
                    version.clone(),
                    ReleaseMeta {
                        version,
                        filepath: Some(path),
                        request: None,
                    },
                );
            }
        }

        Ok(Self { dir, releases })
    }

    pub fn releases(&self) -> impl Iterator<Item = &ReleaseMeta> {
        self.releases.values()
    }

    pub fn get(&self, version: &Version) -> Option<&ReleaseMeta> {
        self.releases.get(version)
    }

    pub fn latest(&self) -> Option<&ReleaseMeta> {
        self.releases.values().next_back()
    }

    /// Register the release offered by a license page. Returns its version.
    pub fn add_latest_from_html(&mut self, html: &str, license_url: &str) -> Result<Version> {
        let form = extract_download_form(html, license_url)?;
        let version = Version::parse(&form.version_label).ok_or_else(|| {
            InstallError::page_structure(
                "(license page)",
                format!("unrecognised release label '{}'", form.version_label),
            )
        })?;
        info!("[PHASE: releases] [STEP: latest] Latest IPS version: {}", version);

        let request = DownloadRequest {
            url: form.action,
            params: vec![("version".to_string(), "latest".to_string())],
        };
        match self.releases.get_mut(&version) {
            Some(cached) => {
                debug!("[PHASE: releases] [STEP: latest] Latest version already downloaded, keeping cache entry");
                cached.request = Some(request);
            }
            None => {
                self.releases.insert(
                    version.clone(),
                    ReleaseMeta {
                        version: version.clone(),
                        filepath: None,
                        request: Some(request),
                    },
                );
            }
        }
        Ok(version)
    }

    pub async fn fetch_latest(&mut self, session: &HttpSession, license_url: &str) -> Result<Version> {
        let html = session.fetch_html(license_url).await?;
        self.add_latest_from_html(&html, license_url)
    }

    /// Path of the archive for `version`, downloading it first when there is no cached copy
    /// or `use_cache` is false.
    pub async fn archive(
        &mut self,
        session: &HttpSession,
        version: &Version,
        use_cache: bool,
        progress: &mut dyn ProgressReporter,
    ) -> Result<PathBuf> {
        info!("[PHASE: releases] [STEP: get] Retrieving version {}", version);
        let meta = self
            .releases
            .get(version)
            .cloned()
            .ok_or_else(|| InstallError::UnsupportedVersion(version.to_string()))?;

        if let Some(path) = meta.filepath.as_ref().filter(|_| use_cache) {
            return Ok(path.clone());
        }
        if meta.filepath.is_some() {
            info!("[PHASE: releases] [STEP: get] Ignoring cached version: {}", version);
        }

        let request = meta.request.as_ref().ok_or_else(|| {
            InstallError::Session(format!(
                "version {} is not offered for download by the client area",
                version
            ))
        })?;
        let path = self.archive_path(version);
        download_to(session, request, &path, progress).await?;

        if let Some(entry) = self.releases.get_mut(version) {
            entry.filepath = Some(path.clone());
        }
        Ok(path)
    }

    pub fn archive_path(&self, version: &Version) -> PathBuf {
        self.dir.join(format!("{}.zip", version))
    }
}

async fn download_to(
    session: &HttpSession,
    request: &DownloadRequest,
    path: &Path,
    progress: &mut dyn ProgressReporter,
) -> Result<()> {
    debug!("[PHASE: releases] [STEP: download] Submitting request: POST {}", request.url);
    let mut download = session.stream_post(&request.url, &request.params).await?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = path.with_extension("zip.part");

    progress.start("Downloading");
    let received = match write_body(&mut download, &partial, progress).await {
        Ok(received) => {
            progress.finish();
            received
        }
        Err(e) => {
            progress.abandon();
            if let Err(rm) = tokio::fs::remove_file(&partial).await {
                warn!(
                    "[PHASE: releases] [STEP: download] Could not remove partial download {:?}: {}",
                    partial, rm
                );
            }
            return Err(e);
        }
    };

    if tokio::fs::try_exists(path).await? {
        info!("[PHASE: releases] [STEP: download] Removing old version download");
        tokio::fs::remove_file(path).await?;
    }
    tokio::fs::rename(&partial, path).await?;
    info!(
        "[PHASE: releases] [STEP: download] Release downloaded to {:?} ({} bytes)",
        path, received
    );
    Ok(())
}

/// Stream the body into `partial`, returning the number of bytes written.
async fn write_body(
    download: &mut Download,
    partial: &Path,
    progress: &mut dyn ProgressReporter,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(partial).await?;
    let total = download.content_length.filter(|len| *len > 0);
    let mut received: u64 = 0;
    while let Some(chunk) = download.chunk().await? {
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        if let Some(total) = total {
            let percent = (received.saturating_mul(100) / total).min(100) as u8;
            progress.update(percent, "Downloading");
        }
    }
    file.flush().await?;
    Ok(received)
}
