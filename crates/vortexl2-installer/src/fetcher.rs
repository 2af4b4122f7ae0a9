// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Release archive download and extraction

use crate::error::{InstallerError, Result};
use crate::release::ResolvedRelease;
use flate2::read::GzDecoder;
use futures_util::TryStreamExt;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Replace `install_root` with the contents of the release archive.
///
/// The previous tree is only removed once the server has answered with the
/// archive. The archive is streamed straight into the extractor; nothing is
/// staged on disk. The single top-level directory GitHub adds to archives is dropped.
pub async fn fetch(
    client: &reqwest::Client,
    release: &ResolvedRelease,
    install_root: &Path,
) -> Result<PathBuf> {
    tracing::info!("Downloading {}", release.download_url);
    let response = client
        .get(&release.download_url)
        .send()
        .await
        .map_err(|e| InstallerError::Download(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(InstallerError::Download(format!(
            "{} returned {}",
            release.download_url,
            response.status()
        )));
    }

    wipe(install_root)?;
    let stream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
    let reader = SyncIoBridge::new(StreamReader::new(stream));
    let root = install_root.to_path_buf();

    let extracted =
        tokio::task::spawn_blocking(move || unpack_stripped(GzDecoder::new(reader), &root))
            .await
            .map_err(|e| InstallerError::Download(format!("Extraction task failed: {e}")))??;

    if extracted == 0 {
        return Err(InstallerError::Download(format!(
            "{} contained no files",
            release.download_url
        )));
    }

    tracing::info!(
        "Extracted {extracted} entries into {}",
        install_root.display()
    );
    Ok(install_root.to_path_buf())
}

fn wipe(install_root: &Path) -> Result<()> {
    if install_root.exists() {
        tracing::debug!("Removing previous installation at {}", install_root.display());
        fs::remove_dir_all(install_root)?;
    }
    fs::create_dir_all(install_root)?;
    Ok(())
}

fn corrupt(e: &std::io::Error) -> InstallerError {
    InstallerError::Download(format!("Failed to extract archive: {e}"))
}

/// Unpack a tar stream into `dest`, dropping the first path component.
fn unpack_stripped<R: Read>(reader: R, dest: &Path) -> Result<usize> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);

    let mut count = 0;
    for entry in archive.entries().map_err(|e| corrupt(&e))? {
        let mut entry = entry.map_err(|e| corrupt(&e))?;

        if matches!(
            entry.header().entry_type(),
            EntryType::XGlobalHeader | EntryType::XHeader
        ) {
            continue;
        }

        let path = entry.path().map_err(|e| corrupt(&e))?.into_owned();
        let Some(relative) = strip_top_level(&path) else {
            continue;
        };

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target).map_err(|e| corrupt(&e))?;
        count += 1;
    }

    Ok(count)
}

/// Path below the archive's top-level directory.
///
/// Returns `None` for the top-level directory itself and for any path that
/// would escape the destination.
fn strip_top_level(path: &Path) -> Option<PathBuf> {
    let mut components = path
        .components()
        .skip_while(|c| matches!(c, Component::CurDir));

    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => return None,
    }

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}
