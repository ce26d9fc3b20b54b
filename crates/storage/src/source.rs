//! Source providers: make an input locator available as a local file

use crate::{ObjectStore, Transfer};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;
use video_palette_common::{PaletteError, Result};
use video_palette_locator::{Locator, ObjectAddress, Scheme};

/// A local file holding the input content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub path: PathBuf,
    /// True when the file was fetched for this run and must be removed by the caller
    pub owned: bool,
}

/// Input capability selected for a locator
pub enum SourceProvider {
    /// Path on the local filesystem, used in place
    Local(PathBuf),
    /// Object downloaded into the run's working directory
    ObjectStore {
        address: ObjectAddress,
        store: Arc<dyn ObjectStore>,
        timeout: Duration,
    },
}

type SourceResolver = fn(&Locator, &Transfer) -> Option<SourceProvider>;

/// Source strategies in priority order; the first match wins
const SOURCE_RESOLVERS: [SourceResolver; 2] = [object_store_source, local_source];

fn object_store_source(locator: &Locator, transfer: &Transfer) -> Option<SourceProvider> {
    locator
        .object_address()
        .map(|address| SourceProvider::ObjectStore {
            address: address.clone(),
            store: Arc::clone(&transfer.store),
            timeout: transfer.timeout,
        })
}

fn local_source(locator: &Locator, _transfer: &Transfer) -> Option<SourceProvider> {
    locator.local_path().cloned().map(SourceProvider::Local)
}

impl SourceProvider {
    /// Select the provider for a resolved input locator
    pub fn for_locator(locator: &Locator, transfer: &Transfer) -> Result<Self> {
        SOURCE_RESOLVERS
            .iter()
            .find_map(|resolver| resolver(locator, transfer))
            .ok_or_else(|| PaletteError::UnsupportedSource(locator.to_string()))
    }

    #[must_use]
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Local(_) => Scheme::Local,
            Self::ObjectStore { .. } => Scheme::ObjectStore,
        }
    }

    /// Return a local path with the content available.
    ///
    /// Object-store content is downloaded under `work_dir` at a path derived
    /// from the key, nested segments included.
    pub async fn local_path(&self, work_dir: &Path) -> Result<FetchedSource> {
        match self {
            Self::Local(path) => Ok(FetchedSource {
                path: path.clone(),
                owned: false,
            }),
            Self::ObjectStore {
                address,
                store,
                timeout,
            } => {
                let target = work_dir.join(key_to_relative_path(&address.key));
                let label = address.to_string();
                info!("Downloading {} to {}", label, target.display());

                tokio::time::timeout(*timeout, download(store.as_ref(), address, &target))
                    .await
                    .map_err(|_| {
                        PaletteError::transfer(
                            &label,
                            format!("download timed out after {}s", timeout.as_secs()),
                        )
                    })??;

                Ok(FetchedSource {
                    path: target,
                    owned: true,
                })
            }
        }
    }
}

async fn download(store: &dyn ObjectStore, address: &ObjectAddress, target: &Path) -> Result<()> {
    let label = address.to_string();
    let mut body = store.get(&address.bucket, &address.key).await?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PaletteError::transfer(&label, e))?;
    }

    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| PaletteError::transfer(&label, e))?;
    while let Some(chunk) = body
        .try_next()
        .await
        .map_err(|e| PaletteError::transfer(&label, e))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| PaletteError::transfer(&label, e))?;
    }
    file.flush()
        .await
        .map_err(|e| PaletteError::transfer(&label, e))?;
    Ok(())
}

/// Relative path for an object key; `..` and root components are dropped
fn key_to_relative_path(key: &str) -> PathBuf {
    let path: PathBuf = Path::new(key)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if path.as_os_str().is_empty() {
        PathBuf::from("object")
    } else {
        path
    }
}
