//! Destinations: where the finished result table is delivered

use crate::{ObjectStore, Transfer};
use aws_sdk_s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;
use video_palette_common::{PaletteError, Result};
use video_palette_locator::{Locator, ObjectAddress, Scheme};

/// Output capability selected for a locator
pub enum Destination {
    /// Upload to an object-store key
    ObjectStore {
        address: ObjectAddress,
        store: Arc<dyn ObjectStore>,
        timeout: Duration,
    },
    /// Write to a local file
    Local(PathBuf),
    /// Accept and drop the content
    Discard,
}

type DestinationResolver = fn(&Locator, &Transfer) -> Option<Destination>;

/// Destination strategies in priority order; the first match wins
const DESTINATION_RESOLVERS: [DestinationResolver; 3] =
    [object_store_destination, discard_destination, local_destination];

fn object_store_destination(locator: &Locator, transfer: &Transfer) -> Option<Destination> {
    locator
        .object_address()
        .map(|address| Destination::ObjectStore {
            address: address.clone(),
            store: Arc::clone(&transfer.store),
            timeout: transfer.timeout,
        })
}

fn discard_destination(locator: &Locator, _transfer: &Transfer) -> Option<Destination> {
    matches!(locator, Locator::Discard).then_some(Destination::Discard)
}

fn local_destination(locator: &Locator, _transfer: &Transfer) -> Option<Destination> {
    locator.local_path().cloned().map(Destination::Local)
}

impl Destination {
    /// Select the destination for a resolved output locator
    pub fn for_locator(locator: &Locator, transfer: &Transfer) -> Result<Self> {
        DESTINATION_RESOLVERS
            .iter()
            .find_map(|resolver| resolver(locator, transfer))
            .ok_or_else(|| PaletteError::UnsupportedDestination(locator.to_string()))
    }

    #[must_use]
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::ObjectStore { .. } => Scheme::ObjectStore,
            Self::Local(_) => Scheme::Local,
            Self::Discard => Scheme::Discard,
        }
    }

    /// Stream `body` to the target. Discard succeeds without reading it.
    pub async fn upload(&self, body: ByteStream) -> Result<()> {
        match self {
            Self::ObjectStore {
                address,
                store,
                timeout,
            } => {
                info!("Uploading results to {}", address);
                tokio::time::timeout(*timeout, store.put(&address.bucket, &address.key, body))
                    .await
                    .map_err(|_| {
                        PaletteError::transfer(
                            address.to_string(),
                            format!("upload timed out after {}s", timeout.as_secs()),
                        )
                    })?
            }
            Self::Local(path) => {
                info!("Writing results to {}", path.display());
                write_local(path, body).await
            }
            Self::Discard => Ok(()),
        }
    }

    /// Upload the content of a local file
    pub async fn upload_file(&self, path: &Path) -> Result<()> {
        if matches!(self, Self::Discard) {
            return Ok(());
        }
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| PaletteError::transfer(path.display().to_string(), e))?;
        self.upload(body).await
    }
}

async fn write_local(path: &Path, mut body: ByteStream) -> Result<()> {
    let label = path.display().to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PaletteError::transfer(&label, e))?;
    }
    let mut file = tokio::fs::File::create(path)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryObjectStore;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use video_palette_locator::resolve;

    fn transfer_with(store: Arc<MemoryObjectStore>) -> Transfer {
        Transfer::new(store, Duration::from_secs(5))
    }

    /// Store that accepts uploads but never answers in time
    struct StalledStore;

    #[async_trait]
    impl ObjectStore for StalledStore {
        async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
            Err(PaletteError::transfer(format!("{bucket}/{key}"), "not stored"))
        }

        async fn put(&self, _bucket: &str, _key: &str, _body: ByteStream) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_uri_is_discard() {
        let transfer = transfer_with(Arc::new(MemoryObjectStore::new()));
        let destination = Destination::for_locator(&resolve("").unwrap(), &transfer).unwrap();
        assert_eq!(destination.scheme(), Scheme::Discard);
        assert!(destination.upload(ByteStream::from(vec![1, 2, 3])).await.is_ok());
        assert!(destination
            .upload_file(Path::new("/does/not/exist.csv"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_object_store_destination_puts_key() {
        let store = Arc::new(MemoryObjectStore::new());
        let transfer = transfer_with(Arc::clone(&store));
        let locator =
            resolve("https://out.s3.us-east-1.amazonaws.com/results/run%201.csv").unwrap();
        let destination = Destination::for_locator(&locator, &transfer).unwrap();
        destination
            .upload(ByteStream::from(b"a,b\n".to_vec()))
            .await
            .unwrap();
        assert_eq!(store.object("out", "results/run 1.csv").unwrap(), b"a,b\n");
    }

    #[tokio::test]
    async fn test_local_destination_writes_file() {
        let transfer = transfer_with(Arc::new(MemoryObjectStore::new()));
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/out.csv");
        let locator = resolve(target.to_str().unwrap()).unwrap();
        let destination = Destination::for_locator(&locator, &transfer).unwrap();
        destination
            .upload(ByteStream::from(b"header\n".to_vec()))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"header\n");
    }

    #[test]
    fn test_unresolved_destination_is_unsupported() {
        let transfer = transfer_with(Arc::new(MemoryObjectStore::new()));
        let locator = resolve("ftp://host/out.csv").unwrap();
        assert!(matches!(
            Destination::for_locator(&locator, &transfer),
            Err(PaletteError::UnsupportedDestination(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_upload_times_out() {
        let transfer = Transfer::new(Arc::new(StalledStore), Duration::from_secs(1));
        let locator = resolve("https://out.s3.amazonaws.com/results/run.csv").unwrap();
        let destination = Destination::for_locator(&locator, &transfer).unwrap();

        match destination.upload(ByteStream::from(b"a,b\n".to_vec())).await {
            Err(PaletteError::TransferError { target, reason }) => {
                assert!(target.contains("results/run.csv"), "{target}");
                assert!(reason.contains("timed out"), "{reason}");
            }
            other => panic!("expected TransferError, got {other:?}"),
        }
    }
}
