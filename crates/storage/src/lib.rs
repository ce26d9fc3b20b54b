//! Storage adapters for palette extraction runs
//!
//! - **Object store**: get/put capability over S3 (or an in-memory stand-in)
//! - **Sources**: make an input locator available as a local file
//! - **Destinations**: deliver the result table to S3, a local path, or nowhere
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use video_palette_locator::resolve;
//! use video_palette_storage::{Destination, S3Config, S3ObjectStore, Transfer};
//!
//! # async fn run() -> video_palette_common::Result<()> {
//! let store = Arc::new(S3ObjectStore::new(S3Config::default()));
//! let transfer = Transfer::new(store, Duration::from_secs(300));
//! let output = resolve("https://results.s3.ap-southeast-1.amazonaws.com/palette.csv")?;
//! let destination = Destination::for_locator(&output, &transfer)?;
//! destination.upload_file(std::path::Path::new("/tmp/palette.csv")).await?;
//! # Ok(())
//! # }
//! ```

pub mod destination;
pub mod object_store;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

pub use aws_sdk_s3::primitives::ByteStream;
pub use destination::Destination;
pub use object_store::{MemoryObjectStore, ObjectStore, S3Config, S3ObjectStore, DEFAULT_REGION};
pub use source::{FetchedSource, SourceProvider};

/// Transfer context shared by sources and destinations of one run
#[derive(Clone)]
pub struct Transfer {
    pub store: Arc<dyn ObjectStore>,
    /// Bound on a single fetch or upload
    pub timeout: Duration,
}

impl Transfer {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
