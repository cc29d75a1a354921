pub mod local;
pub mod provider;

pub use local::*;
pub use provider::*;

use std::sync::Arc;

use crate::config::StorageConfig;

/// Build the blob store described by the storage configuration
pub fn from_config(config: &StorageConfig) -> Arc<dyn BlobStore> {
    let store = LocalBlobStore::new(config);
    tracing::info!(
        "Using {} blob storage at {:?}",
        store.storage_type(),
        store.base_path()
    );
    Arc::new(store)
}
