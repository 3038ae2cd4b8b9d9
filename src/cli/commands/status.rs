use std::path::Path;

use anyhow::{Result, bail};
use tracing::warn;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, ConfigOverrides, OutputFormat};
use crate::services::{CollectionInfo, QdrantBackend, VectorStore};

/// What the vector store reported about itself and the collection.
#[derive(Debug, Default)]
struct StoreStatus {
    connected: bool,
    collection: Option<CollectionInfo>,
    error: Option<String>,
}

pub async fn handle_status(
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
    format: OutputFormat,
) -> Result<()> {
    let mut config = Config::load(config_path)?;
    config.apply(overrides);
    let formatter = get_formatter(format);

    let store_status = match QdrantBackend::new(&config.vector_store) {
        Ok(store) => inspect_store(&store).await,
        Err(e) => {
            warn!(error = %e, "failed to create vector store client");
            StoreStatus {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    };

    let status = StatusInfo {
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected: store_status.connected,
        collection: config.vector_store.collection.clone(),
        collection_exists: store_status.collection.is_some(),
        collection_error: store_status.error.clone(),
        points: store_status.collection.map_or(0, |info| info.points_count),
        embedding_model: config.embedding.model.clone(),
        embedding_dimension: config.embedding.dimension,
    };

    print!("{}", formatter.format_status(&status));

    if !store_status.connected {
        eprintln!();
        eprintln!(
            "Warning: Qdrant not reachable at {}. Check QDRANT_URL and QDRANT_API_KEY.",
            config.vector_store.url
        );
        bail!("vector store unavailable");
    }

    Ok(())
}

async fn inspect_store<S: VectorStore + ?Sized>(store: &S) -> StoreStatus {
    let connected = match store.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!(error = %e, "vector store health check failed");
            return StoreStatus {
                error: Some(e.to_string()),
                ..Default::default()
            };
        }
    };
    if !connected {
        return StoreStatus::default();
    }

    match store.get_collection_info().await {
        Ok(collection) => StoreStatus {
            connected,
            collection,
            error: None,
        },
        Err(e) => {
            warn!(collection = store.collection(), error = %e, "failed to read collection info");
            StoreStatus {
                connected,
                collection: None,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VectorStoreError;
    use crate::models::Batch;
    use async_trait::async_trait;

    struct FixedStore {
        info: fn() -> Result<Option<CollectionInfo>, VectorStoreError>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn health_check(&self) -> Result<bool, VectorStoreError> {
            Ok(true)
        }

        async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
            (self.info)()
        }

        async fn ensure_collection(&self, _dimension: usize) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn upsert_batch(&self, _batch: &Batch) -> Result<(), VectorStoreError> {
            Ok(())
        }

        fn collection(&self) -> &str {
            "costbook_data"
        }
    }

    #[tokio::test]
    async fn test_collection_error_is_reported() {
        let store = FixedStore {
            info: || Err(VectorStoreError::Auth("read-only key".to_string())),
        };
        let status = inspect_store(&store).await;

        assert!(status.connected);
        assert!(status.collection.is_none());
        assert!(status.error.unwrap().contains("read-only key"));
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_an_error() {
        let store = FixedStore { info: || Ok(None) };
        let status = inspect_store(&store).await;

        assert!(status.connected);
        assert!(status.collection.is_none());
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_points_counted() {
        let store = FixedStore {
            info: || Ok(Some(CollectionInfo { points_count: 11_000 })),
        };
        let status = inspect_store(&store).await;
        assert_eq!(status.collection.map(|c| c.points_count), Some(11_000));
    }
}
