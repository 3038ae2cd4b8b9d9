//! Qdrant vector store backend implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::{Qdrant, QdrantError};
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, ListValue, PointStruct, Struct, UpsertPointsBuilder,
    Value as QValue, VectorParamsBuilder, value::Kind,
};
use tracing::{debug, info};

use super::{CollectionInfo, VectorStore};
use crate::error::VectorStoreError;
use crate::models::{Batch, Point, VectorStoreConfig};

/// Qdrant vector store backend.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    timeout: Duration,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url)
            .timeout(config.timeout())
            .skip_compatibility_check();

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(store_error)
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(store_error)?;
        if !exists {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(collection_error)?;

        Ok(Some(CollectionInfo {
            points_count: info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
        }))
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(store_error)?;
        if exists {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(collection_error)?;

        info!(collection = %self.collection, dimension, "created collection");
        Ok(())
    }

    async fn upsert_batch(&self, batch: &Batch) -> Result<(), VectorStoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = batch.points.iter().map(to_point_struct).collect();
        let upsert = UpsertPointsBuilder::new(&self.collection, points).wait(true);

        match tokio::time::timeout(self.timeout, self.client.upsert_points(upsert)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(store_error(e)),
            Err(_) => Err(VectorStoreError::Timeout(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

/// Classify a client error by its gRPC status when the server sent one.
fn store_error(err: QdrantError) -> VectorStoreError {
    match err {
        QdrantError::ResponseError { status } => {
            VectorStoreError::from_status(status.code(), status.message())
        }
        QdrantError::ResourceExhaustedError {
            status,
            retry_after_seconds,
        } => VectorStoreError::from_status(
            status.code(),
            format!(
                "{} (retry after {retry_after_seconds}s)",
                status.message()
            ),
        ),
        other => VectorStoreError::from_transport(other.to_string()),
    }
}

/// Like [`store_error`], but a plain rejection is reported against the collection.
fn collection_error(err: QdrantError) -> VectorStoreError {
    match store_error(err) {
        VectorStoreError::Rejected(message) => VectorStoreError::Collection(message),
        other => other,
    }
}

fn to_point_struct(point: &Point) -> PointStruct {
    let payload: HashMap<String, QValue> = point
        .payload
        .iter()
        .map(|(k, v)| (k.clone(), json_to_qvalue(v)))
        .collect();

    PointStruct::new(point.id.clone(), point.vector.clone(), payload)
}

fn json_to_qvalue(value: &serde_json::Value) -> QValue {
    use serde_json::Value;

    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_qvalue).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_qvalue(v)))
                .collect(),
        }),
    };

    QValue { kind: Some(kind) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn test_backend_creation() {
        let config = VectorStoreConfig {
            api_key: Some("qd-test".to_string()),
            ..Default::default()
        };
        let backend = QdrantBackend::new(&config).unwrap();
        assert_eq!(backend.collection(), "costbook_data");
        assert_eq!(backend.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_store_error_uses_status_code() {
        let rejected = store_error(QdrantError::ResponseError {
            status: tonic::Status::invalid_argument(
                "Wrong input: Vector dimension error: expected dim: 1536, got 1401",
            ),
        });
        assert!(matches!(rejected, VectorStoreError::Rejected(_)));

        let unavailable = store_error(QdrantError::ResponseError {
            status: tonic::Status::unavailable("node 403 is restarting"),
        });
        assert!(matches!(unavailable, VectorStoreError::TransientServer(_)));

        let denied = store_error(QdrantError::ResponseError {
            status: tonic::Status::permission_denied("read-only key"),
        });
        assert!(matches!(denied, VectorStoreError::Auth(_)));
    }

    #[test]
    fn test_collection_error_marks_rejections() {
        let err = collection_error(QdrantError::ResponseError {
            status: tonic::Status::already_exists("collection costbook_data exists"),
        });
        assert!(matches!(err, VectorStoreError::Collection(_)));

        let err = collection_error(QdrantError::ResponseError {
            status: tonic::Status::deadline_exceeded("slow"),
        });
        assert!(matches!(err, VectorStoreError::Timeout(_)));
    }

    #[test]
    fn test_json_to_qvalue_kinds() {
        assert_eq!(json_to_qvalue(&json!(7)).kind, Some(Kind::IntegerValue(7)));
        assert_eq!(json_to_qvalue(&json!(2.5)).kind, Some(Kind::DoubleValue(2.5)));
        assert_eq!(
            json_to_qvalue(&json!("C.Y.")).kind,
            Some(Kind::StringValue("C.Y.".to_string()))
        );
        assert_eq!(json_to_qvalue(&json!(null)).kind, Some(Kind::NullValue(0)));

        let Some(Kind::StructValue(nested)) = json_to_qvalue(&json!({"a": [1, true]})).kind else {
            panic!("expected struct");
        };
        let Some(Kind::ListValue(list)) = &nested.fields["a"].kind else {
            panic!("expected list");
        };
        assert_eq!(list.values.len(), 2);
    }

    #[test]
    fn test_point_struct_keeps_payload() {
        let mut payload = Map::new();
        payload.insert("code".to_string(), json!("A1"));
        payload.insert("unit_cost".to_string(), json!(4.1));
        let point = Point::new(
            "0b7b3c5e-5f8e-5a6a-9a8e-0c4b1b2d3e4f".to_string(),
            vec![0.5; 4],
            payload,
        );

        let converted = to_point_struct(&point);
        assert_eq!(converted.payload.len(), 2);
        assert_eq!(
            converted.payload["unit_cost"].kind,
            Some(Kind::DoubleValue(4.1))
        );
    }
}
