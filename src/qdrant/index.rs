//! [`VectorIndex`] implementation over a single Qdrant collection.

use crate::model::{IndexEntry, IndexHit};
use crate::qdrant::client::QdrantService;
use crate::qdrant::payload::{
    build_point, current_timestamp_rfc3339, hit_from_point, match_filter,
};
use crate::qdrant::types::QdrantError;
use crate::store::{IndexReadError, IndexWriteError, VectorIndex};
use async_trait::async_trait;

const STORE: &str = "qdrant";

/// Chunk embeddings stored as Qdrant points keyed by chunk id.
///
/// Every point carries `owner_id` and `document_id` payload fields; queries filter on the owner
/// and purges delete by document.
pub struct QdrantVectorIndex {
    service: QdrantService,
    collection: String,
    dimension: usize,
}

impl QdrantVectorIndex {
    /// Wrap `service`, creating the collection and payload indexes when missing.
    pub async fn connect(
        service: QdrantService,
        collection: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, QdrantError> {
        let collection = collection.into();
        service
            .create_collection_if_not_exists(&collection, dimension as u64)
            .await?;
        service.ensure_payload_indexes(&collection).await?;
        tracing::info!(collection = %collection, dimension, "Qdrant vector index ready");
        Ok(Self {
            service,
            collection,
            dimension,
        })
    }

    /// Collection backing this index.
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexWriteError> {
        if entry.vector.len() != self.dimension {
            return Err(IndexWriteError::new(
                STORE,
                format!(
                    "vector has {} dimensions, collection expects {}",
                    entry.vector.len(),
                    self.dimension
                ),
            ));
        }
        let point = build_point(&entry, &current_timestamp_rfc3339());
        self.service
            .upsert_points(&self.collection, vec![point])
            .await
            .map_err(|error| IndexWriteError::new(STORE, error.to_string()))
    }

    async fn query(
        &self,
        owner_id: &str,
        vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexReadError> {
        let points = self
            .service
            .search_points(
                &self.collection,
                vector,
                Some(match_filter("owner_id", owner_id)),
                k,
                Some(threshold),
            )
            .await
            .map_err(|error| IndexReadError::new(STORE, error.to_string()))?;

        Ok(points
            .into_iter()
            .filter_map(hit_from_point)
            .filter(|hit| hit.score >= threshold)
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError> {
        self.service
            .delete_points_by_filter(&self.collection, match_filter("document_id", document_id))
            .await
            .map_err(|error| IndexWriteError::new(STORE, error.to_string()))
    }
}
