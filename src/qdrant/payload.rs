//! Helpers for constructing and decoding Qdrant payloads.

use crate::embedding::normalize_similarity;
use crate::model::{ChunkMetadata, IndexEntry, IndexHit};
use crate::qdrant::types::ScoredPoint;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

/// Build the point body stored for one chunk.
pub(crate) fn build_point(entry: &IndexEntry, indexed_at: &str) -> Value {
    json!({
        "id": entry.chunk_id,
        "vector": entry.vector,
        "payload": build_payload(entry, indexed_at),
    })
}

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(entry: &IndexEntry, indexed_at: &str) -> Value {
    let metadata = &entry.metadata;
    let mut payload = Map::new();
    payload.insert("chunk_id".into(), Value::String(entry.chunk_id.clone()));
    payload.insert(
        "document_id".into(),
        Value::String(metadata.document_id.clone()),
    );
    payload.insert("owner_id".into(), Value::String(metadata.owner_id.clone()));
    payload.insert("ordinal".into(), Value::from(metadata.ordinal));
    payload.insert(
        "display_name".into(),
        Value::String(metadata.display_name.clone()),
    );
    payload.insert("mime_type".into(), Value::String(metadata.mime_type.clone()));
    payload.insert("indexed_at".into(), Value::String(indexed_at.to_string()));
    payload.insert("text".into(), Value::String(entry.text.clone()));

    if !metadata.extra.is_empty() {
        payload.insert("extra".into(), Value::Object(metadata.extra.clone()));
    }

    Value::Object(payload)
}

/// Turn a scored point back into an [`IndexHit`], dropping points whose payload is unusable.
pub(crate) fn hit_from_point(point: ScoredPoint) -> Option<IndexHit> {
    let payload = point.payload?;
    let text = payload.get("text")?.as_str()?.to_string();
    let metadata: ChunkMetadata = match serde_json::from_value(Value::Object(payload)) {
        Ok(metadata) => metadata,
        Err(error) => {
            tracing::warn!(point = %point.id, error = %error, "Skipping point with malformed payload");
            return None;
        }
    };
    Some(IndexHit {
        chunk_id: point.id,
        score: normalize_similarity(point.score),
        text,
        metadata,
    })
}

/// Exact-match filter on a keyword payload field.
pub(crate) fn match_filter(field: &str, value: &str) -> Value {
    json!({
        "must": [
            {
                "key": field,
                "match": { "value": value }
            }
        ]
    })
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
