//! Vector retriever port

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One retrieved document chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    /// Document the chunk came from
    pub document_id: String,
    /// Chunk text
    pub content: String,
    /// Similarity score, higher is better
    pub score: f32,
}

/// Scope restriction for a retrieval query
///
/// The adapter must restrict results to documents the user owns; the
/// optional id list narrows the scope further. This check happens at
/// query time, on top of whatever filtering preparation already did.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    /// Requesting user; ownership boundary
    pub user_id: String,
    /// Explicit document scope, `None` for all owned documents
    pub document_ids: Option<Vec<String>>,
}

/// Vector search port
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return the chunks most similar to `text` within `filter`'s scope
    async fn query(&self, text: &str, filter: &RetrievalFilter) -> Result<Vec<RetrievedChunk>>;
}
