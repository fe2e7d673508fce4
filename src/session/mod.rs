
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::info;

use crate::index::VectorIndex;

/// Index-side view of one session, exposed to the surrounding service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub has_index: bool,
    pub filename: Option<String>,
    pub chunks: usize,
}

/// Holds each session's vector index.
///
/// Owned by the engine with an explicit lifecycle (created at server start,
/// dropped at shutdown) rather than living in process-wide statics. Sessions
/// are independent map shards; re-ingestion replaces a session's index
/// wholesale, last writer wins.
#[derive(Debug, Default)]
pub struct SessionStore {
    indexes: DashMap<String, Arc<VectorIndex>>,
}

impl SessionStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly built index for the session, replacing any prior
    /// index in one swap. The index is fully built before this call, so a
    /// failed ingestion never leaves a partial index behind.
    #[inline]
    pub fn replace_index(&self, session_id: &str, index: VectorIndex) {
        info!(
            "Installing index for session '{}': '{}' ({} chunks)",
            session_id,
            index.source_filename(),
            index.len()
        );
        self.indexes
            .insert(session_id.to_string(), Arc::new(index));
    }

    #[inline]
    pub fn index(&self, session_id: &str) -> Option<Arc<VectorIndex>> {
        self.indexes
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the session's index. Returns whether anything was cleared.
    #[inline]
    pub fn clear_index(&self, session_id: &str) -> bool {
        self.indexes.remove(session_id).is_some()
    }

    #[inline]
    pub fn status(&self, session_id: &str) -> SessionStatus {
        self.index(session_id).map_or(
            SessionStatus {
                has_index: false,
                filename: None,
                chunks: 0,
            },
            |index| SessionStatus {
                has_index: true,
                filename: Some(index.source_filename().to_string()),
                chunks: index.len(),
            },
        )
    }
}
