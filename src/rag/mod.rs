
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunking::{ChunkingConfig, split_text};
use crate::completions::{ChatClient, ChatMessage, FragmentStream};
use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::history::ConversationStore;
use crate::index::VectorIndex;
use crate::session::{SessionStatus, SessionStore};
use crate::{RagError, Result};

/// Composes the chunker, embedder, vector index, and conversation store.
///
/// Ingestion runs the one-shot pipeline split → embed → build and swaps the
/// finished index into the session. Answering embeds the query, retrieves
/// top-k context, and streams the completion; the conversation turn is
/// committed only after the caller has consumed the whole stream.
#[derive(Debug)]
pub struct RagEngine {
    config: Config,
    http: reqwest::Client,
    sessions: SessionStore,
    history: Arc<ConversationStore>,
}

/// One document ingestion request
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub session_id: String,
    pub filename: String,
    pub raw_text: String,
    pub chunking: ChunkingConfig,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub session_id: String,
    pub filename: String,
    pub chunks_created: usize,
}

/// One chat request against a session
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub session_id: String,
    pub developer_message: String,
    pub user_message: String,
    pub model: String,
    pub api_key: String,
    pub num_chunks: usize,
}

/// A completion in flight: the fragment stream plus the deferred history
/// commit. Consume the stream fully, then call [`TurnCommit::commit`] with
/// the accumulated response. Dropping the commit handle (client disconnect,
/// mid-stream failure) leaves history untouched.
pub struct PendingAnswer {
    pub fragments: FragmentStream,
    pub commit: TurnCommit,
}

/// Deferred side of the two-phase answer protocol
pub struct TurnCommit {
    history: Arc<ConversationStore>,
    session_id: String,
    user_message: String,
}

impl TurnCommit {
    /// Record the completed exchange. Blank responses are not committed, so
    /// a stream that produced nothing cannot leave a hollow assistant turn.
    #[inline]
    pub fn commit(self, assistant_response: &str) {
        if assistant_response.trim().is_empty() {
            warn!(
                "Session '{}': empty assistant response, not committing turn",
                self.session_id
            );
            return;
        }
        self.history
            .append_turn(&self.session_id, &self.user_message, assistant_response);
    }
}

impl RagEngine {
    #[inline]
    pub fn new(config: Config) -> Self {
        let max_history_tokens = config.history.max_history_tokens;
        Self {
            config,
            http: reqwest::Client::new(),
            sessions: SessionStore::new(),
            history: Arc::new(ConversationStore::new(max_history_tokens)),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the ingestion pipeline and install the session's index.
    ///
    /// The index is built fully in isolation and swapped in at the end;
    /// any failure leaves the session exactly as it was.
    #[inline]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let chunks = split_text(&request.raw_text, &request.chunking)?;
        if chunks.is_empty() {
            return Err(RagError::EmptyInput(format!(
                "document '{}' produced no chunks",
                request.filename
            )));
        }

        info!(
            "Ingesting '{}' for session '{}': {} chunks",
            request.filename,
            request.session_id,
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embedder =
            EmbeddingClient::new(&self.config.provider, self.http.clone(), &request.api_key);
        let vectors = embedder.embed_batch(&texts).await?;

        let index = VectorIndex::build(&request.filename, chunks.into_iter().zip(vectors));
        let chunks_created = index.len();
        self.sessions.replace_index(&request.session_id, index);

        Ok(IngestOutcome {
            session_id: request.session_id,
            filename: request.filename,
            chunks_created,
        })
    }

    /// Start answering a chat request.
    ///
    /// The message list is `[developer] + history + [final user message]`;
    /// when the session has an index, the final message embeds the top-k
    /// retrieved chunks, otherwise the question passes through untouched.
    #[inline]
    pub async fn answer(&self, request: AnswerRequest) -> Result<PendingAnswer> {
        let mut messages = vec![ChatMessage::developer(&request.developer_message)];
        messages.extend(self.history.get_context(&request.session_id));

        let final_user_message = match self.sessions.index(&request.session_id) {
            Some(index) => {
                let embedder = EmbeddingClient::new(
                    &self.config.provider,
                    self.http.clone(),
                    &request.api_key,
                );
                let context = index
                    .search_text_as_text(&embedder, &request.user_message, request.num_chunks)
                    .await?;
                debug!(
                    "Session '{}': retrieved {} chunks from '{}'",
                    request.session_id,
                    context.len(),
                    index.source_filename()
                );
                render_context_prompt(index.source_filename(), &context, &request.user_message)
            }
            None => request.user_message.clone(),
        };
        messages.push(ChatMessage::user(final_user_message));

        let chat = ChatClient::new(&self.config.provider, self.http.clone(), &request.api_key);
        let fragments = chat.stream_complete(&request.model, &messages).await?;

        Ok(PendingAnswer {
            fragments,
            commit: TurnCommit {
                history: Arc::clone(&self.history),
                session_id: request.session_id,
                user_message: request.user_message,
            },
        })
    }

    #[inline]
    pub fn status(&self, session_id: &str) -> SessionStatus {
        self.sessions.status(session_id)
    }

    /// Drop the session's index. Returns whether there was one to drop.
    #[inline]
    pub fn clear_index(&self, session_id: &str) -> bool {
        self.sessions.clear_index(session_id)
    }

    /// Drop the session's conversation history. Returns whether there was
    /// any to drop.
    #[inline]
    pub fn clear_history(&self, session_id: &str) -> bool {
        self.history.clear(session_id)
    }

    #[inline]
    pub fn history(&self) -> &ConversationStore {
        &self.history
    }
}

/// Final user message for an indexed session: retrieved chunks joined by
/// blank lines, then the original question.
fn render_context_prompt(filename: &str, context_chunks: &[String], question: &str) -> String {
    let context = context_chunks.join("\n\n");
    format!(
        "Context from document '{filename}':\n{context}\n\n\
         User Question: {question}\n\n\
         Please answer the user's question based on the provided context from \
         the document. If the context doesn't contain relevant information, \
         let the user know."
    )
}
