
use dashmap::DashMap;
use tracing::debug;

use crate::completions::ChatMessage;

/// Default transcript budget in estimated tokens
pub const DEFAULT_MAX_HISTORY_TOKENS: usize = 8000;

/// Per-session conversation transcripts, trimmed to a token budget.
///
/// Turns are stored oldest-first and always as user/assistant pairs; a user
/// turn never exists without its paired assistant turn once a cycle
/// completes. Each session's append and trim run under that session's map
/// entry lock, so the trimming loop is atomic with respect to its append.
#[derive(Debug)]
pub struct ConversationStore {
    histories: DashMap<String, Vec<ChatMessage>>,
    max_history_tokens: usize,
}

impl ConversationStore {
    #[inline]
    pub fn new(max_history_tokens: usize) -> Self {
        Self {
            histories: DashMap::new(),
            max_history_tokens,
        }
    }

    /// Append one user/assistant pair, creating the history if absent, then
    /// trim oldest pairs while the estimate exceeds the budget. The most
    /// recent pair is always retained, even when it alone exceeds budget,
    /// and trimming removes whole pairs only.
    #[inline]
    pub fn append_turn(&self, session_id: &str, user_message: &str, assistant_message: &str) {
        let mut history = self.histories.entry(session_id.to_string()).or_default();
        history.push(ChatMessage::user(user_message));
        history.push(ChatMessage::assistant(assistant_message));

        while history.len() > 2 && estimate_tokens(&history) > self.max_history_tokens {
            history.drain(..2);
        }

        debug!(
            "Session '{}' history now {} turns (~{} tokens)",
            session_id,
            history.len(),
            estimate_tokens(&history)
        );
    }

    /// The session's full transcript, oldest first; empty if none exists.
    /// Returned messages are used verbatim as prior-turn context.
    #[inline]
    pub fn get_context(&self, session_id: &str) -> Vec<ChatMessage> {
        self.histories
            .get(session_id)
            .map_or_else(Vec::new, |history| history.value().clone())
    }

    /// Remove the session's transcript. Returns whether anything was
    /// cleared; an absent session is an expected state, not an error.
    #[inline]
    pub fn clear(&self, session_id: &str) -> bool {
        self.histories.remove(session_id).is_some()
    }
}

/// Token estimate for a transcript: total content length divided by four.
/// A deliberate character-count heuristic, not real tokenization; trimming
/// behavior is specified against this baseline.
fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|message| message.content.len())
        .sum::<usize>()
        / 4
}
