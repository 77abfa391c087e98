//! Prompt assembly for grounded answers.
//!
//! A prompt is built from three parts: a context block of retrieved
//! passages, the tail of the session history, and the user's question.
//! When retrieval produced nothing, a reduced template tells the model to
//! say the document holds no relevant information.

use crate::config::RetrievalConfig;
use crate::models::{ConversationTurn, RetrievalResult};

#[derive(Debug, Clone)]
pub struct PromptComposer {
    context_chars: usize,
    history_turns: usize,
}

impl PromptComposer {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            context_chars: config.context_chars,
            history_turns: config.history_turns,
        }
    }

    /// The full prompt for `message`.
    pub fn compose(
        &self,
        message: &str,
        results: &[RetrievalResult],
        history: &[ConversationTurn],
    ) -> String {
        let context = self.context_block(results);
        let history = self.history_block(history);
        if context.trim().is_empty() {
            no_context_prompt(message, &history)
        } else {
            grounded_prompt(message, &context, &history)
        }
    }

    /// `[SOURCE - Page N]: <passage>...` per result, blank-line separated.
    pub fn context_block(&self, results: &[RetrievalResult]) -> String {
        results
            .iter()
            .map(|r| {
                format!(
                    "[{} - Page {}]: {}...",
                    r.metadata.source.as_str().to_uppercase(),
                    r.metadata.page,
                    truncate_chars(&r.content, self.context_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The last few turns, oldest first.
    pub fn history_block(&self, history: &[ConversationTurn]) -> String {
        let start = history.len().saturating_sub(self.history_turns);
        history[start..]
            .iter()
            .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn grounded_prompt(message: &str, context: &str, history: &str) -> String {
    format!(
        "You are a helpful AI assistant that answers questions about PDF documents.
Use only the provided context to answer the user's question accurately and concisely.

Context from PDF:
{context}

Chat History:
{history}

Current Question: {message}

Instructions:
- Answer only from the provided context, not from outside knowledge
- If the context doesn't contain enough information, say so explicitly
- Cite page numbers when possible
- For tables, format the data clearly
- For images, describe only what the available metadata tells you
- Use markdown formatting: **bold** for emphasis and * for bullet points
- Organize information clearly with proper structure

Answer:"
    )
}

fn no_context_prompt(message: &str, history: &str) -> String {
    format!(
        "You are a helpful AI assistant that answers questions about PDF documents.
No passage of the uploaded document matched the user's question.

Chat History:
{history}

Current Question: {message}

Instructions:
- Tell the user plainly that the document does not contain information relevant to this question
- Do not answer from outside knowledge

Answer:"
    )
}

/// The first `max` characters of `text`. Never splits a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// `text` cut to `max` characters with `...` appended, or unchanged when it
/// already fits.
pub fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", truncate_chars(text, max))
    } else {
        text.to_string()
    }
}
