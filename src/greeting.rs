//! Small-talk detection.
//!
//! Greetings and pleasantries are answered with a canned reply before the
//! upload gate or retrieval are consulted.

/// Decides whether a message is small talk rather than a document question.
pub trait MessageClassifier: Send + Sync {
    fn is_general(&self, message: &str) -> bool;
}

const GENERAL_MESSAGES: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "how are you",
    "what's up",
    "greetings",
    "thanks",
    "thank you",
    "bye",
    "goodbye",
    "see you",
    "nice to meet you",
];

const SHORT_GREETINGS: &[&str] = &["hi", "hey", "hello"];

/// Exact-match classifier over a fixed vocabulary.
pub struct GreetingVocabulary {
    phrases: Vec<String>,
}

impl GreetingVocabulary {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.into().trim().to_lowercase())
                .collect(),
        }
    }
}

impl Default for GreetingVocabulary {
    fn default() -> Self {
        Self::new(GENERAL_MESSAGES.iter().copied())
    }
}

impl MessageClassifier for GreetingVocabulary {
    fn is_general(&self, message: &str) -> bool {
        let normalized = message.trim().to_lowercase();
        if self.phrases.iter().any(|p| *p == normalized) {
            return true;
        }
        normalized.chars().count() <= 5 && SHORT_GREETINGS.contains(&normalized.as_str())
    }
}

/// Reply to small talk before any PDF has been uploaded in the session.
pub const GREETING_BEFORE_UPLOAD: &str = "Hello! I'm your PDF assistant. Upload a PDF document and \
I can answer questions about its text, tables, and pages.";

/// Reply to small talk once the session has an uploaded PDF.
pub const GREETING_AFTER_UPLOAD: &str = "Hello! Your document is ready. Ask me anything about its \
content, tables, or specific pages.";

/// Reply to a document question before any upload.
pub const UPLOAD_FIRST: &str = "Please upload a PDF document first so I can answer questions \
about it.";
