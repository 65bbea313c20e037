//! Colmap LLM Provider Layer
//!
//! Pluggable LLM provider implementations behind the `LlmProvider` trait
//! from `colmap-domain`.
//!
//! # Providers
//!
//! - `MockProvider`: Scripted responses for tests and local development
//! - `OllamaProvider`: Local Ollama API integration
//!
//! # Examples
//!
//! ```
//! use colmap_llm::MockProvider;
//! use colmap_domain::{InferenceConfig, LlmProvider};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let provider = MockProvider::new("Hello from LLM!");
//! let result = provider.infer("test prompt", &InferenceConfig::default()).await.unwrap();
//! assert_eq!(result, "Hello from LLM!");
//! # }
//! ```

#![warn(missing_docs)]

pub mod ollama;

use async_trait::async_trait;
use colmap_domain::{InferenceConfig, LlmProvider};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaProvider;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

/// Approximate token count for `text` (one token per four characters, rounded up)
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Error(String),
}

#[derive(Debug, Default)]
struct MockState {
    queue: VecDeque<MockReply>,
    by_fragment: Vec<(String, MockReply)>,
    prompts: Vec<String>,
    call_count: usize,
}

/// Mock LLM provider for deterministic testing
///
/// Resolution order for each call:
/// 1. The next queued reply, if any (see [`MockProvider::push_response`])
/// 2. The first registered fragment contained in the prompt
/// 3. The default response
///
/// Clones share state, so a clone handed to the pipeline can be inspected
/// afterwards.
///
/// # Examples
///
/// ```
/// use colmap_llm::MockProvider;
/// use colmap_domain::{InferenceConfig, LlmProvider};
///
/// # #[tokio::main]
/// # async fn main() {
/// let provider = MockProvider::default()
///     .with_response("discover", "{}")
///     .with_queued("first");
/// let config = InferenceConfig::default();
///
/// assert_eq!(provider.infer("please discover", &config).await.unwrap(), "first");
/// assert_eq!(provider.infer("please discover", &config).await.unwrap(), "{}");
/// assert_eq!(provider.call_count(), 2);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            delay: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Respond with `response` whenever the prompt contains `fragment`
    pub fn add_response(&self, fragment: impl Into<String>, response: impl Into<String>) {
        self.state()
            .by_fragment
            .push((fragment.into(), MockReply::Text(response.into())));
    }

    /// Fail whenever the prompt contains `fragment`
    pub fn add_error(&self, fragment: impl Into<String>, message: impl Into<String>) {
        self.state()
            .by_fragment
            .push((fragment.into(), MockReply::Error(message.into())));
    }

    /// Queue a one-shot response, consumed in FIFO order
    pub fn push_response(&self, response: impl Into<String>) {
        self.state().queue.push_back(MockReply::Text(response.into()));
    }

    /// Queue a one-shot failure
    pub fn push_error(&self, message: impl Into<String>) {
        self.state().queue.push_back(MockReply::Error(message.into()));
    }

    /// Builder form of [`MockProvider::add_response`]
    pub fn with_response(self, fragment: impl Into<String>, response: impl Into<String>) -> Self {
        self.add_response(fragment, response);
        self
    }

    /// Builder form of [`MockProvider::push_response`]
    pub fn with_queued(self, response: impl Into<String>) -> Self {
        self.push_response(response);
        self
    }

    /// Sleep for `delay` before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times infer was called
    pub fn call_count(&self) -> usize {
        self.state().call_count
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }

    /// Reset the call count and recorded prompts
    pub fn reset_call_count(&self) {
        let mut state = self.state();
        state.call_count = 0;
        state.prompts.clear();
    }

    fn resolve(&self, prompt: &str) -> MockReply {
        let mut state = self.state();
        state.call_count += 1;
        state.prompts.push(prompt.to_string());

        if let Some(reply) = state.queue.pop_front() {
            return reply;
        }

        state
            .by_fragment
            .iter()
            .find(|(fragment, _)| prompt.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| MockReply::Text(self.default_response.clone()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    type Error = LlmError;

    async fn infer(&self, prompt: &str, _config: &InferenceConfig) -> Result<String, Self::Error> {
        let reply = self.resolve(prompt);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Error(message) => Err(LlmError::Other(message)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
