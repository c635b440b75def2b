//! LlmClient trait and its type-erased wrapper.
//!
//! Implementations (Anthropic, OpenAI) live in rote-infra. The wrapper
//! follows the usual blanket-impl pattern:
//! 1. an object-safe `LlmClientDyn` trait with boxed futures
//! 2. a blanket impl of `LlmClientDyn` for every `T: LlmClient`
//! 3. `BoxLlmClient` holding `Box<dyn LlmClientDyn>` and delegating

use std::future::Future;
use std::pin::Pin;

use rote_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// A single-turn completion backend.
pub trait LlmClient: Send + Sync {
    /// Provider name, e.g. "anthropic".
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send;
}

/// Object-safe version of [`LlmClient`].
pub trait LlmClientDyn: Send + Sync {
    fn name(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;
}

impl<T: LlmClient> LlmClientDyn for T {
    fn name(&self) -> &str {
        LlmClient::name(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

/// Type-erased client for runtime provider selection.
pub struct BoxLlmClient {
    inner: Box<dyn LlmClientDyn + Send + Sync>,
}

impl BoxLlmClient {
    pub fn new<T: LlmClient + 'static>(client: T) -> Self {
        Self {
            inner: Box::new(client),
        }
    }
}

impl LlmClient for BoxLlmClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_boxed(request).await
    }
}

impl std::fmt::Debug for BoxLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLlmClient")
            .field("provider", &self.inner.name())
            .finish()
    }
}
