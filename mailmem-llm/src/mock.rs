//! Scripted model for tests and offline demos.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::LanguageModel;
use crate::error::LlmError;
use crate::types::{LlmRequest, Message};

/// Computes a reply from the request when the queue is empty.
pub type Responder = Arc<dyn Fn(&LlmRequest) -> Result<Message, LlmError> + Send + Sync>;

/// A [`LanguageModel`] that replays queued replies.
///
/// Queued replies are consumed first, in order. Once the queue is empty the
/// responder (if any) answers; otherwise the call fails with
/// [`LlmError::Unavailable`]. Every request is recorded, including the ones
/// that failed.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    queue: Arc<Mutex<VecDeque<Result<Message, LlmError>>>>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl std::fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("queued", &self.queue.lock().len())
            .field("has_responder", &self.responder.is_some())
            .field("delay", &self.delay)
            .field("calls", &self.requests.lock().len())
            .finish()
    }
}

impl ScriptedModel {
    /// An empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A script of plain assistant replies.
    #[must_use]
    pub fn replies<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for text in texts {
            model.push(Ok(Message::assistant(text)));
        }
        model
    }

    /// A model that answers every call with `f`.
    #[must_use]
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<Message, LlmError> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(f));
        self
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one reply.
    pub fn push(&self, reply: Result<Message, LlmError>) {
        self.queue.lock().push_back(reply);
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: &LlmRequest) -> Result<Message, LlmError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.queue.lock().pop_front();
        match (queued, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => (responder.as_ref())(request),
            (None, None) => Err(LlmError::Unavailable("script exhausted".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
