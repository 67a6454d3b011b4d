//! Streaming bridge between a blocking generation backend and an async consumer.
//!
//! Each call to [`StreamBridge::start`] spawns one worker on the blocking pool.
//! The worker pulls fragments from the backend, forwards the non-empty ones over
//! a bounded channel in arrival order, and commits the accumulated text to the
//! conversation store once the backend stream is exhausted. The consumer side is
//! a [`BridgeStream`] that yields exactly one terminal event.
//!
//! Dropping the consumer before the terminal event raises a stop flag: the
//! worker stops pulling fragments, drops the backend stream and commits nothing.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::conversation::store::ConversationStore;
use crate::conversation::types::ContextTurn;
use crate::llm::backend::{GenerationBackend, GenerationInput};
use crate::llm::error::{BackendError, BackendResult};

/// Number of prior messages handed to the backend as context.
pub const CONTEXT_TURNS: usize = 10;

/// Fragments buffered between the worker and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Event delivered to the consumer of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A non-empty piece of the response.
    Fragment {
        /// Fragment text.
        text: String,
    },
    /// The response was committed to the conversation.
    Completed {
        /// Conversation the exchange was stored in.
        conversation_id: String,
    },
    /// Generation failed; nothing was committed.
    Failed {
        /// Conversation the request belonged to.
        conversation_id: String,
        /// Description of the failure.
        error: String,
    },
}

impl BridgeEvent {
    /// Whether this event ends the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Starts streamed generations bound to stored conversations.
#[derive(Clone)]
pub struct StreamBridge {
    store: Arc<ConversationStore>,
    backend: Arc<dyn GenerationBackend>,
}

impl StreamBridge {
    /// Create a bridge over `store` and `backend`.
    #[must_use]
    pub const fn new(store: Arc<ConversationStore>, backend: Arc<dyn GenerationBackend>) -> Self {
        Self { store, backend }
    }

    /// Start streaming a response to `query`.
    ///
    /// Without a conversation id a new conversation is created; an unknown id is
    /// created on the fly. The query must already be validated.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(&self, query: String, conversation_id: Option<String>) -> BridgeStream {
        let conversation_id = self.resolve(conversation_id.as_deref());
        let cancel = Arc::new(AtomicBool::new(false));
        let (events, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let worker = Worker {
            store: Arc::clone(&self.store),
            backend: Arc::clone(&self.backend),
            conversation_id: conversation_id.clone(),
            query,
            cancel: Arc::clone(&cancel),
            events,
        };
        drop(tokio::task::spawn_blocking(move || worker.run()));

        BridgeStream {
            conversation_id,
            rx,
            cancel,
            finished: false,
        }
    }

    fn resolve(&self, requested: Option<&str>) -> String {
        match requested.filter(|id| !id.is_empty()) {
            Some(id) if self.store.exists(id) => id.to_string(),
            Some(id) => {
                info!(conversation_id = %id, "Unknown conversation, creating it");
                self.store.create(Some(id))
            }
            None => self.store.create(None),
        }
    }
}

struct Worker {
    store: Arc<ConversationStore>,
    backend: Arc<dyn GenerationBackend>,
    conversation_id: String,
    query: String,
    cancel: Arc<AtomicBool>,
    events: mpsc::Sender<BridgeEvent>,
}

impl Worker {
    fn run(self) {
        let terminal = match self.generate() {
            Ok(None) => {
                debug!(
                    conversation_id = %self.conversation_id,
                    "Stream cancelled by consumer, nothing committed"
                );
                return;
            }
            Ok(Some(text)) => self.commit(text),
            Err(err) => {
                warn!(conversation_id = %self.conversation_id, error = %err, "Streaming generation failed");
                BridgeEvent::Failed {
                    conversation_id: self.conversation_id.clone(),
                    error: err.to_string(),
                }
            }
        };

        if self.events.blocking_send(terminal).is_err() {
            debug!(conversation_id = %self.conversation_id, "Consumer gone before terminal event");
        }
    }

    /// Relay fragments and return the full text, or `None` if cancelled.
    fn generate(&self) -> BackendResult<Option<String>> {
        let fragments = self.backend.generate_streaming(self.input())?;
        let mut full = String::new();

        for item in fragments {
            if self.is_cancelled() {
                return Ok(None);
            }

            let fragment = item?;
            if fragment.text.is_empty() {
                continue;
            }

            full.push_str(&fragment.text);
            if self
                .events
                .blocking_send(BridgeEvent::Fragment {
                    text: fragment.text,
                })
                .is_err()
            {
                self.cancel.store(true, Ordering::SeqCst);
                return Ok(None);
            }
        }

        if self.is_cancelled() {
            return Ok(None);
        }

        if full.is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        Ok(Some(full))
    }

    fn input(&self) -> GenerationInput {
        match self.store.context(&self.conversation_id, CONTEXT_TURNS) {
            Some(mut turns) if !turns.is_empty() => {
                turns.push(ContextTurn::user(self.query.as_str()));
                GenerationInput::History(turns)
            }
            _ => GenerationInput::Prompt(self.query.clone()),
        }
    }

    fn commit(&self, text: String) -> BridgeEvent {
        let chars = text.chars().count();
        if self
            .store
            .add_message(&self.conversation_id, self.query.as_str(), text, None)
        {
            info!(conversation_id = %self.conversation_id, chars, "Streamed response committed");
            BridgeEvent::Completed {
                conversation_id: self.conversation_id.clone(),
            }
        } else {
            warn!(conversation_id = %self.conversation_id, "Conversation evicted before commit");
            BridgeEvent::Failed {
                conversation_id: self.conversation_id.clone(),
                error: format!("conversation {} no longer exists", self.conversation_id),
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Consumer side of a streamed generation.
///
/// Yields fragments in production order followed by exactly one terminal event.
pub struct BridgeStream {
    conversation_id: String,
    rx: mpsc::Receiver<BridgeEvent>,
    cancel: Arc<AtomicBool>,
    finished: bool,
}

impl BridgeStream {
    /// Conversation this stream belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Stream for BridgeStream {
    type Item = BridgeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            // Worker ended without a terminal event (it panicked).
            Poll::Ready(None) => {
                self.finished = true;
                warn!(conversation_id = %self.conversation_id, "Stream worker stopped unexpectedly");
                Poll::Ready(Some(BridgeEvent::Failed {
                    conversation_id: self.conversation_id.clone(),
                    error: "stream worker stopped unexpectedly".to_string(),
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for BridgeStream {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.store(true, Ordering::SeqCst);
            debug!(conversation_id = %self.conversation_id, "Stream consumer disconnected");
        }
    }
}
