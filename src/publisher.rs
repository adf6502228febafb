//! Directive publication.
//!
//! The service never talks to a music backend directly. It hands each new
//! [`PromptState`] to a [`PublishHandle`], which queues it for a background
//! task driving one [`DirectivePublisher`]. The handoff never blocks the
//! caller: when the queue is full the directive is dropped and logged, and
//! the next published version supersedes it anyway.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::prompt::PromptState;

/// Publication failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The downstream side has gone away.
    #[error("Publisher closed")]
    Closed,

    /// The downstream side refused the directive.
    #[error("Publish rejected: {0}")]
    Rejected(String),
}

/// Outbound side of the engine.
#[async_trait]
pub trait DirectivePublisher: Send + Sync {
    /// Deliver one directive version.
    async fn publish(&self, state: &PromptState) -> Result<(), PublishError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// BroadcastPublisher
// ---------------------------------------------------------------------------

/// Fans directives out to live subscribers over a tokio broadcast channel.
///
/// Having no subscribers is not an error; lagging subscribers miss versions.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PromptState>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PromptState> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl DirectivePublisher for BroadcastPublisher {
    async fn publish(&self, state: &PromptState) -> Result<(), PublishError> {
        if self.sender.send(state.clone()).is_err() {
            log::trace!("No live subscribers for directive v{}", state.version);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}

// ---------------------------------------------------------------------------
// LoggingPublisher
// ---------------------------------------------------------------------------

/// Writes one log line per directive.
#[derive(Debug, Clone)]
pub struct LoggingPublisher {
    base_prompt: String,
}

impl LoggingPublisher {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: base_prompt.into(),
        }
    }
}

#[async_trait]
impl DirectivePublisher for LoggingPublisher {
    async fn publish(&self, state: &PromptState) -> Result<(), PublishError> {
        let prompts = state
            .weighted_prompts(&self.base_prompt)
            .iter()
            .map(|p| format!("\"{}\"@{:.2}", p.text, p.weight))
            .collect::<Vec<_>>()
            .join(" + ");
        log::info!(
            "Directive v{} [{:?}] {}",
            state.version,
            state.phase,
            prompts
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// FanoutPublisher
// ---------------------------------------------------------------------------

/// Publishes to several publishers concurrently.
///
/// One failing target does not stop the others; failures are logged and the
/// first one is returned.
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    targets: Vec<Arc<dyn DirectivePublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Arc<dyn DirectivePublisher>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl DirectivePublisher for FanoutPublisher {
    async fn publish(&self, state: &PromptState) -> Result<(), PublishError> {
        let results =
            futures::future::join_all(self.targets.iter().map(|t| t.publish(state))).await;

        let mut first_error = None;
        for (target, result) in self.targets.iter().zip(results) {
            if let Err(e) = result {
                log::warn!(
                    "Publisher '{}' failed on directive v{}: {}",
                    target.name(),
                    state.version,
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}

// ---------------------------------------------------------------------------
// PublishQueue
// ---------------------------------------------------------------------------

/// Background task draining a bounded queue into a publisher.
pub struct PublishQueue;

impl PublishQueue {
    /// Spawn the drain task on the current tokio runtime.
    ///
    /// The task ends once every [`PublishHandle`] has been dropped.
    pub fn spawn(
        publisher: Arc<dyn DirectivePublisher>,
        capacity: usize,
    ) -> (PublishHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PromptState>(capacity.max(1));
        let task = tokio::spawn(async move {
            while let Some(state) = rx.recv().await {
                if let Err(e) = publisher.publish(&state).await {
                    log::warn!(
                        "Dropping directive v{} after '{}' failed: {}",
                        state.version,
                        publisher.name(),
                        e
                    );
                }
            }
            log::debug!("Publish queue for '{}' closed", publisher.name());
        });
        (PublishHandle { tx }, task)
    }
}

/// Non-blocking producer side of a [`PublishQueue`].
#[derive(Debug, Clone)]
pub struct PublishHandle {
    tx: mpsc::Sender<PromptState>,
}

impl PublishHandle {
    /// A handle whose queue is drained by the caller. Useful when the
    /// consumer is not a [`DirectivePublisher`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PromptState>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a directive without waiting. Returns whether it was accepted.
    pub fn offer(&self, state: PromptState) -> bool {
        match self.tx.try_send(state) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(state)) => {
                log::warn!("Publish queue full, dropping directive v{}", state.version);
                false
            }
            Err(mpsc::error::TrySendError::Closed(state)) => {
                log::warn!(
                    "Publish queue closed, dropping directive v{}",
                    state.version
                );
                false
            }
        }
    }
}
