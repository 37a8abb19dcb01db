//! Per-agent handler table keyed by a closed action enum.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::runtime::Publisher;
use crate::protocol::Envelope;

/// The set of actions an agent understands.
///
/// The payload's `action`/`task` string is parsed into this enum before
/// dispatch; anything outside `ALL` is a dispatch miss.
pub trait Action: Copy + Eq + Hash + Send + Sync + std::fmt::Debug + 'static {
    const ALL: &'static [Self];

    /// Wire name of the action.
    fn key(&self) -> &'static str;

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|action| action.key() == key)
    }
}

/// Failure inside a business handler. Logged by the runtime, never retried.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Publish failed: {0}")]
    Publish(#[from] crate::error::Error),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(s: impl Into<String>) -> Self {
        HandlerError::Failed(s.into())
    }
}

/// A business handler for one action.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one envelope. Use `publisher` to answer or forward.
    async fn handle(&self, envelope: Envelope, publisher: Publisher) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Envelope, Publisher) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, envelope: Envelope, publisher: Publisher) -> Result<(), HandlerError> {
        (self.0)(envelope, publisher).await
    }
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Envelope, Publisher) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Registered handlers for one agent.
pub struct HandlerTable<A: Action> {
    handlers: HashMap<A, Arc<dyn Handler>>,
}

impl<A: Action> HandlerTable<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, returning the one it replaced.
    pub fn insert(&mut self, action: A, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(action, handler)
    }

    pub fn get(&self, action: &A) -> Option<Arc<dyn Handler>> {
        self.handlers.get(action).cloned()
    }

    /// Resolve a raw dispatch key to its handler.
    pub fn resolve(&self, key: &str) -> Option<(A, Arc<dyn Handler>)> {
        let action = A::from_key(key)?;
        self.get(&action).map(|handler| (action, handler))
    }

    /// Actions the agent declares but has no handler for.
    pub fn missing(&self) -> Vec<A> {
        A::ALL
            .iter()
            .copied()
            .filter(|action| !self.handlers.contains_key(action))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A: Action> Default for HandlerTable<A> {
    fn default() -> Self {
        Self::new()
    }
}
