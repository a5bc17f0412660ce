//! Event dispatch to registered handlers.
//!
//! Handlers subscribe either to every event or to one `EventKind`. A failing
//! handler is logged and the remaining handlers still run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::error;

use super::event::{Event, EventKind};

/// Error returned by a subscriber.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Handler for journal events.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: Arc<Event>) -> BoxFuture<'static, Result<(), HandlerError>>;
}

struct FnHandler<F>(F);

impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, event: Arc<Event>) -> BoxFuture<'static, Result<(), HandlerError>> {
        Box::pin((self.0)(event))
    }
}

/// Wrap an async closure as a handler.
///
/// # Example
///
/// ```ignore
/// log.on(EventKind::FsdJump, handler_fn(|event| async move {
///     info!(system = ?event.get("StarSystem"), "Jumped");
///     Ok(())
/// })).await;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

type Handlers = Vec<Arc<dyn EventHandler>>;

/// Routes each event to the generic handlers, then to the handlers of its kind.
#[derive(Default)]
pub struct EventDispatcher {
    any: RwLock<Handlers>,
    by_kind: RwLock<HashMap<EventKind, Handlers>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event, including unknown kinds.
    pub async fn on_any(&self, handler: Arc<dyn EventHandler>) {
        self.any.write().await.push(handler);
    }

    /// Subscribe to one kind.
    pub async fn on(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.by_kind
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Remove every subscription.
    pub async fn clear(&self) {
        self.any.write().await.clear();
        self.by_kind.write().await.clear();
    }

    pub async fn handler_count(&self) -> usize {
        let any = self.any.read().await.len();
        let by_kind: usize = self.by_kind.read().await.values().map(Vec::len).sum();
        any + by_kind
    }

    /// Deliver one event. Handlers run sequentially, in subscription order.
    ///
    /// Returns `true` if every handler succeeded.
    pub async fn dispatch(&self, event: &Arc<Event>) -> bool {
        // Snapshot so handlers may subscribe without deadlocking.
        let any: Handlers = self.any.read().await.clone();
        let specific: Handlers = self
            .by_kind
            .read()
            .await
            .get(event.kind())
            .cloned()
            .unwrap_or_default();

        let mut all_succeeded = true;
        for handler in any.iter().chain(specific.iter()) {
            if let Err(e) = handler.handle(Arc::clone(event)).await {
                error!(kind = %event.kind(), error = %e, "Handler failed");
                all_succeeded = false;
            }
        }
        all_succeeded
    }
}
