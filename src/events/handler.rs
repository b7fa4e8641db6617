//! # Handler trait and function-backed adapter.
//!
//! [`Handle`] is the extension point for bus subscribers. Handlers run on
//! the consumer loop, one event at a time, in registration order. Both
//! blocking-ish and suspending bodies work: a handler that does no I/O just
//! returns an immediately-ready future.
//!
//! ## Contract
//! - Returning `Err` (or panicking) gets the subscription **permanently
//!   removed**; the failure is logged once and never retried.
//! - Handlers should stay short. Long work belongs in a unit worker thread,
//!   with results marshalled back via `publish_threadsafe`.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::Event;

/// Shared handle to a handler implementation.
pub type HandlerRef = Arc<dyn Handle>;

/// Contract for bus event handlers.
///
/// Called from the bus consumer loop. Implementations receive their own
/// clone of the event.
#[async_trait]
pub trait Handle: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: Event) -> Result<(), HandlerError>;

    /// Human-readable name (for the auto-unsubscribe log line).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed handler implementation.
///
/// Wraps a closure that *creates* a new future per event, mirroring how
/// units are function-backed elsewhere in the crate.
///
/// ## Example
/// ```rust
/// use slotvisor::events::{Event, HandlerFn, HandlerRef};
///
/// let h: HandlerRef = HandlerFn::arc("echo", |ev: Event| async move {
///     println!("saw {}", ev.event_type);
///     Ok(())
/// });
/// ```
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared [`HandlerRef`].
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Handle for HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_event(&self, event: Event) -> Result<(), HandlerError> {
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
