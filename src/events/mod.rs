//! Runtime events: taxonomy, payloads, and the bounded bus.
//!
//! This module groups the event **data model** and the **bus** that carries
//! every cross-component message in the system.
//!
//! ## Contents
//! - [`EventType`], [`Event`]: closed taxonomy plus payload metadata
//! - [`Bus`], [`SubscriptionId`]: bounded queue, single consumer loop
//! - [`Handle`], [`HandlerFn`]: subscriber contract and closure adapter
//!
//! ## Quick reference
//! - **Publishers**: bridge callbacks and unit workers (via
//!   `publish_threadsafe`), launcher and system handlers (via `publish`).
//! - **Consumers**: exactly one loop, started by [`Bus::start`]; all
//!   handler execution happens there.

mod bus;
mod event;
mod handler;

pub(crate) use bus::panic_message;
pub use bus::{Bus, SubscriptionId};
pub use event::{Event, EventType};
pub use handler::{Handle, HandlerFn, HandlerRef};
