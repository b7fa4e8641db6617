//! # slotvisor
//!
//! **Slotvisor** is a single-slot unit supervisor for a kiosk appliance.
//!
//! A selector dial (0–255) picks a unit, a go button launches it, and four
//! colour buttons plus LEDs, a numeric display, and a small text screen make
//! up the rest of the operator surface. Exactly one unit runs at a time; a
//! new launch politely evicts the old occupant.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  selector ─┐                                       ┌─ numeric display
//!  go button ┼─► Bridge ──► Bus ──► Launcher ──────► ┼─ text screen
//!  buttons ──┘   (LED-gated)  │         │            └─ LEDs
//!      ▲                      │         ▼
//!      └── LedStateChanged ───┤      Runner (one slot)
//!                             │         │
//!                             │         ├─ worker thread
//!                             │         │    entry(StopToken, Capability)
//!                             │         └─ timeout timer ──► token.cancel()
//!                             │
//!  Catalog (units/*/unit.json, selector_map.json)
//!  Capability (screen, LEDs, bus, config, secrets) ──► handed to the unit
//! ```
//!
//! ### Launch lifecycle
//! ```text
//! GoPressed ──► Launcher
//!   ├─► publish LaunchRequested{ selector }
//!   ├─► Catalog::resolve(selector)
//!   │     └─ None ─► screen "No unit at N", stay idle
//!   ├─► Runner::run
//!   │     ├─► vacate slot (cancel token, stop window, grace, abandon)
//!   │     ├─► load fresh entry, arm timeout timer
//!   │     └─► worker: UnitStarted ─► entry() ─► UnitFinished / UnitError
//!   └─► on UnitFinished / UnitError:
//!         clear screen, LEDs off (gate closes), restore selector readout
//! ```
//!
//! ## Features
//! | Area           | Description                                              | Key types / traits            |
//! |----------------|----------------------------------------------------------|-------------------------------|
//! | **Events**     | Bounded drop-oldest bus, one consumer loop.              | [`Bus`], [`Event`], [`Handle`]|
//! | **Catalog**    | Unit discovery, strict descriptors, selector map.        | [`Catalog`], [`Descriptor`]   |
//! | **Execution**  | Single slot, cooperative stop, timeout budget.           | [`Runner`], [`StopToken`]     |
//! | **Units**      | Function-backed entries, fresh per launch.               | [`UnitLoader`], [`UnitEntry`] |
//! | **Hardware**   | Trait seams for inputs/outputs, full mock set.           | [`HardwareFactory`], [`Color`]|
//! | **Capability** | Scoped appliance handle passed to a running unit.        | [`Capability`]                |
//! | **Lifecycle**  | Composition root, two-phase shutdown, OS signals.        | [`System`]                    |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use slotvisor::hardware::mock::MockHardware;
//! use slotvisor::{FactoryLoader, System, SystemConfig, SystemParams, UnitEntry};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let units = tempfile::tempdir()?;
//!     std::fs::create_dir_all(units.path().join("hello"))?;
//!     std::fs::write(units.path().join("hello/unit.json"), r#"{"name": "Hello"}"#)?;
//!     std::fs::write(units.path().join("selector_map.json"), r#"{"0": "hello"}"#)?;
//!
//!     let loader = Arc::new(FactoryLoader::new());
//!     loader.register("hello", || -> UnitEntry {
//!         Box::new(|_token, cap| {
//!             cap.display_text("Hello from the slot!");
//!             Ok(())
//!         })
//!     });
//!
//!     let hardware = Arc::new(MockHardware::new(0));
//!     let system = System::start(SystemParams {
//!         units_dir: units.path().to_path_buf(),
//!         config: SystemConfig::default(),
//!         hardware: hardware.clone(),
//!         loader,
//!     })?;
//!
//!     hardware.go_button.press();
//!     system.request_shutdown("demo over");
//!     system.wait_for_shutdown_request().await;
//!     system.shutdown("demo over").await;
//!     Ok(())
//! }
//! ```
pub mod bridge;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod hardware;
pub mod launcher;
pub mod loader;
pub mod runner;
pub mod system;

// ---- Public re-exports ----

pub use bridge::Bridge;
pub use capability::{Capability, CapabilityParams};
pub use catalog::{Catalog, Descriptor, SelectorEntry, SelectorMap, UnitSummary};
pub use config::{Location, OverrideStore, Secrets, SystemConfig};
pub use error::{CatalogError, ConfigError, HandlerError, UnitError};
pub use events::{Bus, Event, EventType, Handle, HandlerFn, HandlerRef, SubscriptionId};
pub use hardware::{Color, HardwareFactory};
pub use launcher::{Launcher, LauncherParams};
pub use loader::{FactoryLoader, UnitEntry, UnitFactory, UnitLoader};
pub use runner::{Runner, StopToken};
pub use system::{wait_for_shutdown_signal, System, SystemParams};
