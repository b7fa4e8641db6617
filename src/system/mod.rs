//! # System: composition root and lifecycle.
//!
//! [`System::start`] assembles the whole appliance in dependency order and
//! tears it down symmetrically:
//!
//! ```text
//!  start                              shutdown
//!  ─────                              ────────
//!  1. bus (consumer loop)             1. ShutdownInitiated event
//!  2. hardware handles + bridge       2. stop running unit
//!  3. catalog scan                    3. launcher / bridge detach
//!  4. runner + launcher               4. bus consumer drained & stopped
//!  5. shutdown subscription           5. outputs blanked, hardware cleanup
//!  6. initial selector readout
//!  7. SystemStarted event
//! ```
//!
//! ## Rules
//! - Shutdown is two-phase: anything (a unit, a handler, a signal task) may
//!   *request* it by publishing `ShutdownRequested`; the request only flips
//!   a notifier. The owner of the [`System`] observes it via
//!   [`wait_for_shutdown_request`] and then drives [`shutdown`]. Stopping
//!   the bus from inside a handler would deadlock the consumer loop, so the
//!   handler never does it.
//! - [`shutdown`] is idempotent.
//!
//! [`wait_for_shutdown_request`]: System::wait_for_shutdown_request
//! [`shutdown`]: System::shutdown

mod signals;

pub use signals::wait_for_shutdown_signal;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info};
use serde_json::{Map, Value};
use tokio::sync::Notify;

use crate::bridge::Bridge;
use crate::catalog::Catalog;
use crate::config::{OverrideStore, Secrets, SystemConfig};
use crate::error::CatalogError;
use crate::events::{Bus, Event, EventType, HandlerFn};
use crate::hardware::{Display, HardwareFactory, Leds, Screen};
use crate::launcher::{Launcher, LauncherParams};
use crate::loader::UnitLoader;
use crate::runner::Runner;

/// Stored runtime overrides live next to the units tree.
const OVERRIDES_FILE: &str = "overrides.json";

/// Inputs for [`System::start`].
pub struct SystemParams {
    pub units_dir: PathBuf,
    pub config: SystemConfig,
    pub hardware: Arc<dyn HardwareFactory>,
    pub loader: Arc<dyn UnitLoader>,
}

/// A fully wired, running appliance.
pub struct System {
    bus: Bus,
    catalog: Arc<Mutex<Catalog>>,
    runner: Arc<Runner>,
    launcher: Launcher,
    bridge: Bridge,
    hardware: Arc<dyn HardwareFactory>,
    secrets: Arc<Secrets>,
    leds: Arc<dyn Leds>,
    screen: Arc<dyn Screen>,
    display: Arc<dyn Display>,
    shutdown_notify: Arc<Notify>,
    shutdown_done: AtomicBool,
}

impl System {
    /// Wires everything up and announces `SystemStarted`.
    pub fn start(params: SystemParams) -> Result<Self, CatalogError> {
        info!("starting system (units at {})", params.units_dir.display());

        let bus = Bus::new(params.config.bus_queue_size);
        bus.start();

        let buttons = params.hardware.create_buttons();
        let go_button = params.hardware.create_go_button();
        let leds = params.hardware.create_leds();
        let selector = params.hardware.create_selector();
        let display = params.hardware.create_display();
        let screen = params.hardware.create_screen();

        let bridge = Bridge::attach(bus.clone(), buttons, go_button, selector.clone());

        let secrets = Arc::new(Secrets::new());
        let mut catalog = Catalog::new(params.units_dir.clone());
        catalog.scan()?;
        catalog.warn_missing_secrets(&secrets);
        let catalog = Arc::new(Mutex::new(catalog));

        let runner = Arc::new(Runner::new(
            bus.clone(),
            params.loader,
            params.config.stop_timeout(),
        ));

        let launcher = Launcher::attach(LauncherParams {
            bus: bus.clone(),
            catalog: catalog.clone(),
            runner: runner.clone(),
            selector,
            display: display.clone(),
            screen: screen.clone(),
            leds: leds.clone(),
            secrets: secrets.clone(),
            overrides: OverrideStore::new(params.units_dir.join(OVERRIDES_FILE)),
            location: params.config.location,
        });

        let shutdown_notify = Arc::new(Notify::new());
        let notify = shutdown_notify.clone();
        bus.subscribe(
            EventType::ShutdownRequested,
            HandlerFn::arc("system-shutdown", move |event: Event| {
                let notify = notify.clone();
                async move {
                    let reason = event.payload_str("reason").unwrap_or("unspecified");
                    info!("shutdown requested: {reason}");
                    notify.notify_one();
                    Ok(())
                }
            }),
            None,
        );

        launcher.show_selector();

        let unit_count = match catalog.lock() {
            Ok(catalog) => catalog.len(),
            Err(_) => 0,
        };
        let mut payload = Map::new();
        payload.insert("units".to_string(), Value::from(unit_count));
        bus.publish(EventType::SystemStarted, payload);

        Ok(Self {
            bus,
            catalog,
            runner,
            launcher,
            bridge,
            hardware: params.hardware,
            secrets,
            leds,
            screen,
            display,
            shutdown_notify,
            shutdown_done: AtomicBool::new(false),
        })
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Whether a unit currently occupies the slot.
    pub fn is_unit_running(&self) -> bool {
        self.runner.is_running()
    }

    /// Publishes a `ShutdownRequested` event. Safe to call from anywhere,
    /// including bus handlers and unit workers.
    pub fn request_shutdown(&self, reason: &str) {
        let mut payload = Map::new();
        payload.insert("reason".to_string(), Value::String(reason.to_string()));
        self.bus.publish_threadsafe(EventType::ShutdownRequested, payload);
    }

    /// Completes once a `ShutdownRequested` event has been observed. The
    /// caller then drives [`shutdown`].
    ///
    /// [`shutdown`]: System::shutdown
    pub async fn wait_for_shutdown_request(&self) {
        self.shutdown_notify.notified().await;
    }

    /// Rescans the units tree in place. The selector map and descriptors
    /// are swapped atomically from the launcher's point of view.
    pub fn rescan(&self) -> Result<usize, CatalogError> {
        let mut catalog = self
            .catalog
            .lock()
            .map_err(|_| CatalogError::Invalid("catalog lock poisoned".to_string()))?;
        let count = catalog.scan()?;
        catalog.warn_missing_secrets(&self.secrets);
        Ok(count)
    }

    /// Orderly teardown. Idempotent; must not be called from inside a bus
    /// handler.
    pub async fn shutdown(&self, reason: &str) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down: {reason}");

        let mut payload = Map::new();
        payload.insert("reason".to_string(), Value::String(reason.to_string()));
        self.bus.publish(EventType::ShutdownInitiated, payload);

        if !self.runner.stop() {
            error!("unit still running at shutdown; its thread is abandoned");
        }

        self.launcher.detach();
        self.bridge.detach();
        self.bus.stop().await;

        self.leds.all_off();
        self.screen.clear();
        self.display.clear();
        self.hardware.cleanup();
        info!("system stopped");
    }
}
