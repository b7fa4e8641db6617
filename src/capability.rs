//! # Capability: the unit-facing API surface.
//!
//! A [`Capability`] is handed to a unit's entry point and is the *only* way
//! a unit touches the rest of the appliance:
//!
//! ```text
//!               ┌──────────────────────────────┐
//!   unit entry ─► Capability                   │
//!               │   ├─ screen / LEDs (scoped)  │──► hardware
//!               │   ├─ publish / subscribe     │──► Bus
//!               │   └─ config / secrets / loc  │
//!               └──────────────────────────────┘
//! ```
//!
//! ## Rules
//! - The unit's merged config is `descriptor.config` with stored runtime
//!   overrides applied on top, frozen at launch time.
//! - Every LED change goes through [`set_led`], which drives the hardware
//!   *and* publishes `LedStateChanged` so the input gate stays in sync.
//! - Subscriptions made through the capability are tracked; [`release`]
//!   removes them all, so a unit cannot leave handlers behind after it
//!   finishes. `release` is idempotent.
//!
//! All methods are callable from the unit's worker thread; nothing here
//! blocks on the event loop.
//!
//! [`set_led`]: Capability::set_led
//! [`release`]: Capability::release

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::catalog::{Descriptor, SelectorEntry};
use crate::config::{Location, Secrets};
use crate::events::{Bus, EventType, HandlerRef, SubscriptionId};
use crate::hardware::{Color, Leds, Screen};

/// Everything needed to assemble a [`Capability`] for one launch.
pub struct CapabilityParams {
    pub unit_id: String,
    pub unit_dir: PathBuf,
    pub descriptor: Descriptor,
    pub bus: Bus,
    pub screen: Arc<dyn Screen>,
    pub leds: Arc<dyn Leds>,
    pub secrets: Arc<Secrets>,
    pub location: Location,
    /// Stored runtime overrides for this unit, applied over
    /// `descriptor.config`.
    pub overrides: Map<String, Value>,
    /// Snapshot of the selector listing at launch time, for units that
    /// show a menu of what the appliance offers.
    pub listings: Vec<SelectorEntry>,
}

struct CapabilityInner {
    unit_id: String,
    unit_dir: PathBuf,
    descriptor: Descriptor,
    config: Map<String, Value>,
    bus: Bus,
    screen: Arc<dyn Screen>,
    leds: Arc<dyn Leds>,
    secrets: Arc<Secrets>,
    location: Location,
    listings: Vec<SelectorEntry>,
    subs: Mutex<Vec<SubscriptionId>>,
    released: AtomicBool,
}

/// Scoped appliance handle for one run of one unit. Cheap to clone.
#[derive(Clone)]
pub struct Capability {
    inner: Arc<CapabilityInner>,
}

impl Capability {
    pub fn new(params: CapabilityParams) -> Self {
        let mut config = params.descriptor.config.clone();
        for (key, value) in params.overrides {
            config.insert(key, value);
        }
        Self {
            inner: Arc::new(CapabilityInner {
                unit_id: params.unit_id,
                unit_dir: params.unit_dir,
                descriptor: params.descriptor,
                config,
                bus: params.bus,
                screen: params.screen,
                leds: params.leds,
                secrets: params.secrets,
                location: params.location,
                listings: params.listings,
                subs: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.inner.unit_id
    }

    pub fn unit_dir(&self) -> &Path {
        &self.inner.unit_dir
    }

    pub fn display_name(&self) -> &str {
        self.inner.descriptor.effective_display_name(&self.inner.unit_id)
    }

    /// Merged config: descriptor config with runtime overrides applied.
    pub fn config(&self) -> &Map<String, Value> {
        &self.inner.config
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.inner.config.get(key)
    }

    /// Resolves a secret: environment wins over the secrets file, then the
    /// given default.
    pub fn secret(&self, key: &str, default: &str) -> String {
        self.inner.secrets.get(key, default)
    }

    pub fn location(&self) -> Location {
        self.inner.location
    }

    /// Selector listing as it stood when this unit launched.
    pub fn catalog_listing(&self) -> &[SelectorEntry] {
        &self.inner.listings
    }

    /// Resolves a path relative to the unit's own directory.
    pub fn asset_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.inner.unit_dir.join(rel)
    }

    // -------------------------------------------------------------------
    // Logging, tagged with the unit id

    pub fn log_info(&self, message: &str) {
        log::info!("[{}] {}", self.inner.unit_id, message);
    }

    pub fn log_warn(&self, message: &str) {
        log::warn!("[{}] {}", self.inner.unit_id, message);
    }

    pub fn log_error(&self, message: &str) {
        log::error!("[{}] {}", self.inner.unit_id, message);
    }

    // -------------------------------------------------------------------
    // Output hardware

    pub fn display_text(&self, text: &str) {
        self.inner.screen.display_text(text);
        self.publish(EventType::ScreenUpdated, {
            let mut payload = Map::new();
            payload.insert("text".to_string(), Value::String(text.to_string()));
            payload
        });
    }

    pub fn clear_screen(&self) {
        self.inner.screen.clear();
    }

    /// Drives an LED and publishes `LedStateChanged` so button gating
    /// tracks the new state.
    pub fn set_led(&self, color: Color, on: bool) {
        self.inner.leds.set(color, on);
        self.publish(EventType::LedStateChanged, {
            let mut payload = Map::new();
            payload.insert("color".to_string(), Value::String(color.as_str().to_string()));
            payload.insert("is_on".to_string(), Value::Bool(on));
            payload
        });
    }

    // -------------------------------------------------------------------
    // Bus access

    /// Publishes from the worker thread.
    pub fn publish(&self, event_type: EventType, payload: Map<String, Value>) {
        self.inner.bus.publish_threadsafe(event_type, payload);
    }

    /// Subscribes and tracks the subscription for bulk removal at release.
    pub fn subscribe(
        &self,
        event_type: EventType,
        handler: HandlerRef,
        filter: Option<Map<String, Value>>,
    ) -> SubscriptionId {
        let id = self.inner.bus.subscribe(event_type, handler, filter);
        if let Ok(mut subs) = self.inner.subs.lock() {
            subs.push(id);
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.bus.unsubscribe(id);
        if let Ok(mut subs) = self.inner.subs.lock() {
            subs.retain(|s| *s != id);
        }
    }

    /// Removes every subscription made through this capability. Idempotent;
    /// called by the runner after the unit returns.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids = match self.inner.subs.lock() {
            Ok(mut subs) => std::mem::take(&mut *subs),
            Err(_) => {
                warn!("capability subscription list poisoned for {}", self.inner.unit_id);
                return;
            }
        };
        for id in &ids {
            self.inner.bus.unsubscribe(*id);
        }
        debug!(
            "released capability for {} ({} subscription(s) removed)",
            self.inner.unit_id,
            ids.len()
        );
    }
}
