//! # Launcher: go-button policy and post-run cleanup.
//!
//! The launcher is the policy layer between input events and the runner:
//!
//! ```text
//!  GoPressed ──► read selector ──► resolve unit ──► build capability
//!                                     │                  │
//!                              (unmapped: screen         ▼
//!                               message, no error)    Runner::run
//!
//!  UnitFinished / UnitError ──► clear screen, LEDs off (with events),
//!                               restore selector on the display
//!
//!  SwitchChanged ──► update display (ignored while a unit runs)
//! ```
//!
//! ## Rules
//! - An unmapped selector position is **not an error**: the screen shows a
//!   short message and the system stays idle.
//! - Launcher handlers always return `Ok`; failures are logged and, where
//!   it concerns a unit, reported as a `UnitError` event. Returning `Err`
//!   would get the launcher itself unsubscribed.
//! - Cleanup turns LEDs off through `LedStateChanged` events as well as the
//!   hardware, so the input gate closes with them.
//! - The catalog lock is never held across a launch; descriptor and
//!   directory are cloned out first.

use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use crate::capability::{Capability, CapabilityParams};
use crate::catalog::Catalog;
use crate::config::{Location, OverrideStore, Secrets};
use crate::events::{Bus, Event, EventType, HandlerFn, SubscriptionId};
use crate::hardware::{Color, Display, Leds, Screen, Selector};
use crate::runner::Runner;

/// Everything the launcher needs to wire itself up.
pub struct LauncherParams {
    pub bus: Bus,
    pub catalog: Arc<Mutex<Catalog>>,
    pub runner: Arc<Runner>,
    pub selector: Arc<dyn Selector>,
    pub display: Arc<dyn Display>,
    pub screen: Arc<dyn Screen>,
    pub leds: Arc<dyn Leds>,
    pub secrets: Arc<Secrets>,
    pub overrides: OverrideStore,
    pub location: Location,
}

struct LauncherInner {
    bus: Bus,
    catalog: Arc<Mutex<Catalog>>,
    runner: Arc<Runner>,
    selector: Arc<dyn Selector>,
    display: Arc<dyn Display>,
    screen: Arc<dyn Screen>,
    leds: Arc<dyn Leds>,
    secrets: Arc<Secrets>,
    overrides: OverrideStore,
    location: Location,
}

/// Subscribed launch policy. Dropping the struct does not unsubscribe;
/// call [`detach`] for that.
///
/// [`detach`]: Launcher::detach
pub struct Launcher {
    inner: Arc<LauncherInner>,
    subs: Vec<SubscriptionId>,
}

impl Launcher {
    /// Subscribes the launcher to go, lifecycle, and selector events.
    pub fn attach(params: LauncherParams) -> Self {
        let inner = Arc::new(LauncherInner {
            bus: params.bus,
            catalog: params.catalog,
            runner: params.runner,
            selector: params.selector,
            display: params.display,
            screen: params.screen,
            leds: params.leds,
            secrets: params.secrets,
            overrides: params.overrides,
            location: params.location,
        });

        let mut subs = Vec::new();

        let go = inner.clone();
        subs.push(inner.bus.subscribe(
            EventType::GoPressed,
            HandlerFn::arc("launcher-go", move |_event: Event| {
                let go = go.clone();
                async move {
                    go.on_go();
                    Ok(())
                }
            }),
            None,
        ));

        for event_type in [EventType::UnitFinished, EventType::UnitError] {
            let done = inner.clone();
            subs.push(inner.bus.subscribe(
                event_type,
                HandlerFn::arc("launcher-done", move |event: Event| {
                    let done = done.clone();
                    async move {
                        done.on_done(&event);
                        Ok(())
                    }
                }),
                None,
            ));
        }

        let switched = inner.clone();
        subs.push(inner.bus.subscribe(
            EventType::SwitchChanged,
            HandlerFn::arc("launcher-switch", move |event: Event| {
                let switched = switched.clone();
                async move {
                    switched.on_switch_changed(&event);
                    Ok(())
                }
            }),
            None,
        ));

        Self { inner, subs }
    }

    /// Removes the launcher's subscriptions.
    pub fn detach(&self) {
        for id in &self.subs {
            self.inner.bus.unsubscribe(*id);
        }
    }

    /// Shows the current selector position on the numeric display.
    pub fn show_selector(&self) {
        self.inner.show_selector();
    }
}

impl LauncherInner {
    fn on_go(&self) {
        let position = self.selector.value();

        let mut payload = Map::new();
        payload.insert("selector".to_string(), Value::from(position));
        self.bus.publish(EventType::LaunchRequested, payload);

        let (resolved, listings) = {
            let Ok(catalog) = self.catalog.lock() else {
                error!("catalog lock poisoned; ignoring go press");
                return;
            };
            let resolved = catalog.resolve(position).map(|unit_id| {
                // Resolve guarantees descriptor and dir exist.
                (
                    unit_id.to_string(),
                    catalog.descriptor(unit_id).cloned(),
                    catalog.unit_dir(unit_id).map(|d| d.to_path_buf()),
                )
            });
            (resolved, catalog.selector_listing())
        };

        let Some((unit_id, Some(descriptor), Some(unit_dir))) = resolved else {
            info!("go pressed with no unit at selector {position}");
            self.screen.display_text(&format!("No unit at {position}"));
            return;
        };

        let display_name = descriptor.effective_display_name(&unit_id).to_string();
        self.screen.clear();
        self.screen.display_text(&format!("Launching {display_name}..."));
        self.show_selector();

        let capability = Capability::new(CapabilityParams {
            unit_id: unit_id.clone(),
            unit_dir: unit_dir.clone(),
            descriptor: descriptor.clone(),
            bus: self.bus.clone(),
            screen: self.screen.clone(),
            leds: self.leds.clone(),
            secrets: self.secrets.clone(),
            location: self.location,
            overrides: self.overrides.overrides_for(&unit_id),
            listings,
        });

        if let Err(e) = self
            .runner
            .run(&unit_id, &unit_dir, &descriptor, capability)
        {
            error!("failed to launch {unit_id}: {e}");
            self.screen.display_text(&format!("Failed to launch {display_name}"));
            let mut payload = Map::new();
            payload.insert("unit".to_string(), Value::String(unit_id));
            payload.insert("error".to_string(), Value::String(e.to_string()));
            self.bus.publish(EventType::UnitError, payload);
        }
    }

    /// Post-run cleanup: blank outputs, close the LED gate, restore the
    /// selector readout.
    fn on_done(&self, event: &Event) {
        if let Some(unit) = event.payload_str("unit") {
            debug!("cleaning up after unit {unit}");
        }
        self.screen.clear();
        self.leds.all_off();
        for color in Color::ALL {
            let mut payload = Map::new();
            payload.insert("color".to_string(), Value::String(color.as_str().to_string()));
            payload.insert("is_on".to_string(), Value::Bool(false));
            self.bus.publish(EventType::LedStateChanged, payload);
        }
        self.show_selector();
    }

    fn on_switch_changed(&self, event: &Event) {
        if self.runner.is_running() {
            debug!("selector moved while a unit is running; display unchanged");
            return;
        }
        match event.payload_u64("new_value") {
            Some(_) => self.show_selector(),
            None => warn!("malformed SwitchChanged payload: {:?}", event.payload),
        }
    }

    fn show_selector(&self) {
        let position = self.selector.value();
        self.display.show_number(u32::from(position));
        let mut payload = Map::new();
        payload.insert("value".to_string(), Value::from(position));
        self.bus.publish(EventType::DisplayUpdated, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::catalog::{DESCRIPTOR_FILE, SELECTOR_MAP_FILE};
    use crate::hardware::mock::MockHardware;
    use crate::hardware::HardwareFactory;
    use crate::loader::{FactoryLoader, UnitEntry};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct Fixture {
        bus: Bus,
        hw: MockHardware,
        _bridge: Bridge,
        _launcher: Launcher,
        _tmp: TempDir,
    }

    fn fixture(register: &[(&str, fn() -> UnitEntry)]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("echo_unit")).unwrap();
        std::fs::write(
            tmp.path().join("echo_unit").join(DESCRIPTOR_FILE),
            r#"{"name": "Echo", "timeout_seconds": 5}"#,
        )
        .unwrap();
        std::fs::write(tmp.path().join(SELECTOR_MAP_FILE), r#"{"7": "echo_unit"}"#).unwrap();

        let bus = Bus::new(64);
        bus.start();
        let hw = MockHardware::default();
        let bridge = Bridge::attach(
            bus.clone(),
            hw.create_buttons(),
            hw.create_go_button(),
            hw.create_selector(),
        );

        let mut catalog = Catalog::new(tmp.path());
        catalog.scan().unwrap();

        let loader = FactoryLoader::new();
        for (key, factory) in register {
            loader.register(*key, *factory);
        }
        let runner = Arc::new(Runner::new(
            bus.clone(),
            Arc::new(loader),
            Duration::from_secs(1),
        ));

        let launcher = Launcher::attach(LauncherParams {
            bus: bus.clone(),
            catalog: Arc::new(Mutex::new(catalog)),
            runner,
            selector: hw.create_selector(),
            display: hw.create_display(),
            screen: hw.create_screen(),
            leds: hw.create_leds(),
            secrets: Arc::new(Secrets::new()),
            overrides: OverrideStore::new(tmp.path().join("overrides.json")),
            location: Location::default(),
        });

        Fixture {
            bus,
            hw,
            _bridge: bridge,
            _launcher: launcher,
            _tmp: tmp,
        }
    }

    async fn wait_until(predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unmapped_selector_shows_message_not_error() {
        let f = fixture(&[]);
        f.hw.selector.set_value(42);
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.hw.go_button.press();

        assert!(wait_until(|| f.hw.screen.text() == "No unit at 42").await);
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn go_launches_the_mapped_unit_and_cleans_up() {
        fn echo() -> UnitEntry {
            Box::new(|_token, cap| {
                cap.display_text("hello from echo");
                Ok(())
            })
        }
        let f = fixture(&[("echo_unit", echo)]);
        f.hw.selector.set_value(7);
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.hw.go_button.press();

        // The unit ran, wrote to the screen, and cleanup blanked it again.
        assert!(wait_until(|| {
            f.hw.screen.history().iter().any(|t| t == "hello from echo")
                && f.hw.screen.text().is_empty()
        })
        .await);
        // Cleanup restored the selector readout.
        assert!(wait_until(|| f.hw.display.shown() == Some(7)).await);
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_failure_surfaces_as_unit_error_event() {
        let f = fixture(&[]); // no factory registered for echo_unit
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.bus.subscribe(
            EventType::UnitError,
            HandlerFn::arc("probe", move |event: Event| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(event);
                    Ok(())
                }
            }),
            None,
        );

        f.hw.selector.set_value(7);
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.hw.go_button.press();

        assert!(wait_until(|| !seen.lock().unwrap().is_empty()).await);
        let events = seen.lock().unwrap();
        assert_eq!(events[0].payload_str("unit"), Some("echo_unit"));
        drop(events);
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn selector_updates_display_only_while_idle() {
        fn camper() -> UnitEntry {
            Box::new(|token, _cap| {
                token.wait_timeout(Duration::from_secs(30));
                Ok(())
            })
        }
        let f = fixture(&[("echo_unit", camper)]);

        f.hw.selector.set_value(3);
        assert!(wait_until(|| f.hw.display.shown() == Some(3)).await);

        f.hw.selector.set_value(7);
        assert!(wait_until(|| f.hw.display.shown() == Some(7)).await);
        f.hw.go_button.press();
        assert!(wait_until(|| f.hw.screen.text().starts_with("Launching")).await);

        f.hw.selector.set_value(9);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.hw.display.shown(), Some(7));
        f.bus.stop().await;
    }
}
