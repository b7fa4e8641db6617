//! # Bridge: hardware inputs → bus events, with LED gating.
//!
//! The bridge is the only component that registers hardware input
//! callbacks. Each callback fires on a hardware thread and does nothing but
//! a `publish_threadsafe`; all real handling happens on the bus consumer
//! loop.
//!
//! ```text
//!  colour button ──► gate (LED lit?) ──► ButtonPressed / ButtonReleased
//!  go button     ─────────────────────► GoPressed
//!  selector      ─────────────────────► SwitchChanged {old, new}
//!                                  ▲
//!  LedStateChanged ── updates gate ┘
//! ```
//!
//! ## Rules
//! - The gate defaults **closed**: until an LED is reported lit, presses
//!   and releases of its button are suppressed.
//! - The gate cache is mutated only by the `LedStateChanged` subscription,
//!   on the consumer loop. Driving an LED without publishing the event
//!   (i.e. bypassing the capability) leaves the gate closed.
//! - Releases are gated exactly like presses.
//! - The go button and the selector are never gated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::events::{Bus, Event, EventType, HandlerFn, SubscriptionId};
use crate::hardware::{Buttons, Color, GoButton, Selector};

type LedCache = Arc<Mutex<HashMap<Color, bool>>>;

/// Wires hardware inputs to the bus for the lifetime of the system.
pub struct Bridge {
    bus: Bus,
    led_cache: LedCache,
    led_sub: SubscriptionId,
}

impl Bridge {
    /// Registers all input callbacks and the LED-state subscription.
    pub fn attach(
        bus: Bus,
        buttons: Arc<dyn Buttons>,
        go_button: Arc<dyn GoButton>,
        selector: Arc<dyn Selector>,
    ) -> Self {
        let led_cache: LedCache = Arc::new(Mutex::new(HashMap::new()));

        for color in Color::ALL {
            let cache = led_cache.clone();
            let press_bus = bus.clone();
            buttons.on_press(
                color,
                Box::new(move || {
                    forward_gated(&press_bus, &cache, color, EventType::ButtonPressed);
                }),
            );

            let cache = led_cache.clone();
            let release_bus = bus.clone();
            buttons.on_release(
                color,
                Box::new(move || {
                    forward_gated(&release_bus, &cache, color, EventType::ButtonReleased);
                }),
            );
        }

        let go_bus = bus.clone();
        go_button.on_press(Box::new(move || {
            go_bus.publish_threadsafe(EventType::GoPressed, Map::new());
        }));

        let selector_bus = bus.clone();
        selector.on_change(Box::new(move |old_value, new_value| {
            let mut payload = Map::new();
            payload.insert("old_value".to_string(), Value::from(old_value));
            payload.insert("new_value".to_string(), Value::from(new_value));
            selector_bus.publish_threadsafe(EventType::SwitchChanged, payload);
        }));

        let cache = led_cache.clone();
        let led_sub = bus.subscribe(
            EventType::LedStateChanged,
            HandlerFn::arc("bridge-led-gate", move |event: Event| {
                let cache = cache.clone();
                async move {
                    update_gate(&cache, &event);
                    Ok(())
                }
            }),
            None,
        );

        Self {
            bus,
            led_cache,
            led_sub,
        }
    }

    /// Current gate state for one colour. Closed by default.
    pub fn led_lit(&self, color: Color) -> bool {
        self.led_cache
            .lock()
            .map(|cache| cache.get(&color).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    /// Removes the gate subscription. Input callbacks stay registered; the
    /// gate simply stops tracking LED changes.
    pub fn detach(&self) {
        self.bus.unsubscribe(self.led_sub);
    }
}

fn forward_gated(bus: &Bus, cache: &LedCache, color: Color, event_type: EventType) {
    let lit = cache
        .lock()
        .map(|cache| cache.get(&color).copied().unwrap_or(false))
        .unwrap_or(false);
    if !lit {
        debug!("suppressed {event_type} on unlit {color} button");
        return;
    }
    let mut payload = Map::new();
    payload.insert("color".to_string(), Value::String(color.as_str().to_string()));
    bus.publish_threadsafe(event_type, payload);
}

fn update_gate(cache: &LedCache, event: &Event) {
    let color = event.payload_str("color").and_then(Color::from_str);
    let is_on = event.payload_bool("is_on");
    match (color, is_on) {
        (Some(color), Some(is_on)) => {
            if let Ok(mut cache) = cache.lock() {
                cache.insert(color, is_on);
            }
        }
        _ => warn!("malformed LedStateChanged payload: {:?}", event.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockHardware;
    use crate::hardware::{HardwareFactory, Leds};
    use std::time::{Duration, Instant};

    struct Fixture {
        bus: Bus,
        hw: MockHardware,
        bridge: Bridge,
        seen: Arc<Mutex<Vec<Event>>>,
    }

    fn fixture(captured: &[EventType]) -> Fixture {
        let bus = Bus::new(64);
        bus.start();
        let hw = MockHardware::default();
        let bridge = Bridge::attach(
            bus.clone(),
            hw.create_buttons(),
            hw.create_go_button(),
            hw.create_selector(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        for event_type in captured {
            let sink = seen.clone();
            bus.subscribe(
                *event_type,
                HandlerFn::arc("probe", move |event: Event| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push(event);
                        Ok(())
                    }
                }),
                None,
            );
        }
        Fixture { bus, hw, bridge, seen }
    }

    async fn wait_until(predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !predicate() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    fn publish_led(bus: &Bus, color: Color, is_on: bool) {
        let mut payload = Map::new();
        payload.insert("color".to_string(), Value::String(color.as_str().to_string()));
        payload.insert("is_on".to_string(), Value::Bool(is_on));
        bus.publish(EventType::LedStateChanged, payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_defaults_closed() {
        let f = fixture(&[EventType::ButtonPressed]);
        f.hw.buttons.press(Color::Red);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.seen.lock().unwrap().is_empty());
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn led_event_opens_the_gate() {
        let f = fixture(&[EventType::ButtonPressed]);
        publish_led(&f.bus, Color::Red, true);
        assert!(wait_until(|| f.bridge.led_lit(Color::Red)).await);

        f.hw.buttons.press(Color::Red);
        assert!(wait_until(|| !f.seen.lock().unwrap().is_empty()).await);
        let events = f.seen.lock().unwrap();
        assert_eq!(events[0].payload_str("color"), Some("red"));
        drop(events);
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_closes_on_led_off() {
        let f = fixture(&[EventType::ButtonPressed]);
        publish_led(&f.bus, Color::Blue, true);
        assert!(wait_until(|| f.bridge.led_lit(Color::Blue)).await);
        publish_led(&f.bus, Color::Blue, false);
        assert!(wait_until(|| !f.bridge.led_lit(Color::Blue)).await);

        f.hw.buttons.press(Color::Blue);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.seen.lock().unwrap().is_empty());
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn releases_are_gated_like_presses() {
        let f = fixture(&[EventType::ButtonReleased]);
        f.hw.buttons.release(Color::Green);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.seen.lock().unwrap().is_empty());

        publish_led(&f.bus, Color::Green, true);
        assert!(wait_until(|| f.bridge.led_lit(Color::Green)).await);
        f.hw.buttons.release(Color::Green);
        assert!(wait_until(|| !f.seen.lock().unwrap().is_empty()).await);
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn direct_led_write_does_not_open_the_gate() {
        let f = fixture(&[EventType::ButtonPressed]);
        // Hardware driven without the corresponding event.
        f.hw.leds.set(Color::Yellow, true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!f.bridge.led_lit(Color::Yellow));

        f.hw.buttons.press(Color::Yellow);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.seen.lock().unwrap().is_empty());
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn go_button_is_never_gated() {
        let f = fixture(&[EventType::GoPressed]);
        f.hw.go_button.press();
        assert!(wait_until(|| !f.seen.lock().unwrap().is_empty()).await);
        f.bus.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn selector_change_carries_old_and_new() {
        let f = fixture(&[EventType::SwitchChanged]);
        f.hw.selector.set_value(7);
        assert!(wait_until(|| !f.seen.lock().unwrap().is_empty()).await);
        let events = f.seen.lock().unwrap();
        assert_eq!(events[0].payload_u64("old_value"), Some(0));
        assert_eq!(events[0].payload_u64("new_value"), Some(7));
        drop(events);
        f.bus.stop().await;
    }
}
