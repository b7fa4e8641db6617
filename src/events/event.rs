//! # Bus events: type taxonomy and payload metadata.
//!
//! [`EventType`] is the closed set of dot-namespaced event names shared by
//! every publisher and subscriber, grouped in four namespaces:
//! - **`input.*`**: hardware → system (selector bank, colour buttons, go button)
//! - **`output.*`**: system → hardware / display surfaces
//! - **`system.unit.*`**: unit lifecycle (launch-requested, started, finished, error)
//! - **`system.*`**: process lifecycle (started, shutdown)
//!
//! [`Event`] carries the type, a free-form JSON payload, and a wall-clock
//! timestamp. Events are immutable once published and consumed exactly once
//! by the bus consumer loop.
//!
//! ## Example
//! ```rust
//! use slotvisor::events::{Event, EventType};
//!
//! let ev = Event::new(EventType::UnitFinished)
//!     .with("unit", "echo_unit")
//!     .with("reason", "normal");
//!
//! assert_eq!(ev.event_type, EventType::UnitFinished);
//! assert_eq!(ev.payload_str("reason"), Some("normal"));
//! assert_eq!(ev.event_type.as_str(), "system.unit.finished");
//! ```

use std::fmt;
use std::time::SystemTime;

use serde_json::{Map, Value};

/// Closed set of event types flowing through the bus.
///
/// The dot-namespaced wire name (see [`EventType::as_str`]) is what the
/// original appliance put on its bus; publishers and subscribers here share
/// the enum instead so a typo cannot create an orphan event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    // === Input events (hardware → system) ===
    /// Selector bank value changed. Payload: `old_value`, `new_value`.
    SwitchChanged,
    /// Colour button pressed (only forwarded while its LED is lit). Payload: `color`.
    ButtonPressed,
    /// Colour button released (same LED gate as presses). Payload: `color`.
    ButtonReleased,
    /// Go button pressed. Empty payload.
    GoPressed,

    // === Output events (system → hardware / UI) ===
    /// A logical LED changed state. Payload: `color`, `is_on`.
    ///
    /// This is the *only* input to the bridge's LED cache; the gate tracks
    /// intended state, never a synchronous hardware read.
    LedStateChanged,
    /// Numeric display updated. Payload: `value`.
    DisplayUpdated,
    /// Screen surface updated. Payload: `text`.
    ScreenUpdated,

    // === Unit lifecycle ===
    /// Go press resolved into a launch attempt. Payload: `selector`.
    LaunchRequested,
    /// Unit worker thread started. Payload: `unit`, `display_name`.
    UnitStarted,
    /// Unit returned. Payload: `unit`, `reason` (`"normal"` or `"timeout"`).
    UnitFinished,
    /// Unit failed or panicked. Payload: `unit`, `error`.
    UnitError,

    // === Process lifecycle ===
    /// System finished booting. Payload: `units` (count).
    SystemStarted,
    /// Shutdown requested (admin surface or signal). Payload: `reason`.
    ShutdownRequested,
    /// Shutdown has begun. Payload: `reason`.
    ShutdownInitiated,
}

impl EventType {
    /// Returns the dot-namespaced wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SwitchChanged => "input.switch.changed",
            EventType::ButtonPressed => "input.button.pressed",
            EventType::ButtonReleased => "input.button.released",
            EventType::GoPressed => "input.go_button.pressed",
            EventType::LedStateChanged => "output.led.state_changed",
            EventType::DisplayUpdated => "output.display.updated",
            EventType::ScreenUpdated => "output.screen.updated",
            EventType::LaunchRequested => "system.unit.launch.requested",
            EventType::UnitStarted => "system.unit.started",
            EventType::UnitFinished => "system.unit.finished",
            EventType::UnitError => "system.unit.error",
            EventType::SystemStarted => "system.started",
            EventType::ShutdownRequested => "system.shutdown.requested",
            EventType::ShutdownInitiated => "system.shutdown.initiated",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured event flowing through the bus.
///
/// ### Properties
/// - **Immutable**: built once via [`Event::new`] + [`Event::with`], never
///   patched after publish.
/// - **Cloneable**: handlers receive their own clone.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event classification.
    pub event_type: EventType,
    /// Free-form key → value payload.
    pub payload: Map<String, Value>,
    /// Wall-clock timestamp taken at construction.
    pub at: SystemTime,
}

impl Event {
    /// Creates an event with an empty payload, timestamped now.
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            payload: Map::new(),
            at: SystemTime::now(),
        }
    }

    /// Creates an event carrying the given payload.
    pub fn with_payload(event_type: EventType, payload: Map<String, Value>) -> Self {
        Self {
            event_type,
            payload,
            at: SystemTime::now(),
        }
    }

    /// Adds one payload entry (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Returns the payload value for `key` as a string, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Returns the payload value for `key` as an unsigned integer, if present.
    pub fn payload_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }

    /// Returns the payload value for `key` as a bool, if present.
    pub fn payload_bool(&self, key: &str) -> Option<bool> {
        self.payload.get(key).and_then(Value::as_bool)
    }

    /// AND-matches `filter` against the payload (exact value equality).
    ///
    /// An empty filter matches everything.
    pub(crate) fn matches_filter(&self, filter: &Map<String, Value>) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.payload.get(k) == Some(v))
    }
}
