//! In-memory hardware backend for tests and demos.
//!
//! Every mock records what it was told and lets tests drive the inputs:
//! [`MockButtons::press`], [`MockGoButton::press`], and
//! [`MockSelector::set_value`] fire the registered callbacks exactly like a
//! driver interrupt thread would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    Buttons, Callback, Color, Display, GoButton, HardwareFactory, Leds, Screen, Selector,
    SelectorCallback,
};

/// Mock colour buttons; `press`/`release` fire callbacks synchronously.
#[derive(Default)]
pub struct MockButtons {
    press: Mutex<HashMap<Color, Vec<Callback>>>,
    release: Mutex<HashMap<Color, Vec<Callback>>>,
}

impl MockButtons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a press of the button of `color`.
    pub fn press(&self, color: Color) {
        let callbacks = self.press.lock().expect("mock buttons lock");
        if let Some(list) = callbacks.get(&color) {
            for cb in list {
                cb();
            }
        }
    }

    /// Simulates a release of the button of `color`.
    pub fn release(&self, color: Color) {
        let callbacks = self.release.lock().expect("mock buttons lock");
        if let Some(list) = callbacks.get(&color) {
            for cb in list {
                cb();
            }
        }
    }
}

impl Buttons for MockButtons {
    fn on_press(&self, color: Color, callback: Callback) {
        self.press
            .lock()
            .expect("mock buttons lock")
            .entry(color)
            .or_default()
            .push(callback);
    }

    fn on_release(&self, color: Color, callback: Callback) {
        self.release
            .lock()
            .expect("mock buttons lock")
            .entry(color)
            .or_default()
            .push(callback);
    }
}

/// Mock go button.
#[derive(Default)]
pub struct MockGoButton {
    callbacks: Mutex<Vec<Callback>>,
}

impl MockGoButton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a go press.
    pub fn press(&self) {
        for cb in self.callbacks.lock().expect("mock go lock").iter() {
            cb();
        }
    }
}

impl GoButton for MockGoButton {
    fn on_press(&self, callback: Callback) {
        self.callbacks.lock().expect("mock go lock").push(callback);
    }
}

/// Mock LEDs recording the last commanded state per colour.
#[derive(Default)]
pub struct MockLeds {
    states: Mutex<HashMap<Color, bool>>,
}

impl MockLeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded state for `color` (false if never set).
    pub fn state(&self, color: Color) -> bool {
        *self
            .states
            .lock()
            .expect("mock leds lock")
            .get(&color)
            .unwrap_or(&false)
    }
}

impl Leds for MockLeds {
    fn set(&self, color: Color, on: bool) {
        self.states.lock().expect("mock leds lock").insert(color, on);
    }

    fn all_off(&self) {
        let mut states = self.states.lock().expect("mock leds lock");
        for color in Color::ALL {
            states.insert(color, false);
        }
    }
}

/// Mock selector bank with a settable value.
pub struct MockSelector {
    value: AtomicU8,
    callbacks: Mutex<Vec<SelectorCallback>>,
}

impl MockSelector {
    pub fn new(initial: u8) -> Self {
        Self {
            value: AtomicU8::new(initial),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Sets the selector and fires change callbacks with (old, new).
    pub fn set_value(&self, new: u8) {
        let old = self.value.swap(new, Ordering::SeqCst);
        if old == new {
            return;
        }
        for cb in self.callbacks.lock().expect("mock selector lock").iter() {
            cb(old, new);
        }
    }
}

impl Selector for MockSelector {
    fn value(&self) -> u8 {
        self.value.load(Ordering::SeqCst)
    }

    fn on_change(&self, callback: SelectorCallback) {
        self.callbacks
            .lock()
            .expect("mock selector lock")
            .push(callback);
    }
}

/// Mock numeric display remembering the last shown value.
#[derive(Default)]
pub struct MockDisplay {
    shown: Mutex<Option<u32>>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value shown, or `None` after a clear.
    pub fn shown(&self) -> Option<u32> {
        *self.shown.lock().expect("mock display lock")
    }
}

impl Display for MockDisplay {
    fn show_number(&self, value: u32) {
        *self.shown.lock().expect("mock display lock") = Some(value);
    }

    fn clear(&self) {
        *self.shown.lock().expect("mock display lock") = None;
    }
}

/// Mock screen keeping both the current content and a full history.
///
/// The history survives `clear()`, so a test can assert what a unit wrote
/// even after the launcher's post-run cleanup wiped the surface.
#[derive(Default)]
pub struct MockScreen {
    current: Mutex<Vec<String>>,
    history: Mutex<Vec<String>>,
}

impl MockScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current visible content, newline-joined.
    pub fn text(&self) -> String {
        self.current.lock().expect("mock screen lock").join("\n")
    }

    /// Every text ever displayed, in order (not cleared by `clear`).
    pub fn history(&self) -> Vec<String> {
        self.history.lock().expect("mock screen lock").clone()
    }
}

impl Screen for MockScreen {
    fn display_text(&self, text: &str) {
        self.current
            .lock()
            .expect("mock screen lock")
            .push(text.to_string());
        self.history
            .lock()
            .expect("mock screen lock")
            .push(text.to_string());
    }

    fn clear(&self) {
        self.current.lock().expect("mock screen lock").clear();
    }
}

/// Factory handing out shared mock instances.
///
/// The factory keeps its own `Arc`s, so a test can hold the concrete mocks
/// (to press buttons, read the screen) while the system holds the trait
/// objects.
pub struct MockHardware {
    pub buttons: Arc<MockButtons>,
    pub go_button: Arc<MockGoButton>,
    pub leds: Arc<MockLeds>,
    pub selector: Arc<MockSelector>,
    pub display: Arc<MockDisplay>,
    pub screen: Arc<MockScreen>,
}

impl MockHardware {
    pub fn new(initial_selector: u8) -> Self {
        Self {
            buttons: Arc::new(MockButtons::new()),
            go_button: Arc::new(MockGoButton::new()),
            leds: Arc::new(MockLeds::new()),
            selector: Arc::new(MockSelector::new(initial_selector)),
            display: Arc::new(MockDisplay::new()),
            screen: Arc::new(MockScreen::new()),
        }
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new(0)
    }
}

impl HardwareFactory for MockHardware {
    fn create_buttons(&self) -> Arc<dyn Buttons> {
        self.buttons.clone()
    }

    fn create_go_button(&self) -> Arc<dyn GoButton> {
        self.go_button.clone()
    }

    fn create_leds(&self) -> Arc<dyn Leds> {
        self.leds.clone()
    }

    fn create_selector(&self) -> Arc<dyn Selector> {
        self.selector.clone()
    }

    fn create_display(&self) -> Arc<dyn Display> {
        self.display.clone()
    }

    fn create_screen(&self) -> Arc<dyn Screen> {
        self.screen.clone()
    }
}
