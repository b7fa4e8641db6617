//! Hardware abstraction traits.
//!
//! Every physical component has a matching trait here. Real electrical
//! drivers are external collaborators; this crate ships only the traits and
//! the in-memory [`mock`] backend used by tests and demos.
//!
//! Callback registration methods take `&self`; implementations use interior
//! mutability. Registered callbacks may be invoked from arbitrary driver
//! threads, which is why they must be `Send + Sync` and why the only thing
//! a callback may do with the bus is `publish_threadsafe`.

pub mod mock;

use std::fmt;
use std::sync::Arc;

/// Simple callback with no arguments (button edges).
pub type Callback = Box<dyn Fn() + Send + Sync>;

/// Selector change callback: `(old_value, new_value)`.
pub type SelectorCallback = Box<dyn Fn(u8, u8) + Send + Sync>;

/// The four colour-coded positions shared by buttons and LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Yellow,
    Green,
    Blue,
}

impl Color {
    /// All colours, in panel order.
    pub const ALL: [Color; 4] = [Color::Red, Color::Yellow, Color::Green, Color::Blue];

    /// Lower-case name used in event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Yellow => "yellow",
            Color::Green => "green",
            Color::Blue => "blue",
        }
    }

    /// Parses a payload colour name.
    pub fn from_str(name: &str) -> Option<Color> {
        match name {
            "red" => Some(Color::Red),
            "yellow" => Some(Color::Yellow),
            "green" => Some(Color::Green),
            "blue" => Some(Color::Blue),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four colour-coded pushbuttons.
pub trait Buttons: Send + Sync {
    /// Registers `callback` to fire when the button of `color` is pressed.
    fn on_press(&self, color: Color, callback: Callback);

    /// Registers `callback` to fire when the button of `color` is released.
    fn on_release(&self, color: Color, callback: Callback);
}

/// The single go button that launches the currently-selected unit.
pub trait GoButton: Send + Sync {
    /// Registers `callback` to fire on a go press.
    fn on_press(&self, callback: Callback);
}

/// Four colour-coded LEDs.
pub trait Leds: Send + Sync {
    /// Turns the LED of `color` on or off.
    fn set(&self, color: Color, on: bool);

    /// Turns every LED off.
    fn all_off(&self);
}

/// 8-bit selector bank yielding 0–255.
pub trait Selector: Send + Sync {
    /// Current selector value. Thread-safe snapshot.
    fn value(&self) -> u8;

    /// Registers `callback(old, new)` for selector changes.
    fn on_change(&self, callback: SelectorCallback);
}

/// 4-digit numeric display.
pub trait Display: Send + Sync {
    /// Shows an integer.
    fn show_number(&self, value: u32);

    /// Blanks the display.
    fn clear(&self);
}

/// Rendering surface for unit output.
///
/// All methods are safe to call from any thread; implementations marshal
/// to their own UI loop internally.
pub trait Screen: Send + Sync {
    /// Shows plain text.
    fn display_text(&self, text: &str);

    /// Clears all content.
    fn clear(&self);
}

/// Creates the full hardware set for the current platform.
pub trait HardwareFactory: Send + Sync {
    fn create_buttons(&self) -> Arc<dyn Buttons>;
    fn create_go_button(&self) -> Arc<dyn GoButton>;
    fn create_leds(&self) -> Arc<dyn Leds>;
    fn create_selector(&self) -> Arc<dyn Selector>;
    fn create_display(&self) -> Arc<dyn Display>;
    fn create_screen(&self) -> Arc<dyn Screen>;

    /// Releases hardware resources. No-op by default.
    fn cleanup(&self) {}
}
