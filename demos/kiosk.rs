//! Full kiosk wired against mock hardware.
//!
//! Builds a temporary units tree, starts the system, and plays the operator:
//! dials the selector, presses go, and watches the unit run. Press Ctrl-C
//! (or wait for the scripted shutdown request) to stop.
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run --example kiosk
//! ```

use std::sync::Arc;
use std::time::Duration;

use slotvisor::hardware::mock::MockHardware;
use slotvisor::hardware::Color;
use slotvisor::{
    wait_for_shutdown_signal, FactoryLoader, System, SystemConfig, SystemParams, UnitEntry,
};

fn greeter() -> UnitEntry {
    Box::new(|token, cap| {
        cap.display_text("Hello from the greeter unit");
        cap.set_led(Color::Green, true);
        // Simulated work, interruptible by stop/timeout.
        token.wait_timeout(Duration::from_secs(2));
        cap.display_text("Greeter done");
        Ok(())
    })
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let units = tempfile::tempdir()?;
    std::fs::create_dir_all(units.path().join("greeter"))?;
    std::fs::write(
        units.path().join("greeter/unit.json"),
        r#"{"name": "Greeter", "description": "says hello", "timeout_seconds": 10}"#,
    )?;
    std::fs::write(units.path().join("selector_map.json"), r#"{"7": "greeter"}"#)?;

    let loader = Arc::new(FactoryLoader::new());
    loader.register("greeter", greeter);

    let hardware = Arc::new(MockHardware::new(0));
    let system = System::start(SystemParams {
        units_dir: units.path().to_path_buf(),
        config: SystemConfig::default(),
        hardware: hardware.clone(),
        loader,
    })?;

    // Scripted operator: dial to 7, press go.
    hardware.selector.set_value(7);
    tokio::time::sleep(Duration::from_millis(100)).await;
    hardware.go_button.press();

    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        _ = system.wait_for_shutdown_request() => {}
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            println!("demo over, shutting down");
        }
    }
    system.shutdown("demo finished").await;

    println!("screen history: {:?}", hardware.screen.history());
    Ok(())
}
