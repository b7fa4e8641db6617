//! Shows the timeout budget and cooperative stop in action.
//!
//! The unit would happily run for a minute, but its descriptor grants it
//! two seconds. Watch the log: the timer cancels the stop token, the unit
//! wakes from its wait, and the run finishes with reason `timeout`.
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run --example timeout_unit
//! ```

use std::sync::Arc;
use std::time::Duration;

use slotvisor::hardware::mock::MockHardware;
use slotvisor::{
    Event, EventType, FactoryLoader, HandlerFn, System, SystemConfig, SystemParams, UnitEntry,
};

fn stubborn() -> UnitEntry {
    Box::new(|token, cap| {
        cap.display_text("Working for a minute (or so I think)...");
        let cancelled = token.wait_timeout(Duration::from_secs(60));
        if cancelled {
            cap.display_text("Told to stop, wrapping up");
        }
        Ok(())
    })
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let units = tempfile::tempdir()?;
    std::fs::create_dir_all(units.path().join("stubborn"))?;
    std::fs::write(
        units.path().join("stubborn/unit.json"),
        r#"{"name": "Stubborn", "timeout_seconds": 2}"#,
    )?;
    std::fs::write(units.path().join("selector_map.json"), r#"{"0": "stubborn"}"#)?;

    let loader = Arc::new(FactoryLoader::new());
    loader.register("stubborn", stubborn);

    let hardware = Arc::new(MockHardware::new(0));
    let system = System::start(SystemParams {
        units_dir: units.path().to_path_buf(),
        config: SystemConfig::default(),
        hardware: hardware.clone(),
        loader,
    })?;

    system.bus().subscribe(
        EventType::UnitFinished,
        HandlerFn::arc("report", |event: Event| async move {
            println!(
                "unit {:?} finished, reason: {:?}",
                event.payload_str("unit"),
                event.payload_str("reason"),
            );
            Ok(())
        }),
        None,
    );

    hardware.go_button.press();
    tokio::time::sleep(Duration::from_secs(3)).await;

    system.shutdown("demo finished").await;
    Ok(())
}
