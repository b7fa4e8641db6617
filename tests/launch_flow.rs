//! End-to-end launch flow against mock hardware.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use slotvisor::catalog::{DESCRIPTOR_FILE, SELECTOR_MAP_FILE};
use slotvisor::hardware::mock::MockHardware;
use slotvisor::{
    Event, EventType, FactoryLoader, HandlerFn, System, SystemConfig, SystemParams, UnitEntry,
};

fn units_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("echo_unit")).unwrap();
    std::fs::write(
        tmp.path().join("echo_unit").join(DESCRIPTOR_FILE),
        r#"{"name": "Echo", "description": "prints one line", "timeout_seconds": 5}"#,
    )
    .unwrap();
    std::fs::write(tmp.path().join(SELECTOR_MAP_FILE), r#"{"7": "echo_unit"}"#).unwrap();
    tmp
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
async fn selector_plus_go_runs_the_mapped_unit() {
    let tmp = units_tree();
    let hardware = Arc::new(MockHardware::new(0));

    let loader = Arc::new(FactoryLoader::new());
    loader.register("echo_unit", || -> UnitEntry {
        Box::new(|_token, cap| {
            cap.display_text("echo says hi");
            Ok(())
        })
    });

    let system = System::start(SystemParams {
        units_dir: tmp.path().to_path_buf(),
        config: SystemConfig::default(),
        hardware: hardware.clone(),
        loader,
    })
    .unwrap();

    // Observe the launch lifecycle on the bus.
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event_type in [
        EventType::LaunchRequested,
        EventType::UnitStarted,
        EventType::UnitFinished,
        EventType::UnitError,
    ] {
        let sink = seen.clone();
        system.bus().subscribe(
            event_type,
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

    // Dial the selector to 7, then press go.
    hardware.selector.set_value(7);
    assert!(wait_until(|| hardware.display.shown() == Some(7)).await);
    hardware.go_button.press();

    assert!(
        wait_until(|| {
            let events = seen.lock().unwrap();
            events.iter().any(|e| e.event_type == EventType::UnitFinished)
        })
        .await,
        "unit never finished"
    );

    let events = seen.lock().unwrap();
    let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::LaunchRequested,
            EventType::UnitStarted,
            EventType::UnitFinished,
        ]
    );
    assert_eq!(events[0].payload_u64("selector"), Some(7));
    assert_eq!(events[1].payload_str("unit"), Some("echo_unit"));
    assert_eq!(events[1].payload_str("display_name"), Some("Echo"));
    assert_eq!(events[2].payload_str("unit"), Some("echo_unit"));
    assert_eq!(events[2].payload_str("reason"), Some("normal"));
    drop(events);

    // The unit's output reached the screen before cleanup blanked it.
    assert!(
        wait_until(|| hardware.screen.text().is_empty()).await,
        "screen never cleaned up"
    );
    assert!(hardware.screen.history().iter().any(|t| t == "echo says hi"));

    // Cleanup restored the selector readout.
    assert_eq!(hardware.display.shown(), Some(7));

    system.shutdown("test over").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn go_on_unmapped_position_stays_idle() {
    let tmp = units_tree();
    let hardware = Arc::new(MockHardware::new(0));

    let system = System::start(SystemParams {
        units_dir: tmp.path().to_path_buf(),
        config: SystemConfig::default(),
        hardware: hardware.clone(),
        loader: Arc::new(FactoryLoader::new()),
    })
    .unwrap();

    hardware.selector.set_value(99);
    assert!(wait_until(|| hardware.display.shown() == Some(99)).await);
    hardware.go_button.press();

    assert!(wait_until(|| hardware.screen.text() == "No unit at 99").await);
    assert!(!system.is_unit_running());

    system.shutdown("test over").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn second_go_replaces_the_running_unit() {
    let tmp = units_tree();
    std::fs::create_dir_all(tmp.path().join("camper")).unwrap();
    std::fs::write(
        tmp.path().join("camper").join(DESCRIPTOR_FILE),
        r#"{"timeout_seconds": 30}"#,
    )
    .unwrap();
    std::fs::write(
        tmp.path().join(SELECTOR_MAP_FILE),
        r#"{"1": "camper", "7": "echo_unit"}"#,
    )
    .unwrap();

    let hardware = Arc::new(MockHardware::new(1));
    let loader = Arc::new(FactoryLoader::new());
    loader.register("camper", || -> UnitEntry {
        Box::new(|token, _cap| {
            token.wait_timeout(Duration::from_secs(30));
            Ok(())
        })
    });
    loader.register("echo_unit", || -> UnitEntry {
        Box::new(|_token, _cap| Ok(()))
    });

    let mut config = SystemConfig::default();
    config.stop_timeout_seconds = 1;
    let system = System::start(SystemParams {
        units_dir: tmp.path().to_path_buf(),
        config,
        hardware: hardware.clone(),
        loader,
    })
    .unwrap();

    hardware.go_button.press();
    assert!(wait_until(|| system.is_unit_running()).await);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    system.bus().subscribe(
        EventType::UnitFinished,
        HandlerFn::arc("probe", move |event: Event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event);
                Ok(())
            }
        }),
        None,
    );

    hardware.selector.set_value(7);
    hardware.go_button.press();

    assert!(
        wait_until(|| {
            seen.lock()
                .unwrap()
                .iter()
                .any(|e| e.payload_str("unit") == Some("echo_unit"))
        })
        .await,
        "replacement unit never finished"
    );

    system.shutdown("test over").await;
}
