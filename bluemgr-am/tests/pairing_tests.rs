//! Pairing workflow tests against simulated subsystems

mod helpers;

use bluemgr_am::executor::CommandOutcome;
use bluemgr_am::manager::AudioManager;
use bluemgr_am::retry::Sleeper;
use bluemgr_am::Error;
use bluemgr_common::config::TomlConfig;
use bluemgr_common::events::{EventBus, ManagerEvent};
use bluemgr_common::{ActionStatus, PairingStage};
use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

fn manager(sim: &Arc<SimulatedSystem>, sleeper: Arc<dyn Sleeper>, events: &EventBus) -> AudioManager {
    AudioManager::new(sim.clone(), sleeper, &TomlConfig::default(), events.clone())
}

/// Speaker that connects immediately
fn connected_speaker() -> Arc<SimulatedSystem> {
    let sim = Arc::new(SimulatedSystem::with_bluetooth_modules());
    sim.add_sink(ONBOARD_SINK);
    sim.set_default(ONBOARD_SINK);
    sim.script(
        &format!("bluetoothctl info {}", SPEAKER_MAC),
        vec![CommandOutcome::Ok(connected_info(SPEAKER_MAC, "JBL Flip 5"))],
    );
    sim
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ManagerEvent>) -> Vec<ManagerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_connect_exhaustion_reports_error_and_removes_pairing() {
    let sim = Arc::new(SimulatedSystem::with_bluetooth_modules());
    sim.script(
        &format!("bluetoothctl info {}", SPEAKER_MAC),
        vec![CommandOutcome::Ok(disconnected_info(SPEAKER_MAC, "JBL Flip 5"))],
    );
    let sleeper = Arc::new(RecordingSleeper::new());
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let manager = manager(&sim, sleeper.clone(), &events);

    let result = manager.pair(SPEAKER_MAC).await.unwrap();

    assert_eq!(result.status, ActionStatus::Error);
    assert_eq!(sim.count(&format!("bluetoothctl connect {}", SPEAKER_MAC)), 5);

    // Once in RESET, once after giving up
    let remove = format!("bluetoothctl remove {}", SPEAKER_MAC);
    assert_eq!(sim.count(&remove), 2);
    assert_eq!(sim.calls().last(), Some(&remove));

    // No audio stage was reached
    assert_eq!(sim.count("pactl list cards short"), 0);
    assert!(sim.detached().is_empty());

    // 2 s between attempts, none after the last
    let retry_delays = sleeper
        .delays()
        .into_iter()
        .filter(|d| *d == Duration::from_secs(2))
        .count();
    assert_eq!(retry_delays, 4);

    let connect_attempts: Vec<u32> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ManagerEvent::PairingStageEntered {
                stage: PairingStage::Connect,
                attempt,
                ..
            } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(connect_attempts, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_connect_succeeds_on_third_attempt() {
    let sim = connected_speaker();
    sim.script(
        &format!("bluetoothctl info {}", SPEAKER_MAC),
        vec![
            CommandOutcome::Ok(disconnected_info(SPEAKER_MAC, "JBL Flip 5")),
            CommandOutcome::Ok(disconnected_info(SPEAKER_MAC, "JBL Flip 5")),
            CommandOutcome::Ok(connected_info(SPEAKER_MAC, "JBL Flip 5")),
        ],
    );
    sim.script(
        "pactl list cards short",
        vec![CommandOutcome::Ok(card_line(SPEAKER_CARD))],
    );
    sim.script(
        "pactl list sinks short",
        vec![CommandOutcome::Ok(sink_line(1, SPEAKER_SINK))],
    );
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &EventBus::new(256));

    let result = manager.pair(SPEAKER_MAC).await.unwrap();

    assert_eq!(result.status, ActionStatus::Success);
    assert_eq!(sim.count(&format!("bluetoothctl connect {}", SPEAKER_MAC)), 3);
    assert_eq!(sim.count(&format!("bluetoothctl remove {}", SPEAKER_MAC)), 1);
}

#[tokio::test]
async fn test_card_on_poll_20_and_sink_on_poll_21_succeeds() {
    let sim = connected_speaker();
    sim.add_stream("42", ONBOARD_SINK);

    let mut cards = vec![CommandOutcome::Ok(String::new()); 19];
    cards.push(CommandOutcome::Ok(card_line(SPEAKER_CARD)));
    sim.script("pactl list cards short", cards);

    let onboard = sink_line(0, ONBOARD_SINK);
    sim.script(
        "pactl list sinks short",
        vec![
            CommandOutcome::Ok(onboard.clone()),
            CommandOutcome::Ok(format!("{}{}", onboard, sink_line(1, SPEAKER_SINK))),
        ],
    );

    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &events);

    let result = manager.pair(SPEAKER_MAC).await.unwrap();

    assert_eq!(result.status, ActionStatus::Success, "{}", result.message);
    assert!(result.message.contains(SPEAKER_SINK));
    assert_eq!(result.data.unwrap()["sink"], SPEAKER_SINK);

    assert_eq!(sim.count("pactl list cards short"), 21);
    assert_eq!(sim.count("pactl list sinks short"), 2);

    // First profile accepted on both polls that found the card
    let profile = format!("pactl set-card-profile {} a2dp-sink", SPEAKER_CARD);
    assert_eq!(sim.count(&profile), 2);
    assert_eq!(sim.count_prefix("pactl set-card-profile"), 2);

    // Activated at the pairing volume, streams follow
    assert_eq!(sim.default_sink(), SPEAKER_SINK);
    assert_eq!(sim.volume(SPEAKER_SINK), Some(80));
    assert_eq!(sim.is_muted(SPEAKER_SINK), Some(false));
    assert_eq!(sim.stream_sink("42").as_deref(), Some(SPEAKER_SINK));

    assert_eq!(sim.detached(), vec!["sudo systemctl restart raspotify".to_string()]);

    let events = drain(&mut rx);
    let last_poll = events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::PairingStageEntered {
                stage: PairingStage::SinkWait,
                attempt,
                ..
            } => Some(*attempt),
            _ => None,
        })
        .max();
    assert_eq!(last_poll, Some(21));
    assert!(matches!(
        events.last(),
        Some(ManagerEvent::PairingFinished {
            status: ActionStatus::Success,
            ..
        })
    ));
}

#[tokio::test]
async fn test_modules_reloaded_after_connect() {
    let sim = connected_speaker();
    sim.script(
        "pactl list cards short",
        vec![CommandOutcome::Ok(card_line(SPEAKER_CARD))],
    );
    sim.script(
        "pactl list sinks short",
        vec![CommandOutcome::Ok(sink_line(1, SPEAKER_SINK))],
    );
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &EventBus::new(256));

    manager.pair(SPEAKER_MAC).await.unwrap();

    let calls = sim.calls();
    let connect = calls
        .iter()
        .position(|c| c.starts_with("bluetoothctl connect"))
        .unwrap();
    let unload = calls
        .iter()
        .position(|c| c == "pactl unload-module module-bluetooth-discover")
        .unwrap();
    let load = calls
        .iter()
        .rposition(|c| c == "pactl load-module module-bluetooth-policy")
        .unwrap();
    assert!(connect < unload && unload < load);

    let mut modules = sim.modules();
    modules.sort();
    assert_eq!(modules, vec!["module-bluetooth-discover", "module-bluetooth-policy"]);
}

#[tokio::test]
async fn test_rejected_profiles_are_all_tried() {
    let sim = connected_speaker();
    sim.script(
        "pactl list cards short",
        vec![CommandOutcome::Ok(card_line(SPEAKER_CARD))],
    );
    sim.script(
        &format!("pactl set-card-profile {} a2dp-sink", SPEAKER_CARD),
        vec![CommandOutcome::Failed("Failure: No such entity".to_string())],
    );
    sim.script(
        &format!("pactl set-card-profile {} a2dp_sink", SPEAKER_CARD),
        vec![CommandOutcome::Ok("Failure: Invalid argument".to_string())],
    );
    sim.script(
        "pactl list sinks short",
        vec![CommandOutcome::Ok(sink_line(1, SPEAKER_SINK))],
    );
    let sleeper = Arc::new(RecordingSleeper::new());
    let manager = manager(&sim, sleeper.clone(), &EventBus::new(256));

    let result = manager.pair(SPEAKER_MAC).await.unwrap();

    assert_eq!(result.status, ActionStatus::Success);
    assert_eq!(sim.count_prefix("pactl set-card-profile"), 3);
    assert_eq!(
        sim.count(&format!("pactl set-card-profile {} a2dp", SPEAKER_CARD)),
        1
    );

    let backoffs = sleeper
        .delays()
        .into_iter()
        .filter(|d| *d == Duration::from_millis(300))
        .count();
    assert_eq!(backoffs, 2);
}

#[tokio::test]
async fn test_missing_sink_reports_partial_activation() {
    let sim = connected_speaker();
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &EventBus::new(256));

    let result = manager.pair(SPEAKER_MAC).await.unwrap();

    assert_eq!(result.status, ActionStatus::Warning);
    assert!(!result.message.contains("bluez"));
    assert!(result.data.is_none());

    // 25 polls plus the diagnostic snapshot
    assert_eq!(sim.count("pactl list cards short"), 26);
    assert_eq!(sim.default_sink(), ONBOARD_SINK);
    assert!(sim.detached().is_empty());
}

#[tokio::test]
async fn test_failed_activation_downgrades_to_warning() {
    let sim = connected_speaker();
    sim.script(
        "pactl list cards short",
        vec![CommandOutcome::Ok(card_line(SPEAKER_CARD))],
    );
    sim.script(
        "pactl list sinks short",
        vec![CommandOutcome::Ok(sink_line(1, SPEAKER_SINK))],
    );
    sim.script(
        &format!("pactl set-default-sink {}", SPEAKER_SINK),
        vec![CommandOutcome::Failed("Failure: No such entity".to_string())],
    );
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &EventBus::new(256));

    let result = manager.pair(SPEAKER_MAC).await.unwrap();

    assert_eq!(result.status, ActionStatus::Warning);
    assert_eq!(sim.default_sink(), ONBOARD_SINK);
    assert!(sim.detached().is_empty());
}

#[tokio::test]
async fn test_invalid_mac_rejected_before_any_command() {
    let sim = Arc::new(SimulatedSystem::new());
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &EventBus::new(16));

    for bad in ["", "AA:BB:CC:DD:EE", "AA-BB-CC-DD-EE-FF", "GG:BB:CC:DD:EE:FF"] {
        let err = manager.pair(bad).await.unwrap_err();
        assert!(matches!(err, Error::InvalidMac(_)), "{:?}", err);
    }
    assert!(sim.calls().is_empty());
}

/// Blocks every sleep until released
struct GateSleeper {
    entered: Notify,
    gate: Semaphore,
}

impl GateSleeper {
    fn closed() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Sleeper for GateSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.entered.notify_one();
        let _permit = self.gate.acquire().await;
    }
}

#[tokio::test]
async fn test_concurrent_pairing_rejected() {
    let sim = connected_speaker();
    let sleeper = Arc::new(GateSleeper::closed());
    let manager = Arc::new(manager(&sim, sleeper.clone(), &EventBus::new(256)));

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.pair(SPEAKER_MAC).await })
    };

    // First request is parked in its RESET settle
    sleeper.entered.notified().await;
    assert!(manager.workflow().is_busy());

    let second = manager.pair(SPEAKER_MAC).await;
    assert!(matches!(second, Err(Error::PairingBusy)));

    sleeper.gate.add_permits(1);
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, ActionStatus::Warning);
    assert!(!manager.workflow().is_busy());
}

#[tokio::test]
async fn test_disconnect_falls_back_to_onboard() {
    let sim = Arc::new(SimulatedSystem::with_bluetooth_modules());
    sim.add_sink(HAT_SINK);
    sim.add_sink(SPEAKER_SINK);
    sim.add_sink(ONBOARD_SINK);
    sim.set_default(SPEAKER_SINK);
    sim.add_stream("7", SPEAKER_SINK);

    let sleeper = Arc::new(RecordingSleeper::new());
    let events = EventBus::new(16);
    let mut rx = events.subscribe();
    let manager = manager(&sim, sleeper.clone(), &events);

    let result = manager.disconnect().await;

    assert_eq!(result.status, ActionStatus::Success);
    assert_eq!(result.data.unwrap()["fallback"], ONBOARD_SINK);
    assert_eq!(sim.count("bluetoothctl disconnect"), 1);
    assert_eq!(sim.default_sink(), ONBOARD_SINK);
    assert_eq!(sim.volume(ONBOARD_SINK), Some(80));
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);

    match drain(&mut rx).as_slice() {
        [ManagerEvent::BluetoothDisconnected { fallback, .. }] => {
            assert_eq!(fallback.as_deref(), Some(ONBOARD_SINK));
        }
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_without_fallback_sink() {
    let sim = Arc::new(SimulatedSystem::new());
    sim.add_sink(SPEAKER_SINK);
    sim.set_default(SPEAKER_SINK);
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &EventBus::new(16));

    let result = manager.disconnect().await;

    assert_eq!(result.status, ActionStatus::Success);
    assert!(result.data.is_none());
    assert_eq!(sim.count_prefix("pactl set-default-sink"), 0);
}

#[tokio::test]
async fn test_disconnect_with_failed_fallback_is_warning() {
    let sim = Arc::new(SimulatedSystem::new());
    sim.add_sink(ONBOARD_SINK);
    sim.set_default(SPEAKER_SINK);
    sim.script(
        &format!("pactl set-default-sink {}", ONBOARD_SINK),
        vec![CommandOutcome::Failed("Failure: No such entity".to_string())],
    );

    let events = EventBus::new(16);
    let mut rx = events.subscribe();
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &events);

    let result = manager.disconnect().await;

    assert_eq!(result.status, ActionStatus::Warning);
    assert!(result.data.is_none());
    assert_eq!(sim.count("bluetoothctl disconnect"), 1);
    assert_eq!(sim.count_prefix("pactl set-sink-volume"), 0);

    match drain(&mut rx).as_slice() {
        [ManagerEvent::BluetoothDisconnected { fallback, .. }] => assert!(fallback.is_none()),
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_with_unreadable_sinks_is_warning() {
    let sim = Arc::new(SimulatedSystem::new());
    sim.script("pactl list sinks short", vec![CommandOutcome::TimedOut]);
    let manager = manager(&sim, Arc::new(RecordingSleeper::new()), &EventBus::new(16));

    let result = manager.disconnect().await;

    assert_eq!(result.status, ActionStatus::Warning);
    assert_eq!(sim.count("bluetoothctl disconnect"), 1);
}
