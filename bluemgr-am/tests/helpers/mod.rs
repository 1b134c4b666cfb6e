//! Shared test helpers for bluemgr-am integration tests
//!
//! [`SimulatedSystem`] stands in for `bluetoothctl`, `pactl` and the audio
//! server daemon. It models the audio server state that the configurator and
//! arbitrator mutate (sinks, default, volumes, mutes, streams, modules) and
//! lets a test script exact responses for any command line. A scripted
//! command answers with its responses in order; the last one repeats.
//! `set-default-sink` fails for a name that neither the modelled sinks nor
//! any answered sink listing contain.

#![allow(dead_code)]

use async_trait::async_trait;
use bluemgr_am::executor::{CommandLine, CommandOutcome, CommandRunner};
use bluemgr_am::retry::Sleeper;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub const SPEAKER_MAC: &str = "00:1B:66:AA:BB:CC";
pub const SPEAKER_CARD: &str = "bluez_card.00_1B_66_AA_BB_CC";
pub const SPEAKER_SINK: &str = "bluez_sink.00_1B_66_AA_BB_CC.a2dp_sink";
pub const ONBOARD_SINK: &str = "alsa_output.platform-bcm2835_audio.analog-stereo";
pub const HAT_SINK: &str = "alsa_output.platform-soc_sound.googlevoicehat-soundcard";

#[derive(Default)]
struct SimState {
    sinks: Vec<String>,
    /// Sink names seen in scripted listings
    announced: HashSet<String>,
    default_sink: String,
    volumes: HashMap<String, u8>,
    muted: HashMap<String, bool>,
    /// Stream id -> sink
    streams: BTreeMap<String, String>,
    modules: Vec<String>,
    scripts: HashMap<String, VecDeque<CommandOutcome>>,
    calls: Vec<String>,
    detached: Vec<String>,
}

/// Simulated subsystems behind the [`CommandRunner`] seam
#[derive(Default)]
pub struct SimulatedSystem {
    state: Mutex<SimState>,
}

impl SimulatedSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio server with the Bluetooth modules loaded
    pub fn with_bluetooth_modules() -> Self {
        let sim = Self::new();
        sim.load_module("module-bluetooth-discover");
        sim.load_module("module-bluetooth-policy");
        sim
    }

    pub fn add_sink(&self, sink: &str) {
        self.state.lock().unwrap().sinks.push(sink.to_string());
    }

    pub fn remove_sink(&self, sink: &str) {
        self.state.lock().unwrap().sinks.retain(|s| s != sink);
    }

    pub fn set_default(&self, sink: &str) {
        self.state.lock().unwrap().default_sink = sink.to_string();
    }

    pub fn add_stream(&self, id: &str, sink: &str) {
        self.state
            .lock()
            .unwrap()
            .streams
            .insert(id.to_string(), sink.to_string());
    }

    pub fn load_module(&self, module: &str) {
        self.state.lock().unwrap().modules.push(module.to_string());
    }

    /// Answer `command` with `responses` in order, repeating the last
    pub fn script(&self, command: &str, responses: Vec<CommandOutcome>) {
        assert!(!responses.is_empty(), "script needs at least one response");
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(command.to_string(), responses.into());
    }

    pub fn default_sink(&self) -> String {
        self.state.lock().unwrap().default_sink.clone()
    }

    pub fn volume(&self, sink: &str) -> Option<u8> {
        self.state.lock().unwrap().volumes.get(sink).copied()
    }

    pub fn is_muted(&self, sink: &str) -> Option<bool> {
        self.state.lock().unwrap().muted.get(sink).copied()
    }

    pub fn stream_sink(&self, id: &str) -> Option<String> {
        self.state.lock().unwrap().streams.get(id).cloned()
    }

    pub fn modules(&self) -> Vec<String> {
        self.state.lock().unwrap().modules.clone()
    }

    /// Every executed command line, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Fire-and-forget command lines
    pub fn detached(&self) -> Vec<String> {
        self.state.lock().unwrap().detached.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl SimState {
    fn sinks_listing(&self) -> String {
        self.sinks
            .iter()
            .enumerate()
            .map(|(i, sink)| format!("{}\t{}\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tSUSPENDED\n", i, sink))
            .collect()
    }

    fn streams_listing(&self) -> String {
        self.streams
            .iter()
            .map(|(id, sink)| {
                let index = self.sinks.iter().position(|s| s == sink).unwrap_or(0);
                format!("{}\t{}\t7\tprotocol-native.c\tfloat32le 2ch 44100Hz\n", id, index)
            })
            .collect()
    }

    fn modules_listing(&self) -> String {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, module)| format!("{}\t{}\t\t\n", i + 20, module))
            .collect()
    }

    fn scripted(&mut self, key: &str) -> Option<CommandOutcome> {
        let queue = self.scripts.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn pactl(&mut self, args: &[&str]) -> CommandOutcome {
        match args {
            ["list", "sinks", "short"] => CommandOutcome::Ok(self.sinks_listing()),
            ["list", "sink-inputs", "short"] => CommandOutcome::Ok(self.streams_listing()),
            ["list", "modules", "short"] => CommandOutcome::Ok(self.modules_listing()),
            ["list", "cards", "short"] => CommandOutcome::Ok(String::new()),
            ["get-default-sink"] => CommandOutcome::Ok(format!("{}\n", self.default_sink)),
            ["set-default-sink", sink] => {
                if self.sinks.iter().any(|s| s == sink) || self.announced.contains(*sink) {
                    self.default_sink = sink.to_string();
                    CommandOutcome::Ok(String::new())
                } else {
                    CommandOutcome::Failed("Failure: No such entity".to_string())
                }
            }
            ["set-sink-volume", sink, volume] => match volume.trim_end_matches('%').parse::<u8>() {
                Ok(v) => {
                    self.volumes.insert(sink.to_string(), v);
                    CommandOutcome::Ok(String::new())
                }
                Err(_) => CommandOutcome::Failed("Invalid volume specification".to_string()),
            },
            ["set-sink-mute", sink, flag] => {
                self.muted.insert(sink.to_string(), *flag != "0");
                CommandOutcome::Ok(String::new())
            }
            ["move-sink-input", id, sink] => match self.streams.get_mut(*id) {
                Some(current) => {
                    *current = sink.to_string();
                    CommandOutcome::Ok(String::new())
                }
                None => CommandOutcome::Failed("Failure: No such entity".to_string()),
            },
            ["load-module", module] => {
                if self.modules.iter().any(|m| m == module) {
                    CommandOutcome::Failed("Failure: Module initialization failed".to_string())
                } else {
                    self.modules.push(module.to_string());
                    CommandOutcome::Ok(format!("{}\n", self.modules.len() + 20))
                }
            }
            ["unload-module", module] => {
                let before = self.modules.len();
                self.modules.retain(|m| m != module);
                if self.modules.len() < before {
                    CommandOutcome::Ok(String::new())
                } else {
                    CommandOutcome::Failed("Failure: No such entity".to_string())
                }
            }
            _ => CommandOutcome::Ok(String::new()),
        }
    }
}

#[async_trait]
impl CommandRunner for SimulatedSystem {
    async fn execute(&self, command: &CommandLine) -> CommandOutcome {
        let key = command.to_string();
        let mut state = self.state.lock().unwrap();
        state.calls.push(key.clone());

        if let Some(outcome) = state.scripted(&key) {
            if let (CommandOutcome::Ok(listing), "pactl list sinks short") = (&outcome, key.as_str()) {
                let names: Vec<String> = listing
                    .lines()
                    .filter_map(|line| line.split_whitespace().nth(1))
                    .map(str::to_string)
                    .collect();
                state.announced.extend(names);
            }
            return outcome;
        }

        let args: Vec<&str> = command.arguments().iter().map(String::as_str).collect();
        match command.program() {
            "pactl" => state.pactl(&args),
            "bluetoothctl" if args == ["info"] => {
                CommandOutcome::Failed("Missing device address argument\n".to_string())
            }
            _ => CommandOutcome::Ok(String::new()),
        }
    }

    fn spawn_detached(&self, command: &CommandLine) {
        self.state.lock().unwrap().detached.push(command.to_string());
    }
}

/// [`Sleeper`] that records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// `bluetoothctl info <MAC>` text for a connected device
pub fn connected_info(mac: &str, name: &str) -> String {
    format!(
        "Device {mac} (public)\n\tName: {name}\n\tAlias: {name}\n\tPaired: yes\n\tTrusted: yes\n\tConnected: yes\n"
    )
}

/// `bluetoothctl info <MAC>` text for a known but disconnected device
pub fn disconnected_info(mac: &str, name: &str) -> String {
    format!(
        "Device {mac} (public)\n\tName: {name}\n\tAlias: {name}\n\tPaired: yes\n\tTrusted: yes\n\tConnected: no\n"
    )
}

/// One `pactl list cards short` line
pub fn card_line(card: &str) -> String {
    format!("3\t{}\tmodule-bluez5-device.c\n", card)
}

/// One `pactl list sinks short` line
pub fn sink_line(index: usize, sink: &str) -> String {
    format!("{}\t{}\tmodule-bluez5-device.c\ts16le 2ch 44100Hz\tSUSPENDED\n", index, sink)
}
