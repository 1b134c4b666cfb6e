//! Text scraping of `bluetoothctl` and `pactl` output
//!
//! The Bluetooth stack and the audio server only offer free-text listings.
//! All pattern matching lives here so the rest of the crate works with typed
//! values, and so the rules can be tested against recorded output.

use bluemgr_common::config::PriorityEntry;
use bluemgr_common::{BackendKind, ConnectionStatus, Device, Mac, Sink};
use once_cell::sync::Lazy;
use regex::Regex;

/// `Device <MAC> <name>` anywhere in a line (also matches `[NEW] Device ...`)
static DEVICE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Device ([0-9A-F:]{17}) (.*)").expect("valid regex"));

static INFO_DEVICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Device ([0-9A-F:]{17})").expect("valid regex"));

static INFO_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"Name: (.*)").expect("valid regex"));

const CONNECTED_MARKER: &str = "Connected: yes";
const NO_DEVICE_MARKER: &str = "Missing device address";
const PROFILE_FAILURE_MARKER: &str = "Failure";

/// Name prefix of cards created by the audio server's Bluetooth modules
pub const BLUEZ_CARD_PREFIX: &str = "bluez_card.";

/// Name prefix of sinks created by the audio server's Bluetooth modules
pub const BLUEZ_SINK_PREFIX: &str = "bluez_sink.";

/// Extract named devices from a `bluetoothctl devices` style listing
///
/// Devices whose name is just their address with dashes are skipped: the
/// stack reports unnamed devices that way. Order is preserved and
/// duplicates are kept.
pub fn parse_devices(text: &str) -> Vec<Device> {
    text.lines()
        .filter_map(|line| {
            let caps = DEVICE_LINE.captures(line)?;
            let mac: Mac = caps[1].parse().ok()?;
            let name = caps[2].trim();

            if name.is_empty() || name == mac.dashed() {
                return None;
            }

            Some(Device {
                mac,
                name: name.to_string(),
            })
        })
        .collect()
}

/// First occurrence of `prefix` (case-insensitive), extended through
/// non-whitespace
fn find_token_from(prefix: &str, listing: &str) -> Option<String> {
    // ASCII folding keeps byte offsets aligned with `listing`
    let start = listing
        .to_ascii_lowercase()
        .find(&prefix.to_ascii_lowercase())?;
    let rest = &listing[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

/// Locate a sink identifier in a `pactl list sinks short` listing
pub fn find_sink_by_prefix(prefix: &str, listing: &str) -> Option<String> {
    find_token_from(prefix, listing)
}

/// Locate the Bluetooth card of a device in a `pactl list cards short` listing
pub fn find_card_for_mac(mac: &Mac, listing: &str) -> Option<String> {
    find_token_from(&format!("{}{}", BLUEZ_CARD_PREFIX, mac.underscored()), listing)
}

/// Locate the Bluetooth sink of a device in a `pactl list sinks short` listing
pub fn find_sink_for_mac(mac: &Mac, listing: &str) -> Option<String> {
    find_token_from(&format!("{}{}", BLUEZ_SINK_PREFIX, mac.underscored()), listing)
}

/// Case-insensitive substring test over a raw listing
pub fn contains_fragment(listing: &str, fragment: &str) -> bool {
    listing.to_lowercase().contains(&fragment.to_lowercase())
}

/// Interpret a `bluetoothctl info` block
///
/// Connected only if the address, the name and the connected marker are all
/// present; anything less is reported as not connected.
pub fn parse_connection_info(text: &str) -> ConnectionStatus {
    if text.contains(NO_DEVICE_MARKER) {
        return ConnectionStatus::disconnected();
    }

    let mac = INFO_DEVICE
        .captures(text)
        .and_then(|caps| caps[1].parse::<Mac>().ok());
    let name = INFO_NAME
        .captures(text)
        .map(|caps| caps[1].trim().to_string());

    match (mac, name) {
        (Some(mac), Some(name)) if reports_connected(text) => ConnectionStatus::connected(mac, name),
        _ => ConnectionStatus::disconnected(),
    }
}

/// Whether a device info block carries the connected marker
pub fn reports_connected(text: &str) -> bool {
    text.contains(CONNECTED_MARKER)
}

/// Stream identifiers from `pactl list sink-inputs short` (first column)
pub fn parse_stream_ids(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Whether `pactl set-card-profile` output reports a rejection
pub fn profile_rejected(text: &str) -> bool {
    text.contains(PROFILE_FAILURE_MARKER)
}

/// Whether a module name appears in `pactl list modules short`
pub fn module_loaded(listing: &str, module: &str) -> bool {
    listing.contains(module)
}

/// Backend class of a sink identifier: the first priority entry whose
/// fragment it contains, otherwise [`BackendKind::Other`]
pub fn classify_sink(identifier: &str, priorities: &[PriorityEntry]) -> BackendKind {
    priorities
        .iter()
        .find(|p| contains_fragment(identifier, &p.prefix))
        .map(|p| p.kind)
        .unwrap_or(BackendKind::Other)
}

/// Typed sinks from `pactl list sinks short` (name is the second column)
pub fn parse_sinks(listing: &str, priorities: &[PriorityEntry]) -> Vec<Sink> {
    listing
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let first = columns.next()?;
            let identifier = columns.next().unwrap_or(first);
            Some(Sink {
                identifier: identifier.to_string(),
                kind: classify_sink(identifier, priorities),
            })
        })
        .collect()
}

/// Lines containing `needle`, case-insensitive
pub fn filter_lines(text: &str, needle: &str) -> String {
    text.lines()
        .filter(|line| contains_fragment(line, needle))
        .map(|line| format!("{}\n", line))
        .collect()
}
