//! Domain types shared between the audio manager and its API
//!
//! Devices and sinks are owned by the Bluetooth stack and the audio server.
//! These types are only observations of that external state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Bluetooth link-layer address, normalized to upper-case colon-hex
/// (`AA:BB:CC:DD:EE:FF`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(String);

impl Mac {
    /// Length of the colon-hex rendering
    pub const TEXT_LEN: usize = 17;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address with colons replaced by underscores, as embedded in
    /// audio server card and sink names
    pub fn underscored(&self) -> String {
        self.0.replace(':', "_")
    }

    /// Address with colons replaced by dashes, as echoed by the Bluetooth
    /// stack for devices that advertise no name
    pub fn dashed(&self) -> String {
        self.0.replace(':', "-")
    }
}

impl FromStr for Mac {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != Self::TEXT_LEN {
            return Err(Error::InvalidInput(format!(
                "MAC address must be {} characters: {:?}",
                Self::TEXT_LEN,
                s
            )));
        }

        let octets: Vec<&str> = s.split(':').collect();
        let well_formed = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

        if !well_formed {
            return Err(Error::InvalidInput(format!("Malformed MAC address: {:?}", s)));
        }

        Ok(Mac(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Mac {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mac> for String {
    fn from(mac: Mac) -> Self {
        mac.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Bluetooth device as reported by the Bluetooth stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub mac: Mac,
    pub name: String,
}

/// Connection state reported by the Bluetooth stack
///
/// Either fully populated (`connected = true` with address and name) or
/// fully empty. A half-populated connected record is never produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<Mac>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            mac: None,
            name: None,
        }
    }

    pub fn connected(mac: Mac, name: String) -> Self {
        Self {
            connected: true,
            mac: Some(mac),
            name: Some(name),
        }
    }
}

/// Audio backend family a sink belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Bluetooth A2DP sink created by the audio server's Bluetooth modules
    Bluetooth,
    /// On-board analog output (3.5mm jack)
    Onboard,
    /// Attached audio HAT
    Hat,
    Other,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Bluetooth => "bluetooth",
            BackendKind::Onboard => "onboard",
            BackendKind::Hat => "hat",
            BackendKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// An audio output endpoint observed in the audio server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sink {
    pub identifier: String,
    pub kind: BackendKind,
}

/// Stages of the pairing and audio activation workflow, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStage {
    Preconditions,
    Reset,
    Trust,
    Pair,
    Connect,
    AudioSettle,
    SinkWait,
    Activate,
}

impl PairingStage {
    pub fn label(&self) -> &'static str {
        match self {
            PairingStage::Preconditions => "preconditions",
            PairingStage::Reset => "reset",
            PairingStage::Trust => "trust",
            PairingStage::Pair => "pair",
            PairingStage::Connect => "connect",
            PairingStage::AudioSettle => "audio_settle",
            PairingStage::SinkWait => "sink_wait",
            PairingStage::Activate => "activate",
        }
    }
}

impl fmt::Display for PairingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
