//! `shipproto`: JSON message types shared by slopship services.
//!
//! Everything here crosses a process boundary: HTTP request/response bodies,
//! the WebSocket protocol, and the outcome envelope the engine hands back for
//! every command. Keeping these in one small crate means the engine and the
//! web front door cannot drift apart.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Commands longer than this are truncated before they reach the model.
pub const MAX_COMMAND_LEN: usize = 1000;

/// A spoken command from one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub text: String,
    pub user_id: String,
}

/// What the engine decided: state deltas plus the line the computer speaks.
///
/// `updates` only ever contains ship system gauges. `rank_up` carries the new
/// rank title when this command completed a mission. `alert` and
/// `required_location` let the client render denials without parsing prose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    #[serde(default)]
    pub updates: BTreeMap<String, i64>,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_location: Option<String>,
}

impl CommandOutcome {
    /// A response with no state changes attached.
    pub fn say(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub name: String,
}

/// `token` is the base64-encoded location name scanned from a terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiationToggle {
    pub token: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub rank: String,
    pub xp: i64,
}

/// Places a crew member can be. Sensitive commands are bound to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Bridge,
    Engineering,
    Sickbay,
    #[serde(rename = "Cargo Bay")]
    CargoBay,
    #[serde(rename = "Jefferies Tube")]
    JefferiesTube,
}

impl Location {
    pub const ALL: [Location; 5] = [
        Location::Bridge,
        Location::Engineering,
        Location::Sickbay,
        Location::CargoBay,
        Location::JefferiesTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Bridge => "Bridge",
            Location::Engineering => "Engineering",
            Location::Sickbay => "Sickbay",
            Location::CargoBay => "Cargo Bay",
            Location::JefferiesTube => "Jefferies Tube",
        }
    }

    pub fn parse(s: &str) -> Option<Location> {
        let s = s.trim();
        Location::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages a WebSocket client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientMsg {
    Command { text: String, user_id: String },
    Ping {},
}

/// Messages the server pushes to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerMsg {
    Hello { mode: String },
    Outcome { outcome: CommandOutcome },
    State { systems: BTreeMap<String, i64> },
    Alert { alert: String, message: String },
    Err { text: String },
    Pong {},
}
