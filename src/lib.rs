//! Track whether players are connected to Minecraft servers.
//!
//! Presence is read over [Query](https://wiki.vg/Query) when a server has
//! it enabled (full player list) and over
//! [Server List Ping](https://wiki.vg/Server_List_Ping) otherwise (a
//! sample of up to about 12 names). Support for Query is probed once per
//! server and remembered.
//!
//! * [`status`] and [`query`] are the protocol clients.
//! * [`checker`] answers "is this player online" for one or all servers.
//! * [`monitor`] re-checks on a timer and reports transitions.
//! * [`config`] turns a deserialized config into the pieces above.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]

use std::time::Duration;

pub mod checker;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod query;
mod socket;
pub mod status;
pub mod target;
mod varint;

pub use checker::{CheckOutcome, PresenceChecker, ServerSnapshot};
pub use monitor::{MultiMonitor, RealtimeMonitor};
pub use query::{query, QueryResult};
pub use status::{ping, StatusPayload};
pub use target::{ServerTarget, TargetRegistry};

/// Timeout of a single protocol exchange unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
