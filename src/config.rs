//! Typed monitor configuration.
//!
//! [`MonitorSettings`] deserializes from any serde format; every field has
//! a default. [`MonitorSettings::resolve`] validates it and builds the
//! pieces the checker and monitors need.
//!
//! ```
//! use mc_presence::config::MonitorSettings;
//!
//! let settings: MonitorSettings = serde_json::from_str(
//!     r#"{ "servers": [{ "name": "lobby", "host": "mc.example.com" }] }"#,
//! )
//! .unwrap();
//!
//! let resolved = settings.resolve().unwrap();
//! assert_eq!(resolved.registry.default_target().port(), 25565);
//! ```

use crate::{
    checker::{CheckerOptions, NetworkTransport, PresenceChecker},
    errors::UsageError,
    monitor::{Collaborators, HistoryPolicy, Intervals, MultiMonitor, RealtimeMonitor},
    target::{QuerySupport, ServerTarget, TargetRegistry},
};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};

/// Port Minecraft servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 25565;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// One configured server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Display name, unique ignoring case.
    pub name: String,
    /// Hostname or IP address.
    pub host: String,
    /// Used for both protocols.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Known Query support; probed on first use when absent.
    #[serde(default)]
    pub query: Option<bool>,
}

/// Everything configurable, as read from a config source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Servers in order; the first one is the default target.
    pub servers: Vec<ServerSettings>,
    /// Period of the interactive loop.
    pub interactive_interval_secs: u64,
    /// Period of the background loop.
    pub background_interval_secs: u64,
    /// Timeout of each protocol exchange. A check gets twice this, room
    /// for a query and a status ping.
    pub protocol_timeout_ms: u64,
    /// Per-target wait when checking all servers at once.
    pub fan_out_ceiling_ms: u64,
    /// Checks running at once when checking all servers.
    pub worker_pool_size: usize,
    /// Which ticks are written to history.
    pub history_policy: HistoryPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let intervals = Intervals::default();
        let checker = CheckerOptions::default();

        Self {
            servers: Vec::new(),
            interactive_interval_secs: intervals.interactive.as_secs(),
            background_interval_secs: intervals.background.as_secs(),
            protocol_timeout_ms: crate::DEFAULT_TIMEOUT.as_millis() as u64,
            fan_out_ceiling_ms: checker.ceiling.as_millis() as u64,
            worker_pool_size: checker.pool_size,
            history_policy: HistoryPolicy::default(),
        }
    }
}

/// Validated settings, ready to build a checker and monitors from.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// The configured servers.
    pub registry: TargetRegistry,
    /// Loop periods.
    pub intervals: Intervals,
    /// Fan-out tuning.
    pub checker: CheckerOptions,
    /// Timeout of each protocol exchange.
    pub protocol_timeout: Duration,
    /// Which ticks are written to history.
    pub history_policy: HistoryPolicy,
}

fn non_zero(value: u64, what: &'static str, unit: fn(u64) -> Duration) -> Result<Duration, UsageError> {
    if value == 0 {
        Err(UsageError::InvalidInterval { what })
    } else {
        Ok(unit(value))
    }
}

impl MonitorSettings {
    /// Check the settings and build the registry and options from them.
    ///
    /// # Errors
    /// * [`UsageError::NoTargets`] without servers
    /// * [`UsageError::DuplicateTarget`] for two servers with the same name
    /// * [`UsageError::InvalidPort`] for port 0
    /// * [`UsageError::InvalidInterval`] for a zero interval or timeout, or a
    ///   fan-out ceiling not above the time one check may take
    pub fn resolve(&self) -> Result<ResolvedSettings, UsageError> {
        let targets = self
            .servers
            .iter()
            .map(|server| -> Result<_, UsageError> {
                let target = ServerTarget::new(&*server.name, &*server.host, server.port)?;
                Ok(Arc::new(match server.query {
                    Some(true) => target.with_query_support(QuerySupport::Supported),
                    Some(false) => target.with_query_support(QuerySupport::Unsupported),
                    None => target,
                }))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let registry = TargetRegistry::new(targets)?;

        let intervals = Intervals {
            interactive: non_zero(
                self.interactive_interval_secs,
                "interactive_interval_secs",
                Duration::from_secs,
            )?,
            background: non_zero(
                self.background_interval_secs,
                "background_interval_secs",
                Duration::from_secs,
            )?,
        };

        let protocol_timeout = non_zero(
            self.protocol_timeout_ms,
            "protocol_timeout_ms",
            Duration::from_millis,
        )?;
        let check_timeout = protocol_timeout.saturating_mul(2);
        let ceiling = Duration::from_millis(self.fan_out_ceiling_ms);
        if ceiling <= check_timeout {
            return Err(UsageError::InvalidInterval {
                what: "fan_out_ceiling_ms",
            });
        }

        Ok(ResolvedSettings {
            registry,
            intervals,
            checker: CheckerOptions {
                pool_size: self.worker_pool_size,
                ceiling,
                check_timeout,
            },
            protocol_timeout,
            history_policy: self.history_policy,
        })
    }
}

impl ResolvedSettings {
    /// A checker talking to real servers.
    #[must_use]
    pub fn checker(&self) -> PresenceChecker {
        PresenceChecker::new(
            Arc::new(NetworkTransport::new(self.protocol_timeout)),
            self.checker,
        )
    }

    /// A stopped single-target monitor.
    #[must_use]
    pub fn realtime_monitor(&self, collaborators: Collaborators) -> RealtimeMonitor {
        RealtimeMonitor::new(self.checker(), collaborators, self.history_policy)
    }

    /// A multi-target monitor with both loops stopped.
    #[must_use]
    pub fn multi_monitor(&self, collaborators: Collaborators) -> MultiMonitor {
        MultiMonitor::new(
            self.registry.clone(),
            self.checker(),
            collaborators,
            self.history_policy,
            self.intervals,
        )
    }
}
