//! Collaborators that remember what they were told.

use super::{Collaborators, HistoryStore, MonitorEvent, Notifier};
use crate::checker::testing::ScriptedTransport;
use crate::checker::{CheckerOptions, PresenceChecker};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Records every event in arrival order. Optionally fails each call
/// after recording it, or panics on the first offline event.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<MonitorEvent>>,
    failing: bool,
    panic_on_offline: AtomicBool,
}

impl Recorder {
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Panics instead of recording the first offline event.
    pub(crate) fn panicking_once() -> Self {
        Self {
            panic_on_offline: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub(crate) fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Everything except history samples.
    pub(crate) fn notifications(&self) -> Vec<MonitorEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, MonitorEvent::Sample { .. }))
            .collect()
    }

    pub(crate) fn samples(&self) -> usize {
        self.events().len() - self.notifications().len()
    }

    fn push(&self, event: MonitorEvent) -> Result<(), CollaboratorError> {
        self.events.lock().unwrap().push(event);
        if self.failing {
            Err("recorder refuses".into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for Recorder {
    async fn on_player_online(&self, player: &str, server: &str) -> Result<(), CollaboratorError> {
        self.push(MonitorEvent::PlayerOnline {
            player: player.into(),
            server: server.into(),
        })
    }

    async fn on_player_offline(&self, player: &str, server: &str) -> Result<(), CollaboratorError> {
        if self.panic_on_offline.swap(false, Ordering::SeqCst) {
            panic!("notifier blew up");
        }
        self.push(MonitorEvent::PlayerOffline {
            player: player.into(),
            server: server.into(),
        })
    }

    async fn on_server_up(&self, server: &str) -> Result<(), CollaboratorError> {
        self.push(MonitorEvent::ServerUp {
            server: server.into(),
        })
    }

    async fn on_server_down(&self, server: &str, error: &str) -> Result<(), CollaboratorError> {
        self.push(MonitorEvent::ServerDown {
            server: server.into(),
            error: error.into(),
        })
    }
}

#[async_trait]
impl HistoryStore for Recorder {
    async fn record(
        &self,
        player: &str,
        server: &str,
        online: bool,
        online_count: u32,
    ) -> Result<(), CollaboratorError> {
        self.push(MonitorEvent::Sample {
            player: player.into(),
            server: server.into(),
            online,
            online_count,
        })
    }
}

/// Both collaborators backed by the same recorder.
pub(crate) fn recording(recorder: &Arc<Recorder>) -> Collaborators {
    Collaborators::new(recorder.clone(), recorder.clone())
}

pub(crate) fn scripted_checker(transport: &Arc<ScriptedTransport>) -> PresenceChecker {
    PresenceChecker::new(transport.clone(), CheckerOptions::default())
}
