//! Real-time monitoring: re-check players on a timer and report changes.
//!
//! Every monitored player keeps exactly one previous [`CheckOutcome`]. Each
//! tick compares the new outcome with it and emits [`MonitorEvent`]s:
//!
//! * previous and current both succeeded, `online` differs: player online/offline
//! * previous succeeded, current failed: server down
//! * previous failed, current succeeded: server up
//!
//! Events go to a [`Notifier`] and a [`HistoryStore`] from a dispatcher
//! task, so a slow or failing collaborator never holds up a tick.

mod multi;
mod single;

#[cfg(test)]
pub(crate) mod testing;

pub use self::multi::{
    Intervals, MultiMonitor, DEFAULT_BACKGROUND_INTERVAL, DEFAULT_INTERACTIVE_INTERVAL,
};
pub use self::single::RealtimeMonitor;

use crate::{
    checker::{CheckOutcome, PresenceChecker},
    errors::{CollaboratorError, FailureKind, UsageError},
    target::{QuerySupport, ServerTarget},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    time::{interval, MissedTickBehavior},
};

/// Receives presence and reachability changes.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `player` was seen joining `server`.
    async fn on_player_online(&self, player: &str, server: &str) -> Result<(), CollaboratorError>;

    /// `player` was seen leaving `server`.
    async fn on_player_offline(&self, player: &str, server: &str) -> Result<(), CollaboratorError>;

    /// `server` answers again after failing.
    async fn on_server_up(&self, server: &str) -> Result<(), CollaboratorError>;

    /// `server` stopped answering; `error` says how.
    async fn on_server_down(&self, server: &str, error: &str) -> Result<(), CollaboratorError>;
}

/// Append-only store of presence samples.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record that `player` was (or was not) on `server` alongside `online_count` others.
    async fn record(
        &self,
        player: &str,
        server: &str,
        online: bool,
        online_count: u32,
    ) -> Result<(), CollaboratorError>;
}

/// A [`Notifier`] and [`HistoryStore`] that drop everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

#[async_trait]
impl Notifier for Discard {
    async fn on_player_online(&self, _: &str, _: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn on_player_offline(&self, _: &str, _: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn on_server_up(&self, _: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn on_server_down(&self, _: &str, _: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for Discard {
    async fn record(&self, _: &str, _: &str, _: bool, _: u32) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Where monitor events end up.
#[derive(Clone)]
pub struct Collaborators {
    /// Gets online/offline and up/down events.
    pub notifier: Arc<dyn Notifier>,
    /// Gets presence samples, as selected by the [`HistoryPolicy`].
    pub history: Arc<dyn HistoryStore>,
}

impl Collaborators {
    /// Bundle a notifier and a history store.
    pub fn new(notifier: Arc<dyn Notifier>, history: Arc<dyn HistoryStore>) -> Self {
        Self { notifier, history }
    }

    async fn deliver(&self, event: MonitorEvent) {
        let result = match &event {
            MonitorEvent::PlayerOnline { player, server } => {
                self.notifier.on_player_online(player, server).await
            }
            MonitorEvent::PlayerOffline { player, server } => {
                self.notifier.on_player_offline(player, server).await
            }
            MonitorEvent::ServerUp { server } => self.notifier.on_server_up(server).await,
            MonitorEvent::ServerDown { server, error } => {
                self.notifier.on_server_down(server, error).await
            }
            MonitorEvent::Sample {
                player,
                server,
                online,
                online_count,
            } => {
                self.history
                    .record(player, server, *online, *online_count)
                    .await
            }
        };

        if let Err(err) = result {
            tracing::warn!(?event, error = %err, "collaborator failed, event dropped");
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(Arc::new(Discard), Arc::new(Discard))
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Which ticks produce a [`MonitorEvent::Sample`] for the history store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// One sample per online/offline transition.
    #[default]
    Transitions,
    /// One sample per successful tick.
    EverySample,
}

/// Something a monitor noticed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Player went from offline to online.
    PlayerOnline {
        /// Player name.
        player: String,
        /// Server display name.
        server: String,
    },
    /// Player went from online to offline.
    PlayerOffline {
        /// Player name.
        player: String,
        /// Server display name.
        server: String,
    },
    /// Server answers again.
    ServerUp {
        /// Server display name.
        server: String,
    },
    /// Server stopped answering.
    ServerDown {
        /// Server display name.
        server: String,
        /// Error of the failed check.
        error: String,
    },
    /// A presence sample for the history store.
    Sample {
        /// Player name.
        player: String,
        /// Server display name.
        server: String,
        /// Was the player online?
        online: bool,
        /// Players online on the server.
        online_count: u32,
    },
}

/// Events caused by moving from `previous` to `current`.
///
/// Without a previous outcome nothing has changed yet, so only an
/// [`HistoryPolicy::EverySample`] sample can come out.
#[must_use]
pub fn transitions(
    previous: Option<&CheckOutcome>,
    current: &CheckOutcome,
    policy: HistoryPolicy,
) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    let server = current.target.name().to_string();
    let sample = || MonitorEvent::Sample {
        player: current.player.clone(),
        server: server.clone(),
        online: current.online,
        online_count: current.online_count,
    };

    if let Some(previous) = previous {
        match (previous.succeeded, current.succeeded) {
            (true, false) => events.push(MonitorEvent::ServerDown {
                server: server.clone(),
                error: current.error.clone().unwrap_or_default(),
            }),
            (false, true) => events.push(MonitorEvent::ServerUp {
                server: server.clone(),
            }),
            (true, true) if previous.online != current.online => {
                let player = current.player.clone();
                events.push(if current.online {
                    MonitorEvent::PlayerOnline {
                        player,
                        server: server.clone(),
                    }
                } else {
                    MonitorEvent::PlayerOffline {
                        player,
                        server: server.clone(),
                    }
                });

                if policy == HistoryPolicy::Transitions {
                    events.push(sample());
                }
            }
            _ => {}
        }
    }

    if current.succeeded && policy == HistoryPolicy::EverySample {
        events.push(sample());
    }

    events
}

/// Sending half of a monitor's event queue.
#[derive(Debug, Clone)]
pub(crate) struct EventSender(mpsc::UnboundedSender<MonitorEvent>);

impl EventSender {
    fn send(&self, event: MonitorEvent) {
        // the dispatcher outlives every sender unless the runtime shuts down
        if let Err(err) = self.0.send(event) {
            tracing::warn!(event = ?err.0, "event dispatcher is gone, event dropped");
        }
    }
}

/// Start a task delivering events to `collaborators` in the order sent.
/// It ends once every sender is gone and the queue is drained.
///
/// Each delivery runs in its own task, so a collaborator that panics loses
/// that one event and the dispatcher moves on to the next.
pub(crate) fn spawn_dispatcher(runtime: &Handle, collaborators: Collaborators) -> EventSender {
    let (tx, mut rx) = mpsc::unbounded_channel::<MonitorEvent>();

    runtime.spawn(async move {
        while let Some(event) = rx.recv().await {
            let description = format!("{event:?}");
            let collaborators = collaborators.clone();

            if let Err(err) = tokio::spawn(async move { collaborators.deliver(event).await }).await {
                tracing::warn!(event = %description, error = %err, "collaborator panicked, event dropped");
            }
        }
    });

    EventSender(tx)
}

/// Everything a tick needs besides the tracked entity itself.
#[derive(Debug, Clone)]
pub(crate) struct TickContext {
    pub checker: PresenceChecker,
    pub events: EventSender,
    pub policy: HistoryPolicy,
}

#[derive(Debug)]
struct TrackedState {
    alive: bool,
    last: Option<CheckOutcome>,
}

/// One monitored (player, server) pair and its previous outcome.
#[derive(Debug)]
pub(crate) struct Tracked {
    player: String,
    target: Arc<ServerTarget>,
    busy: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<TrackedState>,
}

impl Tracked {
    pub(crate) fn new(player: &str, target: Arc<ServerTarget>) -> Arc<Self> {
        Arc::new(Self {
            player: player.to_string(),
            target,
            busy: Arc::new(tokio::sync::Mutex::new(())),
            state: Mutex::new(TrackedState {
                alive: true,
                last: None,
            }),
        })
    }

    pub(crate) fn player(&self) -> &str {
        &self.player
    }

    pub(crate) fn target(&self) -> &Arc<ServerTarget> {
        &self.target
    }

    fn state(&self) -> MutexGuard<'_, TrackedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn last_outcome(&self) -> Option<CheckOutcome> {
        self.state().last.clone()
    }

    /// Stop accepting results and forget the previous outcome.
    pub(crate) fn retire(&self) {
        let mut state = self.state();
        state.alive = false;
        state.last = None;
    }

    /// Check once, compare with the previous outcome and emit what changed.
    ///
    /// Skipped if the previous tick for this entity is still running. A
    /// result arriving after [`retire`](Self::retire) is dropped.
    pub(crate) async fn tick(self: Arc<Self>, ctx: TickContext) {
        let Ok(_busy) = Arc::clone(&self.busy).try_lock_owned() else {
            tracing::debug!(player = %self.player, "previous check still running, skipping tick");
            return;
        };

        let checker = ctx.checker.clone();
        let player = self.player.clone();
        let target = Arc::clone(&self.target);

        // a panicking check must not take the loop down with it
        let check = tokio::spawn(async move { checker.check_on_server(&player, &target).await });

        let outcome = match check.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    player = %self.player,
                    server = %self.target.name(),
                    error = %err,
                    "check failed unexpectedly"
                );
                CheckOutcome::failed(
                    &self.player,
                    &self.target,
                    self.target.query_support() == QuerySupport::Supported,
                    FailureKind::Internal,
                    format!("check failed unexpectedly: {err}"),
                )
            }
        };

        self.commit(outcome, &ctx);
    }

    fn commit(&self, outcome: CheckOutcome, ctx: &TickContext) {
        let mut state = self.state();

        if !state.alive {
            tracing::debug!(player = %self.player, "monitor stopped, discarding result");
            return;
        }

        if outcome.succeeded {
            tracing::debug!(
                player = %self.player,
                server = %self.target.name(),
                online = outcome.online,
                online_count = outcome.online_count,
                used_query = outcome.used_query,
                "tick"
            );
        } else {
            tracing::debug!(
                player = %self.player,
                server = %self.target.name(),
                error = outcome.error.as_deref().unwrap_or_default(),
                "tick: server unreachable"
            );
        }

        for event in transitions(state.last.as_ref(), &outcome, ctx.policy) {
            if !matches!(event, MonitorEvent::Sample { .. }) {
                tracing::info!(?event, "transition");
            }
            ctx.events.send(event);
        }

        state.last = Some(outcome);
    }
}

/// Cancels a periodic loop when told to or when dropped. A tick already
/// running is left to finish.
#[derive(Debug)]
pub(crate) struct LoopHandle {
    cancel: watch::Sender<bool>,
}

impl LoopHandle {
    pub(crate) fn cancel(self) {
        let _ = self.cancel.send(true);
    }
}

/// Run `tick` now and then every `period` until the returned handle is
/// cancelled or dropped. Ticks never overlap: the next one waits for the
/// previous one to return.
pub(crate) fn spawn_periodic<F, Fut>(runtime: &Handle, period: Duration, mut tick: F) -> LoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (cancel, mut cancelled) = watch::channel(false);

    runtime.spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancelled.changed() => break,
                _ = ticker.tick() => {}
            }

            tick().await;
        }
    });

    LoopHandle { cancel }
}

/// The runtime loops get spawned on.
pub(crate) fn current_runtime() -> Result<Handle, UsageError> {
    Handle::try_current().map_err(|_| UsageError::NoRuntime)
}

pub(crate) fn validate_player(player: &str) -> Result<&str, UsageError> {
    let player = player.trim();
    if player.is_empty() {
        Err(UsageError::EmptyPlayerName)
    } else {
        Ok(player)
    }
}
