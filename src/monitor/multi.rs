use super::{
    current_runtime, spawn_dispatcher, spawn_periodic, validate_player, Collaborators,
    HistoryPolicy, LoopHandle, TickContext, Tracked,
};
use crate::{
    checker::{CheckOutcome, PresenceChecker},
    errors::UsageError,
    target::{ServerTarget, TargetRegistry},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

/// Default period of the interactive loop.
pub const DEFAULT_INTERACTIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Default period of the background loop.
pub const DEFAULT_BACKGROUND_INTERVAL: Duration = Duration::from_secs(60);

/// Polling periods of the two loops of a [`MultiMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Period of the interactive loop.
    pub interactive: Duration,
    /// Period of the background loop.
    pub background: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            interactive: DEFAULT_INTERACTIVE_INTERVAL,
            background: DEFAULT_BACKGROUND_INTERVAL,
        }
    }
}

#[derive(Debug, Default)]
struct LoopState {
    /// Keyed by lowercased player name.
    players: HashMap<String, Arc<Tracked>>,
    running: Option<LoopHandle>,
}

impl LoopState {
    fn halt(&mut self) {
        for tracked in self.players.values() {
            tracked.retire();
        }
        self.players.clear();

        if let Some(handle) = self.running.take() {
            handle.cancel();
        }
    }
}

fn key(player: &str) -> String {
    player.to_lowercase()
}

/// One named loop polling a set of players.
///
/// Each cycle starts a tick per player without waiting for the others, so
/// a slow server only holds up the players on it.
#[derive(Debug)]
struct PollingLoop {
    name: &'static str,
    period: Duration,
    checker: PresenceChecker,
    collaborators: Collaborators,
    policy: HistoryPolicy,
    state: Arc<Mutex<LoopState>>,
}

impl PollingLoop {
    fn state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_running(&self, state: &mut LoopState) -> Result<(), UsageError> {
        if state.running.is_some() {
            return Ok(());
        }

        let runtime = current_runtime()?;
        let ctx = TickContext {
            checker: self.checker.clone(),
            events: spawn_dispatcher(&runtime, self.collaborators.clone()),
            policy: self.policy,
        };
        let shared = Arc::downgrade(&self.state);
        let name = self.name;

        state.running = Some(spawn_periodic(&runtime, self.period, move || {
            let players = snapshot(&shared);
            let ctx = ctx.clone();

            async move {
                tracing::trace!(monitor = name, players = players.len(), "cycle");
                for tracked in players {
                    tokio::spawn(tracked.tick(ctx.clone()));
                }
            }
        }));

        tracing::info!(monitor = self.name, period = ?self.period, "started polling");
        Ok(())
    }

    fn stop_if_idle(&self, state: &mut LoopState) {
        if state.players.is_empty() {
            if let Some(handle) = state.running.take() {
                handle.cancel();
                tracing::info!(monitor = self.name, "stopped polling, no players left");
            }
        }
    }

    fn add(&self, player: &str, target: Arc<ServerTarget>) -> Result<bool, UsageError> {
        let player = validate_player(player)?;
        let mut state = self.state();

        if let Some(existing) = state.players.get(&key(player)) {
            if existing.target() == &target {
                return Ok(false);
            }
        }

        self.ensure_running(&mut state)?;

        tracing::info!(monitor = self.name, player, server = %target, "tracking player");
        if let Some(previous) = state.players.insert(key(player), Tracked::new(player, target)) {
            previous.retire();
        }

        Ok(true)
    }

    fn remove(&self, player: &str) -> bool {
        let mut state = self.state();

        let Some(tracked) = state.players.remove(&key(player.trim())) else {
            return false;
        };
        tracked.retire();
        tracing::info!(monitor = self.name, player = tracked.player(), "stopped tracking player");

        self.stop_if_idle(&mut state);
        true
    }

    fn replace(&self, players: Vec<(&str, Arc<ServerTarget>)>) -> Result<(), UsageError> {
        let mut state = self.state();

        if !players.is_empty() {
            self.ensure_running(&mut state)?;
        }

        let mut previous = std::mem::take(&mut state.players);
        for (player, target) in players {
            let tracked = match previous.remove(&key(player)) {
                // keep the previous outcome of a player that stays put
                Some(kept) if kept.target() == &target => kept,
                Some(moved) => {
                    moved.retire();
                    Tracked::new(player, target)
                }
                None => Tracked::new(player, target),
            };
            state.players.insert(key(player), tracked);
        }

        for dropped in previous.values() {
            dropped.retire();
        }

        tracing::info!(monitor = self.name, players = state.players.len(), "replaced tracked players");
        self.stop_if_idle(&mut state);
        Ok(())
    }

    fn stop(&self) -> Result<(), UsageError> {
        let mut state = self.state();

        if state.running.is_none() {
            return Err(UsageError::NotActive);
        }
        state.halt();

        tracing::info!(monitor = self.name, "stopped polling");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.state().running.is_some()
    }

    fn players(&self) -> Vec<(String, Arc<ServerTarget>)> {
        let mut players: Vec<_> = self
            .state()
            .players
            .values()
            .map(|t| (t.player().to_string(), Arc::clone(t.target())))
            .collect();
        players.sort_by_key(|(player, _)| key(player));
        players
    }

    fn last_outcomes(&self) -> Vec<CheckOutcome> {
        let mut outcomes: Vec<_> = self
            .state()
            .players
            .values()
            .filter_map(|t| t.last_outcome())
            .collect();
        outcomes.sort_by_key(|o| key(&o.player));
        outcomes
    }
}

fn snapshot(shared: &Weak<Mutex<LoopState>>) -> Vec<Arc<Tracked>> {
    shared.upgrade().map_or_else(Vec::new, |state| {
        let state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.players.values().cloned().collect()
    })
}

/// Watches many players under two independent loops.
///
/// The *interactive* loop polls often and its players are added and
/// removed one at a time. The *background* loop polls rarely and is
/// usually handed a whole set at once. Each loop starts when it gets its
/// first player and stops when it loses its last one. Player names are
/// case-insensitive; a player without a server goes to the registry's
/// default target.
#[derive(Debug)]
pub struct MultiMonitor {
    registry: TargetRegistry,
    interactive: PollingLoop,
    background: PollingLoop,
}

impl MultiMonitor {
    /// Both loops stopped and empty.
    #[must_use]
    pub fn new(
        registry: TargetRegistry,
        checker: PresenceChecker,
        collaborators: Collaborators,
        policy: HistoryPolicy,
        intervals: Intervals,
    ) -> Self {
        let polling_loop = |name, period| PollingLoop {
            name,
            period,
            checker: checker.clone(),
            collaborators: collaborators.clone(),
            policy,
            state: Arc::default(),
        };

        Self {
            interactive: polling_loop("interactive", intervals.interactive),
            background: polling_loop("background", intervals.background),
            registry,
        }
    }

    /// The configured servers.
    #[must_use]
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Track `player` on `server` (or the default server) in the
    /// interactive loop, starting the loop if needed.
    ///
    /// Returns false if the player was already tracked there. Tracking a
    /// player on another server moves them and starts their history over.
    ///
    /// # Errors
    /// * [`UsageError::EmptyPlayerName`] for a blank player name
    /// * [`UsageError::UnknownTarget`] if no server has that name
    /// * [`UsageError::NoRuntime`] if the loop has to start outside a tokio runtime
    pub fn add_player(&self, player: &str, server: Option<&str>) -> Result<bool, UsageError> {
        self.interactive.add(player, self.registry.resolve(server)?)
    }

    /// Stop tracking `player` in the interactive loop, stopping the loop
    /// with its last player. Returns false if the player was not tracked.
    pub fn remove_player(&self, player: &str) -> bool {
        self.interactive.remove(player)
    }

    /// Track exactly `players` in the background loop, replacing whatever
    /// it tracked before. Players that keep their server keep their
    /// previous outcome. An empty set stops the loop.
    ///
    /// # Errors
    /// Same as [`add_player`](Self::add_player); on error nothing changes.
    pub fn start_bulk<'a, I>(&self, players: I) -> Result<(), UsageError>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let resolved = players
            .into_iter()
            .map(|(player, server)| -> Result<_, UsageError> {
                Ok((validate_player(player)?, self.registry.resolve(server)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.background.replace(resolved)
    }

    /// Stop the background loop and forget its players.
    ///
    /// # Errors
    /// Returns [`UsageError::NotActive`] if it is not running.
    pub fn stop_background(&self) -> Result<(), UsageError> {
        self.background.stop()
    }

    /// Like [`add_player`](Self::add_player), for the background loop.
    ///
    /// # Errors
    /// Same as [`add_player`](Self::add_player).
    pub fn add_background_player(
        &self,
        player: &str,
        server: Option<&str>,
    ) -> Result<bool, UsageError> {
        self.background.add(player, self.registry.resolve(server)?)
    }

    /// Like [`remove_player`](Self::remove_player), for the background loop.
    pub fn remove_background_player(&self, player: &str) -> bool {
        self.background.remove(player)
    }

    /// Players of the interactive loop with their servers, sorted by name.
    #[must_use]
    pub fn players(&self) -> Vec<(String, Arc<ServerTarget>)> {
        self.interactive.players()
    }

    /// Players of the background loop with their servers, sorted by name.
    #[must_use]
    pub fn background_players(&self) -> Vec<(String, Arc<ServerTarget>)> {
        self.background.players()
    }

    /// Latest outcome per interactive player that has completed a tick.
    #[must_use]
    pub fn last_outcomes(&self) -> Vec<CheckOutcome> {
        self.interactive.last_outcomes()
    }

    /// Latest outcome per background player that has completed a tick.
    #[must_use]
    pub fn background_outcomes(&self) -> Vec<CheckOutcome> {
        self.background.last_outcomes()
    }

    /// Is the interactive loop running?
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.interactive.is_active()
    }

    /// Is the background loop running?
    #[must_use]
    pub fn is_background_active(&self) -> bool {
        self.background.is_active()
    }

    /// Stop both loops and forget all players. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.interactive.state().halt();
        self.background.state().halt();
        tracing::info!("monitor shut down");
    }
}
