use super::{
    current_runtime, spawn_dispatcher, spawn_periodic, validate_player, Collaborators,
    HistoryPolicy, LoopHandle, TickContext, Tracked,
};
use crate::{
    checker::{CheckOutcome, PresenceChecker},
    errors::UsageError,
    target::ServerTarget,
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

#[derive(Debug)]
struct Session {
    tracked: Arc<Tracked>,
    handle: LoopHandle,
}

/// Watches one player on one server, re-checking on a fixed interval.
///
/// At most one session runs at a time. The first check happens right
/// away; later ones wait for the previous check to finish, so ticks never
/// overlap.
///
/// # Examples
///
/// ```no_run
/// use mc_presence::monitor::RealtimeMonitor;
/// use mc_presence::target::ServerTarget;
/// use std::{sync::Arc, time::Duration};
///
/// #[tokio::main]
/// async fn main() {
///     let lobby = Arc::new(ServerTarget::new("lobby", "localhost", 25565).unwrap());
///     let monitor = RealtimeMonitor::default();
///
///     monitor.start("Notch", lobby, Duration::from_secs(1)).unwrap();
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     println!("{:?}", monitor.last_outcome());
///     monitor.stop().unwrap();
/// }
/// ```
#[derive(Debug, Default)]
pub struct RealtimeMonitor {
    checker: PresenceChecker,
    collaborators: Collaborators,
    policy: HistoryPolicy,
    session: Mutex<Option<Session>>,
}

impl RealtimeMonitor {
    /// A stopped monitor reporting to `collaborators`.
    #[must_use]
    pub fn new(checker: PresenceChecker, collaborators: Collaborators, policy: HistoryPolicy) -> Self {
        Self {
            checker,
            collaborators,
            policy,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching `player` on `target` every `interval`.
    ///
    /// # Errors
    /// * [`UsageError::AlreadyActive`] if a session is running
    /// * [`UsageError::EmptyPlayerName`] for a blank player name
    /// * [`UsageError::InvalidInterval`] for a zero interval
    /// * [`UsageError::NoRuntime`] outside a tokio runtime
    pub fn start(
        &self,
        player: &str,
        target: Arc<ServerTarget>,
        interval: Duration,
    ) -> Result<(), UsageError> {
        let mut session = self.session();

        if session.is_some() {
            return Err(UsageError::AlreadyActive);
        }

        let player = validate_player(player)?;
        if interval.is_zero() {
            return Err(UsageError::InvalidInterval {
                what: "monitor interval",
            });
        }
        let runtime = current_runtime()?;

        let ctx = TickContext {
            checker: self.checker.clone(),
            events: spawn_dispatcher(&runtime, self.collaborators.clone()),
            policy: self.policy,
        };
        let tracked = Tracked::new(player, target);

        let ticking = Arc::clone(&tracked);
        let handle = spawn_periodic(&runtime, interval, move || {
            Arc::clone(&ticking).tick(ctx.clone())
        });

        tracing::info!(
            player,
            server = %tracked.target(),
            ?interval,
            "started monitoring"
        );

        *session = Some(Session { tracked, handle });
        Ok(())
    }

    /// Stop the running session and forget its last outcome.
    ///
    /// A check still in flight is left to finish, but its result is dropped.
    ///
    /// # Errors
    /// Returns [`UsageError::NotActive`] if nothing is running.
    pub fn stop(&self) -> Result<(), UsageError> {
        let Session { tracked, handle } = self.session().take().ok_or(UsageError::NotActive)?;

        tracked.retire();
        handle.cancel();

        tracing::info!(player = tracked.player(), "stopped monitoring");
        Ok(())
    }

    /// Is a session running?
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session().is_some()
    }

    /// Outcome of the latest completed tick of the running session.
    #[must_use]
    pub fn last_outcome(&self) -> Option<CheckOutcome> {
        self.session()
            .as_ref()
            .and_then(|s| s.tracked.last_outcome())
    }

    /// The player being watched.
    #[must_use]
    pub fn current_player(&self) -> Option<String> {
        self.session()
            .as_ref()
            .map(|s| s.tracked.player().to_string())
    }

    /// The server being watched.
    #[must_use]
    pub fn current_target(&self) -> Option<Arc<ServerTarget>> {
        self.session()
            .as_ref()
            .map(|s| Arc::clone(s.tracked.target()))
    }
}
