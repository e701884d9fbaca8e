//! Player presence checks against one or many servers.
//!
//! Each check picks a protocol per target: Query when the target supports
//! it (probed once, then remembered), Server List Ping otherwise.

mod outcome;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use self::outcome::{CheckOutcome, ServerSnapshot};
pub use self::transport::{NetworkTransport, Transport};

use self::outcome::{Failure, Observation};
use crate::{
    errors::FailureKind,
    target::{QuerySupport, ServerTarget},
};
use std::{collections::HashMap, future::Future, io, sync::Arc, time::Duration};
use tokio::{
    sync::Semaphore,
    time::{timeout, timeout_at, Instant},
};

/// Checks allowed to run at once during a fan-out.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Longest one check may take, Query support discovery included. Leaves
/// room for a full query followed by a status ping at the default
/// protocol timeout.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest a fan-out waits for any one target. Kept above the check
/// timeout so it only fires when the pool is starved.
pub const DEFAULT_CEILING: Duration = Duration::from_secs(15);

/// Tuning for [`PresenceChecker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerOptions {
    /// Concurrent checks in a fan-out.
    pub pool_size: usize,
    /// Per-target wait in a fan-out.
    pub ceiling: Duration,
    /// Overall budget of a single check.
    pub check_timeout: Duration,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            ceiling: DEFAULT_CEILING,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }
}

/// Checks whether players are connected, on one server or all of them.
///
/// Cheap to clone; clones share the worker pool.
///
/// # Examples
///
/// ```no_run
/// use mc_presence::checker::PresenceChecker;
/// use mc_presence::target::ServerTarget;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let checker = PresenceChecker::default();
///     let lobby = Arc::new(ServerTarget::new("lobby", "localhost", 25565).unwrap());
///
///     let outcome = checker.check_on_server("Notch", &lobby).await;
///     println!("online: {} ({:?})", outcome.online, outcome.error);
/// }
/// ```
#[derive(Clone)]
pub struct PresenceChecker {
    transport: Arc<dyn Transport>,
    workers: Arc<Semaphore>,
    ceiling: Duration,
    check_timeout: Duration,
}

impl Default for PresenceChecker {
    fn default() -> Self {
        Self::new(Arc::new(NetworkTransport::default()), CheckerOptions::default())
    }
}

impl std::fmt::Debug for PresenceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceChecker")
            .field("available_workers", &self.workers.available_permits())
            .field("ceiling", &self.ceiling)
            .field("check_timeout", &self.check_timeout)
            .finish_non_exhaustive()
    }
}

impl PresenceChecker {
    /// A checker talking through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, options: CheckerOptions) -> Self {
        Self {
            transport,
            workers: Arc::new(Semaphore::new(options.pool_size.max(1))),
            ceiling: options.ceiling,
            check_timeout: options.check_timeout,
        }
    }

    /// Is `player` connected to `target`?
    ///
    /// Never fails: protocol and connectivity errors end up in the
    /// returned outcome.
    pub async fn check_on_server(&self, player: &str, target: &Arc<ServerTarget>) -> CheckOutcome {
        let outcome = match self.observe(target).await {
            Ok(observation) => CheckOutcome::observed(player, target, observation),
            Err(failure) => CheckOutcome::from_failure(player, target, &failure),
        };

        tracing::debug!(
            player,
            server = %target.name(),
            succeeded = outcome.succeeded,
            online = outcome.online,
            used_query = outcome.used_query,
            "checked player"
        );

        outcome
    }

    /// Check `player` on every target at once.
    ///
    /// Checks run on the shared worker pool. A check that runs out of its own
    /// timeout fails like an unreachable server. A target still waiting for a
    /// worker when the ceiling passes gets a failed outcome of kind
    /// [`FailureKind::Deadline`]; its siblings are unaffected.
    pub async fn check_on_all_servers(
        &self,
        player: &str,
        targets: &[Arc<ServerTarget>],
    ) -> HashMap<Arc<ServerTarget>, CheckOutcome> {
        let player: Arc<str> = Arc::from(player);
        let missing_player = Arc::clone(&player);

        self.fan_out(
            targets,
            move |checker, target| {
                let player = Arc::clone(&player);
                async move { checker.check_on_server(&player, &target).await }
            },
            move |target, kind, error| CheckOutcome::failed(&missing_player, target, false, kind, error),
        )
        .await
    }

    /// Status of `target` without looking for any player.
    pub async fn server_status(&self, target: &Arc<ServerTarget>) -> ServerSnapshot {
        match self.observe(target).await {
            Ok(observation) => ServerSnapshot::observed(target, observation),
            Err(failure) => ServerSnapshot::unreachable(
                target,
                failure.used_query,
                FailureKind::of(&failure.error),
                failure.error.to_string(),
            ),
        }
    }

    /// [`server_status`](Self::server_status) for every target at once,
    /// with the same pool and ceiling as
    /// [`check_on_all_servers`](Self::check_on_all_servers).
    pub async fn all_server_status(
        &self,
        targets: &[Arc<ServerTarget>],
    ) -> HashMap<Arc<ServerTarget>, ServerSnapshot> {
        self.fan_out(
            targets,
            |checker, target| async move { checker.server_status(&target).await },
            |target, kind, error| ServerSnapshot::unreachable(target, false, kind, error),
        )
        .await
    }

    /// Close the worker pool. Fan-outs started afterwards report every
    /// target as failed; checks already running finish normally.
    pub fn shutdown(&self) {
        self.workers.close();
    }

    /// One check of `target`, cut off once the check timeout runs out.
    async fn observe(&self, target: &Arc<ServerTarget>) -> Result<Observation, Failure> {
        match timeout(self.check_timeout, self.observe_unbounded(target)).await {
            Ok(result) => result,
            Err(_) => Err(Failure {
                used_query: target.query_support() == QuerySupport::Supported,
                error: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", self.check_timeout),
                ),
            }),
        }
    }

    async fn observe_unbounded(&self, target: &Arc<ServerTarget>) -> Result<Observation, Failure> {
        let transport = &self.transport;
        let mut probed = None;
        let slot = &mut probed;

        // the probe is a full query; keep its answer instead of asking twice
        let use_query = target
            .resolve_query_support(|| async move {
                match transport.probe_query(target).await {
                    Ok(result) => {
                        *slot = Some(result);
                        true
                    }
                    Err(err) => {
                        tracing::debug!(server = %target.name(), error = %err, "query unavailable");
                        false
                    }
                }
            })
            .await;

        if use_query {
            let result = match probed {
                Some(result) => result,
                None => self.transport.query(target).await.map_err(|error| Failure {
                    used_query: true,
                    error,
                })?,
            };

            return Ok(Observation {
                used_query: true,
                online_count: result.online_count,
                max_players: result.max_players,
                players: result.players.clone(),
                query: Some(result),
            });
        }

        let status = async {
            let payload = self.transport.status(target).await?;
            payload.parse().map_err(io::Error::from)
        };

        let response = status.await.map_err(|error| Failure {
            used_query: false,
            error,
        })?;

        Ok(Observation {
            used_query: false,
            online_count: response.players.online,
            max_players: response.players.max,
            players: response
                .players
                .sample
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.name)
                .collect(),
            query: None,
        })
    }

    async fn fan_out<T, F, Fut, M>(
        &self,
        targets: &[Arc<ServerTarget>],
        run: F,
        missing: M,
    ) -> HashMap<Arc<ServerTarget>, T>
    where
        T: Send + 'static,
        F: Fn(Self, Arc<ServerTarget>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        M: Fn(&Arc<ServerTarget>, FailureKind, String) -> T,
    {
        let deadline = Instant::now() + self.ceiling;

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let workers = Arc::clone(&self.workers);
                let check = run(self.clone(), Arc::clone(target));

                let handle = tokio::spawn(async move {
                    let _permit = workers.acquire_owned().await.ok()?;
                    Some(check.await)
                });

                (Arc::clone(target), handle)
            })
            .collect();

        let mut results = HashMap::with_capacity(handles.len());

        for (target, handle) in handles {
            let value = match timeout_at(deadline, handle).await {
                Ok(Ok(Some(value))) => value,
                Ok(Ok(None)) => missing(&target, FailureKind::Internal, "checker is shut down".into()),
                Ok(Err(err)) => {
                    tracing::error!(server = %target.name(), error = %err, "check task failed");
                    missing(&target, FailureKind::Internal, format!("check task failed: {err}"))
                }
                Err(_) => {
                    tracing::warn!(server = %target.name(), ceiling = ?self.ceiling, "check exceeded ceiling");
                    missing(
                        &target,
                        FailureKind::Deadline,
                        format!("no result within {:?}", self.ceiling),
                    )
                }
            };

            results.insert(target, value);
        }

        results
    }
}
