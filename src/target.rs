//! Configured server endpoints and their lazily discovered Query support.

use crate::errors::UsageError;
use serde::Serialize;
use std::{
    fmt,
    future::Future,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

const UNKNOWN: u8 = 0;
const PROBING: u8 = 1;
const SUPPORTED: u8 = 2;
const UNSUPPORTED: u8 = 3;

/// Whether a target answers Query requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySupport {
    /// Not probed yet, or a probe is in flight.
    Unknown,
    /// Query works; presence is read from the full player list.
    Supported,
    /// Query failed when probed; presence comes from the status sample.
    Unsupported,
}

/// One server endpoint under a display name.
///
/// Identity is `(host, port)`. The Query support flag starts out
/// [`QuerySupport::Unknown`] and is resolved at most once, after which it
/// never changes for the lifetime of the target.
#[derive(Debug, Serialize)]
pub struct ServerTarget {
    name: String,
    host: String,
    port: u16,
    #[serde(skip)]
    query_state: AtomicU8,
    #[serde(skip)]
    resolved: Notify,
}

impl ServerTarget {
    /// A target whose Query support will be probed on first use.
    ///
    /// # Errors
    /// Returns [`UsageError::InvalidPort`] if `port` is 0.
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Result<Self, UsageError> {
        let name = name.into();

        if port == 0 {
            return Err(UsageError::InvalidPort { target: name });
        }

        Ok(Self {
            name,
            host: host.into(),
            port,
            query_state: AtomicU8::new(UNKNOWN),
            resolved: Notify::new(),
        })
    }

    /// Skip the probe: Query support is already known.
    #[must_use]
    pub fn with_query_support(self, support: QuerySupport) -> Self {
        let state = match support {
            QuerySupport::Unknown => UNKNOWN,
            QuerySupport::Supported => SUPPORTED,
            QuerySupport::Unsupported => UNSUPPORTED,
        };
        self.query_state.store(state, Ordering::Release);
        self
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hostname or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port for both protocols.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current knowledge about Query support. A probe in flight reads as
    /// [`QuerySupport::Unknown`].
    #[must_use]
    pub fn query_support(&self) -> QuerySupport {
        match self.query_state.load(Ordering::Acquire) {
            SUPPORTED => QuerySupport::Supported,
            UNSUPPORTED => QuerySupport::Unsupported,
            _ => QuerySupport::Unknown,
        }
    }

    /// Return whether Query is supported, running `probe` if nobody has yet.
    ///
    /// Exactly one caller wins the right to probe (a compare-and-set on the
    /// state, no lock is held across the network call). Concurrent callers
    /// wait for that probe to publish its answer. If the winning caller is
    /// cancelled mid-probe the state falls back to unknown and one of the
    /// waiters takes over.
    pub async fn resolve_query_support<F, Fut>(&self, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        loop {
            let notified = self.resolved.notified();
            tokio::pin!(notified);
            // register before reading the state so a publish in between is not missed
            notified.as_mut().enable();

            match self.query_state.load(Ordering::Acquire) {
                SUPPORTED => return true,
                UNSUPPORTED => return false,
                PROBING => notified.await,
                _ => {
                    if self
                        .query_state
                        .compare_exchange(UNKNOWN, PROBING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        break;
                    }
                }
            }
        }

        let mut slot = ProbeSlot {
            target: self,
            published: false,
        };

        let supported = probe().await;
        slot.publish(supported);

        tracing::debug!(server = %self.name, supported, "resolved query support");
        supported
    }
}

/// Held by the caller that won the probe; hands the slot back if dropped
/// before publishing.
struct ProbeSlot<'a> {
    target: &'a ServerTarget,
    published: bool,
}

impl ProbeSlot<'_> {
    fn publish(&mut self, supported: bool) {
        let state = if supported { SUPPORTED } else { UNSUPPORTED };
        self.target.query_state.store(state, Ordering::Release);
        self.published = true;
        self.target.resolved.notify_waiters();
    }
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.target.query_state.store(UNKNOWN, Ordering::Release);
            self.target.resolved.notify_waiters();
        }
    }
}

impl PartialEq for ServerTarget {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.host.eq_ignore_ascii_case(&other.host)
    }
}

impl Eq for ServerTarget {}

impl Hash for ServerTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.to_ascii_lowercase().hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

/// The resolved, ordered list of configured servers.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Vec<Arc<ServerTarget>>,
}

impl TargetRegistry {
    /// # Errors
    /// Returns [`UsageError::NoTargets`] for an empty list and
    /// [`UsageError::DuplicateTarget`] if two targets share a name.
    pub fn new(targets: Vec<Arc<ServerTarget>>) -> Result<Self, UsageError> {
        if targets.is_empty() {
            return Err(UsageError::NoTargets);
        }

        for (i, target) in targets.iter().enumerate() {
            if targets[..i]
                .iter()
                .any(|t| t.name.eq_ignore_ascii_case(&target.name))
            {
                return Err(UsageError::DuplicateTarget(target.name.clone()));
            }
        }

        Ok(Self { targets })
    }

    /// All targets in configuration order.
    #[must_use]
    pub fn targets(&self) -> &[Arc<ServerTarget>] {
        &self.targets
    }

    /// Look a target up by name, ignoring case.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Arc<ServerTarget>> {
        self.targets
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// The first configured target.
    #[must_use]
    pub fn default_target(&self) -> &Arc<ServerTarget> {
        // non-empty by construction
        &self.targets[0]
    }

    /// The named target, or the default one when no name (or an empty one) is given.
    ///
    /// # Errors
    /// Returns [`UsageError::UnknownTarget`] if no target has that name.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<ServerTarget>, UsageError> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(Arc::clone(self.default_target())),
            Some(name) => self
                .by_name(name)
                .cloned()
                .ok_or_else(|| UsageError::UnknownTarget(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn target(name: &str, port: u16) -> Arc<ServerTarget> {
        Arc::new(ServerTarget::new(name, "localhost", port).unwrap())
    }

    #[test]
    fn test_port_zero_rejected() {
        assert_eq!(
            ServerTarget::new("bad", "localhost", 0).unwrap_err(),
            UsageError::InvalidPort {
                target: "bad".into()
            }
        );
    }

    #[test]
    fn test_identity_is_host_and_port() {
        let a = ServerTarget::new("a", "Example.org", 25565).unwrap();
        let b = ServerTarget::new("b", "example.org", 25565).unwrap();
        let c = ServerTarget::new("a", "example.org", 25566).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "a (Example.org:25565)");
    }

    #[tokio::test]
    async fn test_discovery_runs_once_and_sticks() {
        let t = target("lobby", 25565);
        let probes = AtomicUsize::new(0);

        for _ in 0..3 {
            let supported = t
                .resolve_query_support(|| async {
                    probes.fetch_add(1, Ordering::SeqCst);
                    false
                })
                .await;
            assert!(!supported);
        }

        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert_eq!(t.query_support(), QuerySupport::Unsupported);
    }

    #[tokio::test]
    async fn test_preset_support_skips_discovery() {
        let t = ServerTarget::new("lobby", "localhost", 25565)
            .unwrap()
            .with_query_support(QuerySupport::Supported);

        let probes = AtomicUsize::new(0);

        let supported = t
            .resolve_query_support(|| async {
                probes.fetch_add(1, Ordering::SeqCst);
                false
            })
            .await;

        assert!(supported);
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_discovery() {
        let t = target("lobby", 25565);
        let probes = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let t = Arc::clone(&t);
            let probes = Arc::clone(&probes);
            handles.push(tokio::spawn(async move {
                t.resolve_query_support(|| async {
                    probes.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    true
                })
                .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_discovery_hands_over() {
        let t = target("lobby", 25565);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            t.resolve_query_support(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                true
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(t.query_support(), QuerySupport::Unknown);

        assert!(!t.resolve_query_support(|| async { false }).await);
    }

    #[test]
    fn test_registry_lookup() {
        let registry =
            TargetRegistry::new(vec![target("Lobby", 25565), target("Survival", 25566)]).unwrap();

        assert_eq!(registry.by_name("survival").unwrap().port(), 25566);
        assert_eq!(registry.resolve(None).unwrap().name(), "Lobby");
        assert_eq!(registry.resolve(Some("")).unwrap().name(), "Lobby");
        assert_eq!(
            registry.resolve(Some("creative")).unwrap_err(),
            UsageError::UnknownTarget("creative".into())
        );
    }

    #[test]
    fn test_registry_validation() {
        assert_eq!(
            TargetRegistry::new(Vec::new()).unwrap_err(),
            UsageError::NoTargets
        );
        assert_eq!(
            TargetRegistry::new(vec![target("a", 1), target("A", 2)]).unwrap_err(),
            UsageError::DuplicateTarget("A".into())
        );
    }
}
