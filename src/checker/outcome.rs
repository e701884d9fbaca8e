use crate::{errors::FailureKind, query::QueryResult, target::ServerTarget};
use serde::Serialize;
use std::{io, sync::Arc};

/// What one successful exchange with a server told us.
#[derive(Debug, Clone)]
pub(super) struct Observation {
    pub used_query: bool,
    pub online_count: u32,
    pub max_players: u32,
    /// The full player list over Query, the status sample otherwise.
    pub players: Vec<String>,
    pub query: Option<QueryResult>,
}

impl Observation {
    fn lists(&self, player: &str) -> bool {
        self.players.iter().any(|p| p.eq_ignore_ascii_case(player))
    }
}

/// A failed exchange, remembering which protocol was attempted.
#[derive(Debug)]
pub(super) struct Failure {
    pub used_query: bool,
    pub error: io::Error,
}

/// Result of checking one player against one server.
///
/// A failed check still produces an outcome: `succeeded` is false and
/// `error`/`failure` say why.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    /// Player name as it was asked for.
    pub player: String,
    /// Server the check ran against.
    pub target: Arc<ServerTarget>,
    /// Did the server answer with usable data?
    pub succeeded: bool,
    /// Is the player connected? Always false for a failed check.
    pub online: bool,
    /// Players online according to the server.
    pub online_count: u32,
    /// Player slots.
    pub max_players: u32,
    /// Was the Query protocol used (or attempted)?
    pub used_query: bool,
    /// Error message of a failed check.
    pub error: Option<String>,
    /// Classification of a failed check.
    pub failure: Option<FailureKind>,
    /// Full stat response, when the Query protocol was used.
    pub query: Option<QueryResult>,
}

impl CheckOutcome {
    pub(super) fn observed(player: &str, target: &Arc<ServerTarget>, observation: Observation) -> Self {
        Self {
            player: player.to_string(),
            target: Arc::clone(target),
            succeeded: true,
            online: observation.lists(player),
            online_count: observation.online_count,
            max_players: observation.max_players,
            used_query: observation.used_query,
            error: None,
            failure: None,
            query: observation.query,
        }
    }

    pub(super) fn from_failure(player: &str, target: &Arc<ServerTarget>, failure: &Failure) -> Self {
        Self::failed(
            player,
            target,
            failure.used_query,
            FailureKind::of(&failure.error),
            failure.error.to_string(),
        )
    }

    /// An outcome for a check that produced no data.
    #[must_use]
    pub fn failed(
        player: &str,
        target: &Arc<ServerTarget>,
        used_query: bool,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            player: player.to_string(),
            target: Arc::clone(target),
            succeeded: false,
            online: false,
            online_count: 0,
            max_players: 0,
            used_query,
            error: Some(error.into()),
            failure: Some(kind),
            query: None,
        }
    }
}

/// State of one server regardless of any particular player.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    /// Server the snapshot was taken of.
    pub target: Arc<ServerTarget>,
    /// Did the server answer with usable data?
    pub reachable: bool,
    /// Players online.
    pub online_count: u32,
    /// Player slots.
    pub max_players: u32,
    /// Was the Query protocol used (or attempted)?
    pub used_query: bool,
    /// Player names the server disclosed: everyone over Query, a sample otherwise.
    pub players: Vec<String>,
    /// Full stat response, when the Query protocol was used.
    pub query: Option<QueryResult>,
    /// Error message when unreachable.
    pub error: Option<String>,
    /// Classification of the failure when unreachable.
    pub failure: Option<FailureKind>,
}

impl ServerSnapshot {
    pub(super) fn observed(target: &Arc<ServerTarget>, observation: Observation) -> Self {
        Self {
            target: Arc::clone(target),
            reachable: true,
            online_count: observation.online_count,
            max_players: observation.max_players,
            used_query: observation.used_query,
            players: observation.players,
            query: observation.query,
            error: None,
            failure: None,
        }
    }

    pub(super) fn unreachable(
        target: &Arc<ServerTarget>,
        used_query: bool,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            target: Arc::clone(target),
            reachable: false,
            online_count: 0,
            max_players: 0,
            used_query,
            players: Vec::new(),
            query: None,
            error: Some(error.into()),
            failure: Some(kind),
        }
    }
}
