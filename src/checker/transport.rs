use crate::{
    query::{self, QueryResult},
    status::{self, StatusPayload},
    target::ServerTarget,
};
use async_trait::async_trait;
use std::{io, time::Duration};

/// How the checker talks to servers.
///
/// [`NetworkTransport`] is the real thing; other implementations exist to
/// drive the checker and monitors without sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Full stat over the Query protocol.
    async fn query(&self, target: &ServerTarget) -> io::Result<QueryResult>;

    /// Raw status payload over Server List Ping.
    async fn status(&self, target: &ServerTarget) -> io::Result<StatusPayload>;

    /// Find out whether `target` answers Query at all. Runs once per target;
    /// a successful answer is used as that check's result.
    async fn probe_query(&self, target: &ServerTarget) -> io::Result<QueryResult> {
        self.query(target).await
    }
}

/// [`Transport`] over real sockets, with one timeout for every exchange.
#[derive(Debug, Clone, Copy)]
pub struct NetworkTransport {
    timeout: Duration,
}

impl NetworkTransport {
    /// `timeout` bounds connecting and each request/response exchange.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new(crate::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    async fn query(&self, target: &ServerTarget) -> io::Result<QueryResult> {
        query::query(target.host(), target.port(), self.timeout).await
    }

    async fn status(&self, target: &ServerTarget) -> io::Result<StatusPayload> {
        status::ping(target.host(), target.port(), self.timeout).await
    }
}
