//! Scripted [`Transport`] for driving the checker and monitors in tests.

use super::Transport;
use crate::{query::QueryResult, status::StatusPayload, target::ServerTarget};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io::{self, ErrorKind};
use std::sync::Mutex;
use std::time::Duration;

/// What a scripted server does when asked.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Answer, listing these players.
    Players(&'static [&'static str]),
    /// Refuse the connection.
    Down,
    /// Answer with data that fails to parse.
    Garbage,
    /// Never answer (well, not for an hour).
    Hang,
    /// Panic inside the transport.
    Panic,
}

#[derive(Debug)]
struct Script {
    query_enabled: bool,
    replies: VecDeque<Reply>,
    query_calls: usize,
    status_calls: usize,
}

impl Script {
    /// Next reply; the last one repeats forever.
    fn next(&mut self) -> Reply {
        if self.replies.len() > 1 {
            self.replies.pop_front().unwrap()
        } else {
            self.replies.front().cloned().unwrap_or(Reply::Down)
        }
    }
}

/// Servers keyed by target name. Query-enabled servers answer queries from
/// their script and refuse status pings; the others do the opposite.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    servers: Mutex<HashMap<String, Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn server(self, name: &str, query_enabled: bool, replies: Vec<Reply>) -> Self {
        self.servers.lock().unwrap().insert(
            name.to_string(),
            Script {
                query_enabled,
                replies: replies.into(),
                query_calls: 0,
                status_calls: 0,
            },
        );
        self
    }

    /// Replace the remaining replies of a server.
    pub(crate) fn set_replies(&self, name: &str, replies: Vec<Reply>) {
        if let Some(script) = self.servers.lock().unwrap().get_mut(name) {
            script.replies = replies.into();
        }
    }

    pub(crate) fn query_calls(&self, name: &str) -> usize {
        self.servers.lock().unwrap().get(name).map_or(0, |s| s.query_calls)
    }

    pub(crate) fn status_calls(&self, name: &str) -> usize {
        self.servers.lock().unwrap().get(name).map_or(0, |s| s.status_calls)
    }

    /// Record the call and pick the reply, or `None` if this protocol is off.
    fn take(&self, target: &ServerTarget, query: bool) -> Option<Reply> {
        let mut servers = self.servers.lock().unwrap();
        let script = servers.get_mut(target.name())?;

        if query {
            script.query_calls += 1;
        } else {
            script.status_calls += 1;
        }

        (script.query_enabled == query).then(|| script.next())
    }
}

async fn resolve(reply: Reply) -> io::Result<&'static [&'static str]> {
    match reply {
        Reply::Players(players) => Ok(players),
        Reply::Down => Err(io::Error::from(ErrorKind::ConnectionRefused)),
        Reply::Garbage => Err(io::Error::new(ErrorKind::InvalidData, "garbage")),
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(io::Error::from(ErrorKind::TimedOut))
        }
        Reply::Panic => panic!("scripted transport panic"),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn query(&self, target: &ServerTarget) -> io::Result<QueryResult> {
        let Some(reply) = self.take(target, true) else {
            return Err(io::Error::from(ErrorKind::TimedOut));
        };

        let players = resolve(reply).await?;

        Ok(QueryResult {
            motd: Some(format!("{} motd", target.name())),
            online_count: players.len() as u32,
            max_players: 20,
            players: players.iter().map(|p| p.to_string()).collect(),
            ..QueryResult::default()
        })
    }

    async fn status(&self, target: &ServerTarget) -> io::Result<StatusPayload> {
        let Some(reply) = self.take(target, false) else {
            return Err(io::Error::from(ErrorKind::ConnectionRefused));
        };

        if matches!(reply, Reply::Garbage) {
            return Ok(StatusPayload::new("not json"));
        }

        let players = resolve(reply).await?;
        let sample: Vec<_> = players
            .iter()
            .map(|name| serde_json::json!({ "name": name, "id": "00000000-0000-0000-0000-000000000000" }))
            .collect();

        Ok(StatusPayload::new(
            serde_json::json!({
                "version": { "name": "1.20.4", "protocol": 765 },
                "players": { "max": 20, "online": players.len(), "sample": sample },
                "description": { "text": target.name() },
            })
            .to_string(),
        ))
    }
}
