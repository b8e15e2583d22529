//! Per-room WebSocket connection registry
//!
//! Tracks live connections by room code and fans server messages out to
//! them. Delivery order per connection follows enqueue order; a failed send
//! is logged and skipped so one slow or dead consumer never blocks the rest
//! of the room.

use actix::{Addr, Message as ActixMessage};
use dashmap::DashMap;
use mood_gateway_core::DeckItem;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::RoomSocket;

/// Match reference carried by the `voting_finished` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRef {
    pub tmdb_id: i64,
}

/// Server-to-client room protocol.
#[derive(Debug, Clone, Serialize, Deserialize, ActixMessage)]
#[rtype(result = "()")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    UserJoined {
        session_id: String,
        participants_count: usize,
    },
    UserLeft {
        session_id: String,
    },
    UserReady {
        session_id: String,
        all_ready: bool,
        ready_count: usize,
        total_count: usize,
    },
    StartVoting {
        recommendations: Vec<DeckItem>,
        /// ISO-8601
        expires_at: String,
    },
    MatchFound {
        tmdb_id: i64,
    },
    VotingFinished {
        matches: Vec<MatchRef>,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Error {
        detail: String,
    },
}

struct Connection {
    conn_id: Uuid,
    session_id: String,
    addr: Addr<RoomSocket>,
}

/// Registry of live connections per room code.
#[derive(Default)]
pub struct RoomHub {
    rooms: DashMap<String, Vec<Connection>>,
    messages_sent: parking_lot::RwLock<u64>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, code: &str, session_id: &str, addr: Addr<RoomSocket>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.rooms.entry(code.to_string()).or_default().push(Connection {
            conn_id,
            session_id: session_id.to_string(),
            addr,
        });

        tracing::info!(code, session_id, %conn_id, "Room connection registered");
        conn_id
    }

    pub fn unregister(&self, code: &str, conn_id: Uuid) {
        if let Some(mut conns) = self.rooms.get_mut(code) {
            conns.retain(|c| c.conn_id != conn_id);
            if conns.is_empty() {
                drop(conns);
                self.rooms.remove(code);
            }
        }
        tracing::info!(code, %conn_id, "Room connection unregistered");
    }

    /// Fan one message out to every connection in the room. Returns how many
    /// connections accepted it.
    pub fn broadcast(&self, code: &str, message: &ServerMessage) -> usize {
        let Some(conns) = self.rooms.get(code) else {
            return 0;
        };

        let mut sent = 0;
        for conn in conns.iter() {
            match conn.addr.try_send(message.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(
                        code,
                        session_id = %conn.session_id,
                        error = %e,
                        "Dropping broadcast to unreachable connection"
                    );
                }
            }
        }

        *self.messages_sent.write() += sent as u64;
        tracing::debug!(code, sent, "Room broadcast");
        sent
    }

    pub fn connection_count(&self, code: &str) -> usize {
        self.rooms.get(code).map(|c| c.len()).unwrap_or(0)
    }

    pub fn messages_sent(&self) -> u64 {
        *self.messages_sent.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_wire_format() {
        let msg = ServerMessage::UserReady {
            session_id: "abc".into(),
            all_ready: true,
            ready_count: 2,
            total_count: 2,
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"user_ready\""));
        assert!(json.contains("\"all_ready\":true"));
        assert!(json.contains("\"ready_count\":2"));
    }

    #[test]
    fn test_match_found_wire_format() {
        let json = serde_json::to_string(&ServerMessage::MatchFound { tmdb_id: 550 }).unwrap();
        assert_eq!(json, "{\"type\":\"match_found\",\"tmdb_id\":550}");
    }

    #[test]
    fn test_voting_finished_omits_empty_detail() {
        let msg = ServerMessage::VotingFinished {
            matches: vec![MatchRef { tmdb_id: 1 }, MatchRef { tmdb_id: 2 }],
            detail: None,
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"voting_finished\""));
        assert!(json.contains("\"matches\":[{\"tmdb_id\":1},{\"tmdb_id\":2}]"));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_start_voting_carries_iso_expiry() {
        let msg = ServerMessage::StartVoting {
            recommendations: vec![],
            expires_at: "2026-08-01T20:00:00+00:00".into(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"start_voting\""));
        assert!(json.contains("2026-08-01T20:00:00+00:00"));
    }
}
