//! Per-connection room WebSocket actor
//!
//! One actor per client connection. Client frames are JSON commands; every
//! engine outcome is fanned out through the hub. State-machine violations go
//! back to the offending socket as `error` frames without touching the other
//! clients; an unknown session id closes the socket with a policy violation.

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use mood_gateway_core::{GatewayError, SwipeAction};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::engine::RoomEngine;
use crate::hub::{MatchRef, RoomHub, ServerMessage};

/// Heartbeat ping interval.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Two missed heartbeats and the client is gone.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client-to-server room protocol.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SubmitMood { text: String },
    Swipe { tmdb_id: i64, action: SwipeAction },
    ForceStart,
    ForceFinish,
}

/// Close this socket with a policy violation.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct ClosePolicy;

/// WebSocket session actor for one room participant.
pub struct RoomSocket {
    code: String,
    session_id: String,
    conn_id: Uuid,
    engine: Arc<RoomEngine>,
    hub: Arc<RoomHub>,
    hb: Instant,
}

impl RoomSocket {
    pub fn new(code: String, session_id: String, engine: Arc<RoomEngine>, hub: Arc<RoomHub>) -> Self {
        Self {
            code,
            session_id,
            conn_id: Uuid::nil(),
            engine,
            hub,
            hb: Instant::now(),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(
                    session_id = %act.session_id,
                    "Room client heartbeat timeout, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Send an error frame to this client only.
    fn error_to(addr: &actix::Addr<RoomSocket>, error: &GatewayError) {
        let _ = addr.try_send(ServerMessage::Error {
            detail: error.to_string(),
        });
    }

    fn handle_client_message(&self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let engine = self.engine.clone();
        let hub = self.hub.clone();
        let code = self.code.clone();
        let session_id = self.session_id.clone();
        let addr = ctx.address();

        match msg {
            ClientMessage::SubmitMood { text } => {
                actix::spawn(async move {
                    match engine.submit_mood(&session_id, &code, &text).await {
                        Ok((_, participants)) => {
                            let ready_count = participants.iter().filter(|p| p.is_ready).count();
                            let total_count = participants.len();
                            hub.broadcast(
                                &code,
                                &ServerMessage::UserReady {
                                    session_id,
                                    all_ready: total_count > 0 && ready_count == total_count,
                                    ready_count,
                                    total_count,
                                },
                            );
                        }
                        Err(e) => Self::error_to(&addr, &e),
                    }
                });
            }
            ClientMessage::Swipe { tmdb_id, action } => {
                actix::spawn(async move {
                    match engine.record_swipe(&session_id, &code, tmdb_id, action).await {
                        Ok(outcome) => {
                            if let Some(matched) = outcome.matched {
                                hub.broadcast(
                                    &code,
                                    &ServerMessage::MatchFound {
                                        tmdb_id: matched.tmdb_id,
                                    },
                                );
                            }

                            if outcome.all_done {
                                match engine.complete(&code).await {
                                    Ok(matches) => {
                                        hub.broadcast(
                                            &code,
                                            &ServerMessage::VotingFinished {
                                                matches: matches
                                                    .iter()
                                                    .map(|m| MatchRef { tmdb_id: m.tmdb_id })
                                                    .collect(),
                                                detail: Some("everyone has voted".into()),
                                            },
                                        );
                                    }
                                    Err(e) => Self::error_to(&addr, &e),
                                }
                            }
                        }
                        Err(e) => Self::error_to(&addr, &e),
                    }
                });
            }
            ClientMessage::ForceStart => {
                actix::spawn(async move {
                    match engine.force_start(&session_id, &code).await {
                        Ok(start) => {
                            hub.broadcast(
                                &code,
                                &ServerMessage::StartVoting {
                                    recommendations: start.deck,
                                    expires_at: start.expires_at.to_rfc3339(),
                                },
                            );
                        }
                        Err(e) => Self::error_to(&addr, &e),
                    }
                });
            }
            ClientMessage::ForceFinish => {
                actix::spawn(async move {
                    match engine.force_finish(&session_id, &code).await {
                        Ok((_, matches)) => {
                            hub.broadcast(
                                &code,
                                &ServerMessage::VotingFinished {
                                    matches: matches
                                        .iter()
                                        .map(|m| MatchRef { tmdb_id: m.tmdb_id })
                                        .collect(),
                                    detail: None,
                                },
                            );
                        }
                        Err(e) => Self::error_to(&addr, &e),
                    }
                });
            }
        }
    }
}

impl Actor for RoomSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
        self.conn_id = self.hub.register(&self.code, &self.session_id, ctx.address());

        let engine = self.engine.clone();
        let hub = self.hub.clone();
        let code = self.code.clone();
        let session_id = self.session_id.clone();
        let addr = ctx.address();

        actix::spawn(async move {
            // Unknown sessions are closed with a policy violation
            match engine.is_participant(&session_id, &code).await {
                Ok(true) => {
                    let participants_count = engine
                        .snapshot(&code)
                        .await
                        .map(|s| s.participants_count)
                        .unwrap_or(0);
                    hub.broadcast(
                        &code,
                        &ServerMessage::UserJoined {
                            session_id,
                            participants_count,
                        },
                    );
                }
                Ok(false) => {
                    tracing::warn!(code, session_id, "Unknown session on room socket");
                    let _ = addr.try_send(ClosePolicy);
                }
                Err(e) => {
                    Self::error_to(&addr, &e);
                    let _ = addr.try_send(ClosePolicy);
                }
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.hub.unregister(&self.code, self.conn_id);
        self.hub.broadcast(
            &self.code,
            &ServerMessage::UserLeft {
                session_id: self.session_id.clone(),
            },
        );
    }
}

impl Handler<ServerMessage> for RoomSocket {
    type Result = ();

    fn handle(&mut self, msg: ServerMessage, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg) {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::error!(error = %e, "Failed to serialize server message"),
        }
    }
}

impl Handler<ClosePolicy> for RoomSocket {
    type Result = ();

    fn handle(&mut self, _msg: ClosePolicy, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseCode::Policy.into()));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RoomSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => self.handle_client_message(msg, ctx),
                Err(e) => {
                    tracing::debug!(error = %e, "Invalid room client frame");
                    if let Ok(json) = serde_json::to_string(&ServerMessage::Error {
                        detail: "invalid message".into(),
                    }) {
                        ctx.text(json);
                    }
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary frames not supported on room sockets");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                tracing::warn!("Continuation frames not supported on room sockets");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::error!(error = %e, "Room socket protocol error");
                ctx.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"submit_mood","text":"cozy rainy day"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SubmitMood { ref text } if text == "cozy rainy day"));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"swipe","tmdb_id":550,"action":"SUPERLIKE"}"#).unwrap();
        match msg {
            ClientMessage::Swipe { tmdb_id, action } => {
                assert_eq!(tmdb_id, 550);
                assert_eq!(action, SwipeAction::Superlike);
            }
            _ => panic!("wrong message type"),
        }

        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"force_start"}"#).unwrap(),
            ClientMessage::ForceStart
        ));
    }

    #[test]
    fn test_invalid_client_frames_fail_parsing() {
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"unknown"}"#).is_err());
        assert!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"swipe","tmdb_id":1,"action":"MEH"}"#)
                .is_err()
        );
    }
}
