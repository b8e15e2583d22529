//! # Mood Gateway Rooms
//!
//! Collaborative swipe sessions: code-based rooms, mood-pooled decks,
//! unanimous-match detection and the WebSocket fan-out layer.

pub mod engine;
pub mod hub;
pub mod store;
pub mod ws;

pub use engine::{
    all_done, generate_code, score_interactions, RoomEngine, SwipeOutcome, VotingStart,
    CLEANUP_AFTER_MINUTES,
};
pub use hub::{MatchRef, RoomHub, ServerMessage};
pub use store::RoomStore;
pub use ws::RoomSocket;
