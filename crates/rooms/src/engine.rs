//! Room lifecycle and voting engine
//!
//! Code-based ephemeral sessions: participants join with an opaque session
//! id, submit a mood, swipe through a shared deck pooled from everyone's
//! moods, and either match unanimously on a title or end with a weighted
//! top-five. Lifecycle is strictly waiting -> voting -> finished.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use mood_gateway_core::{
    DeckItem, GatewayError, Room, RoomContentType, RoomInteraction, RoomMatch, RoomParticipant,
    RoomSnapshot, RoomStatus, SwipeAction,
};
use mood_gateway_engine::{Embedder, VectorIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::store::RoomStore;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 6;
const CODE_ATTEMPTS: usize = 10;

const DECK_SIZE: usize = 20;
const MOOD_SEARCH_K: usize = 10;
const JOKER_SEARCH_K: usize = 5;

/// Fixed query guaranteeing some universally strong titles in every deck.
const JOKER_QUERY: &str = "popular award winning masterpiece highly rated best";

const MOOD_MIN_CHARS: usize = 3;
const MOOD_MAX_CHARS: usize = 500;

const TOP_MATCHES: usize = 5;

/// Default age before an abandoned room is reaped.
pub const CLEANUP_AFTER_MINUTES: i64 = 30;

/// Outcome of one recorded swipe.
#[derive(Debug, Clone)]
pub struct SwipeOutcome {
    /// Newly detected unanimous match, if any
    pub matched: Option<RoomMatch>,
    /// Every participant has swiped every title anyone swiped
    pub all_done: bool,
}

/// Result of opening the voting phase.
#[derive(Debug, Clone)]
pub struct VotingStart {
    pub room: Room,
    pub deck: Vec<DeckItem>,
    pub expires_at: DateTime<Utc>,
}

/// Generate one candidate room code.
pub fn generate_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Weighted positive scores per title: superlike 3, like 1. Sorted by
/// descending score, ties broken by ascending id for determinism.
pub fn score_interactions(interactions: &[RoomInteraction]) -> Vec<(i64, i64)> {
    let mut scores: HashMap<i64, i64> = HashMap::new();
    for interaction in interactions {
        if interaction.action.is_positive() {
            *scores.entry(interaction.tmdb_id).or_insert(0) += interaction.action.weight();
        }
    }

    let mut ranked: Vec<(i64, i64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Sessions that recorded a positive swipe on the title.
fn sessions_liking(interactions: &[RoomInteraction], tmdb_id: i64) -> HashSet<&str> {
    interactions
        .iter()
        .filter(|i| i.tmdb_id == tmdb_id && i.action.is_positive())
        .map(|i| i.session_id.as_str())
        .collect()
}

/// Strict all-done: the union of swiped titles is contained in every
/// participant's swiped set. Trivially false with no swipes.
pub fn all_done(participants: &[RoomParticipant], interactions: &[RoomInteraction]) -> bool {
    let mut by_session: HashMap<&str, HashSet<i64>> = participants
        .iter()
        .map(|p| (p.session_id.as_str(), HashSet::new()))
        .collect();

    let mut union: HashSet<i64> = HashSet::new();
    for interaction in interactions {
        union.insert(interaction.tmdb_id);
        if let Some(set) = by_session.get_mut(interaction.session_id.as_str()) {
            set.insert(interaction.tmdb_id);
        }
    }

    if union.is_empty() {
        return false;
    }

    by_session.values().all(|set| union.is_subset(set))
}

/// Movie-room engine over the store, the vector index and the encoder.
pub struct RoomEngine {
    store: RoomStore,
    index: Arc<VectorIndex>,
    encoder: Arc<dyn Embedder>,
}

impl RoomEngine {
    pub fn new(store: RoomStore, index: Arc<VectorIndex>, encoder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            index,
            encoder,
        }
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// Create a room and record the creator as its first participant.
    pub async fn create(
        &self,
        creator_session_id: &str,
        content_type: RoomContentType,
        max_participants: i32,
        duration_minutes: i32,
    ) -> Result<Room, GatewayError> {
        if creator_session_id.trim().is_empty() {
            return Err(GatewayError::Validation("session id must not be empty".into()));
        }
        if !(2..=5).contains(&max_participants) {
            return Err(GatewayError::Validation(
                "max_participants must be between 2 and 5".into(),
            ));
        }
        if !(1..=30).contains(&duration_minutes) {
            return Err(GatewayError::Validation(
                "duration_minutes must be between 1 and 30".into(),
            ));
        }

        for _ in 0..CODE_ATTEMPTS {
            let code = generate_code(&mut rand::thread_rng());
            if self.store.find_active_by_code(&code).await?.is_some() {
                continue;
            }

            match self
                .store
                .create_room(
                    &code,
                    creator_session_id,
                    content_type,
                    max_participants,
                    duration_minutes,
                )
                .await
            {
                Ok(room) => {
                    self.store.add_participant(room.id, creator_session_id).await?;
                    info!(code = %room.code, "Room created");
                    return Ok(room);
                }
                // Lost the code race; try the next candidate
                Err(GatewayError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(GatewayError::InvalidRoomAction(
            "could not allocate a unique room code".into(),
        ))
    }

    /// Join a waiting room, or return current state for known sessions.
    pub async fn join_or_rejoin(
        &self,
        session_id: &str,
        code: &str,
    ) -> Result<(Room, Vec<RoomParticipant>), GatewayError> {
        let room = self
            .store
            .find_by_code(code)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("room {}", code)))?;

        if self.store.participant(room.id, session_id).await?.is_some() {
            let participants = self.store.participants(room.id).await?;
            return Ok((room, participants));
        }

        match room.status {
            RoomStatus::Finished => {
                return Err(GatewayError::InvalidRoomAction(
                    "room has already finished".into(),
                ))
            }
            RoomStatus::Voting => return Err(GatewayError::RoomAlreadyStarted),
            RoomStatus::Waiting => {}
        }

        let participants = self.store.participants(room.id).await?;
        if participants.len() >= room.max_participants as usize {
            return Err(GatewayError::RoomFull);
        }

        self.store.add_participant(room.id, session_id).await?;
        let participants = self.store.participants(room.id).await?;
        Ok((room, participants))
    }

    /// Assign a participant's mood and mark them ready.
    pub async fn submit_mood(
        &self,
        session_id: &str,
        code: &str,
        text: &str,
    ) -> Result<(Room, Vec<RoomParticipant>), GatewayError> {
        let mood = text.trim();
        if mood.chars().count() < MOOD_MIN_CHARS || mood.chars().count() > MOOD_MAX_CHARS {
            return Err(GatewayError::Validation(format!(
                "mood must be between {} and {} characters",
                MOOD_MIN_CHARS, MOOD_MAX_CHARS
            )));
        }

        let room = self.active_room(code).await?;
        if room.status != RoomStatus::Waiting {
            return Err(GatewayError::InvalidRoomAction(
                "moods can only change before voting starts".into(),
            ));
        }

        self.store.set_mood(room.id, session_id, mood).await?;
        let participants = self.store.participants(room.id).await?;
        Ok((room, participants))
    }

    /// Creator-only early start; requires at least one ready participant.
    pub async fn force_start(
        &self,
        creator_session_id: &str,
        code: &str,
    ) -> Result<VotingStart, GatewayError> {
        let room = self.active_room(code).await?;

        if room.creator_session_id != creator_session_id {
            return Err(GatewayError::InvalidRoomAction(
                "only the room creator can start voting".into(),
            ));
        }
        if room.status != RoomStatus::Waiting {
            return Err(GatewayError::InvalidRoomAction(
                "voting can only start from the waiting state".into(),
            ));
        }

        let participants = self.store.participants(room.id).await?;
        if !participants.iter().any(|p| p.is_ready) {
            return Err(GatewayError::InvalidRoomAction(
                "at least one participant must be ready".into(),
            ));
        }

        self.start_voting(room, &participants).await
    }

    /// Transition to voting and compute the shared deck.
    async fn start_voting(
        &self,
        room: Room,
        participants: &[RoomParticipant],
    ) -> Result<VotingStart, GatewayError> {
        let deck = self.build_deck(&room, participants).await?;

        self.store.update_status(room.id, RoomStatus::Voting).await?;
        let expires_at = Utc::now() + chrono::Duration::minutes(room.duration_minutes as i64);

        info!(code = %room.code, deck = deck.len(), "Voting started");

        let mut room = room;
        room.status = RoomStatus::Voting;
        Ok(VotingStart {
            room,
            deck,
            expires_at,
        })
    }

    /// Mood-pooled deck: one search per participant mood plus the joker
    /// layer, merged by first-seen id, shuffled, truncated. Outbound items
    /// carry metadata only.
    async fn build_deck(
        &self,
        room: &Room,
        participants: &[RoomParticipant],
    ) -> Result<Vec<DeckItem>, GatewayError> {
        let filter = room.content_type.filter();

        let mut queries: Vec<(String, usize)> = participants
            .iter()
            .filter_map(|p| p.mood.clone())
            .filter(|mood| !mood.trim().is_empty())
            .map(|mood| (mood, MOOD_SEARCH_K))
            .collect();
        queries.push((JOKER_QUERY.to_string(), JOKER_SEARCH_K));

        // All mood searches and the joker run concurrently
        let searches = queries.into_iter().map(|(text, k)| {
            let encoder = self.encoder.clone();
            let index = self.index.clone();
            async move {
                match encoder.embed(&text).await {
                    Ok(embedding) if embedding.iter().any(|&x| x != 0.0) => {
                        index.search(&embedding, k, filter)
                    }
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        warn!(error = %e, "Mood embedding failed, skipping this mood");
                        Vec::new()
                    }
                }
            }
        });

        let mut seen = HashSet::new();
        let mut pooled = Vec::new();
        for results in join_all(searches).await {
            for scored in results {
                if seen.insert(scored.item.tmdb_id) {
                    pooled.push(DeckItem::from(&scored.item));
                }
            }
        }

        pooled.shuffle(&mut rand::thread_rng());
        pooled.truncate(DECK_SIZE);
        Ok(pooled)
    }

    /// Record one swipe; on positive swipes, run unanimous-match detection.
    pub async fn record_swipe(
        &self,
        session_id: &str,
        code: &str,
        tmdb_id: i64,
        action: SwipeAction,
    ) -> Result<SwipeOutcome, GatewayError> {
        let room = self.active_room(code).await?;
        if room.status != RoomStatus::Voting {
            return Err(GatewayError::InvalidRoomAction(
                "swipes are only accepted while voting".into(),
            ));
        }
        if self.store.participant(room.id, session_id).await?.is_none() {
            return Err(GatewayError::NotFound(format!(
                "session {} is not in this room",
                session_id
            )));
        }

        let inserted = self
            .store
            .record_interaction(room.id, session_id, tmdb_id, action)
            .await?;

        let participants = self.store.participants(room.id).await?;
        let interactions = self.store.interactions(room.id).await?;

        let matched = if inserted && action.is_positive() {
            let liking = sessions_liking(&interactions, tmdb_id);
            let everyone = participants
                .iter()
                .all(|p| liking.contains(p.session_id.as_str()));
            if everyone {
                self.store.add_match(room.id, tmdb_id).await?
            } else {
                None
            }
        } else {
            None
        };

        Ok(SwipeOutcome {
            matched,
            all_done: all_done(&participants, &interactions),
        })
    }

    /// Creator-only early finish: weighted top-K is persisted as the match
    /// list and the room becomes terminal.
    pub async fn force_finish(
        &self,
        creator_session_id: &str,
        code: &str,
    ) -> Result<(Room, Vec<RoomMatch>), GatewayError> {
        let room = self.active_room(code).await?;

        if room.creator_session_id != creator_session_id {
            return Err(GatewayError::InvalidRoomAction(
                "only the room creator can finish voting".into(),
            ));
        }
        if room.status != RoomStatus::Voting {
            return Err(GatewayError::InvalidRoomAction(
                "voting has not started".into(),
            ));
        }

        let interactions = self.store.interactions(room.id).await?;
        let ranked = score_interactions(&interactions);

        let mut matches = Vec::new();
        for (tmdb_id, score) in ranked.into_iter().take(TOP_MATCHES) {
            match self.store.add_match(room.id, tmdb_id).await? {
                Some(m) => matches.push(m),
                // Already matched unanimously mid-vote; keep it in the list
                None => {
                    if let Some(existing) = self
                        .store
                        .matches(room.id)
                        .await?
                        .into_iter()
                        .find(|m| m.tmdb_id == tmdb_id)
                    {
                        matches.push(existing);
                    }
                }
            }
            info!(code = %room.code, tmdb_id, score, "Top match persisted");
        }

        self.finish(&room).await?;
        let mut room = room;
        room.status = RoomStatus::Finished;
        Ok((room, matches))
    }

    /// Unconditional terminal transition.
    pub async fn finish(&self, room: &Room) -> Result<(), GatewayError> {
        self.store.update_status(room.id, RoomStatus::Finished).await
    }

    /// Terminal transition triggered by the all-done condition; returns the
    /// matches detected during voting.
    pub async fn complete(&self, code: &str) -> Result<Vec<RoomMatch>, GatewayError> {
        let room = self.active_room(code).await?;
        self.finish(&room).await?;
        self.store.matches(room.id).await
    }

    /// Reap abandoned rooms and purge session rows from old finished rooms.
    /// Returns `(abandoned_deleted, finished_purged)`.
    pub async fn cleanup_expired(&self, minutes: i64) -> Result<(u64, u64), GatewayError> {
        let cutoff = RoomStore::cutoff(minutes);
        let abandoned = self.store.delete_abandoned_before(cutoff).await?;
        let purged = self.store.purge_finished_before(cutoff).await?;

        if abandoned > 0 || purged > 0 {
            info!(abandoned, purged, "Room cleanup finished");
        }
        Ok((abandoned, purged))
    }

    /// Room state summary for HTTP reads and rejoin responses.
    pub async fn snapshot(&self, code: &str) -> Result<RoomSnapshot, GatewayError> {
        let room = self
            .store
            .find_by_code(code)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("room {}", code)))?;

        let participants = self.store.participants(room.id).await?;
        Ok(RoomSnapshot {
            code: room.code,
            status: room.status,
            content_type: room.content_type,
            max_participants: room.max_participants,
            duration_minutes: room.duration_minutes,
            participants_count: participants.len(),
            ready_count: participants.iter().filter(|p| p.is_ready).count(),
            created_at: room.created_at,
        })
    }

    /// Whether the session belongs to the room behind this code.
    pub async fn is_participant(&self, session_id: &str, code: &str) -> Result<bool, GatewayError> {
        let Some(room) = self.store.find_by_code(code).await? else {
            return Ok(false);
        };
        Ok(self.store.participant(room.id, session_id).await?.is_some())
    }

    async fn active_room(&self, code: &str) -> Result<Room, GatewayError> {
        self.store
            .find_active_by_code(code)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("room {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn participant(session_id: &str) -> RoomParticipant {
        RoomParticipant {
            room_id: 1,
            session_id: session_id.to_string(),
            mood: Some("action adventure".into()),
            is_ready: true,
            joined_at: Utc::now(),
        }
    }

    fn swipe(session_id: &str, tmdb_id: i64, action: SwipeAction) -> RoomInteraction {
        RoomInteraction {
            room_id: 1,
            session_id: session_id.to_string(),
            tmdb_id,
            action,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_code_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_weighted_scoring_orders_matches() {
        // s1: superlike X, like Y; s2: like X, like Z; s3: like X, superlike Z
        let interactions = vec![
            swipe("s1", 1, SwipeAction::Superlike),
            swipe("s1", 2, SwipeAction::Like),
            swipe("s2", 1, SwipeAction::Like),
            swipe("s2", 3, SwipeAction::Like),
            swipe("s3", 1, SwipeAction::Like),
            swipe("s3", 3, SwipeAction::Superlike),
        ];

        let ranked = score_interactions(&interactions);
        // X = 3+1+1 = 5, Z = 1+3 = 4, Y = 1
        assert_eq!(ranked, vec![(1, 5), (3, 4), (2, 1)]);
    }

    #[test]
    fn test_dislikes_do_not_score() {
        let interactions = vec![
            swipe("s1", 1, SwipeAction::Dislike),
            swipe("s2", 1, SwipeAction::Dislike),
        ];
        assert!(score_interactions(&interactions).is_empty());
    }

    #[test]
    fn test_all_done_requires_full_coverage() {
        let participants = vec![participant("a"), participant("b")];

        // a swiped {1, 2}, b swiped {1}: union {1, 2} not covered by b
        let partial = vec![
            swipe("a", 1, SwipeAction::Like),
            swipe("a", 2, SwipeAction::Dislike),
            swipe("b", 1, SwipeAction::Like),
        ];
        assert!(!all_done(&participants, &partial));

        // b catches up on 2
        let mut complete = partial.clone();
        complete.push(swipe("b", 2, SwipeAction::Like));
        assert!(all_done(&participants, &complete));
    }

    #[test]
    fn test_all_done_false_with_no_swipes() {
        let participants = vec![participant("a"), participant("b")];
        assert!(!all_done(&participants, &[]));
    }

    #[test]
    fn test_all_done_false_when_one_participant_never_swiped() {
        let participants = vec![participant("a"), participant("b"), participant("c")];
        let interactions = vec![
            swipe("a", 1, SwipeAction::Like),
            swipe("b", 1, SwipeAction::Like),
        ];
        assert!(!all_done(&participants, &interactions));
    }
}
