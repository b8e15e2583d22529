//! Room persistence
//!
//! Rooms, participants, swipe interactions and matches. Swipes are
//! first-write-wins (`ON CONFLICT DO NOTHING`); cleanup deletes abandoned
//! rooms outright but keeps finished rooms' match results while purging
//! participant rows.

use chrono::{DateTime, Duration, Utc};
use mood_gateway_core::{
    GatewayError, Room, RoomContentType, RoomInteraction, RoomMatch, RoomParticipant, RoomStatus,
    SwipeAction,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;

pub struct RoomStore {
    pool: PgPool,
}

impl RoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_room(row: &PgRow) -> Result<Room, GatewayError> {
        let status: String = row.try_get("status")?;
        let content_type: String = row.try_get("content_type")?;
        Ok(Room {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            creator_session_id: row.try_get("creator_session_id")?,
            status: RoomStatus::from_str(&status).map_err(GatewayError::Fatal)?,
            content_type: RoomContentType::from_str(&content_type).map_err(GatewayError::Fatal)?,
            max_participants: row.try_get("max_participants")?,
            duration_minutes: row.try_get("duration_minutes")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_participant(row: &PgRow) -> Result<RoomParticipant, GatewayError> {
        Ok(RoomParticipant {
            room_id: row.try_get("room_id")?,
            session_id: row.try_get("session_id")?,
            mood: row.try_get("mood")?,
            is_ready: row.try_get("is_ready")?,
            joined_at: row.try_get("joined_at")?,
        })
    }

    /// Insert a room; the partial unique index on active codes turns a code
    /// race into a `Conflict`.
    pub async fn create_room(
        &self,
        code: &str,
        creator_session_id: &str,
        content_type: RoomContentType,
        max_participants: i32,
        duration_minutes: i32,
    ) -> Result<Room, GatewayError> {
        let row = sqlx::query(
            r#"
            INSERT INTO rooms (code, creator_session_id, status, content_type,
                               max_participants, duration_minutes, created_at)
            VALUES ($1, $2, 'waiting', $3, $4, $5, NOW())
            RETURNING id, code, creator_session_id, status, content_type,
                      max_participants, duration_minutes, created_at
            "#,
        )
        .bind(code)
        .bind(creator_session_id)
        .bind(content_type.as_str())
        .bind(max_participants)
        .bind(duration_minutes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                GatewayError::Conflict(format!("room code {} already in use", code))
            }
            _ => GatewayError::Database(e),
        })?;

        Self::row_to_room(&row)
    }

    /// The non-finished room holding this code, if any.
    pub async fn find_active_by_code(&self, code: &str) -> Result<Option<Room>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, creator_session_id, status, content_type,
                   max_participants, duration_minutes, created_at
            FROM rooms
            WHERE code = $1 AND status <> 'finished'
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_room).transpose()
    }

    /// The most recent room holding this code, finished or not.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Room>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, creator_session_id, status, content_type,
                   max_participants, duration_minutes, created_at
            FROM rooms
            WHERE code = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_room).transpose()
    }

    pub async fn get_room(&self, room_id: i64) -> Result<Option<Room>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, creator_session_id, status, content_type,
                   max_participants, duration_minutes, created_at
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_room).transpose()
    }

    pub async fn update_status(&self, room_id: i64, status: RoomStatus) -> Result<(), GatewayError> {
        sqlx::query("UPDATE rooms SET status = $2 WHERE id = $1")
            .bind(room_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_participant(
        &self,
        room_id: i64,
        session_id: &str,
    ) -> Result<RoomParticipant, GatewayError> {
        let row = sqlx::query(
            r#"
            INSERT INTO room_participants (room_id, session_id, joined_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (room_id, session_id) DO NOTHING
            RETURNING room_id, session_id, mood, is_ready, joined_at
            "#,
        )
        .bind(room_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_participant(&row),
            // Already present: rejoin path, read the existing row
            None => self
                .participant(room_id, session_id)
                .await?
                .ok_or_else(|| GatewayError::Fatal("participant insert race".into())),
        }
    }

    pub async fn participant(
        &self,
        room_id: i64,
        session_id: &str,
    ) -> Result<Option<RoomParticipant>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT room_id, session_id, mood, is_ready, joined_at
            FROM room_participants
            WHERE room_id = $1 AND session_id = $2
            "#,
        )
        .bind(room_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_participant).transpose()
    }

    pub async fn participants(&self, room_id: i64) -> Result<Vec<RoomParticipant>, GatewayError> {
        let rows = sqlx::query(
            r#"
            SELECT room_id, session_id, mood, is_ready, joined_at
            FROM room_participants
            WHERE room_id = $1
            ORDER BY joined_at
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_participant).collect()
    }

    /// Assign a mood and mark the participant ready.
    pub async fn set_mood(
        &self,
        room_id: i64,
        session_id: &str,
        mood: &str,
    ) -> Result<(), GatewayError> {
        let result = sqlx::query(
            r#"
            UPDATE room_participants
            SET mood = $3, is_ready = TRUE
            WHERE room_id = $1 AND session_id = $2
            "#,
        )
        .bind(room_id)
        .bind(session_id)
        .bind(mood)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound(format!(
                "session {} is not in this room",
                session_id
            )));
        }
        Ok(())
    }

    /// Record a swipe; the first write for `(room, session, tmdb)` wins.
    /// Returns whether this call inserted the row.
    pub async fn record_interaction(
        &self,
        room_id: i64,
        session_id: &str,
        tmdb_id: i64,
        action: SwipeAction,
    ) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            r#"
            INSERT INTO room_interactions (room_id, session_id, tmdb_id, action, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (room_id, session_id, tmdb_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(session_id)
        .bind(tmdb_id)
        .bind(action.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn interactions(&self, room_id: i64) -> Result<Vec<RoomInteraction>, GatewayError> {
        let rows = sqlx::query(
            r#"
            SELECT room_id, session_id, tmdb_id, action, created_at
            FROM room_interactions
            WHERE room_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let action: String = row.try_get("action")?;
                Ok(RoomInteraction {
                    room_id: row.try_get("room_id")?,
                    session_id: row.try_get("session_id")?,
                    tmdb_id: row.try_get("tmdb_id")?,
                    action: SwipeAction::from_str(&action).map_err(GatewayError::Fatal)?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Create a match unless one already exists for `(room, tmdb)`.
    /// Returns the new match, or `None` when it already existed.
    pub async fn add_match(
        &self,
        room_id: i64,
        tmdb_id: i64,
    ) -> Result<Option<RoomMatch>, GatewayError> {
        let row = sqlx::query(
            r#"
            INSERT INTO room_matches (room_id, tmdb_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (room_id, tmdb_id) DO NOTHING
            RETURNING room_id, tmdb_id, created_at
            "#,
        )
        .bind(room_id)
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(RoomMatch {
                room_id: row.try_get("room_id")?,
                tmdb_id: row.try_get("tmdb_id")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn matches(&self, room_id: i64) -> Result<Vec<RoomMatch>, GatewayError> {
        let rows = sqlx::query(
            r#"
            SELECT room_id, tmdb_id, created_at
            FROM room_matches
            WHERE room_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RoomMatch {
                    room_id: row.try_get("room_id")?,
                    tmdb_id: row.try_get("tmdb_id")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Delete abandoned waiting/voting rooms older than the cutoff. The
    /// cascade removes their participants, interactions and matches.
    pub async fn delete_abandoned_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "DELETE FROM rooms WHERE status <> 'finished' AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Purge session PII from old finished rooms while keeping the room and
    /// its matches.
    pub async fn purge_finished_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, GatewayError> {
        let participants = sqlx::query(
            r#"
            DELETE FROM room_participants
            WHERE room_id IN (
                SELECT id FROM rooms WHERE status = 'finished' AND created_at < $1
            )
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM room_interactions
            WHERE room_id IN (
                SELECT id FROM rooms WHERE status = 'finished' AND created_at < $1
            )
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(participants.rows_affected())
    }

    /// Convenience for the cleanup job.
    pub fn cutoff(minutes: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes)
    }
}
