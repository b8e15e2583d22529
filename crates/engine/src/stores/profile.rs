//! Emotional profile persistence

use chrono::Utc;
use mood_gateway_core::{EmotionalProfile, GatewayError};
use sqlx::{PgPool, Row};

/// One row per user: the rating-weighted average embedding plus rolling
/// counters. `confidence == min(1, watched_count / 20)` is maintained by the
/// writer, not the table.
pub struct ProfileStore {
    pool: PgPool,
}

impl ProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch(&self, user_id: i64) -> Result<Option<EmotionalProfile>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, embedding, watched_count, confidence, last_updated
            FROM user_emotional_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let embedding: Option<serde_json::Value> = row.try_get("embedding")?;
            Ok(EmotionalProfile {
                user_id: row.try_get("user_id")?,
                embedding: embedding
                    .map(serde_json::from_value)
                    .transpose()?,
                watched_count: row.try_get("watched_count")?,
                confidence: row.try_get("confidence")?,
                last_updated: row.try_get("last_updated")?,
            })
        })
        .transpose()
    }

    pub async fn upsert(&self, profile: &EmotionalProfile) -> Result<(), GatewayError> {
        let embedding = profile
            .embedding
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO user_emotional_profiles
                (user_id, embedding, watched_count, confidence, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id)
            DO UPDATE SET embedding = $2, watched_count = $3, confidence = $4, last_updated = $5
            "#,
        )
        .bind(profile.user_id)
        .bind(embedding)
        .bind(profile.watched_count)
        .bind(profile.confidence)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
