//! Ratings, watchlist and recommendation-log repositories

use chrono::Utc;
use mood_gateway_core::{
    ContentType, GatewayError, RecommendationLogEntry, UserRating, WatchlistEntry,
};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::str::FromStr;

/// User ratings, unique per `(user, tmdb_id, content_type)` with upsert
/// semantics.
pub struct RatingStore {
    pool: PgPool,
}

impl RatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, rating: &UserRating) -> Result<(), GatewayError> {
        if !(1..=10).contains(&rating.rating) {
            return Err(GatewayError::Validation(
                "rating must be between 1 and 10".into(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO user_ratings (user_id, tmdb_id, content_type, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, tmdb_id, content_type)
            DO UPDATE SET rating = $4, comment = $5
            "#,
        )
        .bind(rating.user_id)
        .bind(rating.tmdb_id)
        .bind(rating.content_type.as_str())
        .bind(rating.rating)
        .bind(&rating.comment)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn for_user(&self, user_id: i64) -> Result<Vec<UserRating>, GatewayError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, tmdb_id, content_type, rating, comment, created_at
            FROM user_ratings
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let content_type: String = row.try_get("content_type")?;
                Ok(UserRating {
                    user_id: row.try_get("user_id")?,
                    tmdb_id: row.try_get("tmdb_id")?,
                    content_type: ContentType::from_str(&content_type)
                        .map_err(GatewayError::Fatal)?,
                    rating: row.try_get("rating")?,
                    comment: row.try_get("comment")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Keys of every title the user has rated, for exclusion filters.
    pub async fn rated_keys(
        &self,
        user_id: i64,
    ) -> Result<HashSet<(ContentType, i64)>, GatewayError> {
        let rows = sqlx::query(
            "SELECT tmdb_id, content_type FROM user_ratings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut keys = HashSet::with_capacity(rows.len());
        for row in rows {
            let content_type: String = row.try_get("content_type")?;
            keys.insert((
                ContentType::from_str(&content_type).map_err(GatewayError::Fatal)?,
                row.try_get::<i64, _>("tmdb_id")?,
            ));
        }
        Ok(keys)
    }
}

/// Watchlist entries, carrying recommendation provenance when the add came
/// from a served recommendation.
pub struct WatchlistStore {
    pool: PgPool,
}

impl WatchlistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, entry: &WatchlistEntry) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO watchlist_entries
                (user_id, tmdb_id, content_type, status, from_recommendation,
                 recommendation_type, recommendation_score, added_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, tmdb_id, content_type)
            DO UPDATE SET status = $4, from_recommendation = $5,
                          recommendation_type = $6, recommendation_score = $7
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.tmdb_id)
        .bind(entry.content_type.as_str())
        .bind(entry.status.as_str())
        .bind(entry.from_recommendation)
        .bind(entry.recommendation_type.map(|t| t.as_str()))
        .bind(entry.recommendation_score)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn for_user(&self, user_id: i64) -> Result<Vec<WatchlistEntry>, GatewayError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, tmdb_id, content_type, status, from_recommendation,
                   recommendation_type, recommendation_score, added_at
            FROM watchlist_entries
            WHERE user_id = $1
            ORDER BY added_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let content_type: String = row.try_get("content_type")?;
                let status: String = row.try_get("status")?;
                let rec_type: Option<String> = row.try_get("recommendation_type")?;
                Ok(WatchlistEntry {
                    user_id: row.try_get("user_id")?,
                    tmdb_id: row.try_get("tmdb_id")?,
                    content_type: ContentType::from_str(&content_type)
                        .map_err(GatewayError::Fatal)?,
                    status: FromStr::from_str(&status).map_err(GatewayError::Fatal)?,
                    from_recommendation: row.try_get("from_recommendation")?,
                    recommendation_type: rec_type
                        .map(|t| FromStr::from_str(&t).map_err(GatewayError::Fatal))
                        .transpose()?,
                    recommendation_score: row.try_get("recommendation_score")?,
                    added_at: row.try_get("added_at")?,
                })
            })
            .collect()
    }
}

/// Append-only log of served recommendations.
pub struct RecommendationLogStore {
    pool: PgPool,
}

impl RecommendationLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, entries: &[RecommendationLogEntry]) -> Result<(), GatewayError> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO recommendation_logs
                    (user_id, tmdb_id, content_type, recommendation_type,
                     emotion_state, score, viewed, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entry.user_id)
            .bind(entry.tmdb_id)
            .bind(entry.content_type.as_str())
            .bind(entry.recommendation_type.as_str())
            .bind(&entry.emotion_state)
            .bind(entry.score)
            .bind(entry.viewed)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}
