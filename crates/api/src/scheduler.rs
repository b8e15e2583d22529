//! Daily background jobs
//!
//! A supervised component with an explicit start/stop lifecycle. The daily
//! cron tick runs the resumable popular ingestion for both catalogues and
//! pre-warms the public "details + similar" cache for the hottest titles;
//! a second, faster tick reaps expired rooms.

use chrono::Utc;
use cron::Schedule;
use mood_gateway_catalog::{list_entries, MetadataClient};
use mood_gateway_core::{CacheClient, ContentType, GatewayError, SchedulerConfig};
use mood_gateway_engine::{CatalogIngester, RecommendationEngine};
use mood_gateway_rooms::{RoomEngine, CLEANUP_AFTER_MINUTES};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How many popular titles get the pre-warmed public envelope.
const PREWARM_TOP_N: usize = 20;

/// TTL of the pre-warmed `{detail, similar}` envelope.
const PREWARM_TTL_SECS: u64 = 86_400;

/// Cadence of the room cleanup sweep.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Build the six-field cron expression for the configured daily fire time.
fn daily_expression(config: &SchedulerConfig) -> String {
    format!("0 {} {} * * *", config.minute, config.hour)
}

/// Handle owning the scheduler tasks; aborting it stops all ticks.
pub struct SchedulerHandle {
    daily: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn stop(self) {
        self.daily.abort();
        self.cleanup.abort();
        info!("Scheduler stopped");
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    ingester: Arc<CatalogIngester>,
    recommendations: Arc<RecommendationEngine>,
    metadata: Arc<MetadataClient>,
    rooms: Arc<RoomEngine>,
    cache: Option<CacheClient>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        ingester: Arc<CatalogIngester>,
        recommendations: Arc<RecommendationEngine>,
        metadata: Arc<MetadataClient>,
        rooms: Arc<RoomEngine>,
        cache: Option<CacheClient>,
    ) -> Self {
        Self {
            config,
            ingester,
            recommendations,
            metadata,
            rooms,
            cache,
        }
    }

    /// Spawn the cron loops. Fails only on an invalid schedule, which the
    /// config validation should have caught.
    pub fn start(self) -> Result<SchedulerHandle, GatewayError> {
        let expression = daily_expression(&self.config);
        let schedule = Schedule::from_str(&expression).map_err(|e| {
            GatewayError::Configuration(format!("invalid schedule {}: {}", expression, e))
        })?;

        info!(%expression, "Scheduler started");

        let rooms = self.rooms.clone();
        let cleanup = tokio::spawn(async move {
            let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(e) = rooms.cleanup_expired(CLEANUP_AFTER_MINUTES).await {
                    error!(error = %e, "Room cleanup failed");
                }
            }
        });

        let daily = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    error!("Cron schedule produced no upcoming fire time");
                    return;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                self.run_daily_jobs().await;
            }
        });

        Ok(SchedulerHandle { daily, cleanup })
    }

    async fn run_daily_jobs(&self) {
        info!("Daily scheduled jobs starting");

        for (content_type, batch) in [
            (ContentType::Movie, self.config.movie_batch_pages),
            (ContentType::Tv, self.config.tv_batch_pages),
        ] {
            match self.ingester.populate_continue(content_type, batch).await {
                Ok(report) => info!(
                    %content_type,
                    added = report.items_added,
                    failed_pages = report.failed_pages,
                    last_page = report.last_page,
                    "Scheduled ingestion finished"
                ),
                Err(e) => error!(%content_type, error = %e, "Scheduled ingestion failed"),
            }
        }

        for content_type in ContentType::ALL {
            if let Err(e) = self.prewarm_popular(content_type).await {
                error!(%content_type, error = %e, "Prewarm failed");
            }
        }
    }

    /// Cache `{detail, similar}` for the top popular titles so the public
    /// similar endpoint answers hot titles without a search.
    async fn prewarm_popular(&self, content_type: ContentType) -> Result<(), GatewayError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let popular = self.metadata.popular(content_type, 1).await;
        if !popular.success {
            return Err(GatewayError::Transient(format!(
                "popular page fetch failed with status {}",
                popular.status_code
            )));
        }

        let mut warmed = 0usize;
        for entry in list_entries(&popular.data).into_iter().take(PREWARM_TOP_N) {
            let detail = self.metadata.details(content_type, entry.tmdb_id).await;
            if !detail.success {
                continue;
            }

            let overview = detail
                .data
                .get("overview")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if overview.is_empty() {
                continue;
            }

            let similar = match self
                .recommendations
                .emotion_public(&overview, content_type, 1, &[entry.tmdb_id])
                .await
            {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(tmdb_id = entry.tmdb_id, error = %e, "Similar prewarm failed");
                    continue;
                }
            };

            let key = format!(
                "tmdb:{}:{}:details_similar_public",
                content_type, entry.tmdb_id
            );
            let payload = serde_json::json!({
                "detail": detail.data,
                "similar": similar,
            });
            if let Err(e) = cache.set_json(&key, &payload, PREWARM_TTL_SECS).await {
                warn!(key = %key, error = %e, "Prewarm cache write failed");
                continue;
            }
            warmed += 1;
        }

        info!(%content_type, warmed, "Prewarm finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_daily_expression_shape() {
        let config = SchedulerConfig {
            enabled: true,
            hour: 3,
            minute: 30,
            movie_batch_pages: 25,
            tv_batch_pages: 25,
        };
        assert_eq!(daily_expression(&config), "0 30 3 * * *");
    }

    #[test]
    fn test_daily_expression_parses_and_fires_daily() {
        let config = SchedulerConfig {
            enabled: true,
            hour: 4,
            minute: 15,
            movie_batch_pages: 25,
            tv_batch_pages: 25,
        };

        let schedule = Schedule::from_str(&daily_expression(&config)).unwrap();
        let mut upcoming = schedule.upcoming(Utc);
        let first = upcoming.next().unwrap();
        let second = upcoming.next().unwrap();

        assert_eq!(first.time().hour(), 4);
        assert_eq!(first.time().minute(), 15);
        assert_eq!(second - first, chrono::Duration::days(1));
    }
}
