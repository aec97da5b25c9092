//! # Campaign Schedule Cache (spec.md §4.3)
//!
//! Process-local, TTL-refreshed cache that lets `processSmart` skip a
//! database round trip in the common case where nothing is due. Backed
//! by `parking_lot::RwLock` over a plain struct rather than `dashmap`,
//! since the whole cache is one small aggregate value (`next_wake`,
//! `last_refreshed_at`, `per_campaign`) refreshed and read as a unit,
//! not sharded by key the way the teacher's per-call-id maps are.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::db::DatabaseManager;
use crate::domain::CampaignId;
use crate::error::Result;

#[derive(Debug, Clone)]
struct CampaignWakeInfo {
    next_wake: DateTime<Utc>,
}

struct CacheState {
    next_wake_time: Option<DateTime<Utc>>,
    last_refreshed_at: Option<DateTime<Utc>>,
    per_campaign: HashMap<CampaignId, CampaignWakeInfo>,
}

pub struct CampaignScheduleCache {
    db: Arc<DatabaseManager>,
    clock: Arc<dyn Clock>,
    ttl: StdDuration,
    state: RwLock<CacheState>,
}

impl CampaignScheduleCache {
    pub fn new(db: Arc<DatabaseManager>, clock: Arc<dyn Clock>, ttl: StdDuration) -> Self {
        Self {
            db,
            clock,
            ttl,
            state: RwLock::new(CacheState {
                next_wake_time: None,
                last_refreshed_at: None,
                per_campaign: HashMap::new(),
            }),
        }
    }

    /// spec.md §4.3 `nextWake`: serves from cache if fresh, else
    /// refreshes. Failure semantics: if the refresh errors, degrade to
    /// "always refresh next time" rather than propagate — a cache is
    /// never allowed to block dispatch.
    pub async fn next_wake(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let is_fresh = {
            let state = self.state.read();
            state
                .last_refreshed_at
                .map(|ts| now.signed_duration_since(ts) < chrono_duration(self.ttl))
                .unwrap_or(false)
        };

        if is_fresh {
            return self.state.read().next_wake_time;
        }

        match self.refresh(now).await {
            Ok(wake) => wake,
            Err(err) => {
                warn!(error = %err, "schedule cache refresh failed, degrading to always-refresh");
                let mut state = self.state.write();
                state.last_refreshed_at = None;
                None
            }
        }
    }

    /// spec.md §4.3 `shouldProcess`: true iff `nextWake(now) <= now`;
    /// invalidates on true so the next call re-evaluates from scratch.
    pub async fn should_process(&self, now: DateTime<Utc>) -> bool {
        let due = match self.next_wake(now).await {
            Some(wake) => wake <= now,
            None => false,
        };
        if due {
            self.invalidate();
        }
        due
    }

    /// spec.md §4.3: called after any campaign/QueueItem mutation, after
    /// processor runs, and on direct-call enqueue.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.last_refreshed_at = None;
    }

    pub async fn force_refresh(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        self.refresh(now).await
    }

    /// Number of campaigns with at least one queued item as of the last
    /// refresh, surfaced on `GET /queue/schedule` for operator visibility.
    pub fn campaign_count(&self) -> usize {
        self.state.read().per_campaign.len()
    }

    async fn refresh(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let mut wake: Option<DateTime<Utc>> = None;
        let mut per_campaign = HashMap::new();

        if self.db.any_direct_item_queued().await? {
            wake = Some(now);
        }

        for campaign in self.db.campaigns_with_queued_items().await? {
            let campaign_wake =
                next_wake_for_campaign(now, &campaign.timezone, campaign.first_call_time, campaign.last_call_time);
            if let Some(campaign_wake) = campaign_wake {
                per_campaign.insert(campaign.id, CampaignWakeInfo { next_wake: campaign_wake });
                wake = Some(match wake {
                    Some(existing) => existing.min(campaign_wake),
                    None => campaign_wake,
                });
            }
        }

        let mut state = self.state.write();
        state.next_wake_time = wake;
        state.last_refreshed_at = Some(self.clock.now());
        state.per_campaign = per_campaign;
        debug!(?wake, campaigns = state.per_campaign.len(), "schedule cache refreshed");
        Ok(wake)
    }
}

/// spec.md §4.3 refresh step 2. A campaign whose timezone doesn't parse
/// is dropped from the cache entirely (never contributes a wake time) —
/// the processor's own per-item check will still skip it safely since
/// [`crate::queue::CallQueue::next_eligible`] fails the same campaign
/// closed for the same reason.
fn next_wake_for_campaign(
    now: DateTime<Utc>,
    tz_name: &str,
    first_call_time: NaiveTime,
    last_call_time: NaiveTime,
) -> Option<DateTime<Utc>> {
    let tz: Tz = tz_name.parse().ok()?;
    let local_now = now.with_timezone(&tz);
    let local_time = local_now.time();

    let local_wake = if local_time < first_call_time {
        local_now.date_naive().and_time(first_call_time)
    } else if local_time <= last_call_time {
        return Some(now);
    } else {
        (local_now.date_naive() + Duration::days(1)).and_time(first_call_time)
    };

    let localized = tz.from_local_datetime(&local_wake).single()?;
    Some(localized.with_timezone(&Utc))
}

fn chrono_duration(std_duration: StdDuration) -> Duration {
    Duration::from_std(std_duration).unwrap_or(Duration::seconds(600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_window_wakes_today_at_first_call_time() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let first = NaiveTime::parse_from_str("09:00", "%H:%M").unwrap();
        let last = NaiveTime::parse_from_str("17:00", "%H:%M").unwrap();
        let wake = next_wake_for_campaign(now, "Asia/Kolkata", first, last).unwrap();
        // 09:00 IST == 03:30 UTC same day.
        assert_eq!(wake.format("%H:%M").to_string(), "03:30");
    }

    #[test]
    fn inside_window_wakes_immediately() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let first = NaiveTime::parse_from_str("09:00", "%H:%M").unwrap();
        let last = NaiveTime::parse_from_str("17:00", "%H:%M").unwrap();
        let wake = next_wake_for_campaign(now, "Asia/Kolkata", first, last).unwrap();
        assert_eq!(wake, now);
    }

    #[test]
    fn after_window_wakes_tomorrow() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let first = NaiveTime::parse_from_str("09:00", "%H:%M").unwrap();
        let last = NaiveTime::parse_from_str("17:00", "%H:%M").unwrap();
        let wake = next_wake_for_campaign(now, "Asia/Kolkata", first, last).unwrap();
        assert!(wake > now);
        assert_eq!(wake.format("%Y-%m-%d").to_string(), "2024-06-02");
    }

    #[test]
    fn unparseable_timezone_yields_no_wake() {
        let now = Utc::now();
        let first = NaiveTime::parse_from_str("09:00", "%H:%M").unwrap();
        let last = NaiveTime::parse_from_str("17:00", "%H:%M").unwrap();
        assert!(next_wake_for_campaign(now, "Not/AZone", first, last).is_none());
    }
}
