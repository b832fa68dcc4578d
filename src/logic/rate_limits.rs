//! Per-organization request limits for API-key traffic.
//!
//! Limits are counted in fixed windows: one counter row per key per UTC
//! minute. The minute limit compares the organization's total in the
//! current minute, the day limit its total since UTC midnight. A refused
//! request still counts toward its windows. Counters older than the current
//! day are pruned as new minute windows open.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::config::RateLimitDefaults;
use crate::error::{AppError, AppResult};
use crate::logic::permissions::{require_member, require_permission, Permission};
use crate::model::{
    ApiKey, EffectiveRateLimit, Id, KeyUsage, RateLimitConfig, RateLimitUpdate, Timestamp,
    UsageSummary, UserContext,
};
use crate::store::traits::{RateLimitStore, Store};

const MINUTE_SECS: i64 = 60;
const DAY_SECS: i64 = 86_400;

fn window_start(now: Timestamp, window_secs: i64) -> Timestamp {
    let secs = now.timestamp();
    DateTime::<Utc>::from_timestamp(secs - secs.rem_euclid(window_secs), 0).unwrap_or(now)
}

pub fn minute_window(now: Timestamp) -> Timestamp {
    window_start(now, MINUTE_SECS)
}

pub fn day_window(now: Timestamp) -> Timestamp {
    window_start(now, DAY_SECS)
}

/// Whole seconds until `window_start + window_secs`, at least 1
fn seconds_until_reset(now: Timestamp, window_start: Timestamp, window_secs: i64) -> u64 {
    let reset = window_start + Duration::seconds(window_secs);
    let remaining = (reset - now).num_seconds().max(1);
    u64::try_from(remaining).unwrap_or(1)
}

pub fn validate_update(update: &RateLimitUpdate) -> AppResult<()> {
    if update.requests_per_minute <= 0 || update.requests_per_day <= 0 {
        return Err(AppError::bad_request("Rate limits must be positive"));
    }
    if update.requests_per_day < update.requests_per_minute {
        return Err(AppError::bad_request(
            "requests_per_day must be at least requests_per_minute",
        ));
    }
    Ok(())
}

pub struct RateLimitOperations;

impl RateLimitOperations {
    /// The stored config, or the configured defaults when none is stored
    pub async fn effective<S: RateLimitStore + ?Sized>(
        store: &S,
        organization_id: &Id,
        defaults: &RateLimitDefaults,
    ) -> AppResult<EffectiveRateLimit> {
        let limits = match store.get_rate_limit_config(organization_id).await? {
            Some(config) => EffectiveRateLimit {
                organization_id: config.organization_id,
                requests_per_minute: config.requests_per_minute,
                requests_per_day: config.requests_per_day,
                is_default: false,
                updated_at: Some(config.updated_at),
            },
            None => EffectiveRateLimit {
                organization_id: organization_id.clone(),
                requests_per_minute: defaults.requests_per_minute,
                requests_per_day: defaults.requests_per_day,
                is_default: true,
                updated_at: None,
            },
        };
        Ok(limits)
    }

    pub async fn get<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        defaults: &RateLimitDefaults,
    ) -> AppResult<EffectiveRateLimit> {
        require_member(store, organization_id, &user.user_id).await?;
        Self::effective(store, organization_id, defaults).await
    }

    pub async fn update<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        update: RateLimitUpdate,
    ) -> AppResult<EffectiveRateLimit> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageRateLimits,
        )
        .await?;
        validate_update(&update)?;

        let config = RateLimitConfig {
            organization_id: organization_id.clone(),
            requests_per_minute: update.requests_per_minute,
            requests_per_day: update.requests_per_day,
            updated_at: chrono::Utc::now(),
        };
        store.upsert_rate_limit_config(config.clone()).await?;

        log::info!(
            "Rate limits for {} set to {}/min {}/day by {}",
            organization_id,
            config.requests_per_minute,
            config.requests_per_day,
            user.user_id
        );
        Ok(EffectiveRateLimit {
            organization_id: config.organization_id,
            requests_per_minute: config.requests_per_minute,
            requests_per_day: config.requests_per_day,
            is_default: false,
            updated_at: Some(config.updated_at),
        })
    }

    /// Drop the stored row so the defaults apply again
    pub async fn reset<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        defaults: &RateLimitDefaults,
    ) -> AppResult<EffectiveRateLimit> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageRateLimits,
        )
        .await?;
        store.delete_rate_limit_config(organization_id).await?;
        Self::effective(store, organization_id, defaults).await
    }

    pub async fn usage<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        defaults: &RateLimitDefaults,
    ) -> AppResult<UsageSummary> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageRateLimits,
        )
        .await?;
        Self::usage_summary(store, organization_id, defaults, chrono::Utc::now()).await
    }

    /// Sums the counters of the current minute and day, overall and per key
    pub async fn usage_summary<S: RateLimitStore + ?Sized>(
        store: &S,
        organization_id: &Id,
        defaults: &RateLimitDefaults,
        now: Timestamp,
    ) -> AppResult<UsageSummary> {
        let limits = Self::effective(store, organization_id, defaults).await?;
        let minute_start = minute_window(now);
        let day_start = day_window(now);

        let counters = store.list_usage(organization_id, day_start).await?;

        let mut per_key: BTreeMap<Id, KeyUsage> = BTreeMap::new();
        for counter in &counters {
            let entry = per_key
                .entry(counter.api_key_id.clone())
                .or_insert_with(|| KeyUsage {
                    api_key_id: counter.api_key_id.clone(),
                    minute: 0,
                    day: 0,
                });
            entry.day += counter.count;
            if counter.window_start == minute_start {
                entry.minute += counter.count;
            }
        }

        Ok(UsageSummary {
            organization_id: organization_id.clone(),
            minute_window_start: minute_start,
            day_window_start: day_start,
            minute: per_key.values().map(|k| k.minute).sum(),
            day: per_key.values().map(|k| k.day).sum(),
            limits,
            keys: per_key.into_values().collect(),
        })
    }

    /// Count one request for `api_key` and refuse it when a window is over its limit
    pub async fn check_and_record<S: RateLimitStore + ?Sized>(
        store: &S,
        api_key: &ApiKey,
        defaults: &RateLimitDefaults,
        now: Timestamp,
    ) -> AppResult<EffectiveRateLimit> {
        let organization_id = &api_key.organization_id;
        let limits = Self::effective(store, organization_id, defaults).await?;
        let minute_start = minute_window(now);
        let day_start = day_window(now);

        let key_minute_count = store
            .increment_usage(organization_id, &api_key.id, minute_start)
            .await?;
        // First request of a key in a new minute: drop counters from earlier days
        if key_minute_count == 1 {
            store.prune_usage(organization_id, day_start).await?;
        }

        let minute_total = store.sum_usage(organization_id, minute_start).await?;
        if minute_total > limits.requests_per_minute {
            log::warn!(
                "Organization {} over minute limit ({} > {})",
                organization_id,
                minute_total,
                limits.requests_per_minute
            );
            return Err(AppError::TooManyRequests {
                retry_after_secs: seconds_until_reset(now, minute_start, MINUTE_SECS),
            });
        }

        let day_total = store.sum_usage(organization_id, day_start).await?;
        if day_total > limits.requests_per_day {
            log::warn!(
                "Organization {} over daily limit ({} > {})",
                organization_id,
                day_total,
                limits.requests_per_day
            );
            return Err(AppError::TooManyRequests {
                retry_after_secs: seconds_until_reset(now, day_start, DAY_SECS),
            });
        }

        Ok(limits)
    }
}
