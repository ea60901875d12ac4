// src/schedule.rs
//! Delivery schedule: K timestamps spread over a daily local-time window.
//!
//! The window `[start_hour, end_hour)` is split into `k + 1` equal parts; slot
//! `i` sits on boundary `i + 1`, shifted by up to ±`jitter_minutes` and clamped
//! back inside the window. If the window is already over for today the
//! schedule moves to tomorrow.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use rand::Rng;
use tracing::{error, info};

/// Spacing of the degraded schedule.
const FALLBACK_SPACING_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Offset of the channel's local time from UTC.
    pub utc_offset_minutes: i32,
    pub jitter_minutes: i64,
}

impl DeliveryWindow {
    fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("utc offset {} minutes out of range", self.utc_offset_minutes))
    }

    fn span_minutes(&self) -> Result<i64> {
        if self.start_hour >= self.end_hour || self.end_hour > 24 {
            bail!("invalid window {}..{}", self.start_hour, self.end_hour);
        }
        Ok(i64::from(self.end_hour - self.start_hour) * 60)
    }

    /// True if `t` falls inside the window on its own local calendar day.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        let Ok(off) = self.offset() else {
            return false;
        };
        let h = t.with_timezone(&off).hour();
        h >= self.start_hour && h < self.end_hour
    }
}

/// Always returns exactly `k` ascending timestamps.
pub fn generate_schedule<R: Rng>(
    k: usize,
    window: &DeliveryWindow,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<DateTime<Utc>> {
    if k == 0 {
        return Vec::new();
    }
    match try_generate(k, window, now, rng) {
        Ok(times) => {
            for (i, t) in times.iter().enumerate() {
                info!(target: "schedule", slot = i + 1, at = %t.to_rfc3339(), "scheduled");
            }
            times
        }
        Err(e) => {
            error!(target: "schedule", error = %e, "schedule generation failed; using fixed spacing");
            fallback_schedule(k, now)
        }
    }
}

/// `k` timestamps from `now`, every 30 minutes.
pub fn fallback_schedule(k: usize, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    (0..k as i64)
        .map(|i| now + Duration::minutes(FALLBACK_SPACING_MINUTES * i))
        .collect()
}

fn try_generate<R: Rng>(
    k: usize,
    window: &DeliveryWindow,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Vec<DateTime<Utc>>> {
    let span = window.span_minutes()?;
    let offset = window.offset()?;
    let local_now = now.with_timezone(&offset);

    let mut day = local_now.date_naive();
    if local_now.hour() >= window.end_hour {
        day = day
            .succ_opt()
            .ok_or_else(|| anyhow!("no day after {day}"))?;
    }
    let base = day
        .and_hms_opt(window.start_hour, 0, 0)
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .ok_or_else(|| anyhow!("window start not representable on {day}"))?
        .with_timezone(&Utc);

    let jitter = window.jitter_minutes.abs();
    let slots = k as i64 + 1;
    let mut times: Vec<DateTime<Utc>> = (1..=k as i64)
        .map(|i| {
            let position = span * i / slots;
            let shift = if jitter > 0 {
                rng.random_range(-jitter..=jitter)
            } else {
                0
            };
            let minute = (position + shift).clamp(0, span - 1);
            base + Duration::minutes(minute)
        })
        .collect();
    times.sort();
    Ok(times)
}
