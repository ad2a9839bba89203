//! Fire-time rules for scheduled jobs.
//!
//! All instants are UTC. Daily triggers carry a fixed UTC offset chosen once
//! at configuration time, so the fire sequence has no DST gaps or repeats.
//! Wall-clock jumps on the host are handled best-effort: the scheduler simply
//! compares the next instant against the current clock on every tick.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("interval must be a positive number of minutes")]
    ZeroInterval,

    #[error("invalid time of day `{0}`, expected HH:MM")]
    InvalidTime(String),

    #[error("invalid UTC offset `{0}`, expected +HH:MM or -HH:MM")]
    InvalidOffset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every `Duration`, starting at registration.
    Interval(Duration),
    /// Once per day at `time` in `offset`.
    DailyAt { time: NaiveTime, offset: FixedOffset },
}

impl Trigger {
    pub fn every_minutes(minutes: u64) -> Result<Self, TriggerError> {
        if minutes == 0 {
            return Err(TriggerError::ZeroInterval);
        }
        Ok(Trigger::Interval(Duration::from_secs(minutes * 60)))
    }

    /// `"HH:MM"` (24-hour) in the given offset.
    pub fn daily_at(time: &str, offset: FixedOffset) -> Result<Self, TriggerError> {
        Ok(Trigger::DailyAt {
            time: parse_time_of_day(time)?,
            offset,
        })
    }

    pub fn validate(&self) -> Result<(), TriggerError> {
        match self {
            Trigger::Interval(d) if d.is_zero() => Err(TriggerError::ZeroInterval),
            _ => Ok(()),
        }
    }

    /// First instant strictly after `now`.
    pub fn next_fire(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Trigger::Interval(every) => add(now, every),
            Trigger::DailyAt { time, offset } => {
                let local = now.with_timezone(&offset);
                let today = local.date_naive().and_time(time);
                let candidate = offset
                    .from_local_datetime(&today)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if candidate > now {
                    candidate
                } else {
                    candidate
                        .checked_add_days(Days::new(1))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC)
                }
            }
        }
    }

    /// Instant of the first run for a job registered at `registered_at`.
    /// Interval jobs run immediately; daily jobs wait for their time.
    pub fn first_fire(&self, registered_at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Trigger::Interval(_) => registered_at,
            Trigger::DailyAt { .. } => self.next_fire(registered_at),
        }
    }

    /// Next instant after a run that was due at `last_due`.
    ///
    /// Intervals stay anchored to the registration instant; fire instants
    /// missed while the process was busy collapse into the next future one.
    pub fn reschedule(&self, last_due: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Trigger::Interval(every) => {
                let next = add(last_due, every);
                if next > now {
                    return next;
                }
                let Ok(step) = TimeDelta::from_std(every) else {
                    return DateTime::<Utc>::MAX_UTC;
                };
                let step_ms = step.num_milliseconds().max(1);
                let behind_ms = (now - last_due).num_milliseconds();
                let skipped = behind_ms / step_ms + 1;
                last_due
                    .checked_add_signed(TimeDelta::milliseconds(skipped.saturating_mul(step_ms)))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            Trigger::DailyAt { .. } => self.next_fire(now),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval(d) => write!(f, "every {}s", d.as_secs()),
            Trigger::DailyAt { time, offset } => {
                write!(f, "daily at {} {}", time.format("%H:%M"), offset)
            }
        }
    }
}

fn add(at: DateTime<Utc>, every: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(every)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, TriggerError> {
    let trimmed = value.trim();
    let valid_shape = trimmed.len() == 5 && trimmed.as_bytes()[2] == b':';
    if !valid_shape {
        return Err(TriggerError::InvalidTime(value.to_string()));
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M").map_err(|_| TriggerError::InvalidTime(value.to_string()))
}

/// `+09:00`, `-05:30`, `Z` or `UTC`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, TriggerError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| TriggerError::InvalidOffset(value.into()));
    }

    let invalid = || TriggerError::InvalidOffset(value.to_string());
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
