//! Due-time computation for delay nodes.

use crate::error::SchedulerError;
use chatflow_context::{ExecutionContext, interpolate};
use chatflow_flow::{DelayConfig, TimingMode};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Local timestamp forms accepted for `execute_at`, besides RFC 3339.
const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Computes when a delay armed at `ctx.now` becomes due.
///
/// `execute_at` placeholders are resolved against `ctx` here, once.
///
/// # Errors
///
/// Returns `DurationOutOfRange` for delays that overflow, and
/// `InvalidExecuteAt` / `InvalidTimezone` for bad absolute dates.
pub fn due_at(
    config: &DelayConfig,
    ctx: &ExecutionContext,
) -> Result<DateTime<Utc>, SchedulerError> {
    match config.timing_mode {
        TimingMode::FixedDelay | TimingMode::DelayFromLastMessage => after(ctx.now, config.seconds),
        TimingMode::AbsoluteDate => {
            let raw = config.execute_at.as_deref().unwrap_or_default();
            let resolved = interpolate(raw, ctx);
            let tz = resolve_timezone(config.timezone.as_deref())?;
            parse_execute_at(&resolved, tz)
        }
    }
}

/// Returns `now + seconds`.
///
/// # Errors
///
/// Returns `DurationOutOfRange` if the result does not fit.
pub fn after(now: DateTime<Utc>, seconds: u64) -> Result<DateTime<Utc>, SchedulerError> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or(SchedulerError::DurationOutOfRange { seconds })
}

/// Parses an IANA timezone name. Missing or blank means UTC.
///
/// # Errors
///
/// Returns `InvalidTimezone` for unknown names.
pub fn resolve_timezone(name: Option<&str>) -> Result<Tz, SchedulerError> {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        None => Ok(Tz::UTC),
        Some(name) => name.parse::<Tz>().map_err(|_| SchedulerError::InvalidTimezone {
            timezone: name.to_owned(),
        }),
    }
}

/// Parses an absolute `execute_at` value.
///
/// RFC 3339 values carry their own offset. Local forms are interpreted in
/// `tz`; a bare date means midnight.
///
/// # Errors
///
/// Returns `InvalidExecuteAt` for empty or unrecognised values and for
/// local times skipped by a DST transition.
pub fn parse_execute_at(raw: &str, tz: Tz) -> Result<DateTime<Utc>, SchedulerError> {
    let value = raw.trim();
    let invalid = |reason: &str| SchedulerError::InvalidExecuteAt {
        value: value.to_owned(),
        reason: reason.to_owned(),
    };

    if value.is_empty() {
        return Err(invalid("no timestamp given"));
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let local = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| invalid("unrecognised timestamp format"))?;

    tz.from_local_datetime(&local)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| invalid("local time does not exist in timezone"))
}
