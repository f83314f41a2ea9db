//! Next-fire computation: interval duration specs and timezone-aware cron
//! expressions (5-field `min hr dom mon dow`, or 6-field with a leading
//! seconds field).
//!
//! **DST handling:**
//! - Spring-forward gaps: local times that don't exist are skipped; the
//!   evaluation advances to the next existing local match.
//! - Fall-back overlaps: the earliest (pre-transition) UTC mapping fires.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Utc};

use nextai_domain::cron::{CronJobSpec, CronScheduleKind};

/// Parse a timezone string into a `chrono_tz::Tz`, falling back to UTC.
pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.trim().parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interval specs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a duration spec like `"500ms"`, `"1s"`, `"5m"`, `"2h"`, or a
/// compound like `"1h30m"`.
pub fn parse_duration(spec: &str) -> Option<Duration> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut chars = spec.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: i64 = digits.parse().ok()?;
        digits.clear();

        let unit = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Duration::milliseconds(1)
            }
            'm' => Duration::minutes(1),
            's' => Duration::seconds(1),
            'h' => Duration::hours(1),
            _ => return None,
        };
        total = total + unit * value as i32;
    }

    if !digits.is_empty() || total <= Duration::zero() {
        return None;
    }
    Some(total)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cron expressions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a cron field and check whether a value matches. Supports `*`,
/// `*/n`, comma lists, and `a-b` ranges.
fn cron_field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

/// Split an expression into `(seconds_field, [min, hr, dom, mon, dow])`.
/// Five fields imply seconds `"0"`.
fn split_fields(cron: &str) -> Option<(&str, [&str; 5])> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    match fields.len() {
        5 => Some(("0", [fields[0], fields[1], fields[2], fields[3], fields[4]])),
        6 => Some((
            fields[0],
            [fields[1], fields[2], fields[3], fields[4], fields[5]],
        )),
        _ => None,
    }
}

fn minute_matches(fields: &[&str; 5], dt: &NaiveDateTime) -> bool {
    cron_field_matches(fields[0], dt.minute())
        && cron_field_matches(fields[1], dt.hour())
        && cron_field_matches(fields[2], dt.day())
        && cron_field_matches(fields[3], dt.month())
        && cron_field_matches(fields[4], dt.weekday().num_days_from_sunday())
}

/// First second in `0..60` matching the seconds field.
fn first_matching_second(field: &str) -> Option<u32> {
    (0..60).find(|&s| cron_field_matches(field, s))
}

/// Compute the next occurrence strictly after `after` for a cron
/// expression evaluated in `tz`. Returns UTC.
pub fn cron_next_tz(
    cron: &str,
    after: &DateTime<Utc>,
    tz: chrono_tz::Tz,
) -> Option<DateTime<Utc>> {
    let (sec_field, fields) = split_fields(cron)?;
    let second = first_matching_second(sec_field)?;

    let local_after = after.with_timezone(&tz).naive_local();
    let mut candidate = local_after
        .with_second(0)
        .and_then(|c| c.with_nanosecond(0))?;

    // Up to two years of minutes: a yearly expression whose nominal date
    // falls into a DST gap can legitimately land in the following year.
    let max_checks = 2 * 366 * 24 * 60;
    for _ in 0..max_checks {
        if minute_matches(&fields, &candidate) {
            if let Some(at) = candidate.with_second(second) {
                if at > local_after {
                    match tz.from_local_datetime(&at) {
                        chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                        chrono::LocalResult::Ambiguous(earliest, _) => {
                            return Some(earliest.with_timezone(&Utc));
                        }
                        chrono::LocalResult::None => {
                            // DST gap: this local time does not exist.
                        }
                    }
                }
            }
        }
        candidate += Duration::minutes(1);
    }
    None
}

/// Compute `(next_run_at, due_now)` for a job. `last_run` anchors interval
/// schedules; cron schedules always advance from `now`.
pub fn resolve_next_run_at(
    spec: &CronJobSpec,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match spec.schedule.kind {
        CronScheduleKind::Interval => {
            let interval = parse_duration(&spec.schedule.cron)?;
            let anchor = match last_run {
                Some(last) if last > now => last,
                _ => now,
            };
            Some(anchor + interval)
        }
        CronScheduleKind::Cron => {
            let tz = parse_tz(&spec.schedule.timezone);
            cron_next_tz(&spec.schedule.cron, &now, tz)
        }
    }
}

/// Validate that a schedule can produce fire times at all.
pub fn validate_schedule(spec: &CronJobSpec) -> nextai_domain::Result<()> {
    use nextai_domain::Error;
    match spec.schedule.kind {
        CronScheduleKind::Interval => {
            parse_duration(&spec.schedule.cron).map(|_| ()).ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "invalid interval spec {:?}",
                    spec.schedule.cron
                ))
            })
        }
        CronScheduleKind::Cron => {
            let tz = parse_tz(&spec.schedule.timezone);
            cron_next_tz(&spec.schedule.cron, &Utc::now(), tz)
                .map(|_| ())
                .ok_or_else(|| {
                    Error::InvalidRequest(format!(
                        "invalid cron expression {:?}",
                        spec.schedule.cron
                    ))
                })
        }
    }
}
