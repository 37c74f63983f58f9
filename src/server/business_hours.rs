//! Business-hours gate for outbound calling
//!
//! Pure functions: no I/O, safe to call on every poll tick. Anything that
//! cannot be interpreted is treated as closed, and an unknown timezone falls
//! back to `America/New_York`.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::models::{BusinessHours, BusinessInformation, Campaign, DayHours, GeneralizedHours};

pub const FALLBACK_TIMEZONE: Tz = chrono_tz::America::New_York;

const TIME_FORMATS: [&str; 4] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"];

/// Whether `at` (default: now) falls inside the declared open hours,
/// interpreted in `timezone`.
pub fn is_within_business_hours(
    info: &BusinessInformation,
    timezone: Option<&str>,
    at: Option<DateTime<Utc>>,
) -> bool {
    let Some(hours) = info.business_hours.as_ref() else {
        tracing::debug!("No business hours configured, treating as closed");
        return false;
    };

    let tz = resolve_timezone(timezone);
    let local = at.unwrap_or_else(Utc::now).with_timezone(&tz);

    match window_for(hours, local.weekday()) {
        Some((open, close)) => {
            let now = local.time();
            open <= now && now < close
        }
        None => false,
    }
}

/// Evaluate a campaign against its own business information.
pub fn campaign_is_open(campaign: &Campaign, at: Option<DateTime<Utc>>) -> bool {
    let info = &campaign.business_information;
    is_within_business_hours(info, info.timezone.as_deref(), at)
}

pub fn resolve_timezone(name: Option<&str>) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = name, "Unknown timezone, falling back to {}", FALLBACK_TIMEZONE);
            FALLBACK_TIMEZONE
        }),
        None => FALLBACK_TIMEZONE,
    }
}

/// Open/close window for `day`, or `None` when closed that day.
fn window_for(hours: &BusinessHours, day: Weekday) -> Option<(NaiveTime, NaiveTime)> {
    match hours {
        BusinessHours::Weekly(days) => {
            let entry = days
                .iter()
                .find(|(name, _)| name.trim().parse::<Weekday>().ok() == Some(day))
                .map(|(_, hours)| hours)?;
            day_window(entry)
        }
        BusinessHours::Generalized(range) => generalized_window(range, day),
    }
}

fn day_window(hours: &DayHours) -> Option<(NaiveTime, NaiveTime)> {
    if hours.closed {
        return None;
    }
    let open = parse_time(hours.open.as_deref()?)?;
    let close = parse_time(hours.close.as_deref()?)?;
    checked_window(open, close)
}

fn generalized_window(range: &GeneralizedHours, day: Weekday) -> Option<(NaiveTime, NaiveTime)> {
    let start = parse_weekday(&range.start_day)?;
    let end = parse_weekday(&range.end_day)?;

    let (s, e, d) = (
        start.num_days_from_monday(),
        end.num_days_from_monday(),
        day.num_days_from_monday(),
    );
    let in_range = if s <= e { s <= d && d <= e } else { d >= s || d <= e };
    if !in_range {
        return None;
    }

    checked_window(parse_time(&range.open)?, parse_time(&range.close)?)
}

// Overnight windows are not supported.
fn checked_window(open: NaiveTime, close: NaiveTime) -> Option<(NaiveTime, NaiveTime)> {
    if close <= open {
        tracing::warn!(%open, %close, "Business hours close before they open, treating as closed");
        return None;
    }
    Some((open, close))
}

fn parse_weekday(raw: &str) -> Option<Weekday> {
    let parsed = raw.trim().parse::<Weekday>().ok();
    if parsed.is_none() {
        tracing::warn!(day = raw, "Unrecognised weekday in business hours");
    }
    parsed
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    let parsed = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok());
    if parsed.is_none() {
        tracing::warn!(time = raw, "Unparseable business hours time, treating as closed");
    }
    parsed
}
