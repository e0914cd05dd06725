use crate::error::{EngineError, Result};

/// Canonical day tokens, Monday first. All day addressing in the store uses
/// these; user-facing day names are normalized on the way in.
pub const DAY_TOKENS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Reserved student label for blocked/occupied slots.
pub const OCCUPIED_LABEL: &str = "(occupied)";

pub const NOTE_MANUALLY_ADDED: &str = "manually added";
pub const NOTE_TIME_OCCUPIED: &str = "time occupied";
pub const NOTE_RESTORED: &str = "restored";

/// Normalize a day name to one of the seven canonical tokens.
///
/// Accepts English full names and abbreviations, the CJK variants found in
/// imported timetable data (星期一 / 周一 / 週一 / 礼拜一 / 禮拜一, with 日 or
/// 天 for Sunday), and 1-based day numbers.
pub fn normalize_day(raw: &str) -> Result<&'static str> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(EngineError::InvalidTimeFormat("empty day name".to_string()));
    }

    let lower = t.to_lowercase();
    match lower.as_str() {
        "mon" | "monday" | "1" => return Ok("mon"),
        "tue" | "tues" | "tuesday" | "2" => return Ok("tue"),
        "wed" | "weds" | "wednesday" | "3" => return Ok("wed"),
        "thu" | "thur" | "thurs" | "thursday" | "4" => return Ok("thu"),
        "fri" | "friday" | "5" => return Ok("fri"),
        "sat" | "saturday" | "6" => return Ok("sat"),
        "sun" | "sunday" | "7" => return Ok("sun"),
        _ => {}
    }

    // CJK forms: an optional week prefix followed by a single day character.
    let stripped = ["星期", "礼拜", "禮拜", "周", "週"]
        .iter()
        .find_map(|p| t.strip_prefix(p))
        .unwrap_or(t);
    match stripped {
        "一" => Ok("mon"),
        "二" => Ok("tue"),
        "三" => Ok("wed"),
        "四" => Ok("thu"),
        "五" => Ok("fri"),
        "六" => Ok("sat"),
        "日" | "天" => Ok("sun"),
        _ => Err(EngineError::InvalidTimeFormat(format!(
            "unrecognized day name: {raw}"
        ))),
    }
}

/// 0-based index of a canonical day token (Monday = 0).
pub fn day_index(token: &str) -> usize {
    DAY_TOKENS.iter().position(|d| *d == token).unwrap_or(0)
}

/// Parse "HH:MM" into minutes since midnight.
pub fn parse_time(raw: &str) -> Result<u16> {
    let t = raw.trim();
    let bad = || EngineError::InvalidTimeFormat(format!("time must be HH:MM, got {raw:?}"));
    let (h, m) = t.split_once(':').ok_or_else(bad)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(bad());
    }
    let hours: u16 = h.parse().map_err(|_| bad())?;
    let mins: u16 = m.parse().map_err(|_| bad())?;
    if hours > 23 || mins > 59 {
        return Err(bad());
    }
    Ok(hours * 60 + mins)
}

pub fn format_time(mins: u16) -> String {
    format!("{:02}:{:02}", mins / 60, mins % 60)
}

/// Parse and validate a slot's time range: both ends half-hour aligned,
/// duration exactly 30 or 60 minutes.
pub fn check_span(start_raw: &str, end_raw: &str) -> Result<(u16, u16)> {
    let start = parse_time(start_raw)?;
    let end = parse_time(end_raw)?;
    if start % 30 != 0 || end % 30 != 0 {
        return Err(EngineError::InvalidTimeFormat(format!(
            "slot times must be half-hour aligned: {start_raw}-{end_raw}"
        )));
    }
    if end <= start {
        return Err(EngineError::InvalidTimeFormat(format!(
            "slot must end after it starts: {start_raw}-{end_raw}"
        )));
    }
    match end - start {
        30 | 60 => Ok((start, end)),
        _ => Err(EngineError::InvalidTimeFormat(format!(
            "slot duration must be 30 or 60 minutes: {start_raw}-{end_raw}"
        ))),
    }
}

/// Canonical slot key: normalized day token plus "HH:MM-HH:MM".
pub fn slot_key(day: &str, start: u16, end: u16) -> String {
    format!("{} {}-{}", day, format_time(start), format_time(end))
}

pub fn is_half_hour(start: u16, end: u16) -> bool {
    end.saturating_sub(start) == 30
}

/// Start of the hour slot a (half-hour) start time belongs to.
pub fn hour_anchor(start: u16) -> u16 {
    start - start % 60
}

/// "first" or "second" half of the hour slot anchored at `hour_anchor(start)`.
pub fn half_hour_position(start: u16) -> &'static str {
    if start % 60 == 30 {
        "second"
    } else {
        "first"
    }
}

/// Half-open interval overlap. Adjacent half-hour slots (16:00-16:30 and
/// 16:30-17:00) do not overlap, which is exactly the pairing exception the
/// exclusivity invariant allows.
pub fn overlaps(a_start: u16, a_end: u16, b_start: u16, b_end: u16) -> bool {
    a_start < b_end && b_start < a_end
}

/// True iff `[inner_start, inner_end)` lies fully inside `[outer_start, outer_end)`.
pub fn contains(outer_start: u16, outer_end: u16, inner_start: u16, inner_end: u16) -> bool {
    outer_start <= inner_start && inner_end <= outer_end
}
