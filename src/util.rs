use chrono::{DateTime, TimeZone};
use std::fmt::Display;

pub const NAME_PREFIX: &str = "POMO";

/// `m:ss`, e.g. 380000 -> "6:20".
pub fn format_duration(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    format!("{}:{:02}", minutes, seconds)
}

/// Reduce free-text keywords to a playlist-name label: non-alphanumerics
/// dropped, whitespace runs collapsed to one space, at most `max_len` chars.
pub fn sanitize_label(raw: &str, max_len: usize) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_len).collect::<String>().trim_end().to_string()
}

/// Month abbreviation, day, hour, minute: "Jan05_0930".
pub fn short_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%b%d_%H%M").to_string()
}

pub fn default_playlist_name(label: &str, timestamp: &str) -> String {
    format!("{}_{}_{}", NAME_PREFIX, label, timestamp)
}
