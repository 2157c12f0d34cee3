//! Small text helpers shared by the store and the fan-out services.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Pages outlive nicknames, so mention markup is collapsed to a stable plain
/// form before a title is stored or looked up.
pub fn clean_title(title: &str) -> String {
    static MENTION_RE: OnceLock<Regex> = OnceLock::new();
    let re = MENTION_RE
        .get_or_init(|| Regex::new(r"<(@[!&]?|#)(\d+)>").expect("mention pattern compiles"));
    let cleaned = re.replace_all(title, |caps: &regex::Captures<'_>| {
        let sigil = if caps[1].starts_with('@') { '@' } else { '#' };
        format!("{sigil}{}", &caps[2])
    });
    cleaned.trim().to_string()
}

pub fn format_datetime(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
