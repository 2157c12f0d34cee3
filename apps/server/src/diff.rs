//! Unified diffs and revision summaries for notification bodies.

use chrono::{DateTime, Utc};
use guildwiki_shared::ids::{RevisionId, UserId};
use similar::TextDiff;

use crate::text::format_datetime;

/// Oldest-to-newest unified diff between two revision bodies, labelled with
/// their summaries. `None` when the bodies are identical (rename revisions).
pub fn unified(old: &str, new: &str, from_label: &str, to_label: &str) -> Option<String> {
    if old == new {
        return None;
    }
    let diff = TextDiff::from_lines(old, new);
    Some(diff.unified_diff().context_radius(3).header(from_label, to_label).to_string())
}

/// One history line for a revision, annotated with the title it was made
/// under when that differs from the page's current title.
pub fn revision_summary(
    revision_id: RevisionId,
    current_title: &str,
    snapshot_title: &str,
    author_id: UserId,
    revised: DateTime<Utc>,
) -> String {
    let title = if snapshot_title == current_title {
        format!("\"{current_title}\"")
    } else {
        format!("\"{current_title}\" (then called \"{snapshot_title}\")")
    };
    format!(
        "#{revision_id}) {title} was revised by <@{author_id}> at {}",
        format_datetime(revised)
    )
}

/// Summary for a rename revision, whose content equals its predecessor's.
pub fn rename_summary(
    old_title: &str,
    new_title: &str,
    author_id: UserId,
    revised: DateTime<Utc>,
) -> String {
    format!(
        "\"{old_title}\" was renamed to \"{new_title}\" by <@{author_id}> at {} with no changes",
        format_datetime(revised)
    )
}
