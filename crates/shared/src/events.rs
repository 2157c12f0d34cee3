use crate::ids::{GuildId, PageId, RevisionId};

/// Notification channel announcing a newly committed revision.
pub const PAGE_EDIT_CHANNEL: &str = "page_edit";

/// Notification channel announcing a deleted page.
pub const PAGE_DELETE_CHANNEL: &str = "page_delete";

/// An in-process event translated from a storage-level notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WikiEvent {
    /// A revision was committed (covers creation, edits, renames and reverts).
    PageEdit { revision_id: RevisionId },
    /// A page was deleted along with everything it owned.
    PageDelete {
        guild_id: GuildId,
        page_id: PageId,
        title: String,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("unknown notification channel: {0}")]
    UnknownChannel(String),
    #[error("malformed payload on {channel}: {payload:?}")]
    MalformedPayload { channel: &'static str, payload: String },
}

impl WikiEvent {
    /// Parse a storage notification. `page_edit` carries the revision id as
    /// text; `page_delete` carries `guild_id,page_id,title`, with the title
    /// keeping any remaining commas.
    pub fn parse(channel: &str, payload: &str) -> Result<Self, EventParseError> {
        match channel {
            PAGE_EDIT_CHANNEL => {
                let revision_id = payload.parse().map_err(|_| EventParseError::MalformedPayload {
                    channel: PAGE_EDIT_CHANNEL,
                    payload: payload.to_string(),
                })?;
                Ok(WikiEvent::PageEdit { revision_id: RevisionId(revision_id) })
            }
            PAGE_DELETE_CHANNEL => {
                let mut parts = payload.splitn(3, ',');
                let malformed = || EventParseError::MalformedPayload {
                    channel: PAGE_DELETE_CHANNEL,
                    payload: payload.to_string(),
                };
                let guild_id: i64 =
                    parts.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
                let page_id: i64 =
                    parts.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
                let title = parts.next().ok_or_else(malformed)?;
                Ok(WikiEvent::PageDelete {
                    guild_id: GuildId(guild_id),
                    page_id: PageId(page_id),
                    title: title.to_string(),
                })
            }
            other => Err(EventParseError::UnknownChannel(other.to_string())),
        }
    }
}
