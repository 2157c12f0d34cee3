//! GuildWiki shared library — typed IDs, permission flags, errors and event
//! contracts shared between the wiki core and its consumers.

pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod permissions;
