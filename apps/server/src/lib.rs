//! GuildWiki server — the core of a multi-tenant, revision-controlled wiki
//! living inside a chat platform.
//!
//! Four subsystems make up the core: the page store and revision log, the
//! permission resolver, the change-notification bus, and the message-binding
//! engine. Command handling and the chat gateway itself live outside this
//! crate and talk to the core through [`store`] services and the
//! [`gateway::ChatGateway`] trait.

pub mod config;
pub mod diff;
pub mod events;
pub mod gateway;
pub mod queries;
pub mod scope;
pub mod shutdown;
pub mod state;
pub mod store;
pub mod tasks;
pub mod text;
