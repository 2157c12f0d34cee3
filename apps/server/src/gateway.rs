//! The chat platform seen from the core.
//!
//! The gateway itself (connection handling, command parsing, rendering) lives
//! outside this crate; this is the complete contract the core consumes:
//! member lookup for fan-out, direct-message notifications, and editing or
//! deleting the messages that mirror pages.

use chrono::{DateTime, Utc};
use guildwiki_shared::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// A role as the platform reports it. Position orders the role hierarchy;
/// higher positions outrank lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub position: i32,
}

/// A user within one guild, as the platform reports them.
#[derive(Debug, Clone)]
pub struct Member {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Explicit roles; the implicit everyone-role need not be listed.
    pub roles: Vec<Role>,
    /// Whether the platform considers this member a guild administrator.
    pub guild_admin: bool,
}

impl Member {
    /// All roles including the implicit everyone-role at position 0.
    pub fn all_roles(&self) -> Vec<Role> {
        let everyone = RoleId::everyone(self.guild_id);
        let mut roles = self.roles.clone();
        if !roles.iter().any(|r| r.id == everyone) {
            roles.push(Role { id: everyone, position: 0 });
        }
        roles
    }

    /// Role ids (including everyone) as raw values for array binds.
    pub fn role_ids(&self) -> Vec<i64> {
        self.all_roles().into_iter().map(|r| r.id.0).collect()
    }

    /// Override entities this member matches: their roles plus themselves.
    pub fn entity_ids(&self) -> Vec<i64> {
        let mut ids = self.role_ids();
        ids.push(self.user_id.0);
        ids
    }
}

/// A direct-message notification produced by the watch-list service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PageEdited {
        guild_id: GuildId,
        title: String,
        author_id: UserId,
        revised: DateTime<Utc>,
        body: String,
    },
    PageDeleted {
        guild_id: GuildId,
        title: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("chat gateway error: {0}")]
pub struct GatewayError(pub String);

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// Look up a member. `None` means the user is no longer in the guild.
    async fn fetch_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<Member>, GatewayError>;

    /// Direct-message a notification to a user.
    async fn notify(&self, user_id: UserId, notification: Notification)
        -> Result<(), GatewayError>;

    /// Replace the content of a message the bot controls.
    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<(), GatewayError>;

    /// Delete a message the bot controls.
    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), GatewayError>;
}

/// Records calls and logs them via tracing. Used by tests and as the wiring
/// default until a real gateway frontend is attached.
#[derive(Default)]
pub struct MockChatGateway {
    pub members: std::sync::Mutex<Vec<Member>>,
    pub calls: std::sync::Mutex<Vec<MockCall>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Notify(UserId, Notification),
    EditMessage(ChannelId, MessageId, String),
    DeleteMessage(ChannelId, MessageId),
}

impl MockChatGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, member: Member) {
        self.members.lock().unwrap().push(member);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatGateway for MockChatGateway {
    async fn fetch_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<Member>, GatewayError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.guild_id == guild_id && m.user_id == user_id)
            .cloned())
    }

    async fn notify(
        &self,
        user_id: UserId,
        notification: Notification,
    ) -> Result<(), GatewayError> {
        tracing::info!(user_id = %user_id, ?notification, "mock: notify");
        self.calls.lock().unwrap().push(MockCall::Notify(user_id, notification));
        Ok(())
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<(), GatewayError> {
        tracing::info!(channel_id = %channel_id, message_id = %message_id, "mock: edit message");
        self.calls
            .lock()
            .unwrap()
            .push(MockCall::EditMessage(channel_id, message_id, content.to_string()));
        Ok(())
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), GatewayError> {
        tracing::info!(channel_id = %channel_id, message_id = %message_id, "mock: delete message");
        self.calls.lock().unwrap().push(MockCall::DeleteMessage(channel_id, message_id));
        Ok(())
    }
}
