macro_rules! define_id {
    ($name:ident) => {
        /// Typed wrapper around a 64-bit entity identifier.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        #[cfg_attr(feature = "sqlx", sqlx(transparent))]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

// Identifiers minted by the chat platform.
define_id!(GuildId);
define_id!(UserId);
define_id!(RoleId);
define_id!(ChannelId);
define_id!(MessageId);

// Identifiers minted by the page store.
define_id!(PageId);
define_id!(RevisionId);
define_id!(ContentId);

impl RoleId {
    /// The implicit everyone-role of a guild shares the guild's id.
    pub fn everyone(guild: GuildId) -> Self {
        Self(guild.0)
    }
}
