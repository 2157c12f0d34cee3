use crate::permissions::{natural_join, Permissions};

/// Domain error raised by the wiki core. `Display` texts are user-facing;
/// the command layer relays them verbatim.
#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    #[error("A page called \"{title}\" does not exist.")]
    PageNotFound { title: String },

    #[error("A page or alias with that name already exists.")]
    PageExists,

    #[error("That title is too long. The limit is {limit} characters.")]
    PageTitleTooLong { title: String, limit: usize },

    #[error("That text is too long ({length} characters). The limit is {limit}.")]
    PageContentTooLong { length: usize, limit: usize },

    #[error(
        "Missing permissions to perform this action on this page. \
         You need these permissions: {}.",
        permission_list(.required)
    )]
    MissingPagePermissions { required: Permissions },

    #[error(
        "Missing permissions to perform this action. You need these permissions: {}.",
        permission_list(.required)
    )]
    MissingPermissions { required: Permissions },

    #[error("That message is not bound to any page.")]
    BindingNotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error("An internal error occurred while completing that action.")]
    Internal(String),
}

fn permission_list(perms: &Permissions) -> String {
    natural_join(&perms.names())
}
