//! Permission resolution and maintenance.
//!
//! A member's base permissions are the OR of their role bitmasks, with an
//! absent `@everyone` row reading as the default preset. Page-scoped checks
//! fold in per-page overrides: `(base | allow) & ~deny`. Privileged actors
//! (guild administrators and configured owners) bypass checks entirely.

use std::collections::HashSet;

use guildwiki_shared::error::WikiError;
use guildwiki_shared::ids::{GuildId, PageId, RoleId, UserId};
use guildwiki_shared::permissions::Permissions;

use crate::gateway::{Member, Role};
use crate::queries::{Catalog, CatalogError};
use crate::scope::Scope;
use crate::store::{db_err, is_not_null_violation};

/// One override row on a page, for a role or a member.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PageOverwrite {
    pub entity_id: i64,
    pub allow: Permissions,
    pub deny: Permissions,
}

struct ResolverQueries {
    get_page_id: String,
    permissions_for: String,
    member_permissions: String,
    manage_permissions_roles: String,
    get_role_permissions: String,
    set_role_permissions: String,
    delete_role_permissions: String,
    set_default_permissions: String,
    allow_role_permissions: String,
    deny_role_permissions: String,
    get_page_overwrites: String,
    get_page_overwrites_for: String,
    set_page_overwrites: String,
    add_page_permissions: String,
    unset_page_permissions: String,
    unset_page_overwrites: String,
}

pub struct PermissionResolver {
    owners: HashSet<UserId>,
    queries: ResolverQueries,
}

impl PermissionResolver {
    pub fn new(owners: impl IntoIterator<Item = UserId>) -> Result<Self, CatalogError> {
        let catalog = Catalog::parse("permissions.sql", include_str!("../sql/permissions.sql"))?;
        let queries = ResolverQueries {
            get_page_id: catalog.get("get_page_id")?.sql(),
            permissions_for: catalog.get("permissions_for")?.sql(),
            member_permissions: catalog.get("member_permissions")?.sql(),
            manage_permissions_roles: catalog.get("manage_permissions_roles")?.sql(),
            get_role_permissions: catalog.get("get_role_permissions")?.sql(),
            set_role_permissions: catalog.get("set_role_permissions")?.sql(),
            delete_role_permissions: catalog.get("delete_role_permissions")?.sql(),
            set_default_permissions: catalog.get("set_default_permissions")?.sql(),
            allow_role_permissions: catalog.get("allow_role_permissions")?.sql(),
            deny_role_permissions: catalog.get("deny_role_permissions")?.sql(),
            get_page_overwrites: catalog.get("get_page_overwrites")?.sql(),
            get_page_overwrites_for: catalog.get("get_page_overwrites_for")?.sql(),
            set_page_overwrites: catalog.get("set_page_overwrites")?.sql(),
            add_page_permissions: catalog.get("add_page_permissions")?.sql(),
            unset_page_permissions: catalog.get("unset_page_permissions")?.sql(),
            unset_page_overwrites: catalog.get("unset_page_overwrites")?.sql(),
        };
        Ok(Self { owners: owners.into_iter().collect(), queries })
    }

    /// Guild administrators and globally configured owners bypass checks.
    pub fn is_privileged(&self, member: &Member) -> bool {
        member.guild_admin || self.owners.contains(&member.user_id)
    }

    /// Resolve a title (page or alias) to its page id.
    pub async fn page_id(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
    ) -> Result<PageId, WikiError> {
        sqlx::query_scalar(&self.queries.get_page_id)
            .bind(guild_id)
            .bind(title)
            .fetch_optional(scope.conn())
            .await
            .map_err(db_err)?
            .ok_or_else(|| WikiError::PageNotFound { title: title.to_string() })
    }

    /// Effective permissions for a member on one page.
    pub async fn permissions_for(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<Permissions, WikiError> {
        let page_id = self.page_id(scope, member.guild_id, title).await?;
        let everyone = RoleId::everyone(member.guild_id);
        let bits: i64 = sqlx::query_scalar(&self.queries.permissions_for)
            .bind(page_id)
            .bind(member.entity_ids())
            .bind(member.role_ids())
            .bind(everyone)
            .bind(Permissions::DEFAULT)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(Permissions::from_bits_truncate(bits as u64))
    }

    /// Guild-wide permissions for page-independent actions.
    pub async fn member_permissions(
        &self,
        scope: &mut Scope,
        member: &Member,
    ) -> Result<Permissions, WikiError> {
        let everyone = RoleId::everyone(member.guild_id);
        let bits: i64 = sqlx::query_scalar(&self.queries.member_permissions)
            .bind(member.role_ids())
            .bind(everyone)
            .bind(Permissions::DEFAULT)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(Permissions::from_bits_truncate(bits as u64))
    }

    /// Verify `required` against the member's effective permissions, scoped
    /// to a page when a title is given.
    pub async fn check(
        &self,
        scope: &mut Scope,
        member: &Member,
        required: Permissions,
        title: Option<&str>,
    ) -> Result<(), WikiError> {
        let actual = match title {
            Some(title) => self.permissions_for(scope, member, title).await?,
            None => self.member_permissions(scope, member).await?,
        };
        if actual.contains(required) || self.is_privileged(member) {
            return Ok(());
        }
        match title {
            Some(_) => Err(WikiError::MissingPagePermissions { required }),
            None => Err(WikiError::MissingPermissions { required }),
        }
    }

    /// The highest of the member's roles that carries `manage permissions`.
    pub async fn highest_manage_permissions_role(
        &self,
        scope: &mut Scope,
        member: &Member,
    ) -> Result<Option<Role>, WikiError> {
        let manager_ids: Vec<i64> = sqlx::query_scalar(&self.queries.manage_permissions_roles)
            .bind(member.role_ids())
            .bind(Permissions::MANAGE_PERMISSIONS)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)?;
        let mut managers: Vec<Role> = member
            .all_roles()
            .into_iter()
            .filter(|role| manager_ids.contains(&role.id.0))
            .collect();
        managers.sort_by_key(|role| role.position);
        Ok(managers.pop())
    }

    /// Role-editing guard: privileged, or the target sits strictly below the
    /// actor's highest manage-permissions role.
    pub async fn check_role_editable(
        &self,
        scope: &mut Scope,
        member: &Member,
        target: Role,
    ) -> Result<(), WikiError> {
        if self.is_privileged(member) {
            return Ok(());
        }
        let highest = self.highest_manage_permissions_role(scope, member).await?;
        check_hierarchy(target.position, highest.map(|role| role.position))
    }

    pub async fn get_role_permissions(
        &self,
        scope: &mut Scope,
        role_id: RoleId,
    ) -> Result<Permissions, WikiError> {
        let perms: Option<Permissions> = sqlx::query_scalar(&self.queries.get_role_permissions)
            .bind(role_id)
            .fetch_optional(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(perms.unwrap_or_default())
    }

    /// Unconditional overwrite, for platform-driven maintenance.
    pub async fn set_role_permissions(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        role_id: RoleId,
        perms: Permissions,
    ) -> Result<(), WikiError> {
        sqlx::query(&self.queries.set_role_permissions)
            .bind(role_id)
            .bind(guild_id)
            .bind(perms)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Called when the platform deletes a role.
    pub async fn delete_role_permissions(
        &self,
        scope: &mut Scope,
        role_id: RoleId,
    ) -> Result<(), WikiError> {
        sqlx::query(&self.queries.delete_role_permissions)
            .bind(role_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Seed `@everyone` with the default preset if it has no row yet. Called
    /// before any mutation that touches the everyone-role.
    pub async fn set_default_permissions(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
    ) -> Result<(), WikiError> {
        sqlx::query(&self.queries.set_default_permissions)
            .bind(RoleId::everyone(guild_id))
            .bind(guild_id)
            .bind(Permissions::DEFAULT)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Grant permissions to a role. Returns the role's new bitmask.
    pub async fn allow_role_permissions(
        &self,
        scope: &mut Scope,
        member: &Member,
        role: Role,
        new_perms: Permissions,
    ) -> Result<Permissions, WikiError> {
        self.check_role_editable(scope, member, role).await?;
        if role.id == RoleId::everyone(member.guild_id) {
            self.set_default_permissions(scope, member.guild_id).await?;
        }
        let perms: Permissions = sqlx::query_scalar(&self.queries.allow_role_permissions)
            .bind(role.id)
            .bind(member.guild_id)
            .bind(new_perms)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(perms)
    }

    /// Revoke permissions from a role. Returns the role's new bitmask.
    pub async fn deny_role_permissions(
        &self,
        scope: &mut Scope,
        member: &Member,
        role: Role,
        perms: Permissions,
    ) -> Result<Permissions, WikiError> {
        self.check_role_editable(scope, member, role).await?;
        if role.id == RoleId::everyone(member.guild_id) {
            self.set_default_permissions(scope, member.guild_id).await?;
        }
        let remaining: Option<Permissions> =
            sqlx::query_scalar(&self.queries.deny_role_permissions)
                .bind(role.id)
                .bind(perms)
                .fetch_optional(scope.conn())
                .await
                .map_err(db_err)?;
        Ok(remaining.unwrap_or_default())
    }

    /// All override rows for a page.
    pub async fn get_page_overwrites(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
    ) -> Result<Vec<PageOverwrite>, WikiError> {
        let page_id = self.page_id(scope, guild_id, title).await?;
        sqlx::query_as(&self.queries.get_page_overwrites)
            .bind(page_id)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)
    }

    /// The (allow, deny) pair for one entity on a page; absent rows read as
    /// no overrides either way.
    pub async fn get_page_overwrites_for(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
        entity_id: i64,
    ) -> Result<(Permissions, Permissions), WikiError> {
        let page_id = self.page_id(scope, guild_id, title).await?;
        let row: Option<(Permissions, Permissions)> =
            sqlx::query_as(&self.queries.get_page_overwrites_for)
                .bind(page_id)
                .bind(entity_id)
                .fetch_optional(scope.conn())
                .await
                .map_err(db_err)?;
        Ok(row.unwrap_or((Permissions::empty(), Permissions::empty())))
    }

    /// Replace the (allow, deny) pair for one entity on a page.
    pub async fn set_page_overwrites(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
        entity_id: i64,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<(), WikiError> {
        ensure_disjoint(allow, deny)?;
        sqlx::query(&self.queries.set_page_overwrites)
            .bind(guild_id)
            .bind(title)
            .bind(entity_id)
            .bind(allow)
            .bind(deny)
            .execute(scope.conn())
            .await
            .map_err(|e| page_cte_err(e, title))?;
        Ok(())
    }

    /// Merge permissions into an entity's allow or deny set on a page.
    /// Returns the resulting (allow, deny) pair.
    pub async fn add_page_permissions(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        entity_id: i64,
        new_allow: Permissions,
        new_deny: Permissions,
    ) -> Result<(Permissions, Permissions), WikiError> {
        ensure_disjoint(new_allow, new_deny)?;
        self.check_permissions_for(scope, member, title).await?;
        sqlx::query_as(&self.queries.add_page_permissions)
            .bind(member.guild_id)
            .bind(title)
            .bind(entity_id)
            .bind(new_allow)
            .bind(new_deny)
            .fetch_one(scope.conn())
            .await
            .map_err(|e| page_cte_err(e, title))
    }

    /// Remove permissions from both override sets ("grey check"). Returns
    /// the resulting pair, or empty sets when no override row exists.
    pub async fn unset_page_permissions(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        entity_id: i64,
        perms: Permissions,
    ) -> Result<(Permissions, Permissions), WikiError> {
        self.check_permissions_for(scope, member, title).await?;
        let row: Option<(Permissions, Permissions)> =
            sqlx::query_as(&self.queries.unset_page_permissions)
                .bind(member.guild_id)
                .bind(title)
                .bind(entity_id)
                .bind(perms)
                .fetch_optional(scope.conn())
                .await
                .map_err(db_err)?;
        Ok(row.unwrap_or((Permissions::empty(), Permissions::empty())))
    }

    /// Drop every override for one entity on a page.
    pub async fn unset_page_overwrites(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
        entity_id: i64,
    ) -> Result<(), WikiError> {
        let result = sqlx::query(&self.queries.unset_page_overwrites)
            .bind(guild_id)
            .bind(title)
            .bind(entity_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(WikiError::PageNotFound { title: title.to_string() });
        }
        Ok(())
    }

    /// Guard for page-override edits: privileged, or holding
    /// `manage permissions` on that page.
    async fn check_permissions_for(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<(), WikiError> {
        if self.is_privileged(member) {
            return Ok(());
        }
        let perms = self.permissions_for(scope, member, title).await?;
        if perms.contains(Permissions::MANAGE_PERMISSIONS) {
            return Ok(());
        }
        Err(WikiError::MissingPermissions { required: Permissions::MANAGE_PERMISSIONS })
    }
}

fn check_hierarchy(target_position: i32, highest_manager: Option<i32>) -> Result<(), WikiError> {
    match highest_manager {
        Some(highest) if target_position < highest => Ok(()),
        _ => Err(WikiError::MissingPermissions { required: Permissions::MANAGE_PERMISSIONS }),
    }
}

fn ensure_disjoint(allow: Permissions, deny: Permissions) -> Result<(), WikiError> {
    if !(allow & deny).is_empty() {
        return Err(WikiError::InvalidInput(
            "Allowed and denied permissions must not intersect.".to_string(),
        ));
    }
    Ok(())
}

/// A NULL page-id CTE trips the NOT NULL constraint; report it as the page
/// being missing.
fn page_cte_err(e: sqlx::Error, title: &str) -> WikiError {
    if is_not_null_violation(&e) {
        WikiError::PageNotFound { title: title.to_string() }
    } else {
        db_err(e)
    }
}
