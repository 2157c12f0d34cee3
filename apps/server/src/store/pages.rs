//! The page store: versioned pages, aliases, revisions and usage statistics.
//!
//! Every operation takes the acting member, authorizes through the
//! permission resolver, and runs inside the caller's `Scope`, so command
//! handlers can compose reads, checks and mutations into one atomic unit.
//! Operations that must exclude title races or preserve the rename-revision
//! invariant open serializable transactions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{BoxStream, StreamExt};
use guildwiki_shared::constants::{
    CONTENT_LENGTH_LIMIT, RECENT_CUTOFF_WEEKS, TITLE_LENGTH_LIMIT, TOP_LIMIT,
};
use guildwiki_shared::error::WikiError;
use guildwiki_shared::ids::{ContentId, GuildId, PageId, RevisionId, UserId};
use guildwiki_shared::permissions::Permissions;

use crate::diff;
use crate::gateway::Member;
use crate::queries::{Catalog, CatalogError};
use crate::scope::{Isolation, Scope};
use crate::store::permissions::PermissionResolver;
use crate::store::{db_err, finish, is_not_null_violation, title_conflict};
use crate::text;

/// A page addressed by some title, carrying its current revision. `alias`
/// is set when the requested title was an alias; `original_title` is then
/// the canonical page title.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Page {
    pub page_id: PageId,
    pub original_title: String,
    pub alias: bool,
    pub created_at: DateTime<Utc>,
    pub revision_id: RevisionId,
    pub author_id: UserId,
    pub revised: DateTime<Utc>,
    /// Absent on partial reads.
    #[sqlx(default)]
    pub content: Option<String>,
}

/// The outcome of resolving a title without loading content.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResolvedTitle {
    /// The alias title when the requested title was an alias.
    pub alias: Option<String>,
    pub page_id: PageId,
    /// The canonical page title.
    pub target: String,
}

impl ResolvedTitle {
    pub fn is_alias(&self) -> bool {
        self.alias.is_some()
    }
}

/// One row of the all-pages or search listings.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PageSummary {
    pub page_id: PageId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub revision_id: RevisionId,
    pub author_id: UserId,
    pub revised: DateTime<Utc>,
}

/// One history entry. `title` is the snapshot taken at revision time;
/// `current_title` is the page's title now.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RevisionSummary {
    pub revision_id: RevisionId,
    pub page_id: PageId,
    pub author_id: UserId,
    pub revised: DateTime<Utc>,
    pub title: String,
    pub current_title: String,
}

impl RevisionSummary {
    pub fn summary(&self) -> String {
        diff::revision_summary(
            self.revision_id,
            &self.current_title,
            &self.title,
            self.author_id,
            self.revised,
        )
    }
}

/// A revision with its body, for diffs and reverts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RevisionDetail {
    pub revision_id: RevisionId,
    pub page_id: PageId,
    pub guild_id: GuildId,
    pub author_id: UserId,
    pub revised: DateTime<Utc>,
    pub title: String,
    pub current_title: String,
    pub content: String,
}

impl RevisionDetail {
    pub fn summary(&self) -> String {
        diff::revision_summary(
            self.revision_id,
            &self.current_title,
            &self.title,
            self.author_id,
            self.revised,
        )
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopPage {
    pub title: String,
    pub uses: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopEditor {
    pub author_id: UserId,
    pub revisions: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PageEditor {
    pub author_id: UserId,
    pub revisions: i64,
    /// This author's share of the page's recent revisions, 0..=1.
    pub rank: f64,
}

struct WikiQueries {
    get_page: String,
    get_page_partial: String,
    get_alias: String,
    get_page_no_alias: String,
    create_page: String,
    create_content: String,
    create_revision: String,
    alias_page: String,
    rename_page: String,
    get_content_id: String,
    delete_page: String,
    delete_alias: String,
    get_page_revisions: String,
    get_all_pages: String,
    get_recent_revisions: String,
    search_pages: String,
    get_individual_revisions: String,
    page_count: String,
    revisions_count: String,
    page_revisions_count: String,
    page_uses: String,
    total_page_uses: String,
    top_pages: String,
    top_editors: String,
    top_page_editors: String,
    log_page_use: String,
    prune_page_uses: String,
}

pub struct PageStore {
    resolver: Arc<PermissionResolver>,
    queries: WikiQueries,
}

impl PageStore {
    pub fn new(resolver: Arc<PermissionResolver>) -> Result<Self, CatalogError> {
        let catalog = Catalog::parse("wiki.sql", include_str!("../sql/wiki.sql"))?;
        let get_page = catalog.get("get_page")?;
        let queries = WikiQueries {
            get_page: get_page.sql(),
            get_page_partial: get_page.with(&[])?,
            get_alias: catalog.get("get_alias")?.sql(),
            get_page_no_alias: catalog.get("get_page_no_alias")?.sql(),
            create_page: catalog.get("create_page")?.sql(),
            create_content: catalog.get("create_content")?.sql(),
            create_revision: catalog.get("create_revision")?.sql(),
            alias_page: catalog.get("alias_page")?.sql(),
            rename_page: catalog.get("rename_page")?.sql(),
            get_content_id: catalog.get("get_content_id")?.sql(),
            delete_page: catalog.get("delete_page")?.sql(),
            delete_alias: catalog.get("delete_alias")?.sql(),
            get_page_revisions: catalog.get("get_page_revisions")?.sql(),
            get_all_pages: catalog.get("get_all_pages")?.sql(),
            get_recent_revisions: catalog.get("get_recent_revisions")?.sql(),
            search_pages: catalog.get("search_pages")?.sql(),
            get_individual_revisions: catalog.get("get_individual_revisions")?.sql(),
            page_count: catalog.get("page_count")?.sql(),
            revisions_count: catalog.get("revisions_count")?.sql(),
            page_revisions_count: catalog.get("page_revisions_count")?.sql(),
            page_uses: catalog.get("page_uses")?.sql(),
            total_page_uses: catalog.get("total_page_uses")?.sql(),
            top_pages: catalog.get("top_pages")?.sql(),
            top_editors: catalog.get("top_editors")?.sql(),
            top_page_editors: catalog.get("top_page_editors")?.sql(),
            log_page_use: catalog.get("log_page_use")?.sql(),
            prune_page_uses: catalog.get("prune_page_uses")?.sql(),
        };
        Ok(Self { resolver, queries })
    }

    pub fn resolver(&self) -> &Arc<PermissionResolver> {
        &self.resolver
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Fetch a page with its content, resolving an alias one hop.
    pub async fn get_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<Page, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, Some(title)).await?;
        self.fetch_page(scope, member.guild_id, title, false).await
    }

    /// Fetch a page without its content.
    pub async fn get_page_partial(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<Page, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, Some(title)).await?;
        self.fetch_page(scope, member.guild_id, title, true).await
    }

    /// Fetch without a permission check, for callers that authorize
    /// differently (bindings, unwatch).
    pub(crate) async fn fetch_page(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
        partial: bool,
    ) -> Result<Page, WikiError> {
        let query = if partial { &self.queries.get_page_partial } else { &self.queries.get_page };
        sqlx::query_as(query)
            .bind(guild_id)
            .bind(title)
            .fetch_optional(scope.conn())
            .await
            .map_err(db_err)?
            .ok_or_else(|| WikiError::PageNotFound { title: title.to_string() })
    }

    /// Report whether a title is an alias and what it points at, without
    /// loading content.
    pub async fn resolve_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<ResolvedTitle, WikiError> {
        scope.begin(Isolation::ReadCommitted).await.map_err(db_err)?;
        let result = self.resolve_page_tx(scope, member, title).await;
        finish(scope, result, db_err).await
    }

    async fn resolve_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<ResolvedTitle, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, Some(title)).await?;

        let alias: Option<ResolvedTitle> = sqlx::query_as(&self.queries.get_alias)
            .bind(member.guild_id)
            .bind(title)
            .fetch_optional(scope.conn())
            .await
            .map_err(db_err)?;
        if let Some(alias) = alias {
            return Ok(alias);
        }

        sqlx::query_as(&self.queries.get_page_no_alias)
            .bind(member.guild_id)
            .bind(title)
            .fetch_optional(scope.conn())
            .await
            .map_err(db_err)?
            .ok_or_else(|| WikiError::PageNotFound { title: title.to_string() })
    }

    pub async fn get_page_revisions<'a>(
        &'a self,
        scope: &'a mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<BoxStream<'a, Result<RevisionSummary, WikiError>>, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, Some(title)).await?;
        Ok(sqlx::query_as::<_, RevisionSummary>(&self.queries.get_page_revisions)
            .bind(member.guild_id)
            .bind(title.to_string())
            .fetch(scope.conn())
            .map(|row| row.map_err(db_err))
            .boxed())
    }

    pub async fn get_all_pages<'a>(
        &'a self,
        scope: &'a mut Scope,
        member: &Member,
    ) -> Result<BoxStream<'a, Result<PageSummary, WikiError>>, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, None).await?;
        Ok(sqlx::query_as::<_, PageSummary>(&self.queries.get_all_pages)
            .bind(member.guild_id)
            .fetch(scope.conn())
            .map(|row| row.map_err(db_err))
            .boxed())
    }

    pub async fn get_recent_revisions<'a>(
        &'a self,
        scope: &'a mut Scope,
        member: &Member,
        cutoff: DateTime<Utc>,
    ) -> Result<BoxStream<'a, Result<RevisionSummary, WikiError>>, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, None).await?;
        Ok(sqlx::query_as::<_, RevisionSummary>(&self.queries.get_recent_revisions)
            .bind(member.guild_id)
            .bind(cutoff)
            .fetch(scope.conn())
            .map(|row| row.map_err(db_err))
            .boxed())
    }

    /// Pages whose title is trigram-similar to the query, best first.
    pub async fn search_pages<'a>(
        &'a self,
        scope: &'a mut Scope,
        member: &Member,
        query: &str,
    ) -> Result<BoxStream<'a, Result<PageSummary, WikiError>>, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, None).await?;
        Ok(sqlx::query_as::<_, PageSummary>(&self.queries.search_pages)
            .bind(member.guild_id)
            .bind(query.to_string())
            .fetch(scope.conn())
            .map(|row| row.map_err(db_err))
            .boxed())
    }

    /// Batch-fetch revisions by id, ascending. Fails if any id is missing
    /// or belongs to another guild.
    pub async fn get_individual_revisions(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        revision_ids: &[RevisionId],
    ) -> Result<Vec<RevisionDetail>, WikiError> {
        let ids: Vec<i64> = revision_ids.iter().map(|id| id.0).collect();
        let revisions: Vec<RevisionDetail> =
            sqlx::query_as(&self.queries.get_individual_revisions)
                .bind(guild_id)
                .bind(&ids)
                .fetch_all(scope.conn())
                .await
                .map_err(db_err)?;

        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        if revisions.len() != unique.len() {
            return Err(WikiError::InvalidInput(
                "One or more revision IDs were not found.".to_string(),
            ));
        }
        Ok(revisions)
    }

    pub async fn get_revision(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        revision_id: RevisionId,
    ) -> Result<RevisionDetail, WikiError> {
        let mut revisions = self.get_individual_revisions(scope, guild_id, &[revision_id]).await?;
        Ok(revisions.remove(0))
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Create a page with its first revision. The revision's title snapshot
    /// is the original title.
    pub async fn create_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        content: &str,
    ) -> Result<(), WikiError> {
        let title = text::clean_title(title);
        Self::check_title(&title)?;
        Self::check_content(content)?;

        scope.begin(Isolation::Serializable).await.map_err(db_err)?;
        let result = self.create_page_tx(scope, member, &title, content).await;
        finish(scope, result, title_conflict).await
    }

    async fn create_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        content: &str,
    ) -> Result<(), WikiError> {
        self.resolver.check(scope, member, Permissions::CREATE, None).await?;

        // the unique index only covers pages, so racing alias creation is
        // excluded by the serializable isolation level
        let alias: Option<ResolvedTitle> = sqlx::query_as(&self.queries.get_alias)
            .bind(member.guild_id)
            .bind(title)
            .fetch_optional(scope.conn())
            .await
            .map_err(title_conflict)?;
        if alias.is_some() {
            return Err(WikiError::PageExists);
        }

        let page_id: PageId = sqlx::query_scalar(&self.queries.create_page)
            .bind(member.guild_id)
            .bind(title)
            .fetch_one(scope.conn())
            .await
            .map_err(title_conflict)?;

        let content_id = self.intern_content(scope, content).await?;
        self.append_revision(scope, page_id, member.user_id, content_id, title).await
    }

    /// Append a revision to an existing page. Returns the canonical title
    /// when the call went through an alias.
    pub async fn revise_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        new_content: &str,
    ) -> Result<Option<String>, WikiError> {
        Self::check_title(title)?;
        Self::check_content(new_content)?;

        scope.begin(Isolation::Serializable).await.map_err(db_err)?;
        let result = self.revise_page_tx(scope, member, title, new_content).await;
        finish(scope, result, db_err).await
    }

    async fn revise_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        new_content: &str,
    ) -> Result<Option<String>, WikiError> {
        self.resolver.check(scope, member, Permissions::EDIT, Some(title)).await?;

        let page = self.fetch_page(scope, member.guild_id, title, true).await?;
        let content_id = self.intern_content(scope, new_content).await?;
        self.append_revision(scope, page.page_id, member.user_id, content_id, &page.original_title)
            .await?;

        Ok(page.alias.then(|| page.original_title))
    }

    /// Rename a page, appending a revision that shares the previous
    /// revision's content and snapshots the new title.
    pub async fn rename_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        new_title: &str,
    ) -> Result<(), WikiError> {
        let new_title = text::clean_title(new_title);
        Self::check_title(&new_title)?;

        scope.begin(Isolation::Serializable).await.map_err(db_err)?;
        let result = self.rename_page_tx(scope, member, title, &new_title).await;
        finish(scope, result, title_conflict).await
    }

    async fn rename_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        new_title: &str,
    ) -> Result<(), WikiError> {
        self.resolver.check(scope, member, Permissions::RENAME, Some(title)).await?;
        self.ensure_title_available(scope, member.guild_id, new_title).await?;

        let page_id: Option<PageId> = sqlx::query_scalar(&self.queries.rename_page)
            .bind(member.guild_id)
            .bind(title)
            .bind(new_title)
            .fetch_optional(scope.conn())
            .await
            .map_err(title_conflict)?;
        let page_id =
            page_id.ok_or_else(|| WikiError::PageNotFound { title: title.to_string() })?;

        let content_id: ContentId = sqlx::query_scalar(&self.queries.get_content_id)
            .bind(page_id)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)?;
        self.append_revision(scope, page_id, member.user_id, content_id, new_title).await
    }

    /// Delete a page, or just an alias when the title is one. Deleting an
    /// alias needs only `edit` since it is nowhere near as destructive.
    /// Returns whether an alias was deleted.
    pub async fn delete_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<bool, WikiError> {
        scope.begin(Isolation::ReadCommitted).await.map_err(db_err)?;
        let result = self.delete_page_tx(scope, member, title).await;
        finish(scope, result, db_err).await
    }

    async fn delete_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<bool, WikiError> {
        let resolved = self.resolve_page(scope, member, title).await?;

        if resolved.is_alias() {
            self.resolver.check(scope, member, Permissions::EDIT, None).await?;
            let result = sqlx::query(&self.queries.delete_alias)
                .bind(member.guild_id)
                .bind(title)
                .execute(scope.conn())
                .await
                .map_err(db_err)?;
            if result.rows_affected() == 0 {
                return Err(WikiError::Internal(format!(
                    "{title:?} resolved to an alias but delete_alias removed nothing"
                )));
            }
            return Ok(true);
        }

        self.resolver.check(scope, member, Permissions::DELETE, Some(title)).await?;
        let result = sqlx::query(&self.queries.delete_page)
            .bind(member.guild_id)
            .bind(title)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(WikiError::Internal(format!(
                "{title:?} resolved to a page but delete_page removed nothing"
            )));
        }
        Ok(false)
    }

    /// Create an alias to an existing page. Requires `create` plus `view`
    /// on the target; the target must be a page, not another alias.
    pub async fn alias_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        alias_title: &str,
        target_title: &str,
    ) -> Result<(), WikiError> {
        let alias_title = text::clean_title(alias_title);
        Self::check_title(&alias_title)?;

        scope.begin(Isolation::Serializable).await.map_err(db_err)?;
        let result = self.alias_page_tx(scope, member, &alias_title, target_title).await;
        finish(scope, result, title_conflict).await
    }

    async fn alias_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        alias_title: &str,
        target_title: &str,
    ) -> Result<(), WikiError> {
        self.resolver.check(scope, member, Permissions::CREATE, None).await?;
        self.resolver.check(scope, member, Permissions::VIEW, Some(target_title)).await?;
        self.ensure_title_available(scope, member.guild_id, alias_title).await?;

        sqlx::query(&self.queries.alias_page)
            .bind(member.guild_id)
            .bind(alias_title)
            .bind(target_title)
            .execute(scope.conn())
            .await
            .map_err(|e| {
                if is_not_null_violation(&e) {
                    // the target subquery returned no page
                    WikiError::PageNotFound { title: target_title.to_string() }
                } else {
                    title_conflict(e)
                }
            })?;
        Ok(())
    }

    /// Replace a page's content with a historical revision's, as a new
    /// revision inside the same transaction. Serializable because the nested
    /// revise turns into a savepoint and inherits this isolation.
    pub async fn revert(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        revision_id: RevisionId,
    ) -> Result<Option<String>, WikiError> {
        scope.begin(Isolation::Serializable).await.map_err(db_err)?;
        let result = self.revert_tx(scope, member, title, revision_id).await;
        finish(scope, result, db_err).await
    }

    async fn revert_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
        revision_id: RevisionId,
    ) -> Result<Option<String>, WikiError> {
        let revision = self.get_revision(scope, member.guild_id, revision_id).await?;
        if revision.current_title.to_lowercase() != title.to_lowercase() {
            return Err(WikiError::InvalidInput(
                "That revision belongs to another page.".to_string(),
            ));
        }
        self.revise_page(scope, member, title, &revision.content).await
    }

    /// Record that a page was read. No permission check; callers log only
    /// after a successful read.
    pub async fn log_page_use(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
    ) -> Result<(), WikiError> {
        sqlx::query(&self.queries.log_page_use)
            .bind(guild_id)
            .bind(title)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Drop usage rows older than the cutoff. Returns how many went.
    pub async fn prune_page_uses(
        &self,
        scope: &mut Scope,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, WikiError> {
        let result = sqlx::query(&self.queries.prune_page_uses)
            .bind(cutoff)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    // ── Statistics ──────────────────────────────────────────────────────

    pub async fn page_count(&self, scope: &mut Scope, guild_id: GuildId) -> Result<i64, WikiError> {
        sqlx::query_scalar(&self.queries.page_count)
            .bind(guild_id)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)
    }

    pub async fn revisions_count(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
    ) -> Result<i64, WikiError> {
        sqlx::query_scalar(&self.queries.revisions_count)
            .bind(guild_id)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)
    }

    pub async fn page_revisions_count(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
    ) -> Result<i64, WikiError> {
        sqlx::query_scalar(&self.queries.page_revisions_count)
            .bind(guild_id)
            .bind(title)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)
    }

    pub async fn page_uses(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<i64, WikiError> {
        sqlx::query_scalar(&self.queries.page_uses)
            .bind(guild_id)
            .bind(title)
            .bind(cutoff.unwrap_or_else(default_cutoff))
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)
    }

    pub async fn total_page_uses(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<i64, WikiError> {
        sqlx::query_scalar(&self.queries.total_page_uses)
            .bind(guild_id)
            .bind(cutoff.unwrap_or_else(default_cutoff))
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)
    }

    pub async fn top_pages(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<TopPage>, WikiError> {
        sqlx::query_as(&self.queries.top_pages)
            .bind(guild_id)
            .bind(cutoff.unwrap_or_else(default_cutoff))
            .bind(TOP_LIMIT)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)
    }

    pub async fn top_editors(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<TopEditor>, WikiError> {
        sqlx::query_as(&self.queries.top_editors)
            .bind(guild_id)
            .bind(cutoff.unwrap_or_else(default_cutoff))
            .bind(TOP_LIMIT)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)
    }

    /// Recent editors of one page with their share of its revisions. An
    /// empty result means the title resolved to nothing.
    pub async fn top_page_editors(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<PageEditor>, WikiError> {
        let editors: Vec<PageEditor> = sqlx::query_as(&self.queries.top_page_editors)
            .bind(guild_id)
            .bind(title)
            .bind(cutoff.unwrap_or_else(default_cutoff))
            .bind(TOP_LIMIT)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)?;
        if editors.is_empty() {
            return Err(WikiError::PageNotFound { title: title.to_string() });
        }
        Ok(editors)
    }

    // ── Validation ──────────────────────────────────────────────────────

    pub fn check_title(title: &str) -> Result<(), WikiError> {
        if title.chars().count() > TITLE_LENGTH_LIMIT {
            return Err(WikiError::PageTitleTooLong {
                title: title.to_string(),
                limit: TITLE_LENGTH_LIMIT,
            });
        }
        Ok(())
    }

    pub fn check_content(content: &str) -> Result<(), WikiError> {
        let length = content.chars().count();
        if length > CONTENT_LENGTH_LIMIT {
            return Err(WikiError::PageContentTooLong { length, limit: CONTENT_LENGTH_LIMIT });
        }
        Ok(())
    }

    async fn ensure_title_available(
        &self,
        scope: &mut Scope,
        guild_id: GuildId,
        title: &str,
    ) -> Result<(), WikiError> {
        let existing: Option<Page> = sqlx::query_as(&self.queries.get_page_partial)
            .bind(guild_id)
            .bind(title)
            .fetch_optional(scope.conn())
            .await
            .map_err(title_conflict)?;
        if existing.is_some() {
            return Err(WikiError::PageExists);
        }
        Ok(())
    }

    async fn intern_content(
        &self,
        scope: &mut Scope,
        content: &str,
    ) -> Result<ContentId, WikiError> {
        sqlx::query_scalar(&self.queries.create_content)
            .bind(content)
            .fetch_one(scope.conn())
            .await
            .map_err(db_err)
    }

    async fn append_revision(
        &self,
        scope: &mut Scope,
        page_id: PageId,
        author_id: UserId,
        content_id: ContentId,
        title_snapshot: &str,
    ) -> Result<(), WikiError> {
        sqlx::query(&self.queries.create_revision)
            .bind(page_id)
            .bind(author_id)
            .bind(content_id)
            .bind(title_snapshot)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

pub fn default_cutoff() -> DateTime<Utc> {
    Utc::now() - Duration::weeks(RECENT_CUTOFF_WEEKS)
}
