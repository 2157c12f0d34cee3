//! Watch lists: standing subscriptions to pages, notified on edit and
//! deletion.
//!
//! The fan-out is deliberately forgiving: a subscriber who left the guild or
//! lost `view` on the page is skipped, a failed delivery is logged without
//! stopping the rest, and deliveries run concurrently.

use std::sync::Arc;

use futures::future::join_all;
use guildwiki_shared::error::WikiError;
use guildwiki_shared::events::WikiEvent;
use guildwiki_shared::ids::{GuildId, PageId, RevisionId, UserId};
use guildwiki_shared::permissions::Permissions;
use sqlx::PgPool;

use crate::diff;
use crate::events::EventConsumer;
use crate::gateway::{ChatGateway, Member, Notification};
use crate::queries::{Catalog, CatalogError};
use crate::scope::{Isolation, Scope};
use crate::store::pages::{PageStore, RevisionDetail};
use crate::store::permissions::PermissionResolver;
use crate::store::{db_err, finish};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WatchEntry {
    pub page_id: PageId,
    pub title: String,
}

struct WatchQueries {
    watch_page: String,
    unwatch_page: String,
    watch_list: String,
    page_subscribers: String,
    delete_page_subscribers: String,
    get_revision_and_previous: String,
}

pub struct WatchLists {
    pool: PgPool,
    store: Arc<PageStore>,
    resolver: Arc<PermissionResolver>,
    gateway: Arc<dyn ChatGateway>,
    queries: WatchQueries,
}

impl WatchLists {
    pub fn new(
        pool: PgPool,
        store: Arc<PageStore>,
        resolver: Arc<PermissionResolver>,
        gateway: Arc<dyn ChatGateway>,
    ) -> Result<Self, CatalogError> {
        let catalog = Catalog::parse("watch_lists.sql", include_str!("../sql/watch_lists.sql"))?;
        let queries = WatchQueries {
            watch_page: catalog.get("watch_page")?.sql(),
            unwatch_page: catalog.get("unwatch_page")?.sql(),
            watch_list: catalog.get("watch_list")?.sql(),
            page_subscribers: catalog.get("page_subscribers")?.sql(),
            delete_page_subscribers: catalog.get("delete_page_subscribers")?.sql(),
            get_revision_and_previous: catalog.get("get_revision_and_previous")?.sql(),
        };
        Ok(Self { pool, store, resolver, gateway, queries })
    }

    /// Subscribe the member to a page. Resolves aliases; requires `view`.
    /// Re-subscribing is a no-op.
    pub async fn watch_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<(), WikiError> {
        scope.begin(Isolation::ReadCommitted).await.map_err(db_err)?;
        let result = self.watch_page_tx(scope, member, title).await;
        finish(scope, result, db_err).await
    }

    async fn watch_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<(), WikiError> {
        let resolved = self.store.resolve_page(scope, member, title).await?;
        sqlx::query(&self.queries.watch_page)
            .bind(resolved.page_id)
            .bind(member.user_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Remove the member's subscription. Returns whether one existed. The
    /// page must exist, but no permission is needed to stop watching.
    pub async fn unwatch_page(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<bool, WikiError> {
        scope.begin(Isolation::ReadCommitted).await.map_err(db_err)?;
        let result = self.unwatch_page_tx(scope, member, title).await;
        finish(scope, result, db_err).await
    }

    async fn unwatch_page_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<bool, WikiError> {
        let page = self.store.fetch_page(scope, member.guild_id, title, true).await?;
        let result = sqlx::query(&self.queries.unwatch_page)
            .bind(page.page_id)
            .bind(member.user_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// The member's watched pages in their guild, alphabetical.
    pub async fn watch_list<'a>(
        &'a self,
        scope: &'a mut Scope,
        member: &Member,
    ) -> Result<futures::stream::BoxStream<'a, Result<WatchEntry, WikiError>>, WikiError> {
        use futures::StreamExt;
        Ok(sqlx::query_as::<_, WatchEntry>(&self.queries.watch_list)
            .bind(member.guild_id)
            .bind(member.user_id)
            .fetch(scope.conn())
            .map(|row| row.map_err(db_err))
            .boxed())
    }

    async fn on_page_edit(&self, revision_id: RevisionId) -> Result<(), WikiError> {
        let mut scope = Scope::acquire(&self.pool).await.map_err(db_err)?;
        let rows: Vec<RevisionDetail> = sqlx::query_as(&self.queries.get_revision_and_previous)
            .bind(revision_id)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)?;
        let Some(new) = rows.first().cloned() else {
            tracing::warn!(revision_id = %revision_id, "page_edit for unknown revision");
            return Ok(());
        };
        let old = rows.into_iter().nth(1);

        let subscribers: Vec<UserId> = sqlx::query_scalar(&self.queries.page_subscribers)
            .bind(new.page_id)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)?;

        let mut sends = Vec::new();
        for user_id in subscribers {
            // editing a page you watch should not notify yourself
            if user_id == new.author_id {
                continue;
            }
            let member = match self.gateway.fetch_member(new.guild_id, user_id).await {
                Ok(Some(member)) => member,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "member lookup failed");
                    continue;
                }
            };
            match self
                .resolver
                .check(&mut scope, &member, Permissions::VIEW, Some(&new.current_title))
                .await
            {
                Ok(()) => {}
                Err(WikiError::MissingPagePermissions { .. })
                | Err(WikiError::MissingPermissions { .. }) => continue,
                Err(e) => return Err(e),
            }

            let notification = Notification::PageEdited {
                guild_id: new.guild_id,
                title: new.current_title.clone(),
                author_id: new.author_id,
                revised: new.revised,
                body: edit_notification_body(old.as_ref(), &new),
            };
            let gateway = Arc::clone(&self.gateway);
            sends.push(async move { (user_id, gateway.notify(user_id, notification).await) });
        }
        drop(scope);

        for (user_id, delivery) in join_all(sends).await {
            if let Err(e) = delivery {
                tracing::error!(user_id = %user_id, error = %e, "edit notification failed");
            }
        }
        Ok(())
    }

    async fn on_page_delete(
        &self,
        guild_id: GuildId,
        page_id: PageId,
        title: &str,
    ) -> Result<(), WikiError> {
        let mut scope = Scope::acquire(&self.pool).await.map_err(db_err)?;
        let subscribers: Vec<UserId> = sqlx::query_scalar(&self.queries.page_subscribers)
            .bind(page_id)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)?;

        let mut sends = Vec::new();
        for user_id in subscribers {
            let member = match self.gateway.fetch_member(guild_id, user_id).await {
                Ok(Some(member)) => member,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "member lookup failed");
                    continue;
                }
            };
            let notification =
                Notification::PageDeleted { guild_id, title: title.to_string() };
            let gateway = Arc::clone(&self.gateway);
            sends.push(async move {
                (member.user_id, gateway.notify(member.user_id, notification).await)
            });
        }

        for (user_id, delivery) in join_all(sends).await {
            if let Err(e) = delivery {
                tracing::error!(user_id = %user_id, error = %e, "delete notification failed");
            }
        }

        sqlx::query(&self.queries.delete_page_subscribers)
            .bind(page_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventConsumer for WatchLists {
    fn name(&self) -> &'static str {
        "watch_lists"
    }

    async fn handle_event(&self, event: WikiEvent) -> Result<(), WikiError> {
        match event {
            WikiEvent::PageEdit { revision_id } => self.on_page_edit(revision_id).await,
            WikiEvent::PageDelete { guild_id, page_id, title } => {
                self.on_page_delete(guild_id, page_id, &title).await
            }
        }
    }
}

/// The notification body: a unified diff against the predecessor, the full
/// content for a first revision, or a rename/no-op summary.
fn edit_notification_body(old: Option<&RevisionDetail>, new: &RevisionDetail) -> String {
    let Some(old) = old else {
        return new.content.clone();
    };
    match diff::unified(&old.content, &new.content, &old.summary(), &new.summary()) {
        Some(body) => body,
        None if old.title != new.title => {
            diff::rename_summary(&old.title, &new.title, new.author_id, new.revised)
        }
        None => "These revisions appear to be identical.".to_string(),
    }
}
