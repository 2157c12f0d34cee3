//! Message bindings: external messages that mirror a page's current content.
//!
//! Edits are pushed into every bound message; deleting a page deletes its
//! mirrors. A mirror edit that fails (for example because the message was
//! removed out from under us) is logged and the binding retained until it is
//! unbound or the page goes away.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::BoxStream;
use futures::StreamExt;
use guildwiki_shared::error::WikiError;
use guildwiki_shared::events::WikiEvent;
use guildwiki_shared::ids::{ChannelId, GuildId, MessageId, PageId, RevisionId};
use guildwiki_shared::permissions::Permissions;
use sqlx::PgPool;

use crate::events::EventConsumer;
use crate::gateway::{ChatGateway, Member};
use crate::queries::{Catalog, CatalogError};
use crate::scope::{Isolation, Scope};
use crate::store::pages::{Page, PageStore};
use crate::store::permissions::PermissionResolver;
use crate::store::{db_err, finish};

/// One bound message of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct Binding {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub page_id: PageId,
}

/// A binding joined with its page title, for the guild-wide listing.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GuildBinding {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub page_id: PageId,
    pub title: String,
}

/// The page a message is bound to.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BoundPage {
    pub page_id: PageId,
    pub guild_id: GuildId,
    pub title: String,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MirrorRevision {
    revision_id: RevisionId,
    page_id: PageId,
    guild_id: GuildId,
    content: String,
}

struct BindingQueries {
    bind: String,
    unbind: String,
    bound_messages: String,
    guild_bindings: String,
    get_bound_page: String,
    delete_all_bindings: String,
    get_revision: String,
}

pub struct Bindings {
    pool: PgPool,
    store: Arc<PageStore>,
    resolver: Arc<PermissionResolver>,
    gateway: Arc<dyn ChatGateway>,
    queries: BindingQueries,
}

impl Bindings {
    pub fn new(
        pool: PgPool,
        store: Arc<PageStore>,
        resolver: Arc<PermissionResolver>,
        gateway: Arc<dyn ChatGateway>,
    ) -> Result<Self, CatalogError> {
        let catalog = Catalog::parse("bindings.sql", include_str!("../sql/bindings.sql"))?;
        let queries = BindingQueries {
            bind: catalog.get("bind")?.sql(),
            unbind: catalog.get("unbind")?.sql(),
            bound_messages: catalog.get("bound_messages")?.sql(),
            guild_bindings: catalog.get("guild_bindings")?.sql(),
            get_bound_page: catalog.get("get_bound_page")?.sql(),
            delete_all_bindings: catalog.get("delete_all_bindings")?.sql(),
            get_revision: catalog.get("get_revision")?.sql(),
        };
        Ok(Self { pool, store, resolver, gateway, queries })
    }

    /// Bind a message to a page, replacing any previous binding of that
    /// message. Requires `edit` on the page. Returns the page with content
    /// so the caller can mirror it into the message immediately.
    pub async fn bind(
        &self,
        scope: &mut Scope,
        member: &Member,
        channel_id: ChannelId,
        message_id: MessageId,
        title: &str,
    ) -> Result<Page, WikiError> {
        scope.begin(Isolation::ReadCommitted).await.map_err(db_err)?;
        let result = self.bind_tx(scope, member, channel_id, message_id, title).await;
        finish(scope, result, db_err).await
    }

    async fn bind_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        channel_id: ChannelId,
        message_id: MessageId,
        title: &str,
    ) -> Result<Page, WikiError> {
        let page = self.store.fetch_page(scope, member.guild_id, title, false).await?;
        self.resolver.check(scope, member, Permissions::EDIT, Some(title)).await?;
        sqlx::query(&self.queries.bind)
            .bind(message_id)
            .bind(channel_id)
            .bind(page.page_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(page)
    }

    /// Remove a message's binding. Requires `edit` on the bound page.
    /// Returns whether a binding was removed.
    pub async fn unbind(
        &self,
        scope: &mut Scope,
        member: &Member,
        message_id: MessageId,
    ) -> Result<bool, WikiError> {
        scope.begin(Isolation::ReadCommitted).await.map_err(db_err)?;
        let result = self.unbind_tx(scope, member, message_id).await;
        finish(scope, result, db_err).await
    }

    async fn unbind_tx(
        &self,
        scope: &mut Scope,
        member: &Member,
        message_id: MessageId,
    ) -> Result<bool, WikiError> {
        let bound = self.get_bound_page(scope, message_id).await?;
        self.resolver.check(scope, member, Permissions::EDIT, Some(&bound.title)).await?;
        let result = sqlx::query(&self.queries.unbind)
            .bind(message_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// The page a message mirrors.
    pub async fn get_bound_page(
        &self,
        scope: &mut Scope,
        message_id: MessageId,
    ) -> Result<BoundPage, WikiError> {
        sqlx::query_as(&self.queries.get_bound_page)
            .bind(message_id)
            .fetch_optional(scope.conn())
            .await
            .map_err(db_err)?
            .ok_or(WikiError::BindingNotFound)
    }

    /// The bound messages of one page. Requires `view`.
    pub async fn bound_messages<'a>(
        &'a self,
        scope: &'a mut Scope,
        member: &Member,
        title: &str,
    ) -> Result<BoxStream<'a, Result<Binding, WikiError>>, WikiError> {
        let page = self.store.get_page_partial(scope, member, title).await?;
        Ok(sqlx::query_as::<_, Binding>(&self.queries.bound_messages)
            .bind(page.page_id)
            .fetch(scope.conn())
            .map(|row| row.map_err(db_err))
            .boxed())
    }

    /// Every binding in the guild, ordered by page for grouped display.
    /// Requires `view`.
    pub async fn guild_bindings<'a>(
        &'a self,
        scope: &'a mut Scope,
        member: &Member,
    ) -> Result<BoxStream<'a, Result<GuildBinding, WikiError>>, WikiError> {
        self.resolver.check(scope, member, Permissions::VIEW, None).await?;
        Ok(sqlx::query_as::<_, GuildBinding>(&self.queries.guild_bindings)
            .bind(member.guild_id)
            .fetch(scope.conn())
            .map(|row| row.map_err(db_err))
            .boxed())
    }

    async fn on_page_edit(&self, revision_id: RevisionId) -> Result<(), WikiError> {
        let mut scope = Scope::acquire(&self.pool).await.map_err(db_err)?;
        let revision: Option<MirrorRevision> = sqlx::query_as(&self.queries.get_revision)
            .bind(revision_id)
            .fetch_optional(scope.conn())
            .await
            .map_err(db_err)?;
        let Some(revision) = revision else {
            tracing::error!(revision_id = %revision_id, "page_edit for unknown revision");
            return Ok(());
        };

        let bindings: Vec<Binding> = sqlx::query_as(&self.queries.bound_messages)
            .bind(revision.page_id)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)?;
        drop(scope);

        let content = Arc::<str>::from(revision.content.as_str());
        let edits = bindings.into_iter().map(|binding| {
            let gateway = Arc::clone(&self.gateway);
            let content = Arc::clone(&content);
            async move {
                let outcome =
                    gateway.edit_message(binding.channel_id, binding.message_id, &content).await;
                (binding, outcome)
            }
        });
        for (binding, outcome) in join_all(edits).await {
            if let Err(e) = outcome {
                // the message may have been deleted externally; keep the
                // binding until it is removed explicitly
                tracing::warn!(
                    guild_id = %revision.guild_id,
                    revision_id = %revision.revision_id,
                    message_id = %binding.message_id,
                    error = %e,
                    "mirror edit failed"
                );
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
        let bindings: Vec<Binding> = sqlx::query_as(&self.queries.bound_messages)
            .bind(page_id)
            .fetch_all(scope.conn())
            .await
            .map_err(db_err)?;
        sqlx::query(&self.queries.delete_all_bindings)
            .bind(page_id)
            .execute(scope.conn())
            .await
            .map_err(db_err)?;
        drop(scope);

        let deletes = bindings.into_iter().map(|binding| {
            let gateway = Arc::clone(&self.gateway);
            async move {
                let outcome = gateway.delete_message(binding.channel_id, binding.message_id).await;
                (binding, outcome)
            }
        });
        for (binding, outcome) in join_all(deletes).await {
            if let Err(e) = outcome {
                tracing::warn!(
                    guild_id = %guild_id,
                    page_title = %title,
                    message_id = %binding.message_id,
                    error = %e,
                    "mirror delete failed"
                );
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventConsumer for Bindings {
    fn name(&self) -> &'static str {
        "bindings"
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
