use std::sync::Arc;

use crate::config::ServerConfig;
use crate::events::EventBus;
use crate::gateway::ChatGateway;
use crate::queries::CatalogError;
use crate::store::bindings::Bindings;
use crate::store::pages::PageStore;
use crate::store::permissions::PermissionResolver;
use crate::store::watch_lists::WatchLists;
use guildwiki_shared::ids::UserId;

/// Shared application state: the pool, the services built over it, and the
/// event bus. Everything is Arc-backed, so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<ServerConfig>,
    pub gateway: Arc<dyn ChatGateway>,
    pub resolver: Arc<PermissionResolver>,
    pub pages: Arc<PageStore>,
    pub watch_lists: Arc<WatchLists>,
    pub bindings: Arc<Bindings>,
    pub events: EventBus,
}

impl AppState {
    /// Build the service graph. Fails if any SQL catalog is malformed or a
    /// service references an unknown query name.
    pub fn new(
        db: sqlx::PgPool,
        config: ServerConfig,
        gateway: Arc<dyn ChatGateway>,
    ) -> Result<Self, CatalogError> {
        let owners = config.owners.iter().copied().map(UserId);
        let resolver = Arc::new(PermissionResolver::new(owners)?);
        let pages = Arc::new(PageStore::new(Arc::clone(&resolver))?);
        let watch_lists = Arc::new(WatchLists::new(
            db.clone(),
            Arc::clone(&pages),
            Arc::clone(&resolver),
            Arc::clone(&gateway),
        )?);
        let bindings = Arc::new(Bindings::new(
            db.clone(),
            Arc::clone(&pages),
            Arc::clone(&resolver),
            Arc::clone(&gateway),
        )?);
        let events = EventBus::new(config.event_buffer);

        Ok(Self {
            db,
            config: Arc::new(config),
            gateway,
            resolver,
            pages,
            watch_lists,
            bindings,
            events,
        })
    }
}
