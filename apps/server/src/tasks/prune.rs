use chrono::{Duration, Utc};
use guildwiki_shared::error::WikiError;

use crate::scope::Scope;
use crate::state::AppState;

/// Drop page-use rows older than the configured retention window. The usage
/// log only feeds recent-activity statistics, so old rows are dead weight.
///
/// Returns the number of rows removed.
pub async fn prune_page_uses(state: &AppState) -> Result<u64, WikiError> {
    let cutoff = Utc::now() - Duration::weeks(state.config.page_use_retention_weeks);
    let mut scope = Scope::acquire(&state.db)
        .await
        .map_err(|e| WikiError::Internal(e.to_string()))?;
    state.pages.prune_page_uses(&mut scope, cutoff).await
}
