//! The storage-backed services: page store, permission resolver, watch lists
//! and message bindings.

pub mod bindings;
pub mod pages;
pub mod permissions;
pub mod watch_lists;

use guildwiki_shared::error::WikiError;

pub(crate) fn db_err(e: sqlx::Error) -> WikiError {
    tracing::error!(error = %e, "database error");
    WikiError::Internal(e.to_string())
}

fn sqlstate(e: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db) = e {
        db.code().map(|c| c.into_owned())
    } else {
        None
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    sqlstate(e).as_deref() == Some("23505")
}

pub(crate) fn is_not_null_violation(e: &sqlx::Error) -> bool {
    sqlstate(e).as_deref() == Some("23502")
}

pub(crate) fn is_serialization_failure(e: &sqlx::Error) -> bool {
    sqlstate(e).as_deref() == Some("40001")
}

/// In title-mutating operations, constraint races surface as "already exists".
pub(crate) fn title_conflict(e: sqlx::Error) -> WikiError {
    if is_unique_violation(&e) || is_serialization_failure(&e) {
        WikiError::PageExists
    } else {
        db_err(e)
    }
}

/// Commit on success, roll back on error. Commit failures in serializable
/// sections go through `map_commit_err` so title races keep their meaning.
pub(crate) async fn finish<T>(
    scope: &mut crate::scope::Scope,
    result: Result<T, WikiError>,
    map_commit_err: fn(sqlx::Error) -> WikiError,
) -> Result<T, WikiError> {
    match result {
        Ok(value) => {
            scope.commit().await.map_err(map_commit_err)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = scope.rollback().await {
                tracing::error!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
