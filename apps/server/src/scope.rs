//! Connection scope: binds a logical command to a single pooled connection.
//!
//! Store methods take `&mut Scope`, so an inner call transparently joins the
//! transaction its caller opened. The outermost `begin` issues a real
//! `BEGIN`; nested `begin`s become savepoints, and `commit`/`rollback`
//! release or roll back to the matching savepoint. Isolation can only be
//! chosen by the outermost `begin`; savepoints inherit it.

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// The database default.
    ReadCommitted,
    /// Required for operations that must exclude title races and preserve
    /// the rename-revision invariant.
    Serializable,
}

pub struct Scope {
    conn: PoolConnection<Postgres>,
    depth: u32,
}

impl Scope {
    /// Take one connection from the pool for the duration of a command.
    pub async fn acquire(pool: &PgPool) -> Result<Self, sqlx::Error> {
        Ok(Self { conn: pool.acquire().await?, depth: 0 })
    }

    /// The bound connection, for running queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Current transaction nesting depth. Zero means autocommit.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Open a transaction, or a savepoint when one is already open.
    pub async fn begin(&mut self, isolation: Isolation) -> Result<(), sqlx::Error> {
        if self.depth == 0 {
            let sql = match isolation {
                Isolation::ReadCommitted => "BEGIN",
                Isolation::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
            };
            sqlx::raw_sql(sql).execute(&mut *self.conn).await?;
        } else {
            let sql = format!("SAVEPOINT {}", savepoint_name(self.depth));
            sqlx::raw_sql(&sql).execute(&mut *self.conn).await?;
        }
        self.depth += 1;
        Ok(())
    }

    /// Commit the innermost transaction level.
    pub async fn commit(&mut self) -> Result<(), sqlx::Error> {
        match self.depth {
            0 => {
                tracing::warn!("commit with no open transaction");
                Ok(())
            }
            1 => {
                sqlx::raw_sql("COMMIT").execute(&mut *self.conn).await?;
                self.depth = 0;
                Ok(())
            }
            depth => {
                let sql = format!("RELEASE SAVEPOINT {}", savepoint_name(depth - 1));
                sqlx::raw_sql(&sql).execute(&mut *self.conn).await?;
                self.depth = depth - 1;
                Ok(())
            }
        }
    }

    /// Roll back the innermost transaction level. A dropped `Scope` with an
    /// open transaction is rolled back by the pool when the connection is
    /// returned, so cancellation at a suspension point is safe too.
    pub async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        match self.depth {
            0 => {
                tracing::warn!("rollback with no open transaction");
                Ok(())
            }
            1 => {
                sqlx::raw_sql("ROLLBACK").execute(&mut *self.conn).await?;
                self.depth = 0;
                Ok(())
            }
            depth => {
                let sql = format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(depth - 1));
                sqlx::raw_sql(&sql).execute(&mut *self.conn).await?;
                self.depth = depth - 1;
                Ok(())
            }
        }
    }
}

fn savepoint_name(depth: u32) -> String {
    format!("wiki_sp_{depth}")
}
