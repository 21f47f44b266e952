//! Scoped transactional sessions.
//!
//! A `Session` wraps a `sqlx::Transaction` and is the only way C3/C4/C5
//! touch the database. Dropping a `Session` without calling `commit`
//! rolls it back — there is no path where a partially-mutated session
//! can be observed by another connection.

use sqlx::{PgPool, Postgres, Transaction as SqlxTx};

pub struct Session<'a> {
    tx: Option<SqlxTx<'a, Postgres>>,
}

impl<'a> Session<'a> {
    pub(crate) async fn begin(pool: &'a PgPool) -> Result<Session<'a>, sqlx::Error> {
        let tx = pool.begin().await?;
        Ok(Session { tx: Some(tx) })
    }

    pub fn conn(&mut self) -> &mut SqlxTx<'a, Postgres> {
        self.tx.as_mut().expect("session already finalized")
    }

    /// Commits the session. Consumes `self` so it cannot be used again.
    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        let tx = self.tx.take().expect("session already finalized");
        tx.commit().await
    }

    /// Rolls back explicitly; equivalent to dropping the session, but
    /// lets the caller observe and propagate the rollback error.
    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        let tx = self.tx.take().expect("session already finalized");
        tx.rollback().await
    }
}
