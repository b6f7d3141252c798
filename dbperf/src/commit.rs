use crate::measurement;
use dbperf_core::{Connection, DbError};

/// Counts writes on one connection and commits every `every` of them.
#[derive(Debug, Clone)]
pub(crate) struct CommitBatcher {
    test: &'static str,
    every: Option<u64>,
    pending: u64,
    commits: u64,
}

impl CommitBatcher {
    /// `every` must be at least 1.
    pub fn every(test: &'static str, every: u64) -> Self {
        debug_assert!(every > 0);
        Self {
            test,
            every: Some(every.max(1)),
            pending: 0,
            commits: 0,
        }
    }

    /// For reads, which leave the transaction alone.
    pub fn never(test: &'static str) -> Self {
        Self {
            test,
            every: None,
            pending: 0,
            commits: 0,
        }
    }

    /// Counts one operation, committing once the interval is reached.
    pub async fn tick<C: Connection>(&mut self, conn: &mut C) -> Result<(), DbError> {
        let Some(every) = self.every else {
            return Ok(());
        };
        self.pending += 1;
        if self.pending >= every {
            self.commit(conn).await?;
        }
        Ok(())
    }

    /// Commits whatever is left. Does nothing when no operation is pending.
    pub async fn flush<C: Connection>(&mut self, conn: &mut C) -> Result<(), DbError> {
        if self.pending > 0 {
            self.commit(conn).await?;
        }
        Ok(())
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    async fn commit<C: Connection>(&mut self, conn: &mut C) -> Result<(), DbError> {
        conn.commit().await?;
        self.pending = 0;
        self.commits += 1;
        measurement::committed(self.test);
        Ok(())
    }
}
