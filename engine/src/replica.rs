//! Replica - a local database paired with a remote primary.
//!
//! The pair owns both the database (the sync target) and the connection
//! (the query target); both members share one lifetime by construction,
//! so freeing one without the other is unrepresentable. Synchronization
//! pulls remote changes and applies them through the kernel's own
//! transaction discipline, one cycle at a time, so foreground queries
//! always observe a consistent pre- or post-sync snapshot.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::runtime::runtime;
use std::time::Duration;

/// A local replica database paired with its remote primary.
pub struct Replica {
    db: libsql::Database,
    conn: Connection,
}

impl Replica {
    /// Establish a local replica file at `path`, replicating from the
    /// primary at `url` authenticated by `token`.
    ///
    /// `sync_interval_secs == 0` disables background sync; the caller
    /// drives [`Replica::sync`] manually. A non-zero interval schedules
    /// periodic sync at that cadence on the shared runtime.
    /// `read_your_writes` guarantees reads on this replica observe its
    /// own prior committed writes even before sync catches up.
    pub fn connect(
        path: &str,
        url: &str,
        token: &str,
        sync_interval_secs: u64,
        read_your_writes: bool,
    ) -> Result<Self> {
        let db = runtime()
            .block_on(async {
                let mut builder = libsql::Builder::new_remote_replica(
                    path,
                    url.to_string(),
                    token.to_string(),
                );
                if sync_interval_secs > 0 {
                    builder = builder.sync_interval(Duration::from_secs(sync_interval_secs));
                }
                builder = builder.read_your_writes(read_your_writes);
                builder.build().await
            })
            .map_err(|e| Error::Open(e.to_string()))?;

        let conn = db.connect().map_err(|e| Error::Open(e.to_string()))?;
        tracing::debug!(
            path,
            url,
            interval = sync_interval_secs,
            read_your_writes,
            "opened remote replica"
        );

        Ok(Self {
            db,
            conn: Connection::from_parts(conn, None),
        })
    }

    /// The query side of the pair.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Pull and apply the latest changes from the remote primary.
    ///
    /// Idempotent: with no new remote changes this is a successful
    /// no-op. Network, auth and conflict failures surface as
    /// [`Error::Sync`]; the caller owns any retry policy.
    pub fn sync(&self) -> Result<()> {
        let replicated = runtime()
            .block_on(self.db.sync())
            .map_err(|e| Error::Sync(e.to_string()))?;
        tracing::debug!(frames = replicated.frames_synced(), "replica sync complete");
        Ok(())
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica").finish_non_exhaustive()
    }
}
