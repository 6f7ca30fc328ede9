//! The connection pool: one [`OriginPool`] per origin key, and a small
//! bounded directory of those pools.

use crate::common::OriginKey;
use crate::conn::{Connection, Stream};
use crate::h1::Http1Conn;
use crate::h2::H2Context;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of origin pools the directory keeps before evicting the
/// oldest-inserted entry.
const DIRECTORY_CAPACITY: usize = 16;

/// A connection checked out of an [`OriginPool`], to be returned via
/// [`OriginPool::release_h1`] (for HTTP/1) once the request/response cycle
/// finishes. HTTP/2 leases need no explicit release: the session handle is
/// simply dropped, since many tasks share it concurrently.
pub(crate) enum Lease {
    H1(Http1Conn<Stream>),
    H2(Arc<H2Context>),
}

/// An idle HTTP/1 connection tagged with an id, so the timer task scheduled
/// for it on [`OriginPool::release_h1`] can find and remove the right entry
/// (or silently no-op, if it was already acquired or evicted by then).
struct IdleH1 {
    id: u64,
    conn: Http1Conn<Stream>,
}

/// Connections available for one origin: at most one live HTTP/2 session,
/// or any number of idle HTTP/1 connections.
pub(crate) struct OriginPool {
    idle_h1: Mutex<VecDeque<IdleH1>>,
    h2: Mutex<Option<Arc<H2Context>>>,
    next_idle_id: AtomicU64,
}

impl OriginPool {
    fn new() -> Self {
        Self {
            idle_h1: Mutex::new(VecDeque::new()),
            h2: Mutex::new(None),
            next_idle_id: AtomicU64::new(0),
        }
    }

    /// Returns an existing HTTP/2 session or idle HTTP/1 connection if one
    /// is available, without dialing. Subsequent acquisitions on the same
    /// origin go through the HTTP/2 context's inner pool once one exists.
    pub(crate) async fn try_acquire(&self) -> Option<Lease> {
        if let Some(ctx) = self.h2.lock().await.clone() {
            return Some(Lease::H2(ctx));
        }
        self.idle_h1.lock().await.pop_front().map(|entry| Lease::H1(entry.conn))
    }

    /// Registers a newly dialed connection, returning the lease for
    /// whichever request triggered the dial.
    pub(crate) async fn adopt(&self, conn: Connection) -> Lease {
        match conn {
            Connection::H1(c) => Lease::H1(c),
            Connection::H2(ctx) => {
                *self.h2.lock().await = Some(ctx.clone());
                Lease::H2(ctx)
            }
        }
    }

    /// Returns an HTTP/1 connection to the idle set, or lets it drop if the
    /// caller determined it's no longer reusable. A connection accepted back
    /// into the idle set gets a timer that proactively evicts (and so
    /// closes) it once its negotiated keep-alive idle timeout elapses,
    /// rather than leaving that discovery to whichever later request finds
    /// the peer already gone.
    pub(crate) async fn release_h1(self: Arc<Self>, conn: Http1Conn<Stream>, reusable: bool) {
        if !reusable || conn.should_close() {
            return;
        }

        let idle_timeout = conn.idle_timeout();
        let id = self.next_idle_id.fetch_add(1, Ordering::Relaxed);
        self.idle_h1.lock().await.push_back(IdleH1 { id, conn });
        tracing::trace!(id, ?idle_timeout, "connection returned to idle pool");

        let pool = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            let mut idle = pool.idle_h1.lock().await;
            if let Some(pos) = idle.iter().position(|entry| entry.id == id) {
                idle.remove(pos);
                tracing::debug!(id, ?idle_timeout, "evicted idle connection after keep-alive timeout");
            }
        });
    }

    /// Installs an HTTP/2 session obtained via an accepted h2c upgrade on a
    /// connection that started out as HTTP/1.
    pub(crate) async fn install_h2(&self, ctx: Arc<H2Context>) {
        *self.h2.lock().await = Some(ctx);
    }
}

/// The bounded `(origin key) -> pool` directory.
pub(crate) struct PoolDirectory {
    entries: Mutex<VecDeque<(OriginKey, Arc<OriginPool>)>>,
}

impl PoolDirectory {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the pool for `key`, creating and registering one if absent.
    /// Inserting past [`DIRECTORY_CAPACITY`] evicts the oldest entry; its
    /// connections keep working for leases that still hold an `Arc` to it,
    /// and are simply no longer reachable for new acquisitions.
    pub(crate) async fn pool_for(&self, key: &OriginKey) -> Arc<OriginPool> {
        let mut entries = self.entries.lock().await;
        if let Some((_, pool)) = entries.iter().find(|(k, _)| k == key) {
            return pool.clone();
        }

        let pool = Arc::new(OriginPool::new());
        entries.push_back((key.clone(), pool.clone()));
        if entries.len() > DIRECTORY_CAPACITY {
            entries.pop_front();
        }
        pool
    }
}

impl Default for PoolDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Origin;

    fn key(host: &str) -> OriginKey {
        OriginKey {
            origin: Origin {
                is_tls: false,
                host: host.to_string(),
                port: 80,
            },
            proxy: None,
            settings_id: 0,
        }
    }

    #[tokio::test]
    async fn same_key_returns_same_pool() {
        let dir = PoolDirectory::new();
        let a = dir.pool_for(&key("example.org")).await;
        let b = dir.pool_for(&key("example.org")).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_pools() {
        let dir = PoolDirectory::new();
        let a = dir.pool_for(&key("a.example")).await;
        let b = dir.pool_for(&key("b.example")).await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn directory_evicts_oldest_entry_past_capacity() {
        let dir = PoolDirectory::new();
        let first = dir.pool_for(&key("origin-0")).await;
        for i in 1..DIRECTORY_CAPACITY {
            dir.pool_for(&key(&format!("origin-{i}"))).await;
        }
        // one more insertion should evict "origin-0"
        dir.pool_for(&key("origin-overflow")).await;

        let entries = dir.entries.lock().await;
        assert!(!entries.iter().any(|(k, _)| k.origin.host == "origin-0"));
        // the evicted pool is still usable by whatever held onto it
        assert_eq!(Arc::strong_count(&first), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_h1_connection_is_evicted_after_keep_alive_timeout() {
        let pool = Arc::new(OriginPool::new());
        let (client_io, _server_io) = tokio::io::duplex(64);
        let conn = Http1Conn::new(Box::pin(client_io) as Stream, std::time::Duration::from_millis(50));

        pool.clone().release_h1(conn, true).await;
        assert_eq!(pool.idle_h1.lock().await.len(), 1);

        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(pool.idle_h1.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn released_connection_marked_non_reusable_is_dropped_not_pooled() {
        let pool = Arc::new(OriginPool::new());
        let (client_io, _server_io) = tokio::io::duplex(64);
        let conn = Http1Conn::new(Box::pin(client_io) as Stream, std::time::Duration::from_secs(30));

        pool.clone().release_h1(conn, false).await;
        assert_eq!(pool.idle_h1.lock().await.len(), 0);
    }
}
