//! Redis cache client with bounded reconnection.
//!
//! Session state sits behind a mutex that is only held for bookkeeping,
//! never across an await. Commands clone the multiplexed connection and run
//! concurrently. The caller that observes a transport failure on a `Ready`
//! session is the only one that starts the background reconnection task.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, error, info, warn};

use super::{Cache, CacheError, ConnectionState, ReconnectPolicy};
use crate::config::CacheConfig;

/// Upper bound on opening a single connection.
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// Keys fetched per SCAN round trip.
const SCAN_COUNT: u32 = 100;

struct Session {
    state: ConnectionState,
    conn: Option<MultiplexedConnection>,
}

struct Inner {
    client: redis::Client,
    policy: ReconnectPolicy,
    command_timeout: Duration,
    session: Mutex<Session>,
}

/// Redis-backed [`Cache`].
///
/// Starts `Disconnected`; call [`RedisCache::connect`] once at startup.
/// Until the session is `Ready` every cache operation is a miss or a no-op.
#[derive(Clone)]
pub struct RedisCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("client", &"<redis::Client>")
            .field("policy", &self.inner.policy)
            .field("command_timeout", &self.inner.command_timeout)
            .field("state", &self.state())
            .finish()
    }
}

impl RedisCache {
    /// Create a client for `config.url`. Does not touch the network.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                policy: ReconnectPolicy::from_config(config),
                command_timeout: config.command_timeout(),
                session: Mutex::new(Session {
                    state: ConnectionState::Disconnected,
                    conn: None,
                }),
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session().state
    }

    /// Open the session: one immediate attempt, then the reconnection policy.
    ///
    /// Ends `Ready` (Ok) or `Failed` (Err). Calling it on a `Ready` session is
    /// a no-op; on a `Failed` one it fails straight away.
    pub async fn connect(&self) -> Result<(), CacheError> {
        {
            let mut session = self.inner.session();
            match session.state {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Disconnected => session.state = ConnectionState::Connecting,
                other => return Err(CacheError::Unavailable(other)),
            }
        }

        match self.inner.open().await {
            Ok(conn) => {
                self.inner.set_ready(conn);
                info!("cache: connected");
                Ok(())
            }
            Err(e) => {
                warn!("cache: connect failed ({}), retrying with backoff", e);
                Arc::clone(&self.inner).reconnect().await
            }
        }
    }

    /// Round trip to the server. Fails unless the session is `Ready`.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self
            .inner
            .ready_connection()
            .ok_or_else(|| CacheError::Unavailable(self.state()))?;
        let reply = timeout(self.inner.command_timeout, async {
            let pong: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            pong
        })
        .await
        .map_err(|_| CacheError::Timeout(self.inner.command_timeout))?;
        reply?;
        Ok(())
    }

    /// Log a failed command; drop the session if the transport is gone.
    fn settle<T>(&self, op: &str, key: &str, result: Result<RedisResult<T>, Elapsed>) -> Option<T> {
        match result {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("cache: redis {} failed for {}: {}", op, key, e);
                if is_transport(&e) {
                    self.mark_disconnected();
                }
                None
            }
            Err(_) => {
                warn!(
                    "cache: redis {} for {} timed out after {:?}",
                    op, key, self.inner.command_timeout
                );
                self.mark_disconnected();
                None
            }
        }
    }

    /// `Ready -> Disconnected`, and start reconnecting if we made that move.
    fn mark_disconnected(&self) {
        let won = {
            let mut session = self.inner.session();
            if session.state == ConnectionState::Ready {
                session.state = ConnectionState::Disconnected;
                session.conn = None;
                true
            } else {
                false
            }
        };

        if won {
            warn!("cache: connection lost, reconnecting in background");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                // Outcome is recorded in the session state
                let _ = inner.reconnect().await;
            });
        }
    }

    /// DEL, returning the server's count of removed keys.
    async fn del(&self, keys: &[String]) -> Option<u64> {
        if keys.is_empty() {
            return Some(0);
        }
        let mut conn = self.inner.ready_connection()?;
        let result = timeout(self.inner.command_timeout, async {
            let removed: RedisResult<u64> = redis::cmd("DEL").arg(keys).query_async(&mut conn).await;
            removed
        })
        .await;
        let joined = keys.join(" ");
        let removed = self.settle("DEL", &joined, result)?;
        debug!(removed, "cache: DEL {}", joined);
        Some(removed)
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ready_connection(&self) -> Option<MultiplexedConnection> {
        let session = self.session();
        match session.state {
            ConnectionState::Ready => session.conn.clone(),
            _ => None,
        }
    }

    fn set_ready(&self, conn: MultiplexedConnection) {
        let mut session = self.session();
        session.state = ConnectionState::Ready;
        session.conn = Some(conn);
    }

    fn set_state(&self, state: ConnectionState) {
        let mut session = self.session();
        session.state = state;
        if state != ConnectionState::Ready {
            session.conn = None;
        }
    }

    async fn open(&self) -> Result<MultiplexedConnection, CacheError> {
        match timeout(OPEN_TIMEOUT, self.client.get_multiplexed_async_connection()).await {
            Ok(conn) => Ok(conn?),
            Err(_) => Err(CacheError::Timeout(OPEN_TIMEOUT)),
        }
    }

    /// Retry per policy until `Ready`, or give up into `Failed`.
    async fn reconnect(self: Arc<Self>) -> Result<(), CacheError> {
        self.set_state(ConnectionState::Connecting);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(delay) = self.policy.next_delay(attempt) else {
                let attempts = attempt - 1;
                self.set_state(ConnectionState::Failed);
                error!(
                    attempts,
                    "cache: giving up on reconnection, serving from store only"
                );
                return Err(CacheError::Exhausted { attempts });
            };

            tokio::time::sleep(delay).await;
            match self.open().await {
                Ok(conn) => {
                    self.set_ready(conn);
                    info!(attempt, "cache: reconnected");
                    return Ok(());
                }
                Err(e) => warn!(attempt, ?delay, "cache: reconnection attempt failed: {}", e),
            }
        }
    }
}

fn is_transport(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.inner.ready_connection()?;
        let result = timeout(self.inner.command_timeout, async {
            let value: RedisResult<Option<String>> = conn.get(key).await;
            value
        })
        .await;
        let value = self.settle("GET", key, result).flatten();
        debug!(hit = value.is_some(), "cache: GET {}", key);
        value
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        let Some(mut conn) = self.inner.ready_connection() else {
            return;
        };
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let result = timeout(self.inner.command_timeout, async {
            let reply: RedisResult<()> = conn.set_ex(key, value, seconds).await;
            reply
        })
        .await;
        self.settle("SETEX", key, result);
    }

    async fn delete_keys(&self, keys: &[String]) {
        self.del(keys).await;
    }

    async fn delete_matching(&self, pattern: &str) -> u64 {
        let mut removed = 0;
        let mut cursor = 0u64;
        loop {
            let Some(mut conn) = self.inner.ready_connection() else {
                return removed;
            };
            let result = timeout(self.inner.command_timeout, async {
                let page: RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await;
                page
            })
            .await;

            let Some((next_cursor, keys)) = self.settle("SCAN", pattern, result) else {
                return removed;
            };
            removed += self.del(&keys).await.unwrap_or(0);
            cursor = next_cursor;
            if cursor == 0 {
                return removed;
            }
        }
    }
}
