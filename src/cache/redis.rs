//! Redis-protocol store backed by a reconnecting connection manager.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind, RedisError, Script};

use crate::cache::store::KvStore;
use crate::cache::{CacheError, CacheResult};

/// INCR then EXPIRE only when the key was just created.
const INCR_EX: &str = r#"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return n
"#;

/// Store talking to Redis (or Valkey) over a single multiplexed connection.
///
/// The connection manager reconnects on its own after transport errors; callers
/// only see the failed operation.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    incr_ex: Script,
}

impl RedisStore {
    /// Open a connection to `url` (`redis://host:port`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(transport)?;
        let conn = ConnectionManager::new(client).await.map_err(transport)?;
        Ok(Self {
            conn,
            incr_ex: Script::new(INCR_EX),
        })
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn transport(err: RedisError) -> CacheError {
    CacheError::Transport(err.to_string())
}

/// Server-side rejections of an increment are counter overflows; everything
/// else is a transport failure.
fn incr_error(key: &str, err: RedisError) -> CacheError {
    let server_side = matches!(
        err.kind(),
        ErrorKind::ResponseError | ErrorKind::ExtensionError | ErrorKind::TypeError
    );
    let message = err.to_string().to_ascii_lowercase();
    if server_side
        && (message.contains("overflow") || message.contains("not an integer or out of range"))
    {
        CacheError::Overflow(key.to_string())
    } else {
        transport(err)
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn incr_ex(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .incr_ex
            .key(key)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| incr_error(key, e))?;
        u64::try_from(count).map_err(|_| CacheError::Overflow(key.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
                .await
                .map_err(transport),
            None => conn.set::<_, _, ()>(key, value).await.map_err(transport),
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(transport)
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await.map_err(transport)?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }
}
