//! Cache backend (§4.I) over Redis: a read-through cache keyed by chunk id,
//! plus derived caches for the QNTM-key set and collection stats.
//! `invalidate_*` always wins over an unexpired TTL entry since it simply
//! deletes the key rather than racing the expiry.

use atlas_core::backend::CacheBackend;
use atlas_core::model::{Chunk, CollectionStats, QntmKey};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const QNTM_KEYS_CACHE_KEY: &str = "atlas:qntm_keys";

pub struct RedisCacheBackend {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisCacheBackend {
    pub async fn connect(url: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, ttl_secs })
    }

    fn chunk_key(id: &str) -> String {
        format!("atlas:chunk:{id}")
    }

    fn stats_key(collection: &str) -> String {
        format!("atlas:stats:{collection}")
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get_chunk(&self, id: &str) -> anyhow::Result<Option<Chunk>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::chunk_key(id)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    async fn set_chunk(&self, chunk: &Chunk) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(chunk)?;
        conn.set_ex(Self::chunk_key(&chunk.chunk_id), serialized, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn invalidate_chunk(&self, id: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::chunk_key(id)).await?;
        Ok(())
    }

    async fn get_qntm_keys(&self) -> anyhow::Result<Option<Vec<QntmKey>>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(QNTM_KEYS_CACHE_KEY).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    async fn set_qntm_keys(&self, keys: &[QntmKey]) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(keys)?;
        conn.set_ex(QNTM_KEYS_CACHE_KEY, serialized, self.ttl_secs).await?;
        Ok(())
    }

    async fn invalidate_qntm_keys(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(QNTM_KEYS_CACHE_KEY).await?;
        Ok(())
    }

    async fn get_stats(&self, collection: &str) -> anyhow::Result<Option<CollectionStats>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::stats_key(collection)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    async fn set_stats(&self, stats: &CollectionStats) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(stats)?;
        conn.set_ex(Self::stats_key(&stats.collection_name), serialized, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn invalidate_stats(&self, collection: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::stats_key(collection)).await?;
        Ok(())
    }

    async fn health(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok()
    }
}
