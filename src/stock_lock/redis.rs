/// Redis 고속 저장소 구현체
/// SET NX EX 한 번이 락 획득의 전부이며, 해제/연장은 Lua로 원자화한다
// region:    --- Imports
use super::{FastStore, FastStoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;

// endregion: --- Imports

// region:    --- Lua Scripts
/// 값 일치 시에만 삭제
const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// 값 일치 시에만 TTL 재설정
const COMPARE_AND_EXPIRE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;
// endregion: --- Lua Scripts

// region:    --- Redis Fast Store
pub struct RedisFastStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
    compare_and_expire: Script,
}

impl RedisFastStore {
    /// Redis 연결 (ConnectionManager가 재연결을 처리)
    pub async fn connect(url: &str) -> Result<Self, FastStoreError> {
        let client = redis::Client::open(url).map_err(|e| FastStoreError(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| FastStoreError(e.to_string()))?;
        Ok(Self {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            compare_and_expire: Script::new(COMPARE_AND_EXPIRE),
        })
    }
}

#[async_trait]
impl FastStore for RedisFastStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, FastStoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| FastStoreError(e.to_string()))?;
        // NX 거부 시 nil
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| FastStoreError(e.to_string()))?;
        Ok(value)
    }

    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool, FastStoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FastStoreError(e.to_string()))?;
        Ok(deleted == 1)
    }

    async fn extend_if_value(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, FastStoreError> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .compare_and_expire
            .key(key)
            .arg(value)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| FastStoreError(e.to_string()))?;
        Ok(extended == 1)
    }

    async fn delete(&self, key: &str) -> Result<(), FastStoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| FastStoreError(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, FastStoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| FastStoreError(e.to_string()))?;
        Ok(count == 1)
    }
}
// endregion: --- Redis Fast Store
