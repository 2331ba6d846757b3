/// 인메모리 고속 저장소 (테스트/로컬 실행용)
/// 만료는 접근 시점에 지연 평가한다
// region:    --- Imports
use super::{FastStore, FastStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// endregion: --- Imports

// region:    --- Memory Fast Store
#[derive(Default)]
pub struct MemoryFastStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 만료된 항목 제거 후 현재 값 반환
    fn live_value(entries: &mut HashMap<String, (String, Instant)>, key: &str) -> Option<String> {
        let expired = entries
            .get(key)
            .map(|(_, expires)| *expires <= Instant::now())
            .unwrap_or(false);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|(value, _)| value.clone())
    }
}

#[async_trait]
impl FastStore for MemoryFastStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, FastStoreError> {
        let mut entries = self.entries.lock().await;
        if Self::live_value(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live_value(&mut entries, key))
    }

    async fn delete_if_value(&self, key: &str, value: &str) -> Result<bool, FastStoreError> {
        let mut entries = self.entries.lock().await;
        match Self::live_value(&mut entries, key) {
            Some(current) if current == value => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend_if_value(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, FastStoreError> {
        let mut entries = self.entries.lock().await;
        match Self::live_value(&mut entries, key) {
            Some(current) if current == value => {
                entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), FastStoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, FastStoreError> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live_value(&mut entries, key).is_some())
    }
}
// endregion: --- Memory Fast Store

// endregion: --- Tests
