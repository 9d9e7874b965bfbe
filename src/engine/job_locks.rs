// ==========================================
// 批量导入作业引擎 - 作业级互斥
// ==========================================
// 同一作业在进程内串行执行；跨进程由状态比较写入兜底
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct JobLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取作业锁（等待其他持有者释放）
    pub async fn acquire(&self, job_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // 清理无人持有的锁
            map.retain(|id, l| id == job_id || Arc::strong_count(l) > 1);
            map.entry(job_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 当前登记的锁数量
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
