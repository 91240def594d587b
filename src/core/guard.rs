//! 同步互斥锁 - 保证同一时刻最多只有一个同步在运行

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 运行许可，drop 时释放（包括 panic 展开路径）
#[must_use = "许可被 drop 时立即释放"]
pub struct RunPermit {
    _held: Box<dyn Send + Sync>,
}

impl RunPermit {
    pub fn new<T: Send + Sync + 'static>(held: T) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl std::fmt::Debug for RunPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RunPermit")
    }
}

/// 同步互斥接口
#[async_trait]
pub trait RunGuard: Send + Sync {
    /// 尝试从空闲转为运行；已有同步在运行时返回 `None`
    fn try_begin(&self) -> Option<RunPermit>;

    /// 等待当前持有者释放（获取后立即释放）
    async fn wait_idle(&self);
}

/// 基于 tokio Mutex 的单飞锁
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    lock: Arc<Mutex<()>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

#[async_trait]
impl RunGuard for SingleFlight {
    fn try_begin(&self) -> Option<RunPermit> {
        self.lock.clone().try_lock_owned().ok().map(RunPermit::new)
    }

    async fn wait_idle(&self) {
        drop(self.lock.lock().await);
    }
}
