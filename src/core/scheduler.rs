//! 定时调度 - 启动时立即同步一次，之后按固定间隔触发

use crate::core::guard::{RunGuard, RunPermit};
use crate::core::reconciler::{SyncOutcome, SyncRequest, TreeReconciler};
use crate::error::SyncError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument, Span};

/// 同步失败后的默认冷却时间
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// 同步间隔上限（小时），十年
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365 * 10;

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    WaitingForTick,
    ShuttingDown,
    Stopped,
}

/// 一次触发的结果
#[derive(Debug)]
pub enum TriggerOutcome {
    /// 已在后台启动同步
    Started(JoinHandle<()>),
    /// 已有同步在运行，本次触发被忽略
    Denied,
}

impl TriggerOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, TriggerOutcome::Started(_))
    }
}

/// 调度配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// 定时同步间隔，必须大于零
    pub interval: Duration,
    /// 同步失败后的冷却时间
    pub cooldown: Duration,
}

impl ScheduleConfig {
    /// 超过 `MAX_INTERVAL_HOURS` 的值按上限处理
    pub fn hours(hours: u64) -> Self {
        Self {
            interval: Duration::from_secs(hours.min(MAX_INTERVAL_HOURS) * 3600),
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// 同步调度器
pub struct Scheduler {
    request: Arc<SyncRequest>,
    reconciler: Arc<TreeReconciler>,
    guard: Arc<dyn RunGuard>,
    config: ScheduleConfig,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        request: SyncRequest,
        reconciler: TreeReconciler,
        guard: Arc<dyn RunGuard>,
        config: ScheduleConfig,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            request: Arc::new(request),
            reconciler: Arc::new(reconciler),
            guard,
            config,
            state,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        debug!("调度器状态: {:?}", state);
        self.state.send_replace(state);
    }

    /// 尝试启动一次同步
    ///
    /// 获取锁成功后在后台执行，不等待完成；已有同步在运行时直接返回 `Denied`。
    pub fn trigger(&self, cancel: &CancellationToken) -> TriggerOutcome {
        let Some(permit) = self.guard.try_begin() else {
            info!("同步正在进行中，跳过本次触发");
            return TriggerOutcome::Denied;
        };

        let span = info_span!("sync", run_id = %uuid::Uuid::new_v4());
        let handle = tokio::spawn(
            run_once(
                self.request.clone(),
                self.reconciler.clone(),
                cancel.clone(),
                self.config.cooldown,
                permit,
            )
            .instrument(span),
        );

        TriggerOutcome::Started(handle)
    }

    /// 运行调度循环，直到取消信号到达且正在进行的同步结束
    pub async fn run(&self, cancel: CancellationToken) {
        debug_assert!(!self.config.interval.is_zero());

        info!(
            "同步文件: {} -> {} (模式: {})",
            self.request.source_root.display(),
            self.request.dest_root.display(),
            self.reconciler.policy().name()
        );

        info!("开始首次同步...");
        let _ = self.trigger(&cancel);
        self.set_state(SchedulerState::WaitingForTick);

        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    info!("开始定时同步...");
                    let _ = self.trigger(&cancel);
                }
            }
        }

        self.set_state(SchedulerState::ShuttingDown);
        info!("正在关闭...");
        self.guard.wait_idle().await;
        self.set_state(SchedulerState::Stopped);
        info!("关闭完成");
    }
}

/// 后台同步任务，结束时释放锁
async fn run_once(
    request: Arc<SyncRequest>,
    reconciler: Arc<TreeReconciler>,
    cancel: CancellationToken,
    cooldown: Duration,
    permit: RunPermit,
) {
    let _release = scopeguard::guard(permit, |_| debug!("同步锁已释放"));

    let span = Span::current();
    let outcome = match tokio::task::spawn_blocking(move || {
        span.in_scope(|| reconciler.reconcile(&request, &cancel))
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => SyncOutcome {
            error: Some(SyncError::TaskFailed(e.to_string())),
            ..Default::default()
        },
    };

    if log_outcome(&outcome) {
        debug!("冷却 {:?} 后再接受新的同步", cooldown);
        tokio::time::sleep(cooldown).await;
    }
}

/// 记录同步结果，返回是否需要冷却
fn log_outcome(outcome: &SyncOutcome) -> bool {
    match &outcome.error {
        None => {
            info!(
                "同步完成: {} 个文件, {} 字节, 耗时 {:.2}s",
                outcome.copied,
                outcome.bytes_copied,
                outcome.duration.as_secs_f64()
            );
            if let Some(skipped) = outcome.skipped {
                info!("跳过文件: {} 个", skipped);
            }
            false
        }
        Some(e) if e.is_cancelled() => {
            info!("同步已取消: 已复制 {} 个文件", outcome.copied);
            false
        }
        Some(e) => {
            error!(
                "同步失败: {} (已复制 {} 个文件, 开始于 {})",
                e,
                outcome.copied,
                chrono::DateTime::from_timestamp(outcome.started_at, 0)
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default()
            );
            true
        }
    }
}
