use anyhow::Context;
use mirrorsync_lib::config::{usage, SyncSettings};
use mirrorsync_lib::core::{Scheduler, SingleFlight, TreeReconciler};
use mirrorsync_lib::logging::{log_dir, LogConfig, SizeRotatingWriter};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 初始化日志系统
fn init_logging(config: &LogConfig, log_dir: &Path) -> anyhow::Result<()> {
    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        tracing_subscriber::registry()
            .try_init()
            .context("初始化日志失败")?;
        return Ok(());
    }

    let env_filter = EnvFilter::from_default_env().add_directive(config.tracing_level().into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    // 文件日志创建失败时只输出到控制台
    let file_writer = SizeRotatingWriter::new(log_dir, config.max_size_mb);
    let file_layer = file_writer.as_ref().ok().map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer.clone())
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("初始化日志失败")?;

    if let Err(e) = file_writer {
        warn!("无法创建日志文件 {:?}: {}", log_dir, e);
    }
    Ok(())
}

/// 等待 Ctrl-C 或 SIGTERM，然后取消所有同步
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("无法监听 SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("收到终止信号");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = SyncSettings::from_args(std::env::args());

    let config_dir = mirrorsync_lib::dirs::app_config_dir();
    let mut log_config = LogConfig::load(&config_dir);
    if let Some(level) = settings.as_ref().ok().and_then(|s| s.log_level.clone()) {
        log_config.level = level;
    }
    if let Err(e) = init_logging(&log_config, &log_dir(&config_dir)) {
        eprintln!("{:#}", e);
    }

    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", usage());
            return ExitCode::from(1);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let scheduler = Scheduler::new(
        settings.request(),
        TreeReconciler::new(settings.policy.into_policy()),
        Arc::new(SingleFlight::new()),
        settings.schedule(),
    );
    scheduler.run(cancel).await;

    ExitCode::SUCCESS
}
