pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use config::SyncSettings;
pub use core::{Scheduler, SchedulerState, SingleFlight, SyncOutcome, SyncPolicy, SyncRequest, TreeReconciler};
pub use error::{ConfigError, SyncError};

/// 配置目录；Linux 下先读 `XDG_CONFIG_HOME`，未设置时用 `~/.config`
pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux 优先使用 XDG_CONFIG_HOME
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }

    /// 本程序的配置目录，找不到系统目录时回退到当前目录下的 `.mirrorsync`
    pub fn app_config_dir() -> PathBuf {
        config_dir()
            .map(|p| p.join("mirrorsync"))
            .unwrap_or_else(|| PathBuf::from(".mirrorsync"))
    }
}
