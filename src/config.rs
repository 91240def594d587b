//! 启动参数
//!
//! 命令格式: `mirrorsync "cmd://ivl=<小时>&src=<目录>&dst=<目录>"`，
//! 可选参数 `mode`、`cooldown`、`log`。

use crate::core::reconciler::{SyncPolicy, SyncRequest};
use crate::core::scheduler::{ScheduleConfig, DEFAULT_COOLDOWN, MAX_INTERVAL_HOURS};
use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const SCHEME: &str = "cmd";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// 同步任务配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub source: PathBuf,
    pub dest: PathBuf,
    /// 同步间隔（小时），大于零
    pub interval_hours: u64,
    pub policy: SyncPolicy,
    /// 同步失败后的冷却时间
    pub cooldown: Duration,
    /// 覆盖配置文件中的日志级别
    pub log_level: Option<String>,
}

impl SyncSettings {
    /// 从进程参数解析（第一个参数为程序名）
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let command = args
            .into_iter()
            .nth(1)
            .ok_or(ConfigError::MissingArgument)?;
        Self::parse(&command)
    }

    /// 解析命令字符串
    pub fn parse(command: &str) -> Result<Self, ConfigError> {
        let query = match command.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case(SCHEME) => rest,
            Some((scheme, _)) => {
                return Err(ConfigError::InvalidUrl(format!("不支持的协议: {}", scheme)))
            }
            None => command,
        };
        let query = query.trim_start_matches('?');

        let mut ivl = None;
        let mut src = None;
        let mut dst = None;
        let mut mode = None;
        let mut cooldown = None;
        let mut log = None;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(raw)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", key, e)))?
                .into_owned();

            match key {
                "ivl" => ivl = Some(value),
                "src" => src = Some(value),
                "dst" => dst = Some(value),
                "mode" => mode = Some(value),
                "cooldown" => cooldown = Some(value),
                "log" => log = Some(value),
                other => debug!("忽略未知参数: {}", other),
            }
        }

        let ivl = required(ivl, "ivl")?;
        let source = required(src, "src")?;
        let dest = required(dst, "dst")?;

        let interval_hours = ivl
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|h| (1..=MAX_INTERVAL_HOURS).contains(h))
            .ok_or_else(|| ConfigError::InvalidInterval(ivl.clone()))?;

        let policy = match mode {
            Some(m) => m.parse().map_err(ConfigError::InvalidPolicy)?,
            None => SyncPolicy::default(),
        };

        let cooldown = match cooldown {
            Some(c) => c
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidCooldown(c.clone()))?,
            None => DEFAULT_COOLDOWN,
        };

        let log_level = match log {
            Some(l) if LOG_LEVELS.contains(&l.to_lowercase().as_str()) => Some(l.to_lowercase()),
            Some(l) => return Err(ConfigError::InvalidLogLevel(l)),
            None => None,
        };

        Ok(Self {
            source: PathBuf::from(source),
            dest: PathBuf::from(dest),
            interval_hours,
            policy,
            cooldown,
            log_level,
        })
    }

    pub fn request(&self) -> SyncRequest {
        SyncRequest::new(&self.source, &self.dest)
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig::hours(self.interval_hours).with_cooldown(self.cooldown)
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingParameter(name))
}

/// 使用说明
pub fn usage() -> String {
    format!(
        r#"Version: {} {}/{}

Usage:
    mirrorsync "cmd://ivl=<hours>&src=<dir>&dst=<dir>[&mode=hash|copy][&cooldown=<secs>][&log=<level>]"

Example:
    mirrorsync "cmd://ivl=12&src=/path/to/source&dst=/path/to/target"
"#,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
