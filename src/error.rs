//! 错误类型

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 同步过程中的错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 文件系统操作失败（打开、读取、写入、刷盘、stat、创建目录）
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 目录遍历失败（包括源目录不存在或不可读）
    #[error("遍历失败: {0}")]
    Walk(#[from] walkdir::Error),

    /// 收到取消请求，遍历主动停止
    #[error("同步已取消")]
    Cancelled,

    /// 执行遍历的后台线程异常退出
    #[error("同步任务异常退出: {0}")]
    TaskFailed(String),
}

impl SyncError {
    pub fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        SyncError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

/// 启动参数错误，进程在调度开始前退出
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("缺少命令参数")]
    MissingArgument,

    #[error("无法解析命令: {0}")]
    InvalidUrl(String),

    #[error("缺少必需参数: {0}")]
    MissingParameter(&'static str),

    #[error("无效的同步间隔: {0}")]
    InvalidInterval(String),

    #[error("无效的同步模式: {0}")]
    InvalidPolicy(String),

    #[error("无效的冷却时间: {0}")]
    InvalidCooldown(String),

    #[error("无效的日志级别: {0}")]
    InvalidLogLevel(String),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
