//! 单文件传输

use crate::error::{SyncError, SyncResult};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// 复制缓冲区大小
const COPY_BUFFER: usize = 256 * 1024;

/// 把源文件完整复制到目标路径，并在返回前刷盘
///
/// 目标已存在时直接覆盖（非原子）。失败时目标内容未定义。
/// 返回复制的字节数。
pub fn copy_file(src: &Path, dst: &Path) -> SyncResult<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::io("create_dir", parent, e))?;
    }

    let input = File::open(src).map_err(|e| SyncError::io("open", src, e))?;
    let output = File::create(dst).map_err(|e| SyncError::io("create", dst, e))?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER, input);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER, output);

    let bytes = io::copy(&mut reader, &mut writer).map_err(|e| {
        // io::copy 不区分读写错误，按写入端报告
        SyncError::io("copy", dst, e)
    })?;

    writer.flush().map_err(|e| SyncError::io("flush", dst, e))?;
    let output = writer
        .into_inner()
        .map_err(|e| SyncError::io("flush", dst, e.into_error()))?;
    output
        .sync_all()
        .map_err(|e| SyncError::io("sync", dst, e))?;

    debug!("复制完成: {} -> {} ({} 字节)", src.display(), dst.display(), bytes);
    Ok(bytes)
}
