//! 文件内容指纹 - 用于判断目标文件是否已是最新

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// 读取缓冲区大小
const READ_CHUNK: usize = 64 * 1024;

/// 文件内容的 BLAKE3 摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// 流式计算任意字节流的指纹，不会把整个内容读入内存
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(Fingerprint(hasher.finalize()))
}

/// 计算文件内容的指纹
pub fn fingerprint_file(path: &Path) -> SyncResult<Fingerprint> {
    let file = File::open(path).map_err(|e| SyncError::io("open", path, e))?;
    fingerprint_reader(file).map_err(|e| SyncError::io("read", path, e))
}
