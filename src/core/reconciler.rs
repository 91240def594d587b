//! 目录树同步 - 把源目录单向镜像到目标目录

use crate::core::fingerprint::fingerprint_file;
use crate::core::transfer::copy_file;
use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// 一次同步的输入，运行期间不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
}

impl SyncRequest {
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
        }
    }
}

/// 一次同步的结果
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// 成功复制的文件数
    pub copied: u64,
    /// 内容一致而跳过的文件数，仅在哈希比较策略下存在
    pub skipped: Option<u64>,
    /// 复制的总字节数
    pub bytes_copied: u64,
    /// 开始时间（Unix 时间戳）
    pub started_at: i64,
    pub duration: Duration,
    /// 中止原因；`None` 表示完整成功
    pub error: Option<SyncError>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(SyncError::is_cancelled)
    }
}

/// 单个文件的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Transfer,
    Skip,
}

/// 文件复制决策策略
pub trait DecisionPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// 是否统计跳过数
    fn tracks_skips(&self) -> bool;

    fn decide(&self, src: &Path, dst: &Path) -> SyncResult<Decision>;
}

/// 无条件复制
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCopy;

impl DecisionPolicy for AlwaysCopy {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn tracks_skips(&self) -> bool {
        false
    }

    fn decide(&self, _src: &Path, _dst: &Path) -> SyncResult<Decision> {
        Ok(Decision::Transfer)
    }
}

/// 目标已存在时比较内容指纹，一致则跳过
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareThenCopy;

impl DecisionPolicy for CompareThenCopy {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn tracks_skips(&self) -> bool {
        true
    }

    fn decide(&self, src: &Path, dst: &Path) -> SyncResult<Decision> {
        match fs::metadata(dst) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Decision::Transfer),
            Err(e) => return Err(SyncError::io("stat", dst, e)),
        }

        let src_hash = fingerprint_file(src)?;
        let dst_hash = fingerprint_file(dst)?;
        trace!("指纹: {} = {}, {} = {}", src.display(), src_hash, dst.display(), dst_hash);

        if src_hash == dst_hash {
            Ok(Decision::Skip)
        } else {
            Ok(Decision::Transfer)
        }
    }
}

/// 同步模式（启动参数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// 无条件复制
    Copy,
    /// 哈希比较后复制
    #[default]
    Hash,
}

impl SyncPolicy {
    pub fn into_policy(self) -> Arc<dyn DecisionPolicy> {
        match self {
            SyncPolicy::Copy => Arc::new(AlwaysCopy),
            SyncPolicy::Hash => Arc::new(CompareThenCopy),
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPolicy::Copy => write!(f, "copy"),
            SyncPolicy::Hash => write!(f, "hash"),
        }
    }
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(SyncPolicy::Copy),
            "hash" => Ok(SyncPolicy::Hash),
            other => Err(other.to_string()),
        }
    }
}

/// 累计计数
#[derive(Debug, Default)]
struct Tally {
    copied: u64,
    skipped: u64,
    bytes: u64,
}

/// 目录树同步器
#[derive(Debug, Clone)]
pub struct TreeReconciler {
    policy: Arc<dyn DecisionPolicy>,
}

impl TreeReconciler {
    pub fn new(policy: Arc<dyn DecisionPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &dyn DecisionPolicy {
        self.policy.as_ref()
    }

    /// 执行一次完整同步
    ///
    /// 每访问一个文件前检查取消信号。任何文件的 stat、指纹或复制失败都会中止
    /// 整个遍历，已完成的计数保留在结果中。
    pub fn reconcile(&self, request: &SyncRequest, cancel: &CancellationToken) -> SyncOutcome {
        let started_at = chrono::Utc::now().timestamp();
        let start = Instant::now();
        let mut tally = Tally::default();

        let result = self.walk(request, cancel, &mut tally);

        SyncOutcome {
            copied: tally.copied,
            skipped: self.policy.tracks_skips().then_some(tally.skipped),
            bytes_copied: tally.bytes,
            started_at,
            duration: start.elapsed(),
            error: result.err(),
        }
    }

    fn walk(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
        tally: &mut Tally,
    ) -> SyncResult<()> {
        let source_root = &request.source_root;
        let dest_root = &request.dest_root;

        fs::create_dir_all(dest_root).map_err(|e| SyncError::io("create_dir", dest_root, e))?;

        for entry in WalkDir::new(source_root).follow_links(false) {
            if cancel.is_cancelled() {
                debug!("遍历中止: 收到取消请求");
                return Err(SyncError::Cancelled);
            }

            let entry = entry?;
            if !entry.file_type().is_file() {
                if !entry.file_type().is_dir() {
                    debug!("跳过非常规文件: {}", entry.path().display());
                }
                continue;
            }

            let src = entry.path();
            let rel = src.strip_prefix(source_root).map_err(|e| {
                SyncError::io("relativize", src, io::Error::new(io::ErrorKind::InvalidInput, e))
            })?;
            let dst = dest_root.join(rel);

            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).map_err(|e| SyncError::io("create_dir", parent, e))?;
            }

            match self.policy.decide(src, &dst)? {
                Decision::Skip => {
                    debug!("内容一致，跳过: {}", rel.display());
                    tally.skipped += 1;
                }
                Decision::Transfer => {
                    tally.bytes += copy_file(src, &dst)?;
                    tally.copied += 1;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(root: &Path, rel: &str) -> String {
        fs::read_to_string(root.join(rel)).unwrap()
    }

    fn sample_tree() -> (TempDir, TempDir, SyncRequest) {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "a/x.txt", "hello");
        write(src.path(), "b/y.txt", "world");
        let request = SyncRequest::new(src.path(), dst.path());
        (src, dst, request)
    }

    /// 在第 N 次决策后触发取消
    #[derive(Debug)]
    struct CancelAfter {
        after: usize,
        calls: AtomicUsize,
        token: CancellationToken,
    }

    impl DecisionPolicy for CancelAfter {
        fn name(&self) -> &'static str {
            "cancel-after"
        }

        fn tracks_skips(&self) -> bool {
            false
        }

        fn decide(&self, _src: &Path, _dst: &Path) -> SyncResult<Decision> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.token.cancel();
            }
            Ok(Decision::Transfer)
        }
    }

    /// 第二个文件开始报错
    #[derive(Debug, Default)]
    struct FailSecond {
        calls: AtomicUsize,
    }

    impl DecisionPolicy for FailSecond {
        fn name(&self) -> &'static str {
            "fail-second"
        }

        fn tracks_skips(&self) -> bool {
            false
        }

        fn decide(&self, _src: &Path, dst: &Path) -> SyncResult<Decision> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= 1 {
                return Err(SyncError::io(
                    "stat",
                    dst,
                    io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                ));
            }
            Ok(Decision::Transfer)
        }
    }

    #[test]
    fn test_hash_policy_first_and_second_run() {
        let (_src, dst, request) = sample_tree();
        let reconciler = TreeReconciler::new(SyncPolicy::Hash.into_policy());
        let token = CancellationToken::new();

        let first = reconciler.reconcile(&request, &token);
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(first.copied, 2);
        assert_eq!(first.skipped, Some(0));
        assert_eq!(first.bytes_copied, 10);
        assert_eq!(read(dst.path(), "a/x.txt"), "hello");
        assert_eq!(read(dst.path(), "b/y.txt"), "world");

        let second = reconciler.reconcile(&request, &token);
        assert!(second.is_success());
        assert_eq!(second.copied, 0);
        assert_eq!(second.skipped, Some(2));
        assert_eq!(second.bytes_copied, 0);
        assert_eq!(read(dst.path(), "a/x.txt"), "hello");
    }

    #[test]
    fn test_copy_policy_always_copies() {
        let (_src, dst, request) = sample_tree();
        let reconciler = TreeReconciler::new(SyncPolicy::Copy.into_policy());
        let token = CancellationToken::new();

        let first = reconciler.reconcile(&request, &token);
        assert!(first.is_success());
        assert_eq!(first.copied, 2);
        assert_eq!(first.skipped, None);

        let second = reconciler.reconcile(&request, &token);
        assert_eq!(second.copied, 2);
        assert_eq!(second.skipped, None);
        assert_eq!(read(dst.path(), "b/y.txt"), "world");
    }

    #[test]
    fn test_changed_file_is_recopied() {
        let (src, dst, request) = sample_tree();
        let reconciler = TreeReconciler::new(Arc::new(CompareThenCopy));
        let token = CancellationToken::new();
        reconciler.reconcile(&request, &token);

        write(src.path(), "a/x.txt", "HELLO again");
        let outcome = reconciler.reconcile(&request, &token);

        assert_eq!(outcome.copied, 1);
        assert_eq!(outcome.skipped, Some(1));
        assert_eq!(read(dst.path(), "a/x.txt"), "HELLO again");
    }

    #[test]
    fn test_dest_only_files_are_kept() {
        let (_src, dst, request) = sample_tree();
        write(dst.path(), "extra/keep.txt", "mine");
        write(dst.path(), "a/other.txt", "also mine");

        let outcome =
            TreeReconciler::new(Arc::new(CompareThenCopy)).reconcile(&request, &CancellationToken::new());

        assert!(outcome.is_success());
        assert_eq!(read(dst.path(), "extra/keep.txt"), "mine");
        assert_eq!(read(dst.path(), "a/other.txt"), "also mine");
    }

    #[test]
    fn test_creates_missing_dest_root() {
        let (src, _dst, _) = sample_tree();
        let parent = tempfile::tempdir().unwrap();
        let dest_root = parent.path().join("not").join("yet");
        let request = SyncRequest::new(src.path(), &dest_root);

        let outcome =
            TreeReconciler::new(Arc::new(AlwaysCopy)).reconcile(&request, &CancellationToken::new());

        assert!(outcome.is_success());
        assert_eq!(read(&dest_root, "a/x.txt"), "hello");
    }

    #[test]
    fn test_empty_source_dirs_are_not_entries() {
        let (src, dst, request) = sample_tree();
        fs::create_dir_all(src.path().join("empty/nested")).unwrap();

        let outcome =
            TreeReconciler::new(Arc::new(AlwaysCopy)).reconcile(&request, &CancellationToken::new());

        assert_eq!(outcome.copied, 2);
        assert!(!dst.path().join("empty").exists());
    }

    #[test]
    fn test_missing_source_root_fails() {
        let parent = tempfile::tempdir().unwrap();
        let request = SyncRequest::new(parent.path().join("missing"), parent.path().join("dst"));

        let outcome =
            TreeReconciler::new(Arc::new(CompareThenCopy)).reconcile(&request, &CancellationToken::new());

        assert!(matches!(outcome.error, Some(SyncError::Walk(_))));
        assert_eq!(outcome.copied, 0);
        assert_eq!(outcome.skipped, Some(0));
    }

    #[test]
    fn test_cancelled_before_start() {
        let (_src, dst, request) = sample_tree();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = TreeReconciler::new(Arc::new(AlwaysCopy)).reconcile(&request, &token);

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.copied, 0);
        assert!(!dst.path().join("a/x.txt").exists());
    }

    #[test]
    fn test_cancel_observed_at_next_file_boundary() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(src.path(), &format!("f{i}.txt"), "data");
        }
        let token = CancellationToken::new();
        let policy = Arc::new(CancelAfter {
            after: 1,
            calls: AtomicUsize::new(0),
            token: token.clone(),
        });

        let outcome = TreeReconciler::new(policy.clone())
            .reconcile(&SyncRequest::new(src.path(), dst.path()), &token);

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.copied, 1);
        assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_aborts_walk_with_partial_counts() {
        let (_src, _dst, request) = sample_tree();

        let outcome =
            TreeReconciler::new(Arc::new(FailSecond::default())).reconcile(&request, &CancellationToken::new());

        assert!(matches!(outcome.error, Some(SyncError::Io { op: "stat", .. })));
        assert!(!outcome.is_cancelled());
        assert_eq!(outcome.copied, 1);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("hash".parse::<SyncPolicy>().unwrap(), SyncPolicy::Hash);
        assert_eq!("COPY".parse::<SyncPolicy>().unwrap(), SyncPolicy::Copy);
        assert!("mirror".parse::<SyncPolicy>().is_err());
        assert_eq!(SyncPolicy::default(), SyncPolicy::Hash);
        assert_eq!(SyncPolicy::Copy.into_policy().name(), "copy");
    }
}
