//! The injected filesystem bundle.
//!
//! Every IO the graph performs flows through an [`FsProvider`]. The default
//! [`RealFs`] overlays the host filesystem (`std::fs` for the sync half,
//! `tokio::fs` for the async half); test suites swap in scripted providers
//! to inject faults and latency.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::warn;

/// Kind of a single directory entry, as reported by the entry-type variant
/// of readdir (no stat involved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirEntryType {
    /// The host could not (or did not) report a type.
    Unknown,
    /// Regular file.
    RegularFile,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// FIFO special file.
    NamedPipe,
    /// Socket.
    Socket,
}

impl From<std::fs::FileType> for DirEntryType {
    fn from(ft: std::fs::FileType) -> Self {
        #[cfg(unix)]
        use std::os::unix::fs::FileTypeExt as _;

        if ft.is_file() {
            Self::RegularFile
        } else if ft.is_dir() {
            Self::Directory
        } else if ft.is_symlink() {
            Self::Symlink
        } else {
            #[cfg(unix)]
            {
                if ft.is_char_device() {
                    return Self::CharDevice;
                } else if ft.is_block_device() {
                    return Self::BlockDevice;
                } else if ft.is_fifo() {
                    return Self::NamedPipe;
                } else if ft.is_socket() {
                    return Self::Socket;
                }
            }
            warn!(ft = ?ft, "unrecognized file type from host, treating as unknown");
            Self::Unknown
        }
    }
}

/// One entry from a readdir call: the observed basename and its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Basename exactly as the filesystem spelled it.
    pub name: String,
    /// Entry type, [`DirEntryType::Unknown`] if the host did not say.
    pub kind: DirEntryType,
}

/// A captured lstat result.
///
/// Timestamps are kept as [`SystemTime`]; millisecond views are derived via
/// the `*_ms` accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stat {
    /// Device id.
    pub dev: u64,
    /// Raw mode word, including the `S_IFMT` type bits.
    pub mode: u32,
    /// Hard link count.
    pub nlink: u64,
    /// Owner uid.
    pub uid: u32,
    /// Owner gid.
    pub gid: u32,
    /// Special-file device id.
    pub rdev: u64,
    /// Preferred IO block size.
    pub blksize: u64,
    /// Inode number.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
    /// Creation time, `UNIX_EPOCH` when the host does not track it.
    pub birthtime: SystemTime,
}

fn millis_since_epoch(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

impl Stat {
    /// Access time as signed milliseconds since the epoch.
    #[must_use]
    pub fn atime_ms(&self) -> i64 {
        millis_since_epoch(self.atime)
    }

    /// Modification time as signed milliseconds since the epoch.
    #[must_use]
    pub fn mtime_ms(&self) -> i64 {
        millis_since_epoch(self.mtime)
    }

    /// Status-change time as signed milliseconds since the epoch.
    #[must_use]
    pub fn ctime_ms(&self) -> i64 {
        millis_since_epoch(self.ctime)
    }

    /// Creation time as signed milliseconds since the epoch.
    #[must_use]
    pub fn birthtime_ms(&self) -> i64 {
        millis_since_epoch(self.birthtime)
    }
}

#[cfg(unix)]
#[expect(
    clippy::cast_sign_loss,
    reason = "nsecs from MetadataExt is always in [0, 999_999_999]"
)]
fn to_systime(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64) + Duration::from_nanos(nsecs as u64)
    }
}

impl From<&std::fs::Metadata> for Stat {
    #[cfg(unix)]
    fn from(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt as _;

        Self {
            dev: meta.dev(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            blksize: meta.blksize(),
            ino: meta.ino(),
            size: meta.size(),
            blocks: meta.blocks(),
            atime: to_systime(meta.atime(), meta.atime_nsec()),
            mtime: to_systime(meta.mtime(), meta.mtime_nsec()),
            ctime: to_systime(meta.ctime(), meta.ctime_nsec()),
            birthtime: meta.created().unwrap_or(UNIX_EPOCH),
        }
    }

    #[cfg(not(unix))]
    fn from(meta: &std::fs::Metadata) -> Self {
        let ft = meta.file_type();
        let type_bits = if ft.is_dir() {
            0o040_000
        } else if ft.is_symlink() {
            0o120_000
        } else {
            0o100_000
        };
        Self {
            dev: 0,
            mode: type_bits,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 4096,
            ino: 0,
            size: meta.len(),
            blocks: meta.len().div_ceil(512),
            atime: meta.accessed().unwrap_or(UNIX_EPOCH),
            mtime: meta.modified().unwrap_or(UNIX_EPOCH),
            ctime: meta.modified().unwrap_or(UNIX_EPOCH),
            birthtime: meta.created().unwrap_or(UNIX_EPOCH),
        }
    }
}

/// Coarse classification of a filesystem error.
///
/// The graph never propagates IO errors; it folds them into node state
/// according to this classification. Raw errnos are consulted first because
/// `io::ErrorKind` collapses distinctions the state machine cares about
/// (EPERM vs EACCES).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    /// ENOENT.
    NotFound,
    /// ENOTDIR.
    NotADirectory,
    /// EPERM, specifically. EACCES classifies as [`FsErrorKind::Other`].
    NotPermitted,
    /// EINVAL.
    InvalidArgument,
    /// Everything else.
    Other,
}

impl FsErrorKind {
    /// Classify a host IO error.
    #[must_use]
    pub fn classify(e: &io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENOENT) => Self::NotFound,
            Some(libc::ENOTDIR) => Self::NotADirectory,
            Some(libc::EPERM) => Self::NotPermitted,
            Some(libc::EINVAL) => Self::InvalidArgument,
            Some(_) => Self::Other,
            None => match e.kind() {
                io::ErrorKind::NotFound => Self::NotFound,
                io::ErrorKind::NotADirectory => Self::NotADirectory,
                io::ErrorKind::InvalidInput => Self::InvalidArgument,
                _ => Self::Other,
            },
        }
    }
}

/// The filesystem operations the graph consumes.
///
/// Paths cross this boundary as the graph's native strings. A provider may
/// serve them from the host, from a fixture tree, or from anywhere else;
/// the graph only interprets the results and the error classification.
/// Every member a provider does not override falls back to the host
/// filesystem, so partial providers (say, a scripted readdir over real
/// stats) compose without boilerplate.
#[async_trait(?Send)]
pub trait FsProvider {
    /// Stat without following a final symlink.
    fn lstat_sync(&self, path: &str) -> io::Result<Stat> {
        RealFs.lstat_sync(path)
    }

    /// List a directory with per-entry types.
    fn readdir_sync(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        RealFs.readdir_sync(path)
    }

    /// Read a symlink's target string.
    fn readlink_sync(&self, path: &str) -> io::Result<String> {
        RealFs.readlink_sync(path)
    }

    /// Fully dereference a path.
    fn realpath_sync(&self, path: &str) -> io::Result<String> {
        RealFs.realpath_sync(path)
    }

    /// Async [`FsProvider::lstat_sync`].
    async fn lstat(&self, path: &str) -> io::Result<Stat> {
        RealFs.lstat(path).await
    }

    /// Async [`FsProvider::readdir_sync`].
    async fn readdir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        RealFs.readdir(path).await
    }

    /// Async [`FsProvider::readlink_sync`].
    async fn readlink(&self, path: &str) -> io::Result<String> {
        RealFs.readlink(path).await
    }

    /// Async [`FsProvider::realpath_sync`].
    async fn realpath(&self, path: &str) -> io::Result<String> {
        RealFs.realpath(path).await
    }
}

/// Provider backed by the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

fn entry_name(entry: &std::fs::DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}

#[async_trait(?Send)]
impl FsProvider for RealFs {
    fn lstat_sync(&self, path: &str) -> io::Result<Stat> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Stat::from(&meta))
    }

    fn readdir_sync(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let kind = entry
                .file_type()
                .map(DirEntryType::from)
                .unwrap_or(DirEntryType::Unknown);
            out.push(DirEntry {
                name: entry_name(&entry),
                kind,
            });
        }
        Ok(out)
    }

    fn readlink_sync(&self, path: &str) -> io::Result<String> {
        let target = std::fs::read_link(path)?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn realpath_sync(&self, path: &str) -> io::Result<String> {
        let real = std::fs::canonicalize(path)?;
        Ok(real.to_string_lossy().into_owned())
    }

    async fn lstat(&self, path: &str) -> io::Result<Stat> {
        let meta = tokio::fs::symlink_metadata(Path::new(path)).await?;
        Ok(Stat::from(&meta))
    }

    async fn readdir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut rd = tokio::fs::read_dir(Path::new(path)).await?;
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let kind = entry
                .file_type()
                .await
                .map(DirEntryType::from)
                .unwrap_or(DirEntryType::Unknown);
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(out)
    }

    async fn readlink(&self, path: &str) -> io::Result<String> {
        let target = tokio::fs::read_link(Path::new(path)).await?;
        Ok(target.to_string_lossy().into_owned())
    }

    async fn realpath(&self, path: &str) -> io::Result<String> {
        let real = tokio::fs::canonicalize(Path::new(path)).await?;
        Ok(real.to_string_lossy().into_owned())
    }
}
