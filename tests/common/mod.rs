#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use pathgraph::{DirEntry, DirEntryType, FsProvider, Stat};

/// Which provider operation a call log entry or injected fault refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Lstat,
    Readdir,
    Readlink,
    Realpath,
}

/// A scripted filesystem: fixed listings, link targets, and per-path
/// injected errnos, with a full call log for IO-count assertions.
///
/// Sync and async halves serve identical data; the async half yields once
/// before replying so that concurrent callers genuinely interleave.
#[derive(Default)]
pub struct MockFs {
    dirs: HashMap<String, Vec<DirEntry>>,
    links: HashMap<String, String>,
    stats: HashMap<String, Stat>,
    realpaths: HashMap<String, String>,
    errors: HashMap<(Op, String), i32>,
    calls: RefCell<Vec<(Op, String)>>,
}

pub fn mk_stat(kind: DirEntryType) -> Stat {
    let type_bits = match kind {
        DirEntryType::Unknown => 0,
        DirEntryType::NamedPipe => 0o010_000,
        DirEntryType::CharDevice => 0o020_000,
        DirEntryType::Directory => 0o040_000,
        DirEntryType::BlockDevice => 0o060_000,
        DirEntryType::RegularFile => 0o100_000,
        DirEntryType::Symlink => 0o120_000,
        DirEntryType::Socket => 0o140_000,
    };
    Stat {
        dev: 1,
        mode: type_bits | 0o755,
        nlink: 1,
        uid: 1000,
        gid: 1000,
        rdev: 0,
        blksize: 4096,
        ino: 42,
        size: 0,
        blocks: 0,
        atime: UNIX_EPOCH,
        mtime: UNIX_EPOCH,
        ctime: UNIX_EPOCH,
        birthtime: UNIX_EPOCH,
    }
}

/// Collapse `.` and `..` in an absolute forward-slash path.
fn normalize_abs(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a directory listing.
    pub fn dir(mut self, path: &str, entries: &[(&str, DirEntryType)]) -> Self {
        self.dirs.insert(
            path.to_owned(),
            entries
                .iter()
                .map(|(name, kind)| DirEntry {
                    name: (*name).to_owned(),
                    kind: *kind,
                })
                .collect(),
        );
        self
    }

    /// Script a symlink's target.
    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.links.insert(path.to_owned(), target.to_owned());
        self
    }

    /// Script an explicit lstat result.
    pub fn stat_of(mut self, path: &str, kind: DirEntryType) -> Self {
        self.stats.insert(path.to_owned(), mk_stat(kind));
        self
    }

    /// Script an explicit realpath result.
    pub fn real(mut self, path: &str, target: &str) -> Self {
        self.realpaths.insert(path.to_owned(), target.to_owned());
        self
    }

    /// Inject an errno for one operation on one path.
    pub fn fail(mut self, op: Op, path: &str, errno: i32) -> Self {
        self.errors.insert((op, path.to_owned()), errno);
        self
    }

    /// How many times `op` hit `path`.
    pub fn calls(&self, op: Op, path: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(o, p)| *o == op && p == path)
            .count()
    }

    /// How many times `op` hit any path.
    pub fn total_calls(&self, op: Op) -> usize {
        self.calls.borrow().iter().filter(|(o, _)| *o == op).count()
    }

    fn log_and_check(&self, op: Op, path: &str) -> io::Result<()> {
        self.calls.borrow_mut().push((op, path.to_owned()));
        match self.errors.get(&(op, path.to_owned())) {
            Some(&errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.dirs.contains_key(path)
            || self.links.contains_key(path)
            || self.stats.contains_key(path)
    }

    fn do_lstat(&self, path: &str) -> io::Result<Stat> {
        self.log_and_check(Op::Lstat, path)?;
        if let Some(stat) = self.stats.get(path) {
            return Ok(*stat);
        }
        if self.dirs.contains_key(path) {
            return Ok(mk_stat(DirEntryType::Directory));
        }
        if self.links.contains_key(path) {
            return Ok(mk_stat(DirEntryType::Symlink));
        }
        Err(io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn do_readdir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.log_and_check(Op::Readdir, path)?;
        match self.dirs.get(path) {
            Some(entries) => Ok(entries.clone()),
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn do_readlink(&self, path: &str) -> io::Result<String> {
        self.log_and_check(Op::Readlink, path)?;
        match self.links.get(path) {
            Some(target) => Ok(target.clone()),
            None if self.exists(path) => Err(io::Error::from_raw_os_error(libc::EINVAL)),
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn do_realpath(&self, path: &str) -> io::Result<String> {
        self.log_and_check(Op::Realpath, path)?;
        if let Some(real) = self.realpaths.get(path) {
            return Ok(real.clone());
        }
        if let Some(target) = self.links.get(path) {
            let absolute = if target.starts_with('/') {
                target.clone()
            } else {
                let dir = path.rsplit_once('/').map_or("", |(d, _)| d);
                format!("{dir}/{target}")
            };
            return Ok(normalize_abs(&absolute));
        }
        if self.exists(path) {
            return Ok(normalize_abs(path));
        }
        Err(io::Error::from_raw_os_error(libc::ENOENT))
    }
}

#[async_trait(?Send)]
impl FsProvider for MockFs {
    fn lstat_sync(&self, path: &str) -> io::Result<Stat> {
        self.do_lstat(path)
    }

    fn readdir_sync(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.do_readdir(path)
    }

    fn readlink_sync(&self, path: &str) -> io::Result<String> {
        self.do_readlink(path)
    }

    fn realpath_sync(&self, path: &str) -> io::Result<String> {
        self.do_realpath(path)
    }

    async fn lstat(&self, path: &str) -> io::Result<Stat> {
        tokio::task::yield_now().await;
        self.do_lstat(path)
    }

    async fn readdir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        tokio::task::yield_now().await;
        self.do_readdir(path)
    }

    async fn readlink(&self, path: &str) -> io::Result<String> {
        tokio::task::yield_now().await;
        self.do_readlink(path)
    }

    async fn realpath(&self, path: &str) -> io::Result<String> {
        tokio::task::yield_now().await;
        self.do_realpath(path)
    }
}
