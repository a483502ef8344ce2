//! The packed per-node type/state word.
//!
//! One `u32` carries both the inode type (the Unix `S_IFMT` nibble shifted
//! into the low 4 bits) and the auxiliary state bits that drive the
//! readdir/lstat/readlink/realpath state machine. This is the hot field of
//! every node: `can_readdir`, `can_readlink`, and `should_walk` are all
//! answered from it without touching anything else.

use bitflags::bitflags;

use crate::provider::DirEntryType;

bitflags! {
    /// Per-node type and state bits.
    ///
    /// The low 4 bits hold the inode type as the `S_IFMT >> 12` nibble;
    /// `0` means the type is unknown. Note that the type values overlap
    /// (`IFBLK` is `IFCHR | IFDIR`), so the type must always be read
    /// through [`NodeState::ifmt`] and compared with `==`, never with
    /// `contains`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeState: u32 {
        /// FIFO special file.
        const IFIFO = 0b0001;
        /// Character device.
        const IFCHR = 0b0010;
        /// Directory.
        const IFDIR = 0b0100;
        /// Block device.
        const IFBLK = 0b0110;
        /// Regular file.
        const IFREG = 0b1000;
        /// Symbolic link.
        const IFLNK = 0b1010;
        /// Socket.
        const IFSOCK = 0b1100;
        /// Mask over the type nibble.
        const IFMT = 0b1111;

        /// The children array is authoritative up to its provisional mark.
        const READDIR_CALLED = 1 << 4;
        /// Stat fields are populated.
        const LSTAT_CALLED = 1 << 5;
        /// This node can never have children.
        const ENOTDIR = 1 << 6;
        /// This node (or an ancestor) definitely does not exist.
        const ENOENT = 1 << 7;
        /// Readlink has failed or is impossible here.
        const ENOREADLINK = 1 << 8;
        /// Realpath has failed or is impossible here.
        const ENOREALPATH = 1 << 9;

        /// Any state that forbids children.
        const ENOCHILD = Self::ENOTDIR.bits()
            | Self::ENOENT.bits()
            | Self::ENOREALPATH.bits();
    }
}

impl NodeState {
    /// The type nibble alone. Empty means the type is unknown.
    #[must_use]
    pub fn ifmt(self) -> Self {
        self & Self::IFMT
    }

    /// True when the type nibble is unset.
    #[must_use]
    pub fn is_unknown(self) -> bool {
        self.ifmt().is_empty()
    }

    /// True when the node is known to be a directory.
    #[must_use]
    pub fn is_dir(self) -> bool {
        self.ifmt() == Self::IFDIR
    }

    /// True when the node is known to be a regular file.
    #[must_use]
    pub fn is_file(self) -> bool {
        self.ifmt() == Self::IFREG
    }

    /// True when the node is known to be a symbolic link.
    #[must_use]
    pub fn is_symlink(self) -> bool {
        self.ifmt() == Self::IFLNK
    }

    /// Whether a readdir may be issued: the type is unknown, a directory,
    /// or a link, and no child-forbidding bit is set.
    #[must_use]
    pub fn can_readdir(self) -> bool {
        if self.intersects(Self::ENOCHILD) {
            return false;
        }
        let ifmt = self.ifmt();
        ifmt.is_empty() || ifmt == Self::IFDIR || ifmt == Self::IFLNK
    }

    /// Replace the type nibble, keeping every state bit.
    ///
    /// Setting a type that can never have children also sets ENOTDIR, and
    /// setting a directory type is only legal when ENOTDIR is clear, so the
    /// word never claims to be both a directory and childless.
    #[must_use]
    pub fn with_ifmt(self, ifmt: Self) -> Self {
        let mut out = (self - Self::IFMT) | ifmt.ifmt();
        if !ifmt.is_empty() && ifmt != Self::IFDIR && ifmt != Self::IFLNK {
            out |= Self::ENOTDIR;
        }
        out
    }

    /// The type nibble for a directory entry reported by the provider.
    #[must_use]
    pub fn from_entry_type(kind: DirEntryType) -> Self {
        match kind {
            DirEntryType::Unknown => Self::empty(),
            DirEntryType::NamedPipe => Self::IFIFO,
            DirEntryType::CharDevice => Self::IFCHR,
            DirEntryType::Directory => Self::IFDIR,
            DirEntryType::BlockDevice => Self::IFBLK,
            DirEntryType::RegularFile => Self::IFREG,
            DirEntryType::Symlink => Self::IFLNK,
            DirEntryType::Socket => Self::IFSOCK,
        }
    }

    /// The type nibble from a raw `st_mode`.
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        Self::from_bits_truncate((mode & 0xF000) >> 12)
    }
}
