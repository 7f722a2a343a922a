// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! The in-memory archive model: dialects, members, and the symbol directory.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// File identification bytes stored at the beginning of the file.
pub const MAGIC: [u8; 8] = *b"!<arch>\n";

/// File identification bytes stored at the beginning of a thin archive.
///
/// A thin archive stores member payloads by reference only; they live in
/// sibling files next to the archive.
pub const THIN_MAGIC: [u8; 8] = *b"!<thin>\n";

/// The terminator closing each 60-byte member header.
pub const TERMINATOR: [u8; 2] = *b"`\n";

/// Fixed size of a member header.
pub(crate) const HEADER_SIZE: u64 = 60;

/// Size field is 10 decimal digits long.
pub(crate) const MAX_MEMBER_SIZE: u64 = 9999999999;

pub(crate) const NANOS_PER_SEC: i128 = 1_000_000_000;

/// The on-disk encoding of an archive.
///
/// Dialects disagree on long-name handling, symbol-table layout, and
/// alignment. `Ambiguous` is the pre-inference value; writes resolve it to
/// the host default.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dialect {
    Ambiguous,
    Gnu,
    GnuThin,
    Gnu64,
    Bsd,
    Darwin,
    Darwin64,
    Coff,
}

impl Dialect {
    /// The dialect native to the build host: Darwin on macOS, COFF on
    /// Windows, GNU everywhere else.
    pub fn host_default() -> Dialect {
        if cfg!(target_os = "macos") {
            Dialect::Darwin
        } else if cfg!(windows) {
            Dialect::Coff
        } else {
            Dialect::Gnu
        }
    }

    pub(crate) fn is_bsd_like(self) -> bool {
        matches!(self, Dialect::Bsd | Dialect::Darwin | Dialect::Darwin64)
    }

    pub(crate) fn is_darwin(self) -> bool {
        matches!(self, Dialect::Darwin | Dialect::Darwin64)
    }

    pub(crate) fn is_64_bit(self) -> bool {
        matches!(self, Dialect::Gnu64 | Dialect::Darwin64)
    }

    pub(crate) fn is_thin(self) -> bool {
        self == Dialect::GnuThin
    }

    /// Alignment of interior records: symbol table, string table, and the
    /// start of each member's payload area.
    pub(crate) fn record_alignment(self) -> u64 {
        if self.is_bsd_like() {
            8
        } else {
            2
        }
    }

    /// Alignment each member payload is padded out to.
    pub(crate) fn payload_alignment(self) -> u64 {
        if self.is_darwin() {
            8
        } else {
            2
        }
    }

    /// The byte used to pad member payloads to `payload_alignment`.
    pub(crate) fn padding_byte(self) -> u8 {
        if self.is_bsd_like() {
            0
        } else {
            b'\n'
        }
    }
}

/// Behaviour toggles threaded through every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modifiers {
    /// Suppress the "creating archive" notice when the archive is new.
    pub create: bool,
    /// Skip inserting files older than the archive itself.
    pub update_only: bool,
    /// Record real timestamps, uids, gids and modes. When off, timestamps
    /// and ids are zeroed and the mode is forced to 644.
    pub use_real_timestamps_and_ids: bool,
    /// Maintain and emit the external symbol directory.
    pub build_symbol_table: bool,
    /// Emit the symbol directory sorted by name.
    pub sort_symbol_table: bool,
    /// Log each operation as it happens.
    pub verbose: bool,
}

impl Default for Modifiers {
    fn default() -> Self {
        Modifiers {
            create: false,
            update_only: false,
            use_real_timestamps_and_ids: false,
            build_symbol_table: true,
            sort_symbol_table: false,
            verbose: false,
        }
    }
}

/// A single file contained in an archive.
///
/// The basename is raw bytes; nothing guarantees it is valid text in any
/// encoding. The modification time is kept in nanoseconds, wide enough to
/// survive round-trips through every dialect's second-resolution headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub mtime: i128,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

impl ArchivedFile {
    pub fn new(name: impl Into<Vec<u8>>, data: Vec<u8>) -> ArchivedFile {
        ArchivedFile {
            name: name.into(),
            data,
            mtime: 0,
            uid: 0,
            gid: 0,
            mode: 644,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whole seconds of the modification time, as written to headers.
    pub(crate) fn mtime_secs(&self) -> u64 {
        (self.mtime / NANOS_PER_SEC).clamp(0, u64::MAX as i128) as u64
    }
}

/// Which member a symbol belongs to.
///
/// `Pending` holds a raw file offset observed in a symbol table before the
/// member loop has run; the reader resolves it to an index once all member
/// header offsets are known. `Unresolved` marks directory entries whose
/// offset matched no member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOwner {
    Resolved(usize),
    Pending(u64),
    Unresolved,
}

/// One entry of the external symbol directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    pub name: Vec<u8>,
    pub owner: SymbolOwner,
}

/// An archive: an ordered sequence of members plus the symbol directory.
///
/// Each instance exclusively owns its backing file handle (when file-backed)
/// and every member payload buffer. Mutation is not thread-safe.
#[derive(Debug)]
pub struct Archive {
    /// The dialect inferred from the input, `Ambiguous` for fresh archives.
    pub(crate) dialect: Dialect,
    /// The dialect used for writes; falls back to the host default when
    /// still `Ambiguous` at write time.
    pub(crate) output_dialect: Dialect,
    pub(crate) modifiers: Modifiers,
    pub(crate) members: Vec<ArchivedFile>,
    pub(crate) symbols: Vec<SymbolRef>,
    /// Basename of each member to its position; first occurrence wins when
    /// duplicates exist.
    pub(crate) index: HashMap<Vec<u8>, usize>,
    /// Directory containing the archive; thin payloads and extractions
    /// resolve against it.
    pub(crate) dir: PathBuf,
    pub(crate) path: Option<PathBuf>,
    pub(crate) file: Option<File>,
    /// Modification time of the backing file when opened; zero for fresh
    /// archives. Gates `update_only` inserts.
    pub(crate) mtime: i128,
}

impl Archive {
    /// Create an empty in-memory archive.
    pub fn new(dialect: Dialect, modifiers: Modifiers) -> Archive {
        Archive {
            dialect,
            output_dialect: dialect,
            modifiers,
            members: Vec::new(),
            symbols: Vec::new(),
            index: HashMap::new(),
            dir: PathBuf::from("."),
            path: None,
            file: None,
            mtime: 0,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn output_dialect(&self) -> Dialect {
        self.output_dialect
    }

    /// Override the dialect used for subsequent writes.
    pub fn set_output_dialect(&mut self, dialect: Dialect) {
        self.output_dialect = dialect;
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn modifiers_mut(&mut self) -> &mut Modifiers {
        &mut self.modifiers
    }

    pub fn members(&self) -> &[ArchivedFile] {
        &self.members
    }

    pub fn symbols(&self) -> &[SymbolRef] {
        &self.symbols
    }

    /// The directory member paths resolve against.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Position of the first member with this basename.
    pub fn position_of(&self, name: &[u8]) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Append a member, keeping the basename map consistent.
    pub(crate) fn push_member(&mut self, member: ArchivedFile) -> usize {
        let pos = self.members.len();
        self.index.entry(member.name.clone()).or_insert(pos);
        self.members.push(member);
        pos
    }

    /// Discard every member and symbol, keeping the backing file and
    /// modifiers.
    pub fn clear(&mut self) {
        self.members.clear();
        self.symbols.clear();
        self.index.clear();
    }

    /// Recompute the basename map from the member sequence.
    pub(crate) fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, member) in self.members.iter().enumerate() {
            self.index.entry(member.name.clone()).or_insert(pos);
        }
    }
}

/// Convert raw basename bytes into a host path component.
#[cfg(unix)]
pub(crate) fn path_from_bytes(name: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(name))
}

#[cfg(not(unix))]
pub(crate) fn path_from_bytes(name: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(name).into_owned())
}
