//! Mutation operations: insert, delete, move, extract, listing, ranlib.
//!
//! All operations keep the model invariants intact: the basename map always
//! locates its member, and symbol owners are remapped whenever member
//! positions shift.

use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::archive::{
    path_from_bytes, Archive, ArchivedFile, Dialect, Modifiers, SymbolOwner, SymbolRef,
    NANOS_PER_SEC,
};
use crate::error::{Error, IoContext, Result};
use crate::object::extract_symbols;
use crate::reader::read_archive;
use crate::writer::write_archive_to_stream;

/// Rebuild the symbol directory from scratch by running the extractors over
/// every member.
pub(crate) fn rebuild_symbol_table(archive: &mut Archive) -> Result<()> {
    let mut symbols = Vec::new();
    for (index, member) in archive.members.iter().enumerate() {
        extract_symbols(&member.data, &mut |name| {
            symbols.push(SymbolRef {
                name: name.to_vec(),
                owner: SymbolOwner::Resolved(index),
            })
        })?;
    }
    archive.symbols = symbols;
    Ok(())
}

fn mtime_nanos(meta: &Metadata) -> i128 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        i128::from(meta.mtime()) * NANOS_PER_SEC + i128::from(meta.mtime_nsec())
    }
    #[cfg(not(unix))]
    {
        meta.modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i128)
            .unwrap_or(0)
    }
}

/// Permission bits rendered as the decimal literal of their octal form,
/// which is what the headers store (644, 755, ...).
pub(crate) fn mode_to_field(bits: u32) -> u32 {
    let mut field = 0;
    let mut mul = 1;
    let mut bits = bits & 0o7777;
    while bits != 0 {
        field += (bits & 7) * mul;
        mul *= 10;
        bits >>= 3;
    }
    field
}

/// Inverse of [`mode_to_field`].
pub(crate) fn mode_from_field(field: u32) -> u32 {
    let mut bits = 0;
    let mut shift = 0;
    let mut field = field;
    while field != 0 && shift < 12 {
        bits |= ((field % 10) & 7) << shift;
        shift += 3;
        field /= 10;
    }
    bits
}

#[cfg(unix)]
fn file_owner_and_mode(meta: &Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.uid(), meta.gid(), mode_to_field(meta.mode()))
}

#[cfg(not(unix))]
fn file_owner_and_mode(_meta: &Metadata) -> (u32, u32, u32) {
    (0, 0, 644)
}

fn basename(path: &Path) -> Vec<u8> {
    let name = path.file_name().unwrap_or(path.as_os_str());
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        name.as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        name.to_string_lossy().into_owned().into_bytes()
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

impl Archive {
    /// Open an archive file, or start a fresh one when it does not exist.
    ///
    /// The backing handle is held for the lifetime of the archive.
    pub fn open(path: impl AsRef<Path>, modifiers: Modifiers) -> Result<Archive> {
        let path = path.as_ref();
        match File::open(path) {
            Ok(mut file) => {
                let meta = file
                    .metadata()
                    .map_err(Error::io(IoContext::Accessing, path))?;
                let mut data = Vec::new();
                file.read_to_end(&mut data)
                    .map_err(Error::io(IoContext::Reading, path))?;
                let mut archive = read_archive(&data, &containing_dir(path), modifiers)?;
                archive.path = Some(path.to_path_buf());
                archive.file = Some(file);
                archive.mtime = mtime_nanos(&meta);
                Ok(archive)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if !modifiers.create {
                    warn!("creating {}", path.display());
                }
                Ok(Archive::create(path, Dialect::Ambiguous, modifiers))
            }
            Err(err) => Err(Error::io(IoContext::Opening, path)(err)),
        }
    }

    /// Start a fresh archive backed by `path`. Nothing is written until
    /// [`Archive::save`].
    pub fn create(path: impl AsRef<Path>, dialect: Dialect, modifiers: Modifiers) -> Archive {
        let path = path.as_ref();
        let mut archive = Archive::new(dialect, modifiers);
        archive.dir = containing_dir(path);
        archive.path = Some(path.to_path_buf());
        archive
    }

    /// Serialise to the backing file, truncating it to the written length.
    /// A failed write truncates to empty rather than leaving a torn
    /// archive behind.
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone().ok_or_else(|| Error::Io {
            context: IoContext::Creating,
            path: PathBuf::from("<archive>"),
            source: io::Error::new(ErrorKind::Unsupported, "archive has no backing file"),
        })?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(Error::io(IoContext::Creating, &path))?;
        match write_archive_to_stream(self, &mut file) {
            Ok(len) => {
                file.set_len(len)
                    .map_err(Error::io(IoContext::Writing, &path))?;
                self.file = Some(file);
                Ok(())
            }
            Err(err) => {
                let _ = file.set_len(0);
                Err(err)
            }
        }
    }

    /// Serialise to an in-memory buffer.
    pub fn write_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        write_archive_to_stream(self, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Insert files as members. An existing member with the same basename
    /// is replaced in place; new members append.
    pub fn insert(&mut self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if let Some(member) = self.load_member(path)? {
                self.insert_member(member)?;
            }
        }
        Ok(())
    }

    /// Append files as members without looking for an existing basename
    /// and without the `update_only` gate.
    pub fn quick_append(&mut self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            let meta = std::fs::metadata(path).map_err(Error::io(IoContext::Accessing, path))?;
            let member = self.read_member_file(path, &meta)?;
            if self.modifiers.verbose {
                info!("a - {}", lossy(&member.name));
            }
            let index = self.push_member(member);
            if self.modifiers.build_symbol_table {
                self.extract_member_symbols(index)?;
            }
        }
        Ok(())
    }

    fn load_member(&mut self, path: &Path) -> Result<Option<ArchivedFile>> {
        let meta = std::fs::metadata(path).map_err(Error::io(IoContext::Accessing, path))?;
        if self.modifiers.update_only && self.mtime != 0 && mtime_nanos(&meta) <= self.mtime {
            if self.modifiers.verbose {
                info!("skipping {}", path.display());
            }
            return Ok(None);
        }
        Ok(Some(self.read_member_file(path, &meta)?))
    }

    fn read_member_file(&self, path: &Path, meta: &Metadata) -> Result<ArchivedFile> {
        let data = std::fs::read(path).map_err(Error::io(IoContext::Reading, path))?;
        let (uid, gid, mode) = file_owner_and_mode(meta);
        let mut member = ArchivedFile::new(basename(path), data);
        if self.modifiers.use_real_timestamps_and_ids {
            member.mtime = mtime_nanos(meta);
            member.uid = uid;
            member.gid = gid;
            member.mode = mode;
        }
        Ok(member)
    }

    /// Insert an already-built member, replacing any member with the same
    /// basename in place.
    pub fn insert_member(&mut self, member: ArchivedFile) -> Result<()> {
        if let Some(index) = self.position_of(&member.name) {
            if self.modifiers.verbose {
                info!("r - {}", lossy(&member.name));
            }
            self.symbols
                .retain(|s| s.owner != SymbolOwner::Resolved(index));
            self.members[index] = member;
            if self.modifiers.build_symbol_table {
                self.extract_member_symbols(index)?;
            }
        } else {
            if self.modifiers.verbose {
                info!("a - {}", lossy(&member.name));
            }
            let index = self.push_member(member);
            if self.modifiers.build_symbol_table {
                self.extract_member_symbols(index)?;
            }
        }
        Ok(())
    }

    fn extract_member_symbols(&mut self, index: usize) -> Result<()> {
        let mut fresh = Vec::new();
        extract_symbols(&self.members[index].data, &mut |name| {
            fresh.push(SymbolRef {
                name: name.to_vec(),
                owner: SymbolOwner::Resolved(index),
            })
        })?;
        self.symbols.extend(fresh);
        Ok(())
    }

    /// Delete members by basename. Unknown names are reported and skipped.
    pub fn delete(&mut self, names: &[Vec<u8>]) -> Result<()> {
        for name in names {
            let Some(index) = self.members.iter().position(|m| &m.name == name) else {
                warn!("no entry {} in archive", lossy(name));
                continue;
            };
            if self.modifiers.verbose {
                info!("d - {}", lossy(name));
            }
            self.members.remove(index);
            self.symbols
                .retain(|s| s.owner != SymbolOwner::Resolved(index));
            for symbol in &mut self.symbols {
                if let SymbolOwner::Resolved(owner) = symbol.owner {
                    if owner > index {
                        symbol.owner = SymbolOwner::Resolved(owner - 1);
                    }
                }
            }
            self.rebuild_index();
        }
        Ok(())
    }

    /// Move the named members to the end of the archive, preserving both
    /// the relative order of the untouched members and the argument order
    /// of the moved ones.
    pub fn move_to_end(&mut self, names: &[Vec<u8>]) -> Result<()> {
        let mut selected = vec![false; self.members.len()];
        let mut tail = Vec::new();
        for name in names {
            let position =
                (0..self.members.len()).find(|&i| !selected[i] && self.members[i].name == *name);
            match position {
                Some(index) => {
                    selected[index] = true;
                    tail.push(index);
                }
                None => warn!("no entry {} in archive", lossy(name)),
            }
        }
        if tail.is_empty() {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..self.members.len())
            .filter(|&i| !selected[i])
            .collect();
        order.extend(tail);

        let mut new_position = vec![0usize; self.members.len()];
        for (new_index, &old_index) in order.iter().enumerate() {
            new_position[old_index] = new_index;
        }
        let mut old: Vec<Option<ArchivedFile>> =
            std::mem::take(&mut self.members).into_iter().map(Some).collect();
        self.members = order.iter().map(|&i| old[i].take().unwrap()).collect();
        for symbol in &mut self.symbols {
            if let SymbolOwner::Resolved(owner) = symbol.owner {
                symbol.owner = SymbolOwner::Resolved(new_position[owner]);
            }
        }
        self.rebuild_index();
        Ok(())
    }

    /// Write members back out as files in the archive's directory. An empty
    /// name list extracts everything.
    pub fn extract(&mut self, names: &[Vec<u8>]) -> Result<()> {
        if self.dialect.is_thin() || self.output_dialect.is_thin() {
            return Err(Error::ExtractingFromThin);
        }
        let indices: Vec<usize> = if names.is_empty() {
            (0..self.members.len()).collect()
        } else {
            names
                .iter()
                .filter_map(|name| {
                    let index = self.members.iter().position(|m| &m.name == name);
                    if index.is_none() {
                        warn!("no entry {} in archive", lossy(name));
                    }
                    index
                })
                .collect()
        };
        for index in indices {
            let member = &self.members[index];
            let path = self.dir.join(path_from_bytes(&member.name));
            if self.modifiers.verbose {
                info!("x - {}", lossy(&member.name));
            }
            let mut file =
                File::create(&path).map_err(Error::io(IoContext::Creating, &path))?;
            file.write_all(&member.data)
                .map_err(Error::io(IoContext::Writing, &path))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let bits = mode_from_field(member.mode) & 0o777;
                if bits != 0 {
                    file.set_permissions(std::fs::Permissions::from_mode(bits))
                        .map_err(Error::io(IoContext::Writing, &path))?;
                }
            }
        }
        Ok(())
    }

    /// Member basenames in archive order.
    pub fn list(&self) -> impl Iterator<Item = &[u8]> {
        self.members.iter().map(|m| m.name.as_slice())
    }

    /// Stream member basenames, one per line.
    pub fn print_names<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for member in &self.members {
            w.write_all(&member.name)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Stream member payloads back to back.
    pub fn print_contents<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for member in &self.members {
            if self.modifiers.verbose {
                info!("p - {}", lossy(&member.name));
            }
            w.write_all(&member.data)?;
        }
        Ok(())
    }

    /// Stream symbol names, one per line.
    pub fn print_symbols<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for symbol in &self.symbols {
            w.write_all(&symbol.name)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Regenerate the symbol directory and rewrite the archive; no other
    /// state changes.
    pub fn ranlib(&mut self) -> Result<()> {
        let saved = self.modifiers.build_symbol_table;
        self.modifiers.build_symbol_table = true;
        let result = self.save();
        self.modifiers.build_symbol_table = saved;
        result
    }
}

fn containing_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
