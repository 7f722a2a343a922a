//! A portable implementation of the Unix `ar` static-library archiver.
//!
//! Reads and writes the archive dialects emitted by GNU binutils and LLVM
//! (GNU, GNU-thin, GNU64, BSD, Darwin, Darwin64 and COFF), manages the
//! member files they contain, and builds the external symbol directory from
//! the ELF, Mach-O and COFF objects inserted into them.
//!
//! The entry points are [`Archive::open`] / [`Archive::create`] for
//! file-backed archives, [`read_archive`] / [`write_archive_to_stream`] for
//! byte-level access, and the mutation operations on [`Archive`].

// We are writing a very specific, well defined format, so it makes it easier
// to see exactly what is being written if we explicitly write out `\n`
// instead of hoping somebody notices the `writeln!` instead of `write!`.
#![allow(clippy::write_with_newline)]

mod alignment;
mod buffer;
mod object;
mod ops;

pub mod archive;
pub mod error;
pub mod mri;
pub mod reader;
pub mod writer;

pub use archive::{Archive, ArchivedFile, Dialect, Modifiers, SymbolOwner, SymbolRef};
pub use error::{Error, IoContext, ObjectError, ParseError, Result};
pub use mri::MriSession;
pub use reader::read_archive;
pub use writer::write_archive_to_stream;
