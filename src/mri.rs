//! The MRI librarian script interpreter.
//!
//! A line-oriented command language accepted for compatibility with
//! `ar -M`. Each command maps onto a single archive operation; `*` and `;`
//! introduce comments.

use std::io::BufRead;
use std::path::PathBuf;

use tracing::warn;

use crate::archive::{Archive, Dialect, Modifiers};
use crate::error::{Error, IoContext, Result};

/// Interpreter state: at most one archive is open at a time.
pub struct MriSession {
    archive: Option<Archive>,
    modifiers: Modifiers,
}

impl MriSession {
    pub fn new(modifiers: Modifiers) -> MriSession {
        MriSession {
            archive: None,
            modifiers,
        }
    }

    /// Run a whole script. Stops at `end` or end of input.
    pub fn run<R: BufRead, W: std::io::Write>(&mut self, input: R, output: &mut W) -> Result<()> {
        for line in input.lines() {
            let line = line.map_err(Error::io(IoContext::Reading, "<script>"))?;
            if !self.run_line(&line, output)? {
                break;
            }
        }
        Ok(())
    }

    /// Execute one script line. Returns false once `end` is reached.
    pub fn run_line<W: std::io::Write>(&mut self, line: &str, output: &mut W) -> Result<bool> {
        // Everything from a comment token on is ignored.
        let code = match line.find(|c| c == '*' || c == ';') {
            Some(start) => &line[..start],
            None => line,
        };
        let mut tokens = code.split_whitespace();
        let Some(command) = tokens.next() else {
            return Ok(true);
        };
        let argument = tokens.next();

        match command.to_ascii_lowercase().as_str() {
            "open" => {
                let path = required(argument)?;
                self.archive = Some(Archive::open(path, self.modifiers)?);
            }
            "create" => {
                let path = required(argument)?;
                let mut modifiers = self.modifiers;
                modifiers.create = true;
                self.archive = Some(Archive::create(path, Dialect::Ambiguous, modifiers));
            }
            "createthin" => {
                let path = required(argument)?;
                let mut modifiers = self.modifiers;
                modifiers.create = true;
                self.archive = Some(Archive::create(path, Dialect::GnuThin, modifiers));
            }
            "addmod" => {
                let path = PathBuf::from(required(argument)?);
                self.open_archive()?.insert(&[path])?;
            }
            "list" => {
                let archive = self.open_archive()?;
                archive
                    .print_names(output)
                    .map_err(Error::io(IoContext::Writing, "<output>"))?;
            }
            "delete" => {
                let name = required(argument)?.as_bytes().to_vec();
                self.open_archive()?.delete(&[name])?;
            }
            "extract" => {
                let name = required(argument)?.as_bytes().to_vec();
                self.open_archive()?.extract(&[name])?;
            }
            "save" => {
                self.open_archive()?.save()?;
            }
            "clear" => {
                if let Some(archive) = self.archive.as_mut() {
                    archive.clear();
                }
            }
            "end" => return Ok(false),
            other => warn!("ignoring unknown script command {other}"),
        }
        Ok(true)
    }

    fn open_archive(&mut self) -> Result<&mut Archive> {
        self.archive.as_mut().ok_or_else(|| Error::Io {
            context: IoContext::Accessing,
            path: PathBuf::from("<archive>"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "no archive is open"),
        })
    }
}

fn required(argument: Option<&str>) -> Result<&str> {
    argument.ok_or_else(|| Error::Io {
        context: IoContext::Reading,
        path: PathBuf::from("<script>"),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "command requires an argument",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let mut session = MriSession::new(Modifiers::default());
        let mut output = Vec::new();
        assert!(session.run_line("* a comment", &mut output).unwrap());
        assert!(session.run_line("   ", &mut output).unwrap());
        assert!(session.run_line("; another", &mut output).unwrap());
        assert!(!session.run_line("END", &mut output).unwrap());
    }

    #[test]
    fn create_then_clear() {
        let mut session = MriSession::new(Modifiers::default());
        let mut output = Vec::new();
        session
            .run_line("create /tmp/mri-test-archive.a", &mut output)
            .unwrap();
        assert!(session.archive.is_some());
        session.run_line("clear", &mut output).unwrap();
        assert!(session.archive.as_ref().unwrap().members().is_empty());
    }
}
