//! The `ar`-style command-line front end.
//!
//! Classic `ar` grammar: one operation letter plus modifier letters in the
//! first positional argument, then the archive, then member files. Clap
//! handles the long options; the operation string is walked by hand.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use arfile::{Archive, Dialect, Modifiers, MriSession};

/// A portable ar archiver.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Archive dialect to write (gnu, gnu64, bsd, darwin, darwin64, coff).
    #[arg(long)]
    format: Option<String>,

    /// Write a thin archive.
    #[arg(long)]
    thin: bool,

    /// Read an MRI librarian script from standard input.
    #[arg(short = 'M')]
    mri: bool,

    /// Operation and modifier letters, the archive, then member files.
    #[arg(num_args = 0..)]
    args: Vec<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Operation {
    Delete,
    Move,
    PrintContents,
    QuickAppend,
    Insert,
    Ranlib,
    PrintNames,
    Extract,
    PrintSymbols,
}

fn parse_operation(letters: &str) -> Result<(Operation, Modifiers)> {
    let mut operation = None;
    let mut modifiers = Modifiers::default();
    for letter in letters.chars() {
        let next = match letter {
            'd' => Some(Operation::Delete),
            'm' => Some(Operation::Move),
            'p' => Some(Operation::PrintContents),
            'q' => Some(Operation::QuickAppend),
            'r' => Some(Operation::Insert),
            't' => Some(Operation::PrintNames),
            'x' => Some(Operation::Extract),
            'w' => Some(Operation::PrintSymbols),
            // A bare `s` with no other operation letter means ranlib.
            's' if !letters.chars().any(|c| "dmpqrtxw".contains(c)) => Some(Operation::Ranlib),
            's' => {
                modifiers.build_symbol_table = true;
                None
            }
            'S' => {
                modifiers.build_symbol_table = false;
                None
            }
            'c' => {
                modifiers.create = true;
                None
            }
            'u' => {
                modifiers.update_only = true;
                None
            }
            'U' => {
                modifiers.use_real_timestamps_and_ids = true;
                None
            }
            'D' => {
                modifiers.use_real_timestamps_and_ids = false;
                None
            }
            'v' => {
                modifiers.verbose = true;
                None
            }
            other => bail!("unknown operation or modifier: {other}"),
        };
        if let Some(next) = next {
            if operation.is_some() && operation != Some(next) {
                bail!("only one operation may be specified");
            }
            operation = Some(next);
        }
    }
    let operation = operation.context("an operation is required (one of d m p q r s t x w)")?;
    Ok((operation, modifiers))
}

fn parse_format(name: &str) -> Result<Dialect> {
    Ok(match name {
        "gnu" => Dialect::Gnu,
        "gnu64" => Dialect::Gnu64,
        "bsd" => Dialect::Bsd,
        "darwin" => Dialect::Darwin,
        "darwin64" => Dialect::Darwin64,
        "coff" => Dialect::Coff,
        other => bail!("unknown archive format: {other}"),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.mri {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        let mut session = MriSession::new(Modifiers::default());
        session.run(stdin.lock(), &mut stdout)?;
        return Ok(());
    }

    let mut args = cli.args.iter();
    let letters = args.next().context("missing operation")?;
    let (operation, mut modifiers) = parse_operation(letters)?;
    let archive_path = PathBuf::from(args.next().context("missing archive path")?);
    let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
    let names: Vec<Vec<u8>> = paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned().into_bytes())
                .unwrap_or_default()
        })
        .collect();

    // Read-only operations never warn about a missing archive.
    if matches!(
        operation,
        Operation::PrintContents | Operation::PrintNames | Operation::PrintSymbols
    ) {
        modifiers.create = true;
    }

    let mut archive = Archive::open(&archive_path, modifiers)
        .with_context(|| format!("failed to open {}", archive_path.display()))?;
    if let Some(format) = &cli.format {
        archive.set_output_dialect(parse_format(format)?);
    }
    if cli.thin {
        archive.set_output_dialect(Dialect::GnuThin);
    }

    let mut stdout = std::io::stdout();
    match operation {
        Operation::Insert => {
            archive.insert(&paths)?;
            archive.save()?;
        }
        Operation::QuickAppend => {
            archive.quick_append(&paths)?;
            archive.save()?;
        }
        Operation::Delete => {
            archive.delete(&names)?;
            archive.save()?;
        }
        Operation::Move => {
            archive.move_to_end(&names)?;
            archive.save()?;
        }
        Operation::Extract => {
            archive.extract(&names)?;
        }
        Operation::Ranlib => {
            archive.ranlib()?;
        }
        Operation::PrintContents => {
            archive.print_contents(&mut stdout)?;
        }
        Operation::PrintNames => {
            archive.print_names(&mut stdout)?;
        }
        Operation::PrintSymbols => {
            archive.print_symbols(&mut stdout)?;
        }
    }
    stdout.flush().ok();
    Ok(())
}
