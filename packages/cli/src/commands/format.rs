use super::open_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use flowtree_common::RealFileSystem;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct FormatArgs {
    /// Flow file to format
    pub file: PathBuf,

    /// Rewrite the file instead of printing it
    #[arg(short, long)]
    pub write: bool,
}

pub fn format(args: FormatArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let mut document = open_document(&config, cwd, &args.file)?;

    if args.write {
        document.save(&RealFileSystem)?;
        println!("  {} {}", "✓".green(), args.file.display());
    } else {
        print!("{}", document.to_text()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_write_normalizes_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.flow"),
            "Flow -name Flow\n\n  Start   -name start\n  Display -name \"show\"\n",
        )
        .unwrap();

        format(
            FormatArgs {
                file: PathBuf::from("main.flow"),
                write: true,
            },
            dir.path(),
        )
        .unwrap();

        let written = fs::read_to_string(dir.path().join("main.flow")).unwrap();
        assert!(written.ends_with("Flow -name Flow\n  Start -name start\n  Display -name show\n"));
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = format(
            FormatArgs {
                file: PathBuf::from("nope.flow"),
                write: false,
            },
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("nope.flow"));
    }
}
