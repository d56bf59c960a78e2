use super::open_document;
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use flowtree_common::RealFileSystem;
use flowtree_editor::{EditSession, InsertPosition, Lookup, SuggestionScope};
use flowtree_parser::{serialize_line, Component};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct SuggestArgs {
    /// Flow file to inspect
    pub file: PathBuf,

    /// Full name of the component to insert relative to, e.g. Flow.start
    pub target: String,

    /// Where the new component would go
    #[arg(short, long, value_enum, default_value_t = Position::Beneath)]
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Position {
    Beneath,
    Here,
    After,
}

impl From<Position> for InsertPosition {
    fn from(position: Position) -> Self {
        match position {
            Position::Beneath => InsertPosition::Beneath,
            Position::Here => InsertPosition::Here,
            Position::After => InsertPosition::After,
        }
    }
}

pub fn suggest(args: SuggestArgs, cwd: &Path) -> Result<()> {
    let suggestions = suggestions_for(&args, cwd)?;

    println!(
        "💡 {} {} {}",
        "Suggestions".bright_blue().bold(),
        format!("{:?}", args.position).to_lowercase(),
        args.target.bright_white()
    );
    if suggestions.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for line in suggestions {
        println!("  {}", line);
    }
    Ok(())
}

/// Suggested component lines for the target, in rule order
pub fn suggestions_for(args: &SuggestArgs, cwd: &Path) -> Result<Vec<String>> {
    let config = Config::load(cwd)?;
    let document = open_document(&config, cwd, &args.file)?;
    let registry = document.shared_registry();

    let actor = config.suggestions(cwd, &registry, SuggestionScope::Actor)?;
    let external = config.suggestions(cwd, &registry, SuggestionScope::External)?;
    let session = EditSession::new(document, Arc::new(RealFileSystem), config.settings.clone())
        .with_suggestions(actor, external);

    let target = session
        .document()
        .tree()
        .locate(&args.target, Lookup::Shared(&registry))
        .ok_or_else(|| anyhow!("No component named {}", args.target))?;

    let suggested: Vec<Component> = session.suggest_insert(target, args.position.into())?;
    Ok(suggested.iter().map(serialize_line).collect())
}
