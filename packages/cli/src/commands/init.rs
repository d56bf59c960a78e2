use crate::config::{Config, DEFAULT_CONFIG_NAME};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use flowtree_editor::Registry;
use flowtree_parser::{Component, NestedText};
use std::fs;
use std::path::Path;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Name of the starter flow file
    #[arg(short, long, default_value = "main.flow")]
    pub flow: String,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = cwd.join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    println!("{}", "📝 Initializing flowtree project...".bright_blue().bold());

    let config = Config {
        default_suggestions: vec!["PassThrough".to_string()],
        ..Config::default()
    };

    let flow_path = cwd.join(&args.flow);
    if !flow_path.exists() {
        fs::write(&flow_path, starter_flow(&config)?)?;
        println!("  {} Created {}", "✓".green(), args.flow);
    }

    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);

    println!();
    println!("{}", "✅ Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Run: flowtree tree {}", args.flow);
    println!("  2. Run: flowtree suggest {} Flow.start --position after", args.flow);

    Ok(())
}

/// Root with a start and a display, built from the built-in catalogue
fn starter_flow(config: &Config) -> Result<String> {
    let registry = Registry::builtin()?;
    let mut root = registry.instantiate(registry.root_type())?;
    root.children.push(Component::new("Start", "start"));
    root.children.push(Component::new("Display", "show"));

    let codec: NestedText = config.codec();
    Ok(codec.encode_document(&[root]))
}
