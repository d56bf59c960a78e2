use super::open_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use flowtree_editor::{NodeId, Tree};
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct TreeArgs {
    /// Flow file to print
    pub file: PathBuf,

    /// Show each node's full name
    #[arg(long)]
    pub full_names: bool,
}

pub fn tree(args: TreeArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let document = open_document(&config, cwd, &args.file)?;
    print!("{}", render(document.tree(), args.full_names));
    Ok(())
}

/// One line per node, plus annotation lines, indented by depth
pub fn render(tree: &Tree, full_names: bool) -> String {
    let mut out = String::new();
    if let Some(root) = tree.root() {
        render_node(tree, root, full_names, &mut out);
    }
    out
}

fn render_node(tree: &Tree, id: NodeId, full_names: bool, out: &mut String) {
    let indent = "  ".repeat(tree.depth(id));
    let label = tree.label(id);
    let mut lines = label.lines();

    if let Some(first) = lines.next() {
        out.push_str(&indent);
        out.push_str(first);
        if full_names {
            out.push_str(&format!("  {}", tree.full_name(id).dimmed()));
        }
        out.push('\n');
    }
    for annotation in lines {
        out.push_str(&format!("{}  {}\n", indent, annotation.italic()));
    }

    for &child in tree.children(id) {
        render_node(tree, child, full_names, out);
    }
}
