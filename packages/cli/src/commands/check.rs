use crate::config::Config;
use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use flowtree_common::{walk_all, walk_component, Visitor};
use flowtree_editor::{validate_instance, ComponentKind, Registry, Role, OPTION_CALLABLE};
use flowtree_parser::{format_error, join_full_name, Component, NestedText, ParseError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Flow file or directory to check
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum Problem {
    Decode(ParseError),
    Structure(String),
}

pub fn check(args: CheckArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let registry = config.registry(cwd)?;
    let codec = config.codec();

    let input = cwd.join(&args.path);
    let files = if input.is_file() {
        vec![input.clone()]
    } else if input.is_dir() {
        find_flow_files(&input)
    } else {
        bail!("Input path does not exist: {}", input.display());
    };

    println!(
        "🔍 {} {} flow files",
        "Checking".green().bold(),
        files.len()
    );

    let mut problems = 0;
    for file in &files {
        let source = fs::read_to_string(file)?;
        let name = file.strip_prefix(cwd).unwrap_or(file).display().to_string();
        let found = check_source(&registry, &codec, &source);

        if found.is_empty() {
            println!("  {} {}", "✓".green(), name);
            continue;
        }

        problems += found.len();
        println!("  {} {}", "✗".red(), name);
        for problem in found {
            match problem {
                Problem::Decode(err) => eprintln!("{}", format_error(&source, &name, &err)),
                Problem::Structure(message) => println!("    {}", message.red()),
            }
        }
    }

    if problems > 0 {
        bail!("{} problems found", problems);
    }

    println!("✨ {} No problems found", "Done".green().bold());
    Ok(())
}

/// Every problem in one document; decoding stops at the first bad line
pub fn check_source(registry: &Registry, codec: &NestedText, source: &str) -> Vec<Problem> {
    let roots = match codec.decode_str(source) {
        Ok(roots) => roots,
        Err(err) => return vec![Problem::Decode(err)],
    };

    let mut pools = PoolMembers {
        registry,
        names: HashSet::new(),
    };
    walk_all(&mut pools, &roots);

    let mut problems = Vec::new();
    if roots.len() > 1 {
        problems.push(Problem::Structure(format!(
            "{} top-level components, expected one",
            roots.len()
        )));
    }

    for root in &roots {
        if root.type_id != registry.root_type() {
            problems.push(Problem::Structure(format!(
                "{}: root is {}, expected {}",
                root.name,
                root.type_id,
                registry.root_type()
            )));
        }
        if let Err(err) = validate_instance(registry, root) {
            problems.push(Problem::Structure(format!("{}: {}", root.name, err)));
            continue;
        }

        check_children(registry, root, &mut vec![root.name.as_str()], &pools.names, &mut problems);
    }

    debug!(problems = problems.len(), "Checked document");
    problems
}

/// Names defined in any callable pool of the document
struct PoolMembers<'r> {
    registry: &'r Registry,
    names: HashSet<String>,
}

impl Visitor for PoolMembers<'_> {
    fn visit_component(&mut self, component: &Component) {
        if self.registry.is_pool(&component.type_id) {
            self.names.extend(component.children.iter().map(|c| c.name.clone()));
        }
        walk_component(self, component);
    }
}

fn check_children<'a>(
    registry: &Registry,
    parent: &'a Component,
    path: &mut Vec<&'a str>,
    shared: &HashSet<String>,
    problems: &mut Vec<Problem>,
) {
    let capability = registry.capability_of(&parent.type_id);
    let mut seen = HashSet::new();

    for child in &parent.children {
        path.push(child.name.as_str());
        let child_name = join_full_name(path.iter().copied());

        if !seen.insert(child.name.as_str()) {
            problems.push(Problem::Structure(format!("{}: duplicate name", child_name)));
        }

        if let Some(capability) = capability {
            match registry.role_of(&child.type_id) {
                Some(Role::Standalone) if !capability.can_contain_standalones => {
                    problems.push(Problem::Structure(format!(
                        "{}: {} does not allow standalone {}",
                        child_name, parent.type_id, child.type_id
                    )));
                }
                Some(Role::Source) if !capability.can_contain_source && !registry.is_pool(&parent.type_id) => {
                    problems.push(Problem::Structure(format!(
                        "{}: {} does not allow source {}",
                        child_name, parent.type_id, child.type_id
                    )));
                }
                _ => {}
            }
            if !registry.satisfies(&child.type_id, &capability.restrictions) {
                problems.push(Problem::Structure(format!(
                    "{}: {} is not allowed in {}",
                    child_name, child.type_id, parent.type_id
                )));
            }
        }

        if registry.kind_of(&child.type_id) == Some(ComponentKind::CallableReference) {
            match child.options.get(OPTION_CALLABLE) {
                Some(callable) if shared.contains(callable) => {}
                Some(callable) => problems.push(Problem::Structure(format!(
                    "{}: callable {} is not defined",
                    child_name, callable
                ))),
                None => problems.push(Problem::Structure(format!(
                    "{}: missing -{}",
                    child_name, OPTION_CALLABLE
                ))),
            }
        }

        check_children(registry, child, path, shared, problems);
        path.pop();
    }
}

/// Find all .flow files below a directory
fn find_flow_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "flow"))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}
