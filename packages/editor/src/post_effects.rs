//! # Post-Effect System
//!
//! Renames cascade into the rest of the document.
//!
//! ## Design
//!
//! A committed mutation reports the renames it caused. Each registered
//! rewriter gets a look at every rename and patches whatever refers to the
//! old name. The built-in rewriter follows renamed callable components into
//! the references that call them.
//!
//! Rewriters only touch option values; they never change structure. The
//! session runs them inside the same undo point as the mutation, and skips
//! them entirely when name changes are ignored.

use crate::events::ChangeEvent;
use crate::mutations::{Renamed, OPTION_CALLABLE};
use crate::registry::{ComponentKind, Registry};
use crate::tree::{NodeId, Tree};
use tracing::debug;

/// Rewrites references after a component was renamed
pub trait ReferenceRewriter: std::fmt::Debug {
    /// Returns the nodes whose instances were changed
    fn rewrite(&self, tree: &mut Tree, registry: &Registry, renamed: &Renamed) -> Vec<NodeId>;
}

/// Points callable references at the new name of a renamed pool member
#[derive(Debug)]
pub struct CallableReferenceRewriter;

impl ReferenceRewriter for CallableReferenceRewriter {
    fn rewrite(&self, tree: &mut Tree, registry: &Registry, renamed: &Renamed) -> Vec<NodeId> {
        let Some(pool) = renamed.scope else {
            return Vec::new();
        };
        if !tree.type_id(pool).is_some_and(|t| registry.is_pool(t)) {
            return Vec::new();
        }
        if renamed.old.name == renamed.new.name {
            return Vec::new();
        }

        // references can see the pool from anywhere below its parent
        let visible_from = tree.parent(pool).unwrap_or(pool);
        let references: Vec<NodeId> = tree
            .descendants(visible_from)
            .into_iter()
            .filter(|&id| registry.kind_of(tree.type_id(id).unwrap_or_default()) == Some(ComponentKind::CallableReference))
            .collect();

        let mut changed = Vec::new();
        for id in references {
            let Ok(component) = tree.component_mut(id) else {
                continue;
            };
            if component.options.get(OPTION_CALLABLE) == Some(renamed.old.name.as_str()) {
                component
                    .options
                    .set(OPTION_CALLABLE, Some(renamed.new.name.clone()));
                changed.push(id);
            }
        }

        if !changed.is_empty() {
            debug!(
                from = %renamed.old.name,
                to = %renamed.new.name,
                references = changed.len(),
                "Rewrote callable references"
            );
        }
        changed
    }
}

/// Runs every registered rewriter over a mutation's renames
#[derive(Debug)]
pub struct PostEffectEngine {
    rewriters: Vec<Box<dyn ReferenceRewriter>>,
}

impl PostEffectEngine {
    /// Engine with the built-in rewriters
    pub fn new() -> Self {
        Self {
            rewriters: vec![Box::new(CallableReferenceRewriter)],
        }
    }

    /// Engine without any rewriters
    pub fn empty() -> Self {
        Self { rewriters: Vec::new() }
    }

    pub fn with_rewriter(mut self, rewriter: Box<dyn ReferenceRewriter>) -> Self {
        self.rewriters.push(rewriter);
        self
    }

    pub fn len(&self) -> usize {
        self.rewriters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewriters.is_empty()
    }

    /// Applies all rewriters; returns one change event per touched batch
    pub fn apply(&self, tree: &mut Tree, registry: &Registry, renames: &[Renamed]) -> Vec<ChangeEvent> {
        let mut changed = Vec::new();
        for renamed in renames {
            for rewriter in &self.rewriters {
                for id in rewriter.rewrite(tree, registry, renamed) {
                    if !changed.contains(&id) {
                        changed.push(id);
                    }
                }
            }
        }

        if changed.is_empty() {
            Vec::new()
        } else {
            vec![ChangeEvent::modified(changed)]
        }
    }
}

impl Default for PostEffectEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Lookup;
    use flowtree_parser::Component;

    fn setup() -> (Registry, Tree) {
        let registry = Registry::builtin().unwrap();
        let flow = Component::new("Flow", "Flow")
            .with_child(Component::new("CallableActors", "CallableActors").with_child(Component::new("Display", "show")))
            .with_child(Component::new("Start", "start"))
            .with_child(Component::new("CallableSink", "call").with_option("callable", "show"))
            .with_child(Component::new("CallableSink", "other").with_option("callable", "elsewhere"));
        let tree = Tree::from_component(&registry, &flow).unwrap();
        (registry, tree)
    }

    fn rename_event(tree: &Tree, member: NodeId, new_name: &str) -> Renamed {
        let old = tree.component(member).unwrap().clone();
        let mut new = old.clone();
        new.name = new_name.to_string();
        Renamed {
            scope: tree.parent(member),
            old,
            new,
        }
    }

    #[test]
    fn test_engine_has_builtin_rewriter() {
        assert_eq!(PostEffectEngine::new().len(), 1);
        assert!(PostEffectEngine::empty().is_empty());
    }

    #[test]
    fn test_pool_rename_rewrites_matching_references() {
        let (registry, mut tree) = setup();
        let member = tree.locate("Flow.CallableActors.show", Lookup::Direct).unwrap();
        let renamed = rename_event(&tree, member, "display");

        let events = PostEffectEngine::new().apply(&mut tree, &registry, &[renamed]);
        assert_eq!(events.len(), 1);

        let call = tree.locate("Flow.call", Lookup::Direct).unwrap();
        let other = tree.locate("Flow.other", Lookup::Direct).unwrap();
        assert_eq!(tree.component(call).unwrap().options.get("callable"), Some("display"));
        assert_eq!(tree.component(other).unwrap().options.get("callable"), Some("elsewhere"));
    }

    #[test]
    fn test_rename_outside_pool_is_ignored() {
        let (registry, mut tree) = setup();
        let start = tree.locate("Flow.start", Lookup::Direct).unwrap();
        let renamed = rename_event(&tree, start, "show");

        let events = PostEffectEngine::new().apply(&mut tree, &registry, &[renamed]);
        assert!(events.is_empty());
    }
}
