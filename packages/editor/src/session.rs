//! # Edit Session Management
//!
//! An EditSession is one editor's view of a document: undo history, the
//! suggestion engines, change listeners and the queue of follow-up work.
//!
//! Mutations pass through `Validating → Applying → Committed`, or end in
//! `Rejected`. A mutation rejected while applying is rolled back from the
//! snapshot taken before it started, so the tree never keeps a partial
//! edit.
//!
//! Follow-ups are queued in the order mutations produce them and are only
//! acted on when the host calls `run_follow_ups`.

use crate::document::Document;
use crate::errors::EditorError;
use crate::events::{ChangeEvent, ChangeListener, FollowUp};
use crate::mutations::{EditEnv, InsertPosition, Mutation, MutationResult};
use crate::post_effects::PostEffectEngine;
use crate::registry::Registry;
use crate::settings::EditorSettings;
use crate::snapshot::StateSnapshot;
use crate::suggestion::{SuggestionContext, SuggestionEngine, SuggestionScope};
use crate::tree::NodeId;
use crate::undo_stack::{UndoPoint, UndoStack};
use flowtree_common::FileSystem;
use flowtree_parser::{Component, NestedText};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Validating,
    Applying,
    Committed,
    Rejected,
}

pub struct EditSession {
    document: Document,
    registry: Arc<Registry>,
    fs: Arc<dyn FileSystem>,
    settings: EditorSettings,
    undo: UndoStack,
    effects: PostEffectEngine,
    actor_suggestions: SuggestionEngine,
    external_suggestions: SuggestionEngine,
    listeners: Vec<Box<dyn ChangeListener>>,
    follow_ups: VecDeque<FollowUp>,
    state: MutationState,
}

impl EditSession {
    /// Session with the built-in suggestion rules
    pub fn new(document: Document, fs: Arc<dyn FileSystem>, settings: EditorSettings) -> Self {
        let registry = document.shared_registry();
        let actor_suggestions = SuggestionEngine::builtin(SuggestionScope::Actor, &registry);
        let external_suggestions = SuggestionEngine::builtin(SuggestionScope::External, &registry);
        Self {
            document,
            registry,
            fs,
            undo: UndoStack::with_max_levels(settings.max_undo),
            settings,
            effects: PostEffectEngine::new(),
            actor_suggestions,
            external_suggestions,
            listeners: Vec::new(),
            follow_ups: VecDeque::new(),
            state: MutationState::Idle,
        }
    }

    pub fn with_suggestions(mut self, actor: SuggestionEngine, external: SuggestionEngine) -> Self {
        self.actor_suggestions = actor;
        self.external_suggestions = external;
        self
    }

    pub fn with_post_effects(mut self, effects: PostEffectEngine) -> Self {
        self.effects = effects;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    fn codec(&self) -> NestedText {
        self.document.codec()
    }

    /// Snapshot of the current document and view
    pub fn capture(&self) -> Result<StateSnapshot, EditorError> {
        Ok(StateSnapshot::capture(
            self.document.tree(),
            &self.registry,
            &self.codec(),
            self.settings.store_nested_state,
        )?)
    }

    /// Replaces the document with a snapshot; returns the view entries that
    /// no longer resolve
    pub fn restore(&mut self, snapshot: &StateSnapshot) -> Result<Vec<String>, EditorError> {
        let restored = snapshot.restore(&self.registry, &self.codec())?;
        self.document.replace_tree(restored.tree);
        self.queue_reload();
        Ok(restored.unresolved)
    }

    /// Validates, applies and records a mutation
    #[instrument(skip_all)]
    pub fn apply(&mut self, mutation: &Mutation) -> Result<MutationResult, EditorError> {
        let codec = self.codec();
        self.state = MutationState::Validating;
        let env = EditEnv::new(&self.registry, self.fs.as_ref()).with_codec(codec);
        if let Err(error) = mutation.validate(self.document.tree(), &env) {
            debug!(%error, "Mutation rejected");
            self.state = MutationState::Rejected;
            return Err(error.into());
        }

        let before = match self.capture() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.state = MutationState::Rejected;
                return Err(error);
            }
        };

        self.state = MutationState::Applying;
        let env = EditEnv::new(&self.registry, self.fs.as_ref()).with_codec(codec);
        let mut result = match mutation.apply_validated(self.document.tree_mut(), &env) {
            Ok(result) => result,
            Err(error) => {
                debug!(%error, "Mutation failed while applying, rolling back");
                let restored = before.restore(&self.registry, &codec)?;
                self.document.replace_tree(restored.tree);
                self.state = MutationState::Rejected;
                return Err(error.into());
            }
        };

        self.undo.push(UndoPoint::new(before, result.comment.clone()));

        if !self.settings.ignore_name_changes && !result.renamed.is_empty() {
            let events = self
                .effects
                .apply(self.document.tree_mut(), &self.registry, &result.renamed);
            for event in events {
                result.follow_ups.push(FollowUp::Notify(event.clone()));
                result.changes.push(event);
            }
        }

        self.document.version += 1;
        self.follow_ups.extend(result.follow_ups.iter().cloned());
        self.state = MutationState::Committed;
        Ok(result)
    }

    /// Groups the following mutations into one undo step
    pub fn begin_batch(&mut self, comment: impl Into<String>) {
        self.undo.begin_batch(comment);
    }

    pub fn end_batch(&mut self) {
        self.undo.end_batch();
    }

    /// Returns false when there is nothing to undo
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let Some(point) = self.undo.peek_undo() else {
            return Ok(false);
        };
        let restored = point.snapshot.restore(&self.registry, &self.codec())?;
        let current = self.capture()?;
        self.undo.undo(current);
        self.document.replace_tree(restored.tree);
        self.queue_reload();
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let Some(point) = self.undo.peek_redo() else {
            return Ok(false);
        };
        let restored = point.snapshot.restore(&self.registry, &self.codec())?;
        let current = self.capture()?;
        self.undo.redo(current);
        self.document.replace_tree(restored.tree);
        self.queue_reload();
        Ok(true)
    }

    fn queue_reload(&mut self) {
        let tree = self.document.tree();
        if let Some(root) = tree.root() {
            self.follow_ups
                .push_back(FollowUp::Notify(ChangeEvent::structure(root)));
        }
        self.follow_ups
            .push_back(FollowUp::Select(tree.selected().to_vec()));
    }

    /// Copies the nodes to a clipboard payload and removes them
    pub fn cut(&mut self, ids: &[NodeId]) -> Result<Vec<String>, EditorError> {
        let lines = self.document.copy(ids)?;
        self.apply(&Mutation::Remove {
            targets: ids.to_vec(),
        })?;
        Ok(lines)
    }

    pub fn paste(
        &mut self,
        target: NodeId,
        position: InsertPosition,
        lines: Vec<String>,
    ) -> Result<MutationResult, EditorError> {
        self.apply(&Mutation::Paste {
            target,
            position,
            lines,
        })
    }

    /// Candidates for inserting relative to `target`
    pub fn suggest_insert(&self, target: NodeId, position: InsertPosition) -> Result<Vec<Component>, EditorError> {
        let context = SuggestionContext::for_insert(self.document.tree(), &self.registry, target, position)?;
        Ok(self.actor_suggestions.suggest(&self.registry, &context))
    }

    /// Candidates for moving the selected nodes out into their own file
    pub fn suggest_external(&self, nodes: &[NodeId]) -> Result<Vec<Component>, EditorError> {
        let context = SuggestionContext::for_selection(self.document.tree(), &self.registry, nodes)?;
        Ok(self.external_suggestions.suggest(&self.registry, &context))
    }

    pub fn pending_follow_ups(&self) -> usize {
        self.follow_ups.len()
    }

    /// Drains the follow-up queue in order. Selection and expansion are
    /// applied to the tree, notifications go to every listener.
    pub fn run_follow_ups(&mut self) -> Vec<FollowUp> {
        let mut drained = Vec::with_capacity(self.follow_ups.len());
        while let Some(follow_up) = self.follow_ups.pop_front() {
            match &follow_up {
                FollowUp::Select(ids) => self.document.tree_mut().select(ids.clone()),
                FollowUp::Expand(id) => self.document.tree_mut().set_expanded(*id, true),
                FollowUp::Notify(event) => {
                    let tree = self.document.tree();
                    for listener in &mut self.listeners {
                        listener.on_change(event, tree);
                    }
                }
            }
            drained.push(follow_up);
        }
        drained
    }

    pub fn save(&mut self) -> Result<(), EditorError> {
        self.document.save(self.fs.as_ref())
    }
}
