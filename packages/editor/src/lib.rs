//! # Flowtree Editor
//!
//! Editing engine for pipeline flows.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: nested text ⇄ components, rules     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor                                      │
//! │  - Registry: component types + capabilities │
//! │  - Tree: arena of stripped components       │
//! │  - Suggestions: rule-based candidates       │
//! │  - Mutations: validated structural edits    │
//! │  - Session: undo, post effects, follow-ups  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Registry is injected**: nothing looks up types through globals
//! 2. **Reject before mutating**: a failed edit leaves the tree untouched
//! 3. **Full names are the stable handle**: snapshots store names, not ids
//! 4. **Effects are queued**: the host drains follow-ups in order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flowtree_editor::{Document, EditSession, EditorSettings, Mutation, Registry};
//!
//! let registry = Arc::new(Registry::builtin()?);
//! let doc = Document::load(registry, NestedText::new(), &fs, Path::new("main.flow"))?;
//! let mut session = EditSession::new(doc, fs, EditorSettings::default());
//!
//! session.apply(&Mutation::Rename { target, name: "reader".into(), propagate: true })?;
//! session.run_follow_ups();
//! session.undo()?;
//! session.save()?;
//! ```

mod document;
mod errors;
mod events;
mod mutations;
mod post_effects;
mod registry;
mod session;
mod settings;
mod snapshot;
mod suggestion;
mod tree;
mod undo_stack;

pub use document::Document;
pub use errors::EditorError;
pub use events::{ChangeEvent, ChangeKind, ChangeListener, FollowUp};
pub use mutations::{
    EditEnv, InsertPosition, Mutation, MutationError, MutationResult, Renamed, Variant, OPTION_CALLABLE,
    OPTION_CONDITION, OPTION_FILE,
};
pub use post_effects::{CallableReferenceRewriter, PostEffectEngine, ReferenceRewriter};
pub use registry::{
    Catalogue, CatalogueError, ComponentDescriptor, ComponentKind, ContainerCapability, Equivalents,
    ExecutionMode, OptionKind, OptionSpec, Registry, Role, TypeConstraint,
};
pub use session::{EditSession, MutationState};
pub use settings::EditorSettings;
pub use snapshot::{Restored, SnapshotError, SnapshotPayload, StateSnapshot};
pub use suggestion::{
    validate_rule, ContextActor, LoadedRule, RoleFilter, RuleError, SuggestionContext, SuggestionEngine,
    SuggestionScope,
};
pub use tree::{
    unique_name, validate_instance, FullInstance, Lookup, Node, NodeId, ReconstructionError, SearchPattern, Tree,
    TreeError,
};
pub use undo_stack::{UndoPoint, UndoStack};
