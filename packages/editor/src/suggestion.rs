//! # Suggestion Engine
//!
//! Proposes components for a position in the tree from a list of
//! `IF <condition> THEN <command>` rules.
//!
//! Rules are checked once when loaded: a rule that does not parse, names
//! an unknown class or data type, or fails against a minimal context is
//! dropped with a warning. At suggestion time every remaining rule is
//! evaluated; the commands of all matching rules are unioned, a rule that
//! errors is logged and skipped, and the default list stands in when no
//! rule contributed. The result is then filtered by the parent's
//! restrictions and the roles allowed at the insertion point.

use crate::mutations::InsertPosition;
use crate::registry::{Registry, Role, TypeConstraint};
use crate::tree::{NodeId, Tree, TreeError};
use flowtree_parser::ast::{
    AllowedRole, ClassTest, Command, Condition, PlaceholderField, PlaceholderSubject, Target,
};
use flowtree_parser::{parse_line, parse_rules, serialize_line, Component, ParseError, Rule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, instrument, warn};

const BUILTIN_ACTOR_RULES: &str = include_str!("../assets/actor_rules.txt");
const BUILTIN_EXTERNAL_RULES: &str = include_str!("../assets/external_rules.txt");

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Rule does not parse: {0}")]
    Parse(#[from] ParseError),

    #[error("Unknown class '{0}'")]
    UnknownClass(String),

    #[error("Unknown data type '{0}'")]
    UnknownDataType(String),

    #[error("No {0} component in this context")]
    MissingActor(&'static str),

    #[error("Invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },
}

/// What the suggestions are for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionScope {
    /// Components to insert at a position
    Actor,
    /// Reference that replaces a set of externalized components
    External,
}

/// Component as seen by a rule
#[derive(Debug, Clone, PartialEq)]
pub struct ContextActor {
    pub type_id: String,
    pub name: String,
    pub full_name: String,
    pub skip: bool,
}

impl ContextActor {
    fn from_node(tree: &Tree, id: NodeId) -> Result<Self, TreeError> {
        let component = tree.component(id)?;
        Ok(Self {
            type_id: component.type_id.clone(),
            name: component.name.clone(),
            full_name: tree.full_name(id),
            skip: component.skip,
        })
    }

    fn field(&self, field: PlaceholderField) -> &str {
        match field {
            PlaceholderField::Class => &self.type_id,
            PlaceholderField::Name => &self.name,
            PlaceholderField::Full => &self.full_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFilter {
    pub standalones: bool,
    pub sources: bool,
    pub transformers: bool,
    pub sinks: bool,
}

impl RoleFilter {
    pub fn all() -> Self {
        Self {
            standalones: true,
            sources: true,
            transformers: true,
            sinks: true,
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        match role {
            Role::Standalone => self.standalones,
            Role::Source => self.sources,
            Role::Transformer => self.transformers,
            Role::Sink => self.sinks,
        }
    }
}

/// Everything a rule can look at
#[derive(Debug, Clone)]
pub struct SuggestionContext {
    pub parent: Option<ContextActor>,
    /// Ancestors above the parent, nearest first
    pub ancestors: Vec<ContextActor>,
    pub parent_allows_standalones: bool,
    pub parent_allows_source: bool,
    pub restrictions: Vec<TypeConstraint>,
    /// `None` when the context covers several unrelated positions
    pub position: Option<usize>,
    pub actors: Vec<ContextActor>,
    pub allowed: RoleFilter,
}

impl SuggestionContext {
    /// Context for inserting relative to `target`
    pub fn for_insert(
        tree: &Tree,
        registry: &Registry,
        target: NodeId,
        position: InsertPosition,
    ) -> Result<Self, TreeError> {
        let (parent, index) = match position {
            InsertPosition::Beneath => (target, tree.children(target).len()),
            InsertPosition::Here | InsertPosition::After => {
                let parent = tree
                    .parent(target)
                    .ok_or_else(|| TreeError::NoParent(tree.full_name(target)))?;
                let index = tree.index_of(target).unwrap_or(0);
                match position {
                    InsertPosition::After => (parent, index + 1),
                    _ => (parent, index),
                }
            }
        };

        let actors = tree
            .children(parent)
            .iter()
            .map(|&id| ContextActor::from_node(tree, id))
            .collect::<Result<Vec<_>, _>>()?;

        let role_at = |i: usize| actors.get(i).and_then(|a| registry.role_of(&a.type_id));
        let mut allowed = RoleFilter::all();
        match position {
            InsertPosition::Here => {
                let here = role_at(index);
                allowed.sinks = false;
                allowed.standalones = matches!(here, Some(Role::Standalone | Role::Source));
                allowed.sources = here != Some(Role::Source);
                allowed.transformers = !matches!(here, Some(Role::Standalone | Role::Source));
            }
            InsertPosition::After => {
                let previous = role_at(index - 1);
                allowed.standalones = previous == Some(Role::Standalone);
                allowed.sources = previous == Some(Role::Standalone);
                allowed.sinks = previous != Some(Role::Standalone);
            }
            InsertPosition::Beneath => {}
        }

        Self::around(tree, registry, parent, Some(index), actors, allowed)
    }

    /// Context for replacing a selection of siblings with one reference
    pub fn for_selection(tree: &Tree, registry: &Registry, nodes: &[NodeId]) -> Result<Self, TreeError> {
        let first = *nodes.first().ok_or(TreeError::EmptyTree)?;
        let parent = tree
            .parent(first)
            .ok_or_else(|| TreeError::NoParent(tree.full_name(first)))?;
        let actors = nodes
            .iter()
            .map(|&id| ContextActor::from_node(tree, id))
            .collect::<Result<Vec<_>, _>>()?;
        let position = (nodes.len() == 1).then_some(0);

        Self::around(tree, registry, parent, position, actors, RoleFilter::all())
    }

    fn around(
        tree: &Tree,
        registry: &Registry,
        parent: NodeId,
        position: Option<usize>,
        actors: Vec<ContextActor>,
        allowed: RoleFilter,
    ) -> Result<Self, TreeError> {
        let parent_actor = ContextActor::from_node(tree, parent)?;
        let capability = registry.capability_of(&parent_actor.type_id);
        let mut ancestors = Vec::new();
        let mut current = tree.parent(parent);
        while let Some(id) = current {
            ancestors.push(ContextActor::from_node(tree, id)?);
            current = tree.parent(id);
        }

        Ok(Self {
            parent_allows_standalones: capability.is_some_and(|c| c.can_contain_standalones),
            parent_allows_source: capability.is_some_and(|c| c.can_contain_source),
            restrictions: capability.map(|c| c.restrictions.clone()).unwrap_or_default(),
            parent: Some(parent_actor),
            ancestors,
            position,
            actors,
            allowed,
        })
    }

    /// Minimal context used to check rules when they are loaded: an empty
    /// root container, inserting at the front
    pub fn synthetic(registry: &Registry) -> Self {
        let root = registry.root_type().to_string();
        let capability = registry.capability_of(&root);
        Self {
            parent: Some(ContextActor {
                type_id: root.clone(),
                name: root.clone(),
                full_name: root,
                skip: false,
            }),
            ancestors: Vec::new(),
            parent_allows_standalones: capability.is_some_and(|c| c.can_contain_standalones),
            parent_allows_source: capability.is_some_and(|c| c.can_contain_source),
            restrictions: Vec::new(),
            position: Some(0),
            actors: Vec::new(),
            allowed: RoleFilter::all(),
        }
    }

    pub fn preceding(&self) -> Option<&ContextActor> {
        let index = self.position?.checked_sub(1)?;
        self.actors.get(index)
    }

    pub fn following(&self) -> Option<&ContextActor> {
        self.actors.get(self.position?)
    }

    /// The actor occupying the slot: the selected node for a single-node
    /// selection, otherwise the node the new component pushes down
    pub fn this(&self) -> Option<&ContextActor> {
        self.following()
    }
}

/// Evaluates one rule; remembers the parent matched by the last
/// `PARENT`/`ANYPARENT` test for `${LASTPARENT...}`
struct Evaluator<'a> {
    registry: &'a Registry,
    context: &'a SuggestionContext,
    last_parent: Option<&'a ContextActor>,
}

impl<'a> Evaluator<'a> {
    fn new(registry: &'a Registry, context: &'a SuggestionContext) -> Self {
        Self {
            registry,
            context,
            last_parent: None,
        }
    }

    fn condition(&mut self, condition: &Condition) -> Result<bool, RuleError> {
        let context = self.context;
        match condition {
            Condition::Literal { value } => Ok(*value),
            Condition::Not { inner } => Ok(!self.condition(inner)?),
            Condition::And { left, right } => Ok(self.condition(left)? && self.condition(right)?),
            Condition::Or { left, right } => Ok(self.condition(left)? || self.condition(right)?),
            Condition::IsFirst => Ok(context.position == Some(0)),
            Condition::IsLast => Ok(context.position.is_some_and(|p| p >= context.actors.len())),
            Condition::Parent { test, class } => {
                self.check_class(class)?;
                let matched = context
                    .parent
                    .as_ref()
                    .filter(|parent| self.class_test(parent, *test, class));
                if matched.is_some() {
                    self.last_parent = matched;
                }
                Ok(matched.is_some())
            }
            Condition::ParentAllows { role } => Ok(match role {
                AllowedRole::Standalone => context.parent_allows_standalones,
                AllowedRole::Source => context.parent_allows_source,
            }),
            Condition::AnyParent { test, class } => {
                self.check_class(class)?;
                let matched = context
                    .parent
                    .iter()
                    .chain(context.ancestors.iter())
                    .find(|actor| self.class_test(actor, *test, class));
                if matched.is_some() {
                    self.last_parent = matched;
                }
                Ok(matched.is_some())
            }
            Condition::PrecedingGenerates { data_type } => {
                self.check_data_type(data_type)?;
                Ok(context.preceding().is_some_and(|actor| {
                    self.registry.describe(&actor.type_id).is_some_and(|d| {
                        d.generates
                            .iter()
                            .any(|generated| self.registry.is_data_like(generated, data_type))
                    })
                }))
            }
            Condition::FollowingAccepts { data_type } => {
                self.check_data_type(data_type)?;
                Ok(context.following().is_some_and(|actor| {
                    self.registry.describe(&actor.type_id).is_some_and(|d| {
                        d.accepts
                            .iter()
                            .any(|accepted| self.registry.is_data_like(data_type, accepted))
                    })
                }))
            }
            Condition::Before { target } => self.target(context.following(), target),
            Condition::After { target } => self.target(context.preceding(), target),
            Condition::This { target } => self.target(context.this(), target),
            Condition::First { target } => self.target(context.actors.first(), target),
            Condition::Last { target } => self.target(context.actors.last(), target),
        }
    }

    fn class_test(&self, actor: &ContextActor, test: ClassTest, class: &str) -> bool {
        match test {
            ClassTest::Is => actor.type_id == class,
            ClassTest::Like => self.registry.is_like(&actor.type_id, class),
        }
    }

    fn target(&self, actor: Option<&ContextActor>, target: &Target) -> Result<bool, RuleError> {
        if let Target::Class(class) = target {
            self.check_class(class)?;
        }
        let Some(actor) = actor else {
            return Ok(false);
        };
        let role = self.registry.role_of(&actor.type_id);
        Ok(match target {
            Target::Standalone => role == Some(Role::Standalone),
            Target::Source => role == Some(Role::Source),
            Target::Transformer => role == Some(Role::Transformer),
            Target::Sink => role == Some(Role::Sink),
            Target::Class(class) => self.registry.is_like(&actor.type_id, class),
        })
    }

    fn check_class(&self, class: &str) -> Result<(), RuleError> {
        if self.registry.is_known_class(class) {
            Ok(())
        } else {
            Err(RuleError::UnknownClass(class.to_string()))
        }
    }

    fn check_data_type(&self, data_type: &str) -> Result<(), RuleError> {
        if self.registry.is_known_data_type(data_type) {
            Ok(())
        } else {
            Err(RuleError::UnknownDataType(data_type.to_string()))
        }
    }

    fn command(&self, command: &Command) -> Result<Component, RuleError> {
        match command {
            Command::Type(type_id) => self
                .registry
                .instantiate(type_id)
                .map_err(|_| RuleError::UnknownClass(type_id.clone())),
            Command::Template(template) => {
                let line = expand(template, |subject, field| {
                    let actor = match subject {
                        PlaceholderSubject::Parent => self.context.parent.as_ref(),
                        PlaceholderSubject::LastParent => self.last_parent,
                        PlaceholderSubject::Preceding => self.context.preceding(),
                        PlaceholderSubject::Following => self.context.following(),
                    };
                    actor
                        .map(|a| a.field(field).to_string())
                        .ok_or(RuleError::MissingActor(subject_label(subject)))
                })?;
                instantiate_line(self.registry, &line)
            }
        }
    }
}

fn subject_label(subject: PlaceholderSubject) -> &'static str {
    match subject {
        PlaceholderSubject::Parent => "parent",
        PlaceholderSubject::LastParent => "last matched parent",
        PlaceholderSubject::Preceding => "preceding",
        PlaceholderSubject::Following => "following",
    }
}

/// Replaces `${SUBJECT.FIELD}` placeholders; unrecognised ones stay as written
fn expand<F>(template: &str, mut value: F) -> Result<String, RuleError>
where
    F: FnMut(PlaceholderSubject, PlaceholderField) -> Result<String, RuleError>,
{
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return Ok(result);
        };

        let inner = &after[..end];
        let placeholder = inner.split_once('.').and_then(|(subject, field)| {
            Some((PlaceholderSubject::parse(subject)?, PlaceholderField::parse(field)?))
        });
        match placeholder {
            Some((subject, field)) => result.push_str(&value(subject, field)?),
            None => result.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Builds a component from an option line on top of the type's defaults
fn instantiate_line(registry: &Registry, line: &str) -> Result<Component, RuleError> {
    let parsed = parse_line(line).map_err(|e| RuleError::InvalidCommand {
        command: line.to_string(),
        reason: e.to_string(),
    })?;
    let mut component = registry
        .instantiate(&parsed.type_id)
        .map_err(|_| RuleError::UnknownClass(parsed.type_id.clone()))?;

    if !parsed.name.is_empty() {
        component.name = parsed.name;
    }
    component.skip = parsed.skip;
    if !parsed.annotation.is_empty() {
        component.annotation = parsed.annotation;
    }
    if parsed.logging_level.is_some() {
        component.logging_level = parsed.logging_level;
    }
    for (key, value) in parsed.options.iter() {
        component.options.set(key, value.map(str::to_string));
    }
    Ok(component)
}

/// Static checks that do not need a real context
fn check_references(registry: &Registry, condition: &Condition) -> Result<(), RuleError> {
    let class = |class: &str| {
        if registry.is_known_class(class) {
            Ok(())
        } else {
            Err(RuleError::UnknownClass(class.to_string()))
        }
    };
    let data_type = |name: &str| {
        if registry.is_known_data_type(name) {
            Ok(())
        } else {
            Err(RuleError::UnknownDataType(name.to_string()))
        }
    };

    match condition {
        Condition::Not { inner } => check_references(registry, inner),
        Condition::And { left, right } | Condition::Or { left, right } => {
            check_references(registry, left)?;
            check_references(registry, right)
        }
        Condition::Parent { class: c, .. } | Condition::AnyParent { class: c, .. } => class(c),
        Condition::PrecedingGenerates { data_type: d } | Condition::FollowingAccepts { data_type: d } => {
            data_type(d)
        }
        Condition::Before { target }
        | Condition::After { target }
        | Condition::This { target }
        | Condition::First { target }
        | Condition::Last { target } => match target {
            Target::Class(c) => class(c),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

fn check_command(registry: &Registry, command: &Command) -> Result<(), RuleError> {
    match command {
        Command::Type(type_id) => registry
            .require(type_id)
            .map(|_| ())
            .map_err(|_| RuleError::UnknownClass(type_id.clone())),
        Command::Template(template) => {
            let sample = expand(template, |_, _| Ok("placeholder".to_string()))?;
            let parsed = parse_line(&sample).map_err(|e| RuleError::InvalidCommand {
                command: template.clone(),
                reason: e.to_string(),
            })?;
            let type_is_placeholder = template.trim_start().starts_with("${");
            if !type_is_placeholder && registry.describe(&parsed.type_id).is_none() {
                return Err(RuleError::UnknownClass(parsed.type_id));
            }
            Ok(())
        }
    }
}

/// Checks a parsed rule against the registry and a minimal context
pub fn validate_rule(registry: &Registry, rule: &Rule) -> Result<(), RuleError> {
    check_references(registry, &rule.condition)?;
    check_command(registry, &rule.command)?;
    let context = SuggestionContext::synthetic(registry);
    Evaluator::new(registry, &context).condition(&rule.condition)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LoadedRule {
    pub text: String,
    pub rule: Rule,
}

#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    scope: SuggestionScope,
    rules: Vec<LoadedRule>,
    rejected: Vec<(String, RuleError)>,
    defaults: Vec<String>,
}

impl SuggestionEngine {
    /// Loads rules from rule-file text (one rule per line, `#` comments)
    #[instrument(skip(registry, source, defaults))]
    pub fn load(scope: SuggestionScope, registry: &Registry, source: &str, defaults: Vec<String>) -> Self {
        let mut rules = Vec::new();
        let mut rejected = Vec::new();

        for (text, parsed) in parse_rules(source) {
            let checked = parsed
                .map_err(RuleError::from)
                .and_then(|rule| validate_rule(registry, &rule).map(|_| rule));
            match checked {
                Ok(rule) => rules.push(LoadedRule { text, rule }),
                Err(error) => {
                    warn!(?scope, rule = %text, %error, "Dropping suggestion rule");
                    rejected.push((text, error));
                }
            }
        }

        let defaults = defaults
            .into_iter()
            .filter(|type_id| {
                let known = registry.describe(type_id).is_some();
                if !known {
                    warn!(?scope, type_id = %type_id, "Dropping unknown default suggestion");
                }
                known
            })
            .collect();

        debug!(?scope, rules = rules.len(), dropped = rejected.len(), "Suggestion rules loaded");
        Self {
            scope,
            rules,
            rejected,
            defaults,
        }
    }

    /// Loads a list of individual rule strings
    pub fn from_rules<I, S>(scope: SuggestionScope, registry: &Registry, rules: I, defaults: Vec<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let source = rules
            .into_iter()
            .map(|rule| rule.as_ref().replace('\n', " "))
            .collect::<Vec<_>>()
            .join("\n");
        Self::load(scope, registry, &source, defaults)
    }

    /// Engine with the rules shipped for `scope`
    pub fn builtin(scope: SuggestionScope, registry: &Registry) -> Self {
        match scope {
            SuggestionScope::Actor => Self::load(scope, registry, BUILTIN_ACTOR_RULES, vec!["PassThrough".to_string()]),
            SuggestionScope::External => Self::load(scope, registry, BUILTIN_EXTERNAL_RULES, Vec::new()),
        }
    }

    /// Replaces the types offered when no rule matches
    pub fn with_defaults(mut self, defaults: Vec<String>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn scope(&self) -> SuggestionScope {
        self.scope
    }

    pub fn rules(&self) -> &[LoadedRule] {
        &self.rules
    }

    /// Rules dropped at load time, with the reason
    pub fn rejected(&self) -> &[(String, RuleError)] {
        &self.rejected
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Ordered, de-duplicated suggestions for a context
    #[instrument(skip_all, fields(scope = ?self.scope, position = ?context.position))]
    pub fn suggest(&self, registry: &Registry, context: &SuggestionContext) -> Vec<Component> {
        let mut candidates = Vec::new();

        for loaded in &self.rules {
            let mut evaluator = Evaluator::new(registry, context);
            let outcome = evaluator
                .condition(&loaded.rule.condition)
                .and_then(|matched| match matched {
                    true => evaluator.command(&loaded.rule.command).map(Some),
                    false => Ok(None),
                });
            match outcome {
                Ok(Some(component)) => candidates.push(component),
                Ok(None) => {}
                Err(error) => warn!(rule = %loaded.text, %error, "Suggestion rule failed"),
            }
        }

        if candidates.is_empty() {
            candidates = self
                .defaults
                .iter()
                .filter_map(|type_id| registry.instantiate(type_id).ok())
                .collect();
        }

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| registry.satisfies(&c.type_id, &context.restrictions))
            .filter(|c| registry.role_of(&c.type_id).is_some_and(|r| context.allowed.allows(r)))
            .filter(|c| seen.insert(serialize_line(c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    fn actor(type_id: &str, name: &str) -> ContextActor {
        ContextActor {
            type_id: type_id.to_string(),
            name: name.to_string(),
            full_name: format!("Flow.{}", name),
            skip: false,
        }
    }

    fn context(actors: Vec<ContextActor>, position: Option<usize>) -> SuggestionContext {
        let registry = registry();
        SuggestionContext {
            actors,
            position,
            ..SuggestionContext::synthetic(&registry)
        }
    }

    #[test]
    fn test_expand_placeholders() {
        let out = expand("A -name ${PARENT.NAME}-x -keep ${OTHER.NAME}", |subject, field| {
            assert_eq!(subject, PlaceholderSubject::Parent);
            assert_eq!(field, PlaceholderField::Name);
            Ok("p".to_string())
        })
        .unwrap();
        assert_eq!(out, "A -name p-x -keep ${OTHER.NAME}");
    }

    #[test]
    fn test_validate_drops_unknown_class() {
        let registry = registry();
        let rule = flowtree_parser::parse("IF PARENT IS Nonexistent THEN Display").unwrap();
        assert_eq!(
            validate_rule(&registry, &rule),
            Err(RuleError::UnknownClass("Nonexistent".to_string()))
        );
        let rule = flowtree_parser::parse("IF PRECEDING GENERATES Blob THEN Display").unwrap();
        assert!(matches!(validate_rule(&registry, &rule), Err(RuleError::UnknownDataType(_))));
    }

    #[test]
    fn test_load_keeps_good_rules() {
        let registry = registry();
        let engine = SuggestionEngine::load(
            SuggestionScope::Actor,
            &registry,
            "IF TRUE THEN Display\nIF BROKEN\nIF TRUE THEN NoSuchType\n",
            Vec::new(),
        );
        assert_eq!(engine.rules().len(), 1);
        assert_eq!(engine.rejected().len(), 2);
    }

    #[test]
    fn test_is_first_and_is_last() {
        let registry = registry();
        let ctx = context(vec![actor("Start", "s")], Some(1));
        let mut eval = Evaluator::new(&registry, &ctx);
        assert!(!eval.condition(&Condition::IsFirst).unwrap());
        assert!(eval.condition(&Condition::IsLast).unwrap());

        let ctx = context(vec![actor("Start", "s")], None);
        let mut eval = Evaluator::new(&registry, &ctx);
        assert!(!eval.condition(&Condition::IsLast).unwrap());
    }

    #[test]
    fn test_preceding_generates_uses_data_hierarchy() {
        let registry = registry();
        let ctx = context(vec![actor("StringConstants", "s"), actor("Display", "d")], Some(1));
        let rule = flowtree_parser::parse("IF PRECEDING GENERATES Object AND FOLLOWING ACCEPTS String THEN X").unwrap();
        assert!(Evaluator::new(&registry, &ctx).condition(&rule.condition).unwrap());
    }

    #[test]
    fn test_last_parent_placeholder() {
        let registry = registry();
        let mut ctx = context(Vec::new(), Some(0));
        ctx.parent = Some(actor("Sequence", "inner"));
        ctx.ancestors = vec![actor("Tee", "outer"), actor("Flow", "Flow")];

        let rule = flowtree_parser::parse(r#"IF ANYPARENT LIKE Tee THEN "Display -name ${LASTPARENT.NAME}""#).unwrap();
        let mut eval = Evaluator::new(&registry, &ctx);
        assert!(eval.condition(&rule.condition).unwrap());
        assert_eq!(eval.command(&rule.command).unwrap().name, "outer");
    }

    #[test]
    fn test_missing_placeholder_actor_is_error() {
        let registry = registry();
        let ctx = context(Vec::new(), Some(0));
        let eval = Evaluator::new(&registry, &ctx);
        let err = eval
            .command(&Command::Template("Display -name ${PRECEDING.NAME}".to_string()))
            .unwrap_err();
        assert_eq!(err, RuleError::MissingActor("preceding"));
    }

    #[test]
    fn test_runtime_errors_are_skipped() {
        let registry = registry();
        let engine = SuggestionEngine::from_rules(
            SuggestionScope::Actor,
            &registry,
            [r#"IF TRUE THEN "Display -name ${PRECEDING.NAME}""#, "IF TRUE THEN Null"],
            Vec::new(),
        );
        assert_eq!(engine.rules().len(), 2);
        let ctx = context(Vec::new(), Some(0));
        let types: Vec<_> = engine
            .suggest(&registry, &ctx)
            .into_iter()
            .map(|c| c.type_id)
            .collect();
        assert_eq!(types, vec!["Null"]);
    }

    #[test]
    fn test_defaults_and_dedupe() {
        let registry = registry();
        let engine = SuggestionEngine::from_rules(
            SuggestionScope::Actor,
            &registry,
            ["IF FALSE THEN Null"],
            vec!["PassThrough".to_string(), "PassThrough".to_string(), "Bogus".to_string()],
        );
        assert_eq!(engine.defaults().len(), 2);
        let ctx = context(Vec::new(), Some(0));
        let suggestions = engine.suggest(&registry, &ctx);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].type_id, "PassThrough");
    }

    #[test]
    fn test_builtin_rules_all_load() {
        let registry = registry();
        for scope in [SuggestionScope::Actor, SuggestionScope::External] {
            let engine = SuggestionEngine::builtin(scope, &registry);
            assert!(engine.rejected().is_empty(), "{:?}", engine.rejected());
            assert!(!engine.rules().is_empty());
        }
    }
}
