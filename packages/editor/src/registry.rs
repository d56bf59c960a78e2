//! # Component Registry
//!
//! Read-only catalogue of every component type the editor knows about.
//!
//! A type is described once, in JSON, and the registry answers the
//! questions the tree and the mutations keep asking:
//!
//! - which role a type plays in a pipeline (derived from its data types)
//! - whether it is a container, and what the container allows
//! - how to build a default instance of it
//! - which type to use when a subtree is moved into a shared pool,
//!   referenced from a file, or wrapped in an enclosing container
//!
//! The registry is built once at startup and shared behind an `Arc`.

use flowtree_common::{CommonError, FileSystem};
use flowtree_parser::Component;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

const BUILTIN_CATALOGUE: &str = include_str!("../assets/catalogue.json");

/// Position a component can take in a pipeline, derived from what it
/// accepts and generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Accepts nothing, generates nothing
    Standalone,
    /// Generates data without input
    Source,
    /// Consumes and produces data
    Transformer,
    /// Consumes data only
    Sink,
}

impl Role {
    pub fn classify(accepts: &[String], generates: &[String]) -> Role {
        match (accepts.is_empty(), generates.is_empty()) {
            (true, true) => Role::Standalone,
            (true, false) => Role::Source,
            (false, false) => Role::Transformer,
            (false, true) => Role::Sink,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standalone => "standalone",
            Role::Source => "source",
            Role::Transformer => "transformer",
            Role::Sink => "sink",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
    /// The container decides at run time
    Undefined,
}

/// Allowed child type of a container: either a whole role or a type (and
/// everything that is like it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeConstraint {
    Role(Role),
    Type(String),
}

impl TryFrom<String> for TypeConstraint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.strip_prefix("role:") {
            Some("standalone") => Ok(TypeConstraint::Role(Role::Standalone)),
            Some("source") => Ok(TypeConstraint::Role(Role::Source)),
            Some("transformer") => Ok(TypeConstraint::Role(Role::Transformer)),
            Some("sink") => Ok(TypeConstraint::Role(Role::Sink)),
            Some(other) => Err(format!("unknown role '{}'", other)),
            None if value.is_empty() => Err("empty type constraint".to_string()),
            None => Ok(TypeConstraint::Type(value)),
        }
    }
}

impl From<TypeConstraint> for String {
    fn from(constraint: TypeConstraint) -> Self {
        constraint.to_string()
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeConstraint::Role(role) => write!(f, "role:{}", role),
            TypeConstraint::Type(id) => f.write_str(id),
        }
    }
}

fn default_true() -> bool {
    true
}

/// What a container type allows below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerCapability {
    #[serde(default)]
    pub can_contain_standalones: bool,
    #[serde(default)]
    pub can_contain_source: bool,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub forwards_input: bool,
    /// Dynamic containers take any number of children; fixed ones keep the
    /// arity of their default children.
    #[serde(default = "default_true")]
    pub mutable: bool,
    /// Empty means unrestricted
    #[serde(default)]
    pub restrictions: Vec<TypeConstraint>,
    /// Names forced onto children by index
    #[serde(default)]
    pub fixed_names: Vec<String>,
    #[serde(default)]
    pub default_children: Vec<String>,
}

impl ContainerCapability {
    pub fn fixed_arity(&self) -> Option<usize> {
        if self.mutable {
            None
        } else {
            Some(self.default_children.len().max(self.fixed_names.len()))
        }
    }

    pub fn has_fixed_names(&self) -> bool {
        !self.fixed_names.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentKind {
    #[default]
    Plain,
    /// Container holding shared definitions that references point at
    CallablePool,
    /// Stand-in for a pool member, named by its `callable` option
    CallableReference,
    /// Stand-in for a subtree stored in another file, named by its `file` option
    ExternalReference,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[default]
    Text,
    Flag,
    Number,
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    #[serde(default)]
    pub kind: OptionKind,
    #[serde(default)]
    pub default: Option<String>,
}

/// Variant types a component can be converted into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equivalents {
    #[serde(default)]
    pub conditional: Option<String>,
    #[serde(default)]
    pub timed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub id: String,
    #[serde(default)]
    pub default_name: Option<String>,
    #[serde(default)]
    pub accepts: Vec<String>,
    #[serde(default)]
    pub generates: Vec<String>,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub container: Option<ContainerCapability>,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
    #[serde(default)]
    pub kind: ComponentKind,
    #[serde(default)]
    pub equivalents: Equivalents,
}

impl ComponentDescriptor {
    pub fn role(&self) -> Role {
        Role::classify(&self.accepts, &self.generates)
    }

    pub fn default_name(&self) -> &str {
        self.default_name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_container(&self) -> bool {
        self.container.is_some()
    }

    pub fn option(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }
}

/// On-disk form of the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalogue {
    pub root_type: String,
    /// Data type → its direct parents
    #[serde(default)]
    pub data_types: BTreeMap<String, Vec<String>>,
    pub types: Vec<ComponentDescriptor>,
    #[serde(default)]
    pub callable_pool: Option<String>,
    #[serde(default)]
    pub callable_references: BTreeMap<Role, String>,
    #[serde(default)]
    pub external_references: BTreeMap<Role, String>,
    /// Container used to wrap a run of components, keyed by the role the
    /// wrapped run ends up playing
    #[serde(default)]
    pub enclosures: BTreeMap<Role, String>,
}

#[derive(Error, Debug)]
pub enum CatalogueError {
    #[error("Invalid catalogue: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not read catalogue: {0}")]
    Common(#[from] CommonError),

    #[error("Type '{0}' is declared twice")]
    DuplicateType(String),

    #[error("{context} refers to unknown type '{type_id}'")]
    UnknownReference { context: String, type_id: String },

    #[error("Unknown component type: {0}")]
    UnknownType(String),

    #[error("Default children form a cycle: {0}")]
    DefaultChildCycle(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub struct Registry {
    root_type: String,
    types: HashMap<String, ComponentDescriptor>,
    order: Vec<String>,
    classes: HashSet<String>,
    data_types: HashMap<String, Vec<String>>,
    callable_pool: Option<String>,
    callable_references: BTreeMap<Role, String>,
    external_references: BTreeMap<Role, String>,
    enclosures: BTreeMap<Role, String>,
}

impl Registry {
    /// Registry built from the catalogue shipped with the crate
    pub fn builtin() -> Result<Self, CatalogueError> {
        Self::from_json(BUILTIN_CATALOGUE)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogueError> {
        let catalogue: Catalogue = serde_json::from_str(json)?;
        Self::from_catalogue(catalogue)
    }

    #[instrument(skip(fs), fields(path = %path.display()))]
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self, CatalogueError> {
        let json = fs.read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_catalogue(catalogue: Catalogue) -> Result<Self, CatalogueError> {
        let mut types = HashMap::new();
        let mut order = Vec::new();
        let mut classes = HashSet::new();

        for descriptor in catalogue.types {
            if types.contains_key(&descriptor.id) {
                return Err(CatalogueError::DuplicateType(descriptor.id));
            }
            classes.insert(descriptor.id.clone());
            classes.extend(descriptor.supertypes.iter().cloned());
            order.push(descriptor.id.clone());
            types.insert(descriptor.id.clone(), descriptor);
        }

        let mut data_types: HashMap<String, Vec<String>> = HashMap::new();
        for (name, parents) in catalogue.data_types {
            for parent in &parents {
                data_types.entry(parent.clone()).or_default();
            }
            data_types.entry(name).or_default().extend(parents);
        }

        let registry = Self {
            root_type: catalogue.root_type,
            types,
            order,
            classes,
            data_types,
            callable_pool: catalogue.callable_pool,
            callable_references: catalogue.callable_references,
            external_references: catalogue.external_references,
            enclosures: catalogue.enclosures,
        };
        registry.check_references()?;

        debug!(types = registry.order.len(), "Component registry loaded");
        Ok(registry)
    }

    fn check_references(&self) -> Result<(), CatalogueError> {
        let require = |context: String, type_id: &str| {
            if self.types.contains_key(type_id) {
                Ok(())
            } else {
                Err(CatalogueError::UnknownReference {
                    context,
                    type_id: type_id.to_string(),
                })
            }
        };

        require("rootType".to_string(), &self.root_type)?;
        if let Some(pool) = &self.callable_pool {
            require("callablePool".to_string(), pool)?;
        }
        for (label, map) in [
            ("callableReferences", &self.callable_references),
            ("externalReferences", &self.external_references),
            ("enclosures", &self.enclosures),
        ] {
            for (role, type_id) in map {
                require(format!("{}.{}", label, role), type_id)?;
            }
        }

        for id in &self.order {
            let descriptor = &self.types[id];
            for equivalent in [&descriptor.equivalents.conditional, &descriptor.equivalents.timed]
                .into_iter()
                .flatten()
            {
                require(format!("{} equivalents", id), equivalent)?;
            }
            if let Some(container) = &descriptor.container {
                for child in &container.default_children {
                    require(format!("{} default children", id), child)?;
                }
            }
        }

        let mut visits = HashMap::new();
        for id in &self.order {
            self.check_default_children(id, &mut visits, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Depth-first walk over default children; `instantiate` follows the
    /// same edges, so any cycle here would never terminate there
    fn check_default_children<'a>(
        &'a self,
        id: &'a str,
        visits: &mut HashMap<&'a str, Visit>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), CatalogueError> {
        match visits.get(id) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let start = path.iter().position(|&p| p == id).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(id);
                return Err(CatalogueError::DefaultChildCycle(cycle.join(" -> ")));
            }
            None => {}
        }

        visits.insert(id, Visit::InProgress);
        path.push(id);
        if let Some(container) = self.types.get(id).and_then(|d| d.container.as_ref()) {
            for child in &container.default_children {
                self.check_default_children(child, visits, path)?;
            }
        }
        path.pop();
        visits.insert(id, Visit::Done);
        Ok(())
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    pub fn describe(&self, type_id: &str) -> Option<&ComponentDescriptor> {
        self.types.get(type_id)
    }

    pub fn require(&self, type_id: &str) -> Result<&ComponentDescriptor, CatalogueError> {
        self.describe(type_id)
            .ok_or_else(|| CatalogueError::UnknownType(type_id.to_string()))
    }

    /// All descriptors in declaration order
    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.order.iter().filter_map(|id| self.types.get(id))
    }

    pub fn role_of(&self, type_id: &str) -> Option<Role> {
        self.describe(type_id).map(ComponentDescriptor::role)
    }

    pub fn capability_of(&self, type_id: &str) -> Option<&ContainerCapability> {
        self.describe(type_id).and_then(|d| d.container.as_ref())
    }

    pub fn kind_of(&self, type_id: &str) -> Option<ComponentKind> {
        self.describe(type_id).map(|d| d.kind)
    }

    pub fn is_container(&self, type_id: &str) -> bool {
        self.capability_of(type_id).is_some()
    }

    pub fn is_pool(&self, type_id: &str) -> bool {
        self.kind_of(type_id) == Some(ComponentKind::CallablePool)
    }

    /// A class is any registered type or any declared supertype
    pub fn is_known_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    /// True when `type_id` is `class` or inherits from it
    pub fn is_like(&self, type_id: &str, class: &str) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![type_id];
        while let Some(current) = pending.pop() {
            if current == class {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(descriptor) = self.types.get(current) {
                pending.extend(descriptor.supertypes.iter().map(String::as_str));
            }
        }
        false
    }

    pub fn is_known_data_type(&self, name: &str) -> bool {
        self.data_types.contains_key(name)
    }

    /// True when data of type `actual` can be used where `wanted` is expected
    pub fn is_data_like(&self, actual: &str, wanted: &str) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![actual];
        while let Some(current) = pending.pop() {
            if current == wanted {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(parents) = self.data_types.get(current) {
                pending.extend(parents.iter().map(String::as_str));
            }
        }
        false
    }

    /// Empty restrictions allow everything; otherwise one constraint must match
    pub fn satisfies(&self, type_id: &str, restrictions: &[TypeConstraint]) -> bool {
        restrictions.is_empty()
            || restrictions.iter().any(|constraint| match constraint {
                TypeConstraint::Role(role) => self.role_of(type_id) == Some(*role),
                TypeConstraint::Type(class) => self.is_like(type_id, class),
            })
    }

    /// Default instance of a type, including its default children
    pub fn instantiate(&self, type_id: &str) -> Result<Component, CatalogueError> {
        let descriptor = self.require(type_id)?;
        let mut component = Component::new(&descriptor.id, descriptor.default_name());
        for option in &descriptor.options {
            if let Some(default) = &option.default {
                component.options.set(&option.name, Some(default.clone()));
            }
        }

        if let Some(container) = &descriptor.container {
            for (index, child_type) in container.default_children.iter().enumerate() {
                let mut child = self.instantiate(child_type)?;
                if let Some(name) = container.fixed_names.get(index) {
                    child.name = name.clone();
                }
                component.children.push(child);
            }
        }
        Ok(component)
    }

    pub fn callable_pool_type(&self) -> Option<&str> {
        self.callable_pool.as_deref()
    }

    pub fn callable_reference_for(&self, role: Role) -> Option<&str> {
        self.callable_references.get(&role).map(String::as_str)
    }

    pub fn external_reference_for(&self, role: Role) -> Option<&str> {
        self.external_references.get(&role).map(String::as_str)
    }

    /// Container able to wrap a run of components that starts with a
    /// `first` and ends with a `last` role
    pub fn enclosure_for(&self, first: Role, last: Role) -> Option<&str> {
        use Role::*;
        let role = match (first, last) {
            (Standalone, Standalone) => Standalone,
            (Transformer, Transformer) => Transformer,
            (Source, Source) | (Source, Transformer) => Source,
            (Transformer, Sink) | (Sink, Sink) => Sink,
            _ => return None,
        };
        self.enclosures.get(&role).map(String::as_str)
    }
}
