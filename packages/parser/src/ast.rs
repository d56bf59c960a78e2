use serde::{Deserialize, Serialize};

/// Span information for source location tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Opaque option payload of a component, in declaration order.
///
/// A `None` value marks a flag (`-key` with no argument).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options(Vec<(String, Option<String>)>);

impl Options {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Sets a key, keeping its position if it already exists.
    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Option<String>> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Option<String>)> {
        self.0.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Options {
    fn from_iter<T: IntoIterator<Item = (K, Option<String>)>>(iter: T) -> Self {
        let mut options = Options::new();
        for (k, v) in iter {
            options.set(k, v);
        }
        options
    }
}

/// A typed, named unit of pipeline work.
///
/// `children` is only populated for full (deep) instances. Stripped
/// instances, as held by tree nodes, always have an empty child list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub type_id: String,
    pub name: String,
    pub skip: bool,
    pub annotation: String,
    pub logging_level: Option<String>,
    pub options: Options,
    pub children: Vec<Component>,
}

impl Component {
    pub fn new(type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            skip: false,
            annotation: String::new(),
            logging_level: None,
            options: Options::new(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Component) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.set(key, Some(value.into()));
        self
    }

    /// Copy of this component without its children.
    pub fn stripped(&self) -> Component {
        Component {
            children: Vec::new(),
            ..self.clone()
        }
    }

    /// Removes and returns the children, leaving the component stripped.
    pub fn take_children(&mut self) -> Vec<Component> {
        std::mem::take(&mut self.children)
    }

    /// Number of components in this subtree, including itself.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Component::count).sum::<usize>()
    }
}

/// One `IF <condition> THEN <command>` suggestion rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: Condition,
    pub command: Command,
    pub span: Span,
}

/// Boolean part of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Condition {
    Literal { value: bool },
    Not { inner: Box<Condition> },
    And { left: Box<Condition>, right: Box<Condition> },
    Or { left: Box<Condition>, right: Box<Condition> },
    IsFirst,
    IsLast,
    Parent { test: ClassTest, class: String },
    ParentAllows { role: AllowedRole },
    AnyParent { test: ClassTest, class: String },
    PrecedingGenerates { data_type: String },
    FollowingAccepts { data_type: String },
    Before { target: Target },
    After { target: Target },
    This { target: Target },
    First { target: Target },
    Last { target: Target },
}

/// `IS` compares type ids exactly, `LIKE` also matches supertypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassTest {
    Is,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowedRole {
    Standalone,
    Source,
}

/// Role keyword or class expression tested against a context actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Standalone,
    Source,
    Transformer,
    Sink,
    Class(String),
}

/// Right-hand side of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Bare type id, instantiated with its defaults.
    Type(String),
    /// Quoted option line, possibly containing `${...}` placeholders.
    Template(String),
}

/// Actor a placeholder reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceholderSubject {
    Parent,
    LastParent,
    Preceding,
    Following,
}

/// Attribute a placeholder expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceholderField {
    Class,
    Name,
    Full,
}

impl PlaceholderSubject {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PARENT" => Some(Self::Parent),
            "LASTPARENT" => Some(Self::LastParent),
            "PRECEDING" => Some(Self::Preceding),
            "FOLLOWING" => Some(Self::Following),
            _ => None,
        }
    }
}

impl PlaceholderField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLASS" => Some(Self::Class),
            "NAME" => Some(Self::Name),
            "FULL" => Some(Self::Full),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_keep_order_on_overwrite() {
        let mut options = Options::new();
        options.set("a", Some("1".into()));
        options.set("b", None);
        options.set("a", Some("2".into()));

        let keys: Vec<_> = options.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(options.get("a"), Some("2"));
        assert!(options.contains("b"));
        assert_eq!(options.get("b"), None);
    }

    #[test]
    fn test_stripped_is_idempotent() {
        let tree = Component::new("Sequence", "seq")
            .with_child(Component::new("Display", "out"));
        let once = tree.stripped();
        assert!(once.children.is_empty());
        assert_eq!(once.stripped(), once);
        assert_eq!(tree.count(), 2);
    }
}
