//! Ordered, mergeable configuration trees.
//!
//! A [`ConfigTree`] is the value container every daemon build produces and
//! every renderer consumes. Keys keep their insertion order so rendering is
//! deterministic, and [`ConfigTree::merge`] composes defaults with overrides.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer (ports, timers, sizes).
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Free-form string.
    Str(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested tree.
    Tree(ConfigTree),
}

/// The shape of a [`Value`], used to validate typed property keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    List,
    Tree,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "boolean",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Str => "string",
            Self::List => "list",
            Self::Tree => "tree",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Return the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::List(_) => ValueKind::List,
            Self::Tree(_) => ValueKind::Tree,
        }
    }

    /// Build a list value from anything convertible into values.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Self>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_tree(&self) -> Option<&ConfigTree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Whether the value is a scalar (neither a list nor a tree).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Tree(_))
    }
}

/// Scalars print bare, lists print comma separated and trees print as
/// `{key=value, ...}`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Tree(tree) => {
                f.write_str("{")?;
                for (i, (k, v)) in tree.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<ConfigTree> for Value {
    fn from(value: ConfigTree) -> Self {
        Self::Tree(value)
    }
}

/// How [`ConfigTree::merge`] combines two lists stored under the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListMerge {
    /// The incoming list replaces the existing one.
    #[default]
    Replace,
    /// The incoming items are appended to the existing list.
    Concat,
}

/// Ordered mapping from string keys to [`Value`]s.
///
/// Keys are case-sensitive and unique per level. Setting an existing key
/// replaces the value in place, so the key keeps its original position.
///
/// # Examples
///
/// ```
/// use ipmesh_lib::{ConfigTree, ListMerge};
///
/// let mut defaults = ConfigTree::new()
///     .with("verbosity", 1)
///     .with("timers", ConfigTree::new().with("hold", 30).with("keepalive", 3));
/// let overrides = ConfigTree::new().with("timers", ConfigTree::new().with("hold", 10));
///
/// defaults.merge(&overrides, ListMerge::Replace);
/// assert_eq!(defaults.get_path("timers.hold").and_then(|v| v.as_int()), Some(10));
/// assert_eq!(defaults.get_path("timers.keepalive").and_then(|v| v.as_int()), Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    entries: Vec<(String, Value)>,
}

impl ConfigTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ConfigTree::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Return the value under `key` or `default` when absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn get_tree(&self, key: &str) -> Option<&Self> {
        self.get(key).and_then(Value::as_tree)
    }

    #[must_use]
    pub fn get_list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_list)
    }

    /// Look up a dotted path such as `timers.hold` through nested trees.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_tree()?.get(part)?;
        }
        Some(current)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` over `self`.
    ///
    /// Keys in `other` win. Nested trees are merged recursively so sibling
    /// keys survive at every depth; lists are replaced wholesale unless
    /// `lists` is [`ListMerge::Concat`]. Keys new to `self` are appended in
    /// `other`'s order.
    pub fn merge(&mut self, other: &Self, lists: ListMerge) {
        for (key, incoming) in &other.entries {
            match (self.get_mut(key), incoming) {
                (Some(Value::Tree(current)), Value::Tree(next)) => current.merge(next, lists),
                (Some(Value::List(current)), Value::List(next)) if lists == ListMerge::Concat => {
                    current.extend(next.iter().cloned());
                }
                (Some(slot), _) => *slot = incoming.clone(),
                (None, _) => self.entries.push((key.clone(), incoming.clone())),
            }
        }
    }

    /// Consume `self` and return it merged with `other`, replacing lists.
    #[must_use]
    pub fn merged(mut self, other: &Self) -> Self {
        self.merge(other, ListMerge::Replace);
        self
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigTree
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        for (k, v) in iter {
            tree.set(k, v);
        }
        tree
    }
}

impl Serialize for ConfigTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConfigTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TreeVisitor)
    }
}

struct TreeVisitor;

impl<'de> Visitor<'de> for TreeVisitor {
    type Value = ConfigTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of configuration keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ConfigTree, A::Error> {
        let mut tree = ConfigTree::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            if tree.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key `{key}`")));
            }
            tree.entries.push((key, value));
        }
        Ok(tree)
    }
}
