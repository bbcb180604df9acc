//! Structured context fields and the persistent field chain.
//!
//! A [`Field`] is a key/value annotation with optional capability tags
//! ([`Property`]). Fields accumulate in a [`FieldChain`]: an immutable,
//! singly linked list where each derivation allocates exactly one node and
//! shares its parent with every other derivation of the same chain.
//!
//! ```text
//!   root ── a ── b ── c        (chain held by caller 1)
//!                 └── d        (chain held by caller 2, shares a, b)
//! ```
//!
//! Iteration is newest-first. Keys are not deduplicated; consumers that want
//! last-write-wins semantics keep the first occurrence they see.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use smallvec::SmallVec;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Property
// ============================================================================

/// Capability tag attached to a field.
///
/// Properties are consulted by consumers (e.g. a metrics tool only turns
/// fields tagged [`Property::ALLOW_IN_METRICS`] into labels); the core never
/// interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Property(&'static str);

impl Property {
    /// The field may be used as a metric label.
    pub const ALLOW_IN_METRICS: Self = Self("allow_in_metrics");
    /// The field may be attached to tracing spans.
    pub const ALLOW_IN_TRACES: Self = Self("allow_in_traces");

    /// Creates a custom property tag.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the tag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Small set of [`Property`] tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(SmallVec<[Property; 2]>);

impl Properties {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set extended with `property` (no-op if already present).
    #[must_use]
    pub fn with(mut self, property: Property) -> Self {
        if !self.contains(property) {
            self.0.push(property);
        }
        self
    }

    /// Returns `true` if the set holds `property`.
    #[must_use]
    pub fn contains(&self, property: Property) -> bool {
        self.0.contains(&property)
    }

    /// Returns `true` if no tag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Property> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Property> for Properties {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::with)
    }
}

// ============================================================================
// Value
// ============================================================================

/// Shared error handle used in field values and events.
pub type ErrorRef = Arc<dyn StdError + Send + Sync + 'static>;

/// Field value.
///
/// Scalars are stored inline; anything else is kept behind an `Arc` so that
/// cloning a field never deep-copies its payload.
#[derive(Clone)]
pub enum Value {
    /// String value.
    Str(Arc<str>),
    /// Signed integer.
    I64(i64),
    /// Unsigned integer.
    U64(u64),
    /// Floating point number.
    F64(f64),
    /// Boolean.
    Bool(bool),
    /// An error value.
    Error(ErrorRef),
    /// Any other value, rendered through its `Debug` impl.
    Debug(Arc<dyn fmt::Debug + Send + Sync>),
}

impl Value {
    /// Wraps an arbitrary `Debug` value.
    #[must_use]
    pub fn debug<T: fmt::Debug + Send + Sync + 'static>(value: T) -> Self {
        Self::Debug(Arc::new(value))
    }

    /// Wraps an error value.
    #[must_use]
    pub fn error<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Error(Arc::new(err))
    }

    /// Returns the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is a signed integer.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            // Opaque payloads compare by identity.
            (Self::Error(a), Self::Error(b)) => Arc::ptr_eq(a, b),
            (Self::Debug(a), Self::Debug(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Error(e) => write!(f, "{e}"),
            Self::Debug(d) => write!(f, "{d:?}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Error(e) => write!(f, "Error({e})"),
            _ => write!(f, "{self}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::I64(v) => serializer.serialize_i64(*v),
            Self::U64(v) => serializer.serialize_u64(*v),
            Self::F64(v) => serializer.serialize_f64(*v),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Error(_) | Self::Debug(_) => serializer.collect_str(self),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<Arc<str>> for Value {
    fn from(v: Arc<str>) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I64(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U64(u64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::U64(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<ErrorRef> for Value {
    fn from(v: ErrorRef) -> Self {
        Self::Error(v)
    }
}

// ============================================================================
// Field
// ============================================================================

/// A single key/value context annotation.
#[derive(Clone, PartialEq)]
pub struct Field {
    key: Arc<str>,
    value: Value,
    properties: Properties,
}

impl Field {
    /// Creates a field without properties.
    #[must_use]
    pub fn new(key: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            properties: Properties::new(),
        }
    }

    /// Adds a capability tag.
    #[must_use]
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties = self.properties.with(property);
        self
    }

    /// Replaces the capability tags.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the capability tags.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.key, self.value)
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Field", 3)?;
        s.serialize_field("key", &*self.key)?;
        s.serialize_field("value", &self.value)?;
        let props: Vec<&str> = self.properties.iter().map(Property::as_str).collect();
        s.serialize_field("properties", &props)?;
        s.end()
    }
}

// ============================================================================
// Fields (iteration contract)
// ============================================================================

/// Anything that can enumerate fields.
///
/// `for_each_field` visits fields newest-first and stops as soon as the
/// callback returns `false`. The return value is `false` iff the walk was
/// stopped early, which lets composed iterables propagate the stop.
pub trait Fields {
    /// Visits every field until `f` returns `false`.
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool;

    /// Number of fields.
    fn len(&self) -> usize;

    /// Returns `true` if there are no fields.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits `self`, then `other`.
    fn chain<B: Fields>(self, other: B) -> Chained<Self, B>
    where
        Self: Sized,
    {
        Chained(self, other)
    }

    /// Clones every field into a vector, in visiting order.
    fn to_vec(&self) -> Vec<Field> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each_field(&mut |field| {
            out.push(field.clone());
            true
        });
        out
    }

    /// Returns the most recent value stored under `key`.
    fn get(&self, key: &str) -> Option<Value> {
        let mut found = None;
        self.for_each_field(&mut |field| {
            if field.key() == key {
                found = Some(field.value().clone());
                return false;
            }
            true
        });
        found
    }
}

impl Fields for Field {
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool {
        f(self)
    }

    fn len(&self) -> usize {
        1
    }
}

impl Fields for [Field] {
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool {
        self.iter().all(|field| f(field))
    }

    fn len(&self) -> usize {
        <[Field]>::len(self)
    }
}

impl Fields for Vec<Field> {
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool {
        self.as_slice().for_each_field(f)
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

impl<T: Fields + ?Sized> Fields for &T {
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool {
        (**self).for_each_field(f)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// Two field sources visited back to back (see [`Fields::chain`]).
#[derive(Debug, Clone)]
pub struct Chained<A, B>(A, B);

impl<A: Fields, B: Fields> Fields for Chained<A, B> {
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool {
        self.0.for_each_field(f) && self.1.for_each_field(f)
    }

    fn len(&self) -> usize {
        self.0.len() + self.1.len()
    }
}

// ============================================================================
// FieldChain
// ============================================================================

struct Node {
    /// Fields added by one derivation, in the order they were given.
    batch: SmallVec<[Field; 1]>,
    parent: Option<Arc<Node>>,
}

impl Drop for Node {
    // Unlink uniquely owned ancestors iteratively so that dropping a very long
    // chain does not recurse once per node.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut owned) => next = owned.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// Immutable, structurally shared sequence of fields.
///
/// Cloning is O(1). [`with_field`](Self::with_field) and
/// [`with_fields`](Self::with_fields) allocate a single node and leave the
/// receiver untouched.
#[derive(Clone, Default)]
pub struct FieldChain {
    head: Option<Arc<Node>>,
    len: usize,
}

impl FieldChain {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Returns a chain with `field` added on top.
    #[must_use]
    pub fn with_field(&self, field: Field) -> Self {
        let mut batch = SmallVec::new();
        batch.push(field);
        self.push_batch(batch)
    }

    /// Returns a chain with all `fields` added on top as one node.
    ///
    /// Within the batch the last field is the newest, so
    /// `with_fields([a, b])` iterates like `with_field(a).with_field(b)`.
    #[must_use]
    pub fn with_fields<I: IntoIterator<Item = Field>>(&self, fields: I) -> Self {
        let batch: SmallVec<[Field; 1]> = fields.into_iter().collect();
        if batch.is_empty() {
            return self.clone();
        }
        self.push_batch(batch)
    }

    /// Returns a chain where every field of `newer` sits on top of `self`.
    ///
    /// Shares `newer` as-is when `self` is empty; otherwise `newer` is
    /// copied into a single node.
    #[must_use]
    pub fn with_chain(&self, newer: &Self) -> Self {
        if self.head.is_none() {
            return newer.clone();
        }
        let mut batch: SmallVec<[Field; 1]> = newer.iter().cloned().collect();
        batch.reverse();
        self.with_fields(batch)
    }

    /// The fields of `self` that were added on top of `base`.
    ///
    /// Returns the whole chain when `base` is empty or is not an ancestor of
    /// `self`.
    #[must_use]
    pub fn newer_than(&self, base: &Self) -> Self {
        let Some(stop) = base.head.as_ref() else {
            return self.clone();
        };
        if base.len > self.len {
            return self.clone();
        }
        let mut above = Vec::new();
        let mut cursor = self.head.as_ref();
        while let Some(node) = cursor {
            if Arc::ptr_eq(node, stop) {
                return above
                    .iter()
                    .rev()
                    .fold(Self::new(), |chain, node: &&Arc<Node>| {
                        chain.with_fields(node.batch.iter().cloned())
                    });
            }
            above.push(node);
            cursor = node.parent.as_ref();
        }
        self.clone()
    }

    fn push_batch(&self, batch: SmallVec<[Field; 1]>) -> Self {
        let len = self.len + batch.len();
        Self {
            head: Some(Arc::new(Node {
                batch,
                parent: self.head.clone(),
            })),
            len,
        }
    }

    /// Returns `true` if both chains share the same head node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Iterates newest-first.
    #[must_use]
    pub fn iter(&self) -> FieldIter<'_> {
        FieldIter {
            node: self.head.as_deref(),
            idx: self.head.as_ref().map_or(0, |n| n.batch.len()),
        }
    }
}

impl Fields for FieldChain {
    fn for_each_field(&self, f: &mut dyn FnMut(&Field) -> bool) -> bool {
        for field in self.iter() {
            if !f(field) {
                return false;
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl<'a> IntoIterator for &'a FieldChain {
    type Item = &'a Field;
    type IntoIter = FieldIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Field> for FieldChain {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self::new().with_fields(iter)
    }
}

impl fmt::Debug for FieldChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Serialize for FieldChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Newest-first iterator over a [`FieldChain`].
pub struct FieldIter<'a> {
    node: Option<&'a Node>,
    /// Number of fields of `node` not yet yielded.
    idx: usize,
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a Field;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node?;
            if self.idx > 0 {
                self.idx -= 1;
                return Some(&node.batch[self.idx]);
            }
            self.node = node.parent.as_deref();
            self.idx = self.node.map_or(0, |n| n.batch.len());
        }
    }
}
