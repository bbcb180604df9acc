//! Trace identifiers and the persistent trace-ID chain.
//!
//! A call chain may participate in several trace scopes at once (nested
//! correlation contexts, a request ID plus an upstream trace ID, ...).
//! [`TraceIds`] keeps them newest-first with the same sharing discipline as
//! [`FieldChain`](crate::field::FieldChain).

use std::fmt;
use std::sync::Arc;

/// Opaque trace identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(Arc<str>);

impl TraceId {
    /// Creates a trace identifier.
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TraceId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

struct Node {
    id: TraceId,
    parent: Option<Arc<Node>>,
}

impl Drop for Node {
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

/// Immutable, structurally shared sequence of trace IDs, newest first.
#[derive(Clone, Default)]
pub struct TraceIds {
    head: Option<Arc<Node>>,
    len: usize,
}

impl TraceIds {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Returns a chain with `id` added on top.
    #[must_use]
    pub fn with(&self, id: impl Into<TraceId>) -> Self {
        Self {
            head: Some(Arc::new(Node {
                id: id.into(),
                parent: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Number of IDs in the chain.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the chain is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the most recent ID.
    #[must_use]
    pub fn latest(&self) -> Option<&TraceId> {
        self.head.as_deref().map(|n| &n.id)
    }

    /// Visits IDs newest-first until `f` returns `false`.
    ///
    /// Returns `false` iff the walk was stopped early.
    pub fn for_each(&self, mut f: impl FnMut(&TraceId) -> bool) -> bool {
        self.iter().all(|id| f(id))
    }

    /// Iterates newest-first.
    #[must_use]
    pub fn iter(&self) -> TraceIdIter<'_> {
        TraceIdIter {
            node: self.head.as_deref(),
        }
    }

    /// Clones the IDs into a vector, newest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TraceId> {
        self.iter().cloned().collect()
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
}

impl<T: Into<TraceId>> FromIterator<T> for TraceIds {
    /// Pushes the items in order, so the last item ends up newest.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |ids, id| ids.with(id))
    }
}

impl PartialEq for TraceIds {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for TraceIds {}

impl fmt::Debug for TraceIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a TraceIds {
    type Item = &'a TraceId;
    type IntoIter = TraceIdIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Newest-first iterator over [`TraceIds`].
pub struct TraceIdIter<'a> {
    node: Option<&'a Node>,
}

impl<'a> Iterator for TraceIdIter<'a> {
    type Item = &'a TraceId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.parent.as_deref();
        Some(&node.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first() {
        let ids = TraceIds::new().with("outer").with("inner");
        let got: Vec<_> = ids.iter().map(TraceId::as_str).collect();
        assert_eq!(got, ["inner", "outer"]);
        assert_eq!(ids.latest().map(TraceId::as_str), Some("inner"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn from_iter_pushes_in_order() {
        let ids: TraceIds = ["a", "b", "c"].into_iter().collect();
        assert_eq!(ids, TraceIds::new().with("a").with("b").with("c"));
        assert_eq!(ids.latest().map(TraceId::as_str), Some("c"));
    }

    #[test]
    fn derivation_leaves_parent_untouched() {
        let base = TraceIds::new().with("root");
        let child = base.with("child");
        assert_eq!(base.len(), 1);
        assert_eq!(child.len(), 2);
        assert!(!base.ptr_eq(&child));
        assert!(base.ptr_eq(&base.clone()));
    }

    #[test]
    fn for_each_reports_early_exit() {
        let ids: TraceIds = ["a", "b", "c"].into_iter().collect();
        let mut n = 0;
        assert!(!ids.for_each(|_| {
            n += 1;
            false
        }));
        assert_eq!(n, 1);
        assert!(ids.for_each(|_| true));
    }
}
