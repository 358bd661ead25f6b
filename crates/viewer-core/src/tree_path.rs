//! Root-relative element paths.

use std::fmt;

use crate::element::EquivalenceStrategy;

/// Ordered elements from a top-level element down to a target element.
///
/// Paths never contain the viewer input: top-level elements have a
/// one-segment path and the empty path denotes the input itself. Paths tell
/// apart elements that compare equal but sit in different branches.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TreePath<E> {
    segments: Vec<E>,
}

impl<E> TreePath<E> {
    pub const EMPTY: TreePath<E> = TreePath {
        segments: Vec::new(),
    };

    pub fn new(segments: Vec<E>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[E] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first_segment(&self) -> Option<&E> {
        self.segments.first()
    }

    pub fn last_segment(&self) -> Option<&E> {
        self.segments.last()
    }

    pub fn segment(&self, index: usize) -> Option<&E> {
        self.segments.get(index)
    }

    /// Equality under `strategy` rather than the segments' own `PartialEq`.
    pub fn equals(&self, other: &TreePath<E>, strategy: &dyn EquivalenceStrategy<E>) -> bool {
        self.segments.len() == other.segments.len() && self.starts_with(other, strategy)
    }

    pub fn starts_with(&self, prefix: &TreePath<E>, strategy: &dyn EquivalenceStrategy<E>) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix
                .segments
                .iter()
                .zip(&self.segments)
                .all(|(a, b)| strategy.equals(a, b))
    }

    pub fn hash_with(&self, strategy: &dyn EquivalenceStrategy<E>) -> u64 {
        self.segments.iter().fold(self.segments.len() as u64, |acc, segment| {
            acc.rotate_left(5) ^ strategy.hash(segment)
        })
    }
}

impl<E: Clone> TreePath<E> {
    /// Path of the parent, or `None` for the empty path.
    pub fn parent_path(&self) -> Option<TreePath<E>> {
        if self.segments.is_empty() {
            return None;
        }
        Some(TreePath::new(
            self.segments[..self.segments.len() - 1].to_vec(),
        ))
    }

    pub fn child(&self, element: E) -> TreePath<E> {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(element);
        TreePath::new(segments)
    }
}

impl<E> Default for TreePath<E> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<E: fmt::Debug> fmt::Debug for TreePath<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TreePath")?;
        f.debug_list().entries(&self.segments).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::DefaultEquivalence;

    #[test]
    fn parent_path_drops_last_segment() {
        let path = TreePath::new(vec!["a", "b", "c"]);
        let parent = path.parent_path().expect("non-empty path has a parent");
        assert_eq!(parent.segments(), &["a", "b"]);
        assert_eq!(path.last_segment(), Some(&"c"));
        assert!(TreePath::<&str>::EMPTY.parent_path().is_none());
    }

    #[test]
    fn prefix_and_equality_follow_strategy() {
        let path = TreePath::new(vec![1, 2, 3]);
        let prefix = TreePath::new(vec![1, 2]);
        assert!(path.starts_with(&prefix, &DefaultEquivalence));
        assert!(!prefix.starts_with(&path, &DefaultEquivalence));
        assert!(path.equals(&prefix.child(3), &DefaultEquivalence));
        assert_eq!(
            path.hash_with(&DefaultEquivalence),
            prefix.child(3).hash_with(&DefaultEquivalence)
        );
    }
}
