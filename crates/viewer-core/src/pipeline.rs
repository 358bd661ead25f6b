//! Sort/filter pipeline: raw model children in, visible children out.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::providers::{Comparator, Filter};
use crate::tree_path::TreePath;

pub struct SortFilterPipeline<E> {
    filters: Vec<Rc<dyn Filter<E>>>,
    comparator: Option<Rc<dyn Comparator<E>>>,
}

impl<E> Default for SortFilterPipeline<E> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            comparator: None,
        }
    }
}

impl<E: std::fmt::Debug> SortFilterPipeline<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, filter: Rc<dyn Filter<E>>) {
        self.filters.push(filter);
    }

    /// Removes `filter` by identity; returns `false` if it was not registered.
    pub fn remove_filter(&mut self, filter: &Rc<dyn Filter<E>>) -> bool {
        let before = self.filters.len();
        self.filters.retain(|candidate| !Rc::ptr_eq(candidate, filter));
        before != self.filters.len()
    }

    pub fn set_filters(&mut self, filters: Vec<Rc<dyn Filter<E>>>) {
        self.filters = filters;
    }

    pub fn filters(&self) -> &[Rc<dyn Filter<E>>] {
        &self.filters
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn set_comparator(&mut self, comparator: Option<Rc<dyn Comparator<E>>>) {
        self.comparator = comparator;
    }

    pub fn comparator(&self) -> Option<&Rc<dyn Comparator<E>>> {
        self.comparator.as_ref()
    }

    /// Runs every filter in registration order. An element survives only if
    /// all filters accept it; dropped elements are passed to `filtered_out`.
    /// A failing filter is logged and treated as accepting.
    pub fn filter(
        &self,
        elements: Vec<E>,
        parent: &TreePath<E>,
        filtered_out: &mut dyn FnMut(&E),
    ) -> Vec<E> {
        if self.filters.is_empty() {
            return elements;
        }
        let mut kept = Vec::with_capacity(elements.len());
        for element in elements {
            if self.accepts(parent, &element) {
                kept.push(element);
            } else {
                filtered_out(&element);
            }
        }
        kept
    }

    fn accepts(&self, parent: &TreePath<E>, element: &E) -> bool {
        self.filters
            .iter()
            .all(|filter| match filter.select(parent, element) {
                Ok(selected) => selected,
                Err(err) => {
                    log::warn!("filter failed on {element:?}, keeping it: {err}");
                    true
                }
            })
    }

    /// Stable sort by the comparator; raw order is kept without one.
    pub fn sort(&self, elements: &mut [E], parent: &TreePath<E>) {
        if let Some(comparator) = &self.comparator {
            elements.sort_by(|a, b| comparator.compare(parent, a, b));
        }
    }

    /// Filtered, then sorted.
    pub fn compute_visible(
        &self,
        raw: Vec<E>,
        parent: &TreePath<E>,
        filtered_out: &mut dyn FnMut(&E),
    ) -> Vec<E> {
        let mut visible = self.filter(raw, parent, filtered_out);
        self.sort(&mut visible, parent);
        visible
    }

    pub fn compare(&self, parent: &TreePath<E>, a: &E, b: &E) -> Ordering {
        match &self.comparator {
            Some(comparator) => comparator.compare(parent, a, b),
            None => Ordering::Equal,
        }
    }

    /// Index at which `element` belongs in the already sorted `visible`.
    ///
    /// Binary search; on hitting an equal element the scan continues forward
    /// past the whole run of equal elements, so the new element lands after
    /// every element comparing equal to it. Repeated insertion of equal
    /// elements therefore never reorders earlier ones. Without a comparator
    /// the element is appended.
    pub fn insertion_index(&self, visible: &[E], parent: &TreePath<E>, element: &E) -> usize {
        let Some(comparator) = &self.comparator else {
            return visible.len();
        };
        let mut low = 0usize;
        let mut high = visible.len();
        while low < high {
            let mid = low + (high - low) / 2;
            match comparator.compare(parent, &visible[mid], element) {
                Ordering::Equal => {
                    let mut index = mid + 1;
                    while index < visible.len()
                        && comparator.compare(parent, &visible[index], element) == Ordering::Equal
                    {
                        index += 1;
                    }
                    return index;
                }
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
            }
        }
        low
    }

    /// Whether a change to any of `properties` of `element` may move it or
    /// change whether it is shown.
    pub fn needs_refilter(&self, element: &E, properties: &[&str]) -> bool {
        properties.iter().any(|property| {
            self.comparator
                .as_ref()
                .is_some_and(|comparator| comparator.is_sorter_property(element, property))
                || self
                    .filters
                    .iter()
                    .any(|filter| filter.is_filter_property(element, property))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FnFilter;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        key: u32,
        tag: &'static str,
    }

    fn entry(key: u32, tag: &'static str) -> Entry {
        Entry { key, tag }
    }

    fn by_key() -> SortFilterPipeline<Entry> {
        let mut pipeline = SortFilterPipeline::new();
        pipeline.set_comparator(Some(Rc::new(|a: &Entry, b: &Entry| a.key.cmp(&b.key))));
        pipeline
    }

    #[test]
    fn filters_run_in_order_and_report_drops() {
        let mut pipeline = SortFilterPipeline::new();
        pipeline.add_filter(Rc::new(FnFilter::new(|_: &TreePath<u32>, n: &u32| n % 2 == 0)));
        pipeline.add_filter(Rc::new(FnFilter::new(|_: &TreePath<u32>, n: &u32| *n > 2)));
        let mut dropped = Vec::new();
        let visible = pipeline.compute_visible(
            vec![1, 2, 3, 4, 6],
            &TreePath::EMPTY,
            &mut |n| dropped.push(*n),
        );
        assert_eq!(visible, vec![4, 6]);
        assert_eq!(dropped, vec![1, 2, 3]);
    }

    #[test]
    fn sort_is_stable() {
        let pipeline = by_key();
        let mut elements = vec![entry(2, "a"), entry(1, "b"), entry(2, "c"), entry(1, "d")];
        pipeline.sort(&mut elements, &TreePath::EMPTY);
        let tags: Vec<_> = elements.iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn no_comparator_keeps_model_order() {
        let pipeline = SortFilterPipeline::<u32>::new();
        let visible = pipeline.compute_visible(vec![3, 1, 2], &TreePath::EMPTY, &mut |_| {});
        assert_eq!(visible, vec![3, 1, 2]);
        assert_eq!(pipeline.insertion_index(&visible, &TreePath::EMPTY, &0), 3);
    }

    #[test]
    fn equal_elements_insert_after_their_run() {
        let pipeline = by_key();
        let mut visible: Vec<Entry> = Vec::new();
        for tag in ["first", "second", "third"] {
            let new = entry(5, tag);
            let index = pipeline.insertion_index(&visible, &TreePath::EMPTY, &new);
            visible.insert(index, new);
        }
        let low = entry(1, "low");
        let index = pipeline.insertion_index(&visible, &TreePath::EMPTY, &low);
        visible.insert(index, low);
        let high = entry(9, "high");
        let index = pipeline.insertion_index(&visible, &TreePath::EMPTY, &high);
        visible.insert(index, high);
        let tags: Vec<_> = visible.iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec!["low", "first", "second", "third", "high"]);
    }

    #[test]
    fn insertion_lands_after_equal_run_found_mid_search() {
        let pipeline = by_key();
        let visible = vec![
            entry(1, "a"),
            entry(3, "b"),
            entry(3, "c"),
            entry(3, "d"),
            entry(3, "e"),
            entry(7, "f"),
        ];
        let index = pipeline.insertion_index(&visible, &TreePath::EMPTY, &entry(3, "new"));
        assert_eq!(index, 5);
    }

    #[test]
    fn refilter_follows_declared_properties() {
        let mut pipeline = SortFilterPipeline::<u32>::new();
        pipeline.add_filter(Rc::new(
            FnFilter::new(|_: &TreePath<u32>, _: &u32| true).with_properties(&["size"]),
        ));
        assert!(pipeline.needs_refilter(&1, &["name", "size"]));
        assert!(!pipeline.needs_refilter(&1, &["name"]));
    }
}
