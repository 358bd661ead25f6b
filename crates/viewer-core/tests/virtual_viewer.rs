mod common;

use std::cell::RefCell;
use std::rc::Rc;

use viewer_core::{LazyContentProvider, Resolution, Viewer, ViewerOptions};
use viewer_testing::{Item, ItemLabels, LazyModel, TreeModel};
use viewer_widgets::{ListControl, TableControl, TreeControl};

fn names_of(items: &[&str]) -> Vec<Item> {
    Item::many(items)
}

fn numbered(count: usize) -> Vec<Item> {
    (0..count).map(|index| Item::new(format!("item{index}"))).collect()
}

struct Lazy {
    viewer: Viewer<Item>,
    model: Rc<LazyModel<Item>>,
    root: Item,
}

impl Lazy {
    fn new(count: usize) -> Self {
        let options = ViewerOptions::default().with_virtual_mode(true);
        let viewer: Viewer<Item> = Viewer::with_options(TableControl::new(1), options);
        let model: Rc<LazyModel<Item>> = Rc::new(LazyModel::new());
        let root = Item::new("root");
        model.set_children(&root, numbered(count));
        viewer.set_label_provider(Rc::new(ItemLabels::new()));
        viewer.set_lazy_content_provider(model.clone());
        viewer.set_input(Some(root.clone()));
        Self {
            viewer,
            model,
            root,
        }
    }

    fn shown(&self) -> Vec<String> {
        self.viewer
            .with_nodes(|nodes| {
                nodes
                    .children(None)
                    .into_iter()
                    .map(|node| {
                        nodes
                            .element(node)
                            .map_or_else(|| "<empty>".to_string(), |item| item.name().to_string())
                    })
                    .collect()
            })
            .unwrap()
    }
}

#[test]
fn declaring_a_count_resolves_nothing() {
    let lazy = Lazy::new(1000);
    assert_eq!(lazy.viewer.item_count(None), 1000);
    assert!(lazy.shown().is_empty());
    assert_eq!(lazy.model.resolves(), 0);
}

#[test]
fn materialize_resolves_each_visible_index_once() {
    let lazy = Lazy::new(1000);

    let report = lazy.viewer.materialize(None, 0..3);
    assert_eq!(report.created.len(), 3);
    assert_eq!(lazy.shown(), vec!["item0", "item1", "item2"]);

    lazy.viewer.materialize(None, 1..5);
    assert_eq!(lazy.model.resolves(), 5);
    assert_eq!(lazy.shown(), vec!["item0", "item1", "item2", "item3", "item4"]);
}

#[test]
fn nodes_keep_index_order_whatever_the_materialization_order() {
    let lazy = Lazy::new(100);
    lazy.viewer.materialize(None, 50..51);
    lazy.viewer.materialize(None, 10..11);
    lazy.viewer.materialize(None, 70..71);
    assert_eq!(lazy.shown(), vec!["item10", "item50", "item70"]);
}

#[test]
fn pending_resolution_is_retried_on_the_next_pass() {
    let lazy = Lazy::new(10);
    lazy.model.hold(2);

    lazy.viewer.materialize(None, 2..3);
    assert!(lazy.shown().is_empty());
    assert_eq!(lazy.viewer.pending_indices(), vec![(None, 2)]);

    lazy.model.release(2);
    lazy.viewer.materialize(None, 5..6);

    assert!(lazy.viewer.pending_indices().is_empty());
    assert_eq!(lazy.shown(), vec!["item2", "item5"]);
}

#[test]
fn shrinking_the_count_disposes_the_tail() {
    let lazy = Lazy::new(10);
    lazy.viewer.materialize(None, 0..10);

    let report = lazy.viewer.set_item_count(4);

    assert_eq!(report.disposed.len(), 6);
    assert_eq!(lazy.viewer.item_count(None), 4);
    assert_eq!(lazy.shown().len(), 4);
}

#[test]
fn replace_supplies_an_element_directly() {
    let lazy = Lazy::new(10);
    lazy.viewer.replace(None, 3, Item::new("direct"));
    assert_eq!(lazy.shown(), vec!["direct"]);
    assert_eq!(lazy.model.resolves(), 0);
}

#[test]
fn replace_past_the_count_fails_without_creating_nodes() {
    let lazy = Lazy::new(2);
    let report = lazy.viewer.replace(None, 5, Item::new("late"));
    assert!(report.created.is_empty());
    assert!(lazy.shown().is_empty());
}

#[test]
fn clear_index_forces_a_new_resolution() {
    let lazy = Lazy::new(5);
    lazy.viewer.materialize(None, 0..2);
    lazy.model.set_children(&lazy.root, names_of(&["fresh0", "fresh1"]));

    lazy.viewer.clear_index(None, 1);
    assert_eq!(lazy.shown(), vec!["item0", "<empty>"]);

    lazy.viewer.materialize(None, 0..2);
    assert_eq!(lazy.shown(), vec!["item0", "fresh1"]);
}

#[test]
fn removal_keeps_later_rows_bound() {
    let lazy = Lazy::new(4);
    lazy.viewer.materialize(None, 0..4);
    let resolves = lazy.model.resolves();
    let mut remaining = numbered(4);
    let removed = remaining.remove(1);
    lazy.model.set_children(&lazy.root, remaining);

    let report = lazy.viewer.remove(&[removed]);

    assert_eq!(report.disposed.len(), 1);
    assert_eq!(lazy.viewer.item_count(None), 3);
    assert_eq!(lazy.shown(), vec!["item0", "item2", "item3"]);
    lazy.viewer.materialize(None, 0..3);
    assert_eq!(lazy.model.resolves(), resolves);
}

#[test]
fn selection_after_a_removed_row_survives() {
    let options = ViewerOptions::default().with_virtual_mode(true);
    let viewer: Viewer<Item> = Viewer::with_options(ListControl::new(), options);
    let model: Rc<TreeModel<Item>> = Rc::new(TreeModel::new());
    let root = Item::new("root");
    model.set_children(&root, names_of(&["a", "b", "c", "d"]));
    viewer.set_content_provider(model.clone());
    viewer.set_input(Some(root.clone()));
    viewer.materialize(None, 0..4);
    viewer.set_selection(&[Item::new("d")], false);
    let invalid = Rc::new(RefCell::new(0));
    viewer.set_invalid_selection_handler(Box::new({
        let invalid = Rc::clone(&invalid);
        move |_previous: &[Item], _restored: &[Item]| {
            *invalid.borrow_mut() += 1;
            None
        }
    }));

    model.set_children(&root, names_of(&["a", "c", "d"]));
    viewer.remove(&[Item::new("b")]);

    let shown: Vec<String> = viewer
        .with_nodes(|nodes| {
            nodes
                .children(None)
                .into_iter()
                .map(|node| {
                    nodes
                        .element(node)
                        .map_or_else(|| "<empty>".to_string(), |item| item.name().to_string())
                })
                .collect()
        })
        .unwrap();
    assert_eq!(shown, vec!["a", "c", "d"]);
    assert_eq!(viewer.selection(), vec![Item::new("d")]);
    assert_eq!(*invalid.borrow(), 0);
}

#[test]
fn refresh_rematerializes_what_was_visible() {
    let lazy = Lazy::new(10);
    lazy.viewer.materialize(None, 0..2);
    lazy.model.set_children(&lazy.root, names_of(&["x", "y", "z"]));

    lazy.viewer.refresh();

    assert_eq!(lazy.viewer.item_count(None), 3);
    assert_eq!(lazy.shown(), vec!["x", "y"]);
}

#[test]
fn lazy_provider_requires_virtual_mode() {
    let viewer: Viewer<Item> = Viewer::new(ListControl::new());
    let model: Rc<TreeModel<Item>> = Rc::new(TreeModel::new());
    let root = Item::new("root");
    model.set_children(&root, names_of(&["a", "b"]));
    viewer.set_content_provider(model.clone());
    viewer.set_input(Some(root.clone()));
    let lazy: Rc<LazyModel<Item>> = Rc::new(LazyModel::new());
    lazy.set_children(&root, numbered(5));

    viewer.set_lazy_content_provider(lazy.clone());
    viewer.refresh();

    // The refused provider never replaced the eager one.
    assert_eq!(viewer.item_count(None), 2);
    assert_eq!(lazy.resolves(), 0);
}

#[test]
fn virtual_tree_nodes_expand_to_their_declared_count() {
    let options = ViewerOptions::default().with_virtual_mode(true);
    let viewer: Viewer<Item> = Viewer::with_options(TreeControl::new(), options);
    let model: Rc<LazyModel<Item>> = Rc::new(LazyModel::new());
    let root = Item::new("root");
    let (a, b) = (Item::new("a"), Item::new("b"));
    model.set_children(&root, vec![a.clone(), b.clone()]);
    model.set_children(&a, names_of(&["a1", "a2"]));
    viewer.set_label_provider(Rc::new(ItemLabels::new()));
    viewer.set_lazy_content_provider(model.clone());
    viewer.set_input(Some(root.clone()));
    viewer.materialize(None, 0..2);
    let below = |parent: &Item| -> Vec<String> {
        let parent = viewer.find_node(parent);
        viewer
            .with_nodes(|nodes| {
                nodes
                    .children(parent)
                    .into_iter()
                    .map(|node| {
                        nodes
                            .element(node)
                            .map_or_else(|| "<empty>".to_string(), |item| item.name().to_string())
                    })
                    .collect()
            })
            .unwrap()
    };
    assert_eq!(below(&a), vec!["<empty>"]);
    assert!(below(&b).is_empty());

    assert!(viewer.set_expanded(&a, true));
    assert!(viewer.is_expanded(&a));
    assert_eq!(viewer.item_count(Some(&a)), 2);
    assert!(below(&a).is_empty());

    viewer.materialize(Some(&a), 0..2);
    assert_eq!(below(&a), vec!["a1", "a2"]);

    assert!(!viewer.set_expanded(&b, true));
    assert_eq!(viewer.item_count(Some(&b)), 0);
}

/// Answers "pending" and hands the element over through `replace`, the way
/// a model that fetches asynchronously would, except that it does so from
/// inside the resolution callback.
struct ReplacingModel {
    viewer: RefCell<Option<Viewer<Item>>>,
    reports: RefCell<Vec<bool>>,
}

impl LazyContentProvider<Item> for ReplacingModel {
    fn child_count(&self, _parent: &Item) -> usize {
        3
    }

    fn resolve(&self, _parent: &Item, index: usize) -> Resolution<Item> {
        if let Some(viewer) = self.viewer.borrow().as_ref() {
            let report = viewer.replace(None, index, Item::new(format!("late{index}")));
            self.reports.borrow_mut().push(report.deferred);
        }
        Resolution::Pending
    }
}

#[test]
fn replace_from_inside_a_resolution_is_deferred() {
    let options = ViewerOptions::default().with_virtual_mode(true);
    let viewer: Viewer<Item> = Viewer::with_options(ListControl::new(), options);
    let model = Rc::new(ReplacingModel {
        viewer: RefCell::new(Some(viewer.clone())),
        reports: RefCell::new(Vec::new()),
    });
    viewer.set_lazy_content_provider(model.clone());
    viewer.set_input(Some(Item::new("root")));

    viewer.materialize(None, 0..2);

    assert_eq!(*model.reports.borrow(), vec![true, true]);
    assert!(viewer.pending_indices().is_empty());
    let shown: Vec<String> = viewer
        .with_nodes(|nodes| {
            nodes
                .children(None)
                .into_iter()
                .filter_map(|node| nodes.element(node).map(|item| item.name().to_string()))
                .collect()
        })
        .unwrap();
    assert_eq!(shown, vec!["late0", "late1"]);
    model.viewer.borrow_mut().take();
}

#[test]
fn eager_content_in_virtual_mode_is_sorted_up_front() {
    let options = ViewerOptions::default().with_virtual_mode(true);
    let viewer: Viewer<Item> = Viewer::with_options(ListControl::new(), options);
    let model: Rc<TreeModel<Item>> = Rc::new(TreeModel::new());
    let root = Item::new("root");
    model.set_children(&root, names_of(&["c", "a", "b"]));
    viewer.set_content_provider(model);
    viewer.set_comparator(Some(Rc::new(|a: &Item, b: &Item| a.cmp(b))));
    viewer.set_input(Some(root));
    assert_eq!(viewer.item_count(None), 3);

    viewer.materialize(None, 0..1);
    viewer.add(None, &[Item::new("0")]);
    viewer.materialize(None, 0..4);

    let shown: Vec<String> = viewer
        .with_nodes(|nodes| {
            nodes
                .children(None)
                .into_iter()
                .filter_map(|node| nodes.element(node).map(|item| item.name().to_string()))
                .collect()
        })
        .unwrap();
    assert_eq!(shown, vec!["0", "a", "b", "c"]);
}
