#![allow(dead_code)]

use std::rc::Rc;

use viewer_core::node::walk_preorder;
use viewer_core::{NodeCollection, NodeId, Viewer, ViewerOptions};
use viewer_testing::{EventRecorder, Item, ItemLabels, TreeModel};
use viewer_widgets::{ListControl, TreeControl};

/// A viewer wired to a [`TreeModel`] whose input is `root`.
pub struct Setup {
    pub viewer: Viewer<Item>,
    pub model: Rc<TreeModel<Item>>,
    pub labels: Rc<ItemLabels>,
    pub events: EventRecorder<Item>,
    pub root: Item,
}

impl Setup {
    pub fn new(nodes: impl NodeCollection<Item> + 'static, options: ViewerOptions) -> Self {
        let viewer: Viewer<Item> = Viewer::with_options(nodes, options);
        let model: Rc<TreeModel<Item>> = Rc::new(TreeModel::new());
        let labels = Rc::new(ItemLabels::new());
        let events = EventRecorder::new();
        viewer.set_content_provider(model.clone());
        viewer.set_label_provider(labels.clone());
        viewer.add_association_listener(events.association_listener());
        viewer.add_selection_listener(events.selection_listener());
        Self {
            viewer,
            model,
            labels,
            events,
            root: Item::new("root"),
        }
    }

    /// A list showing `names` below the input.
    pub fn list(names: &[&str]) -> Self {
        let setup = Self::new(ListControl::new(), ViewerOptions::default());
        setup.model.set_children(&setup.root, Item::many(names));
        setup.viewer.set_input(Some(setup.root.clone()));
        setup
    }

    /// A tree over `children`, given as `(parent, children)` pairs where
    /// `"root"` is the input.
    pub fn tree(children: &[(&str, &[&str])]) -> Self {
        Self::tree_with(TreeControl::new(), ViewerOptions::default(), children)
    }

    pub fn tree_with(
        nodes: impl NodeCollection<Item> + 'static,
        options: ViewerOptions,
        children: &[(&str, &[&str])],
    ) -> Self {
        let setup = Self::new(nodes, options);
        for (parent, names) in children {
            setup.model.set_children(&Item::new(*parent), Item::many(names));
        }
        setup.viewer.set_input(Some(setup.root.clone()));
        setup
    }

    /// Element names of the nodes below the top level (`None`) or below the
    /// first node of `parent`. Elementless nodes read `<empty>`.
    pub fn shown(&self, parent: Option<&Item>) -> Vec<String> {
        let parent = parent.map(|parent| self.viewer.find_node(parent).expect("parent node"));
        self.viewer
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
            .expect("viewer idle")
    }

    /// Label texts of the top-level nodes.
    pub fn texts(&self) -> Vec<String> {
        self.viewer
            .with_nodes(|nodes| {
                nodes
                    .children(None)
                    .into_iter()
                    .map(|node| nodes.label(node).map(|label| label.text.clone()).unwrap_or_default())
                    .collect()
            })
            .expect("viewer idle")
    }

    /// Current top-level children of the input in the model.
    pub fn top(&self) -> Vec<Item> {
        self.model.children_of(&self.root)
    }

    pub fn item(&self, name: &str) -> Item {
        find_item(&self.model, &self.root, name).expect("item in model")
    }
}

fn find_item(model: &TreeModel<Item>, parent: &Item, name: &str) -> Option<Item> {
    for child in model.children_of(parent) {
        if child.name() == name {
            return Some(child);
        }
        if let Some(found) = find_item(model, &child, name) {
            return Some(found);
        }
    }
    None
}

pub fn names(items: &[Item]) -> Vec<String> {
    items.iter().map(|item| item.name().to_string()).collect()
}

/// Every node with an element is found through the registry under that
/// element, and every registry entry points at live nodes showing it.
pub fn assert_registry_consistent(viewer: &Viewer<Item>) {
    let entries = viewer.registry_entries();
    viewer
        .with_nodes(|nodes| {
            let mut live: Vec<NodeId> = Vec::new();
            walk_preorder(nodes, None, &mut |node| live.push(node));
            for node in &live {
                if let Some(element) = nodes.element(*node) {
                    assert!(
                        entries
                            .iter()
                            .any(|(key, mapped)| key == element && mapped.contains(node)),
                        "node {node} showing {element:?} is not registered"
                    );
                }
            }
            for (element, mapped) in &entries {
                for node in mapped {
                    assert!(live.contains(node), "registry points at dead node {node}");
                    assert_eq!(nodes.element(*node), Some(element));
                }
            }
        })
        .expect("viewer idle");
}
