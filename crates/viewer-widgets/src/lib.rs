//! In-memory controls implementing [`viewer_core::NodeCollection`].
//!
//! Nothing here paints. The controls keep rows, labels and per-row state so
//! a viewer can be driven and inspected headlessly, in tests, benches and the
//! demo.

mod arena;
mod controls;

use std::fmt::Debug;

pub use controls::{ListControl, TableControl, TreeControl};
use viewer_core::{NodeCollection, NodeId};

/// Renders the rows below the top level, one per line, indented by depth.
///
/// Each line reads `[id] text`, preceded by `+`/`-` for expanded/collapsed
/// rows that have children and followed by `[x]`/`[~]` for checked/grayed
/// rows. Elementless rows show as `<empty>`.
pub fn dump<E: Debug>(nodes: &dyn NodeCollection<E>) -> String {
    let mut output = String::new();
    dump_rows(nodes, None, 0, &mut output);
    output
}

fn dump_rows<E: Debug>(nodes: &dyn NodeCollection<E>, parent: Option<NodeId>, depth: usize, output: &mut String) {
    for node in nodes.children(parent) {
        let indent = "  ".repeat(depth);
        let marker = match (nodes.child_count(Some(node)) > 0, nodes.is_expanded(node)) {
            (false, _) => "",
            (true, true) => "- ",
            (true, false) => "+ ",
        };
        let text = match (nodes.element(node), nodes.label(node)) {
            (None, _) => "<empty>".to_string(),
            (Some(_), Some(label)) if !label.text.is_empty() => label.text.clone(),
            (Some(element), _) => format!("{element:?}"),
        };
        let check = if nodes.is_grayed(node) {
            " [~]"
        } else if nodes.is_checked(node) {
            " [x]"
        } else {
            ""
        };
        output.push_str(&format!("{indent}{marker}[{node}] {text}{check}\n"));
        dump_rows(nodes, Some(node), depth + 1, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewer_core::Label;

    #[test]
    fn dump_shows_nesting_and_state() {
        let mut tree: TreeControl<&'static str> = TreeControl::new().with_check_boxes();
        let root = tree.create(None, 0).unwrap();
        tree.set_element(root, Some("root")).unwrap();
        tree.set_label(root, Label::text("Root")).unwrap();
        tree.set_expanded(root, true).unwrap();
        let leaf = tree.create(Some(root), 0).unwrap();
        tree.set_element(leaf, Some("leaf")).unwrap();
        tree.set_checked(leaf, true).unwrap();
        let dummy = tree.create(None, 1).unwrap();

        assert_eq!(
            dump::<&'static str>(&tree),
            format!("- [{root}] Root\n  [{leaf}] \"leaf\" [x]\n[{dummy}] <empty>\n")
        );
    }
}
