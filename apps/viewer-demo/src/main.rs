use std::rc::Rc;

use anyhow::{ensure, Context};
use viewer_core::{ChangeReport, FnFilter, TreePath, Viewer, ViewerOptions, ALL_LEVELS};
use viewer_testing::{Item, ItemLabels, LazyModel, TreeModel};
use viewer_widgets::{dump, TableControl, TreeControl};

const ROW_COUNT: usize = 10_000;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("=== Viewer reconciliation demo ===");
    println!("Set RUST_LOG=viewer_core=debug to trace each session.");
    println!();

    tree_demo()?;
    println!();
    table_demo()?;
    Ok(())
}

fn summary(report: &ChangeReport) -> String {
    format!(
        "created {} disposed {} reassociated {} relabeled {}",
        report.created.len(),
        report.disposed.len(),
        report.reassociated.len(),
        report.relabeled
    )
}

fn tree_demo() -> anyhow::Result<()> {
    let root = Item::new("workspace");
    let model: Rc<TreeModel<Item>> = Rc::new(TreeModel::new());
    model.set_children(&root, Item::many(&["src", "tests", "Cargo.toml"]));
    model.set_children(&Item::new("src"), Item::many(&["lib.rs", "viewer.rs"]));
    model.set_children(&Item::new("tests"), Item::many(&["smoke.rs"]));

    let viewer: Viewer<Item> = Viewer::new(TreeControl::new().with_check_boxes());
    viewer.set_content_provider(model.clone());
    viewer.set_label_provider(Rc::new(ItemLabels::new()));
    viewer.add_selection_listener(Box::new(|selection: &[Item]| {
        log::info!("selection changed: {selection:?}");
        Ok(())
    }));
    viewer.set_input(Some(root.clone()));
    viewer.set_comparator(Some(Rc::new(|a: &Item, b: &Item| a.cmp(b))));

    println!("-- initial tree (children fetched lazily on expansion)");
    print_tree(&viewer)?;

    let report = viewer.expand_to_level(None, ALL_LEVELS);
    println!("-- expanded everything: {}", summary(&report));
    print_tree(&viewer)?;

    let viewer_rs = Item::new("viewer.rs");
    ensure!(viewer.reveal(&viewer_rs), "viewer.rs is not in the model");
    viewer.set_selection(&[viewer_rs.clone()], true);
    viewer.set_checked(&Item::new("tests"), true);

    model.push(&Item::new("src"), Item::new("arena.rs"));
    model.remove(&Item::new("Cargo.toml"));
    let report = viewer.refresh();
    println!("-- model edited and refreshed: {}", summary(&report));
    print_tree(&viewer)?;

    // A new instance equal to the shown one keeps its node and the selection.
    let renamed = Item::new("viewer.rs");
    renamed.set_caption("viewer.rs (modified)");
    model.set_children(
        &Item::new("src"),
        vec![Item::new("arena.rs"), Item::new("lib.rs"), renamed],
    );
    let report = viewer.refresh_labels(true);
    println!("-- equal instance swapped in: {}", summary(&report));
    print_tree(&viewer)?;

    let hide_tests = FnFilter::new(|_: &TreePath<Item>, item: &Item| item.name() != "smoke.rs");
    viewer.add_filter(Rc::new(hide_tests));
    println!("-- smoke.rs filtered out");
    print_tree(&viewer)?;

    println!("selection: {:?}", viewer.selection());
    println!("checked:   {:?}", viewer.checked_elements());
    println!("expanded:  {:?}", viewer.expanded_elements());
    Ok(())
}

fn table_demo() -> anyhow::Result<()> {
    let root = Item::new("rows");
    let model: Rc<LazyModel<Item>> = Rc::new(LazyModel::new());
    model.set_children(
        &root,
        (0..ROW_COUNT).map(|row| Item::new(format!("row {row}"))).collect(),
    );

    let options = ViewerOptions::default().with_virtual_mode(true);
    let viewer: Viewer<Item> = Viewer::with_options(TableControl::new(2), options);
    viewer.set_lazy_content_provider(model.clone());
    viewer.set_label_provider(Rc::new(ItemLabels::new()));
    viewer.set_input(Some(root));

    println!(
        "-- virtual table: {} rows, {} resolved",
        viewer.item_count(None),
        model.resolves()
    );

    let report = viewer.materialize(None, 40..48);
    println!("-- rows 40..48 scrolled into view: {}", summary(&report));
    let shown = viewer
        .with_nodes(|nodes| dump(nodes))
        .context("viewer busy while dumping the table")?;
    for line in shown.lines().filter(|line| !line.contains("<empty>")) {
        println!("{line}");
    }
    println!("resolved {} of {} rows", model.resolves(), ROW_COUNT);

    viewer.replace(None, 42, Item::new("row 42 (replaced)"));
    let replaced = viewer
        .find_node(&Item::new("row 42 (replaced)"))
        .context("replaced row has no node")?;
    println!("row 42 now shown by node {replaced}");

    viewer.set_item_count(ROW_COUNT / 2);
    println!("-- count halved: {} rows", viewer.item_count(None));
    Ok(())
}

fn print_tree(viewer: &Viewer<Item>) -> anyhow::Result<()> {
    let shown = viewer
        .with_nodes(|nodes| dump(nodes))
        .context("viewer busy while dumping the tree")?;
    print!("{shown}");
    Ok(())
}
