mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{names, Setup};
use viewer_core::ViewerOptions;
use viewer_testing::Item;
use viewer_widgets::ListControl;

#[test]
fn selection_follows_elements_across_reorder() {
    let setup = Setup::list(&["a", "b", "c"]);
    let top = setup.top();
    setup.viewer.set_selection(&[top[1].clone()], false);
    setup.events.take();

    setup.model.set_children(
        &setup.root,
        vec![top[2].clone(), top[1].clone(), top[0].clone()],
    );
    setup.viewer.refresh();

    assert_eq!(names(&setup.viewer.selection()), vec!["b"]);
    assert!(setup.events.selections().is_empty());
}

#[test]
fn set_selection_notifies_listeners() {
    let setup = Setup::list(&["a", "b", "c"]);
    setup.viewer.set_selection(&Item::many(&["c", "a"]), false);
    assert_eq!(names(&setup.viewer.selection()), vec!["a", "c"]);
    assert_eq!(
        setup.events.selections().last().map(|selection| names(selection)),
        Some(vec!["a".to_string(), "c".to_string()])
    );
}

#[test]
fn unknown_elements_are_left_out_of_the_selection() {
    let setup = Setup::list(&["a"]);
    setup.viewer.set_selection(&Item::many(&["a", "zz"]), false);
    assert_eq!(names(&setup.viewer.selection()), vec!["a"]);
}

#[test]
fn losing_a_selected_element_reports_the_reduced_selection() {
    let setup = Setup::list(&["a", "b", "c"]);
    let top = setup.top();
    setup
        .viewer
        .set_selection(&[top[1].clone(), top[2].clone()], false);
    setup.events.take();

    setup
        .model
        .set_children(&setup.root, vec![top[0].clone(), top[2].clone()]);
    setup.viewer.refresh();

    assert_eq!(names(&setup.viewer.selection()), vec!["c"]);
    assert_eq!(
        setup.events.selections(),
        vec![vec![top[2].clone()]]
    );
}

#[test]
fn invalid_selection_handler_can_pick_a_fallback() {
    let setup = Setup::list(&["a", "b", "c"]);
    let top = setup.top();
    setup.viewer.set_selection(&[top[1].clone()], false);
    let seen = Rc::new(RefCell::new(None));
    {
        let seen = Rc::clone(&seen);
        setup
            .viewer
            .set_invalid_selection_handler(Box::new(move |previous: &[Item], restored: &[Item]| {
                *seen.borrow_mut() = Some((names(previous), names(restored)));
                Some(vec![Item::new("a")])
            }));
    }
    setup.events.take();

    setup
        .model
        .set_children(&setup.root, vec![top[0].clone(), top[2].clone()]);
    setup.viewer.refresh();

    assert_eq!(
        seen.borrow().clone(),
        Some((vec!["b".to_string()], Vec::new()))
    );
    assert_eq!(names(&setup.viewer.selection()), vec!["a"]);
    assert_eq!(setup.events.selections(), vec![vec![Item::new("a")]]);
}

#[test]
fn selection_requested_mid_refresh_wins_over_the_restore() {
    let setup = Setup::list(&["a", "b", "c"]);
    let top = setup.top();
    setup.viewer.set_selection(&[top[0].clone()], false);
    let inner = setup.viewer.clone();
    let deferred = Rc::new(RefCell::new(Vec::new()));
    {
        let deferred = Rc::clone(&deferred);
        setup.model.on_fetch(move |_| {
            let report = inner.set_selection(&[Item::new("c")], false);
            deferred.borrow_mut().push(report.deferred);
        });
    }

    setup.viewer.refresh();

    assert_eq!(*deferred.borrow(), vec![true]);
    assert_eq!(names(&setup.viewer.selection()), vec!["c"]);
}

#[test]
fn selection_is_not_restored_when_preservation_is_off() {
    let options = ViewerOptions::default().with_preserve_selection(false);
    let setup = Setup::new(ListControl::new(), options);
    setup.model.set_children(&setup.root, Item::many(&["a", "b"]));
    setup.viewer.set_input(Some(setup.root.clone()));
    let top = setup.top();
    setup.viewer.set_selection(&[top[1].clone()], false);

    // b's node is rebound to x and stays selected.
    setup
        .model
        .set_children(&setup.root, vec![top[0].clone(), Item::new("x")]);
    setup.viewer.refresh();

    assert!(setup.events.selections().len() == 1);
    assert_eq!(names(&setup.viewer.selection()), vec!["x"]);
}

#[test]
fn selected_paths_are_top_level_paths_in_lists() {
    let setup = Setup::list(&["a", "b"]);
    setup.viewer.set_selection(&[Item::new("b")], false);
    let paths = setup.viewer.selected_paths();
    assert_eq!(paths.len(), 1);
    assert_eq!(names(paths[0].segments()), vec!["b"]);
}
