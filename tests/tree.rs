use assert_matches::assert_matches;

use arc_browser::domain::{Attributes, Level};
use arc_browser::error::BrowserError;
use arc_browser::qido::parse_records;
use arc_browser::tree::{Applied, BrowserTree, RowId, RowKind};

fn studies() -> Vec<Attributes> {
    parse_records(include_str!("fixtures/studies.json")).unwrap()
}

fn series() -> Vec<Attributes> {
    parse_records(include_str!("fixtures/series.json")).unwrap()
}

fn instances() -> Vec<Attributes> {
    parse_records(include_str!("fixtures/instances.json")).unwrap()
}

fn loaded_tree() -> BrowserTree {
    let mut tree = BrowserTree::new();
    let ticket = tree.begin_search(0);
    assert_eq!(tree.apply_studies(&ticket, studies()), Applied::Inserted(2));
    tree
}

fn expand(tree: &mut BrowserTree, row: RowId, records: Vec<Attributes>) -> Applied {
    let ticket = tree.begin_expand(row, 0).unwrap();
    tree.apply_children(&ticket, records).unwrap()
}

/// Walks every row and checks span == 1 + rows rendered beneath it.
fn assert_spans(tree: &BrowserTree) {
    let rows = tree.visible_rows();
    for (index, row) in rows.iter().enumerate() {
        let RowKind::Record(id) = row.kind else {
            continue;
        };
        let beneath = rows[index + 1..]
            .iter()
            .take_while(|next| next.depth > row.depth)
            .count();
        assert_eq!(tree.span(id), 1 + beneath, "span of row {id}");
    }
}

#[test]
fn search_numbers_rows_from_offset() {
    let mut tree = BrowserTree::new();
    let ticket = tree.begin_search(40);
    tree.apply_studies(&ticket, studies());
    let numbers = tree
        .studies()
        .iter()
        .map(|id| tree.row(*id).unwrap().number)
        .collect::<Vec<_>>();
    assert_eq!(numbers, vec![41, 42]);
    assert_eq!(tree.study_offset(), 40);
}

#[test]
fn expanding_a_study_inserts_header_and_series_after_it() {
    let mut tree = loaded_tree();
    let first = tree.studies()[0];
    let second = tree.studies()[1];
    assert_eq!(tree.span(first), 1);

    assert_eq!(expand(&mut tree, first, series()), Applied::Inserted(2));

    // N series plus one header row.
    assert_eq!(tree.span(first), 1 + 2 + 1);
    let rows = tree.visible_rows();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].kind, RowKind::Record(first));
    assert_matches!(
        rows[1].kind,
        RowKind::ChildHeader { owner, level: Level::Series } if owner == first
    );
    assert_matches!(rows[2].kind, RowKind::Record(_));
    assert_eq!(rows[2].depth, 1);
    assert_eq!(rows[4].kind, RowKind::Record(second));
    assert_spans(&tree);
}

#[test]
fn nested_expansion_and_attributes_keep_spans_consistent() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    expand(&mut tree, study, series());
    let series_row = tree.row(study).unwrap().state.children().unwrap().rows[0];

    expand(&mut tree, series_row, instances());
    assert_eq!(tree.span(series_row), 1 + 1 + 2);
    assert_eq!(tree.span(study), 1 + 1 + tree.span(series_row) + 1);
    assert_spans(&tree);

    let instance = tree.row(series_row).unwrap().state.children().unwrap().rows[1];
    assert!(tree.toggle_attributes(instance).unwrap());
    assert_eq!(tree.span(instance), 2);
    assert_eq!(tree.span(study), 1 + 1 + (1 + 1 + 1 + 2) + 1);
    assert_spans(&tree);

    assert!(tree.toggle_attributes(study).unwrap());
    assert_spans(&tree);
    assert!(!tree.toggle_attributes(instance).unwrap());
    assert_spans(&tree);
}

#[test]
fn collapse_restores_the_span_before_expansion() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    tree.toggle_attributes(study).unwrap();
    let before_span = tree.span(study);
    let before_rows = tree.visible_rows();
    let before_len = tree.len();

    expand(&mut tree, study, series());
    let series_row = tree.row(study).unwrap().state.children().unwrap().rows[0];
    expand(&mut tree, series_row, instances());

    let removed = tree.collapse(study).unwrap();
    assert_eq!(removed, 1 + 2 + 1 + 2);
    assert_eq!(tree.span(study), before_span);
    assert_eq!(tree.visible_rows(), before_rows);
    assert_eq!(tree.len(), before_len);
    assert!(tree.row(series_row).is_none());
    assert!(tree.row(study).unwrap().state.attributes_open());
}

#[test]
fn collapsing_a_collapsed_row_removes_nothing() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    assert_eq!(tree.collapse(study).unwrap(), 0);
    assert_eq!(tree.span(study), 1);
}

#[test]
fn paging_children_replaces_the_previous_page() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    expand(&mut tree, study, series());

    let ticket = tree.begin_expand(study, 2).unwrap();
    assert_eq!(tree.span(study), 1);
    tree.apply_children(&ticket, series()[..1].to_vec()).unwrap();

    assert_eq!(tree.child_offset(study), Some(2));
    let page = tree.row(study).unwrap().state.children().unwrap().clone();
    assert_eq!(page.rows.len(), 1);
    assert_eq!(tree.row(page.rows[0]).unwrap().number, 3);
    assert_eq!(tree.len(), 3);
    assert_spans(&tree);
}

#[test]
fn response_for_a_superseded_expansion_is_stale() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    let first = tree.begin_expand(study, 0).unwrap();
    let second = tree.begin_expand(study, 0).unwrap();

    assert_eq!(tree.apply_children(&first, series()).unwrap(), Applied::Stale);
    assert_eq!(tree.span(study), 1);
    assert_eq!(tree.apply_children(&second, series()).unwrap(), Applied::Inserted(2));
    assert_eq!(tree.apply_children(&second, series()).unwrap(), Applied::Stale);
    assert_spans(&tree);
}

#[test]
fn response_after_collapse_is_stale() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    let ticket = tree.begin_expand(study, 0).unwrap();
    tree.collapse(study).unwrap();
    assert_eq!(tree.apply_children(&ticket, series()).unwrap(), Applied::Stale);
    assert_eq!(tree.visible_rows().len(), 2);
}

#[test]
fn children_response_after_new_search_is_stale() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    let ticket = tree.begin_expand(study, 0).unwrap();

    let search = tree.begin_search(0);
    tree.apply_studies(&search, studies());
    assert_eq!(tree.apply_children(&ticket, series()).unwrap(), Applied::Stale);
}

#[test]
fn older_search_response_is_stale() {
    let mut tree = BrowserTree::new();
    let old = tree.begin_search(0);
    let new = tree.begin_search(20);
    assert_eq!(tree.apply_studies(&new, studies()), Applied::Inserted(2));
    assert_eq!(tree.apply_studies(&old, studies()[..1].to_vec()), Applied::Stale);
    assert_eq!(tree.study_offset(), 20);
    assert_eq!(tree.studies().len(), 2);
}

#[test]
fn instances_cannot_be_expanded() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    expand(&mut tree, study, series());
    let series_row = tree.row(study).unwrap().state.children().unwrap().rows[0];
    expand(&mut tree, series_row, instances());
    let instance = tree.row(series_row).unwrap().state.children().unwrap().rows[0];

    assert_matches!(
        tree.begin_expand(instance, 0),
        Err(BrowserError::NotExpandable(Level::Instance))
    );
    assert_matches!(tree.begin_expand(9999, 0), Err(BrowserError::UnknownRow(9999)));
}

#[test]
fn series_expansion_carries_both_uids() {
    let mut tree = loaded_tree();
    let study = tree.studies()[0];
    expand(&mut tree, study, series());
    let series_row = tree.row(study).unwrap().state.children().unwrap().rows[1];

    let ticket = tree.begin_expand(series_row, 0).unwrap();
    assert_eq!(ticket.level, Level::Series);
    assert_eq!(ticket.study_uid, "1.2.840.1");
    assert_eq!(ticket.series_uid.as_deref(), Some("1.2.840.1.2"));
    assert_eq!(tree.ancestors(series_row), vec![study]);
}

#[test]
fn spans_hold_through_mixed_operations() {
    let mut tree = loaded_tree();
    let [first, second] = [tree.studies()[0], tree.studies()[1]];

    expand(&mut tree, second, series());
    assert_spans(&tree);
    tree.toggle_attributes(first).unwrap();
    assert_spans(&tree);
    expand(&mut tree, first, series());
    assert_spans(&tree);
    let series_row = tree.row(first).unwrap().state.children().unwrap().rows[1];
    tree.toggle_attributes(series_row).unwrap();
    expand(&mut tree, series_row, instances());
    assert_spans(&tree);
    tree.collapse(series_row).unwrap();
    assert_spans(&tree);
    assert!(tree.row(series_row).unwrap().state.attributes_open());
    tree.collapse(second).unwrap();
    tree.toggle_attributes(first).unwrap();
    assert_spans(&tree);
    assert_eq!(tree.span(first), 1 + 1 + 1 + 2);
}
