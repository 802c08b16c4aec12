use arc_browser::inspector::{InspectorLine, inspect};
use arc_browser::qido::parse_records;

#[test]
fn sequences_are_listed_depth_first_with_item_markers() {
    let instances = parse_records(include_str!("fixtures/instances.json")).unwrap();
    let lines = inspect(&instances[1]);

    let position = lines
        .iter()
        .position(|line| {
            matches!(line, InspectorLine::Attribute { name, .. } if name == "ReferencedSeriesSequence")
        })
        .unwrap();
    let outline = lines[position..]
        .iter()
        .take(9)
        .map(|line| match line {
            InspectorLine::Attribute { name, .. } => format!("{}{name}", line.indent()),
            InspectorLine::Item { number, .. } => format!("{}Item #{number}", line.indent()),
        })
        .collect::<Vec<_>>();

    assert_eq!(
        outline,
        vec![
            "ReferencedSeriesSequence",
            ">Item #1",
            ">SeriesInstanceUID",
            ">ReferencedImageSequence",
            ">>Item #1",
            ">>ReferencedSOPInstanceUID",
            ">>Item #2",
            ">>ReferencedSOPInstanceUID",
            ">Item #2",
        ]
    );
    assert_eq!(lines.last().unwrap().depth(), 0);
}

#[test]
fn attribute_lines_carry_tag_vr_and_value() {
    let studies = parse_records(include_str!("fixtures/studies.json")).unwrap();
    let lines = inspect(&studies[0]);
    assert_eq!(lines.len(), studies[0].len());
    assert_eq!(
        lines[1],
        InspectorLine::Attribute {
            depth: 0,
            name: "PatientName".to_string(),
            tag: "(0010,0010)".to_string(),
            vr: "PN".to_string(),
            value: "Doe^Jane".to_string(),
        }
    );
    let modalities = lines
        .iter()
        .find(|line| matches!(line, InspectorLine::Attribute { name, .. } if name == "ModalitiesInStudy"))
        .unwrap();
    assert_matches::assert_matches!(modalities, InspectorLine::Attribute { value, .. } if value == "CT,PR");
}

#[test]
fn sequence_value_counts_items() {
    let instances = parse_records(include_str!("fixtures/instances.json")).unwrap();
    let lines = inspect(&instances[1]);
    assert!(lines.iter().any(|line| matches!(
        line,
        InspectorLine::Attribute { name, value, .. }
            if name == "ReferencedSeriesSequence" && value == "2 Item"
    )));
}
