use assert_matches::assert_matches;

use arc_browser::domain::Attributes;
use arc_browser::error::BrowserError;
use arc_browser::qido::parse_records;
use arc_browser::wado::{
    InstanceLinks, Selector, ViewKind, gsps_uri, list_links, number_of_ref_images,
    referenced_series, wado_uri_of,
};

const CT_RETRIEVE: &str = "/studies/1.2.840.1/series/1.2.840.1.1/instances/1.2.840.1.1.1";

fn instances() -> Vec<Attributes> {
    parse_records(include_str!("fixtures/instances.json")).unwrap()
}

#[test]
fn retrieve_uri_becomes_single_object_query() {
    assert_eq!(
        wado_uri_of("http://archive/rs/studies/1.2/series/1.2.3/instances/1.2.3.4"),
        "http://archive/rs?requestType=WADO&studyUID=1.2&seriesUID=1.2.3&objectUID=1.2.3.4"
    );
}

#[test]
fn multiframe_instance_links() {
    let links = InstanceLinks::for_instance(&instances()[0]).unwrap();
    let wado = "?requestType=WADO&studyUID=1.2.840.1&seriesUID=1.2.840.1.1&objectUID=1.2.840.1.1.1";
    assert_eq!(links.retrieve_uri, CT_RETRIEVE);
    assert_eq!(links.wado_uri, wado);
    assert_eq!(links.download, format!("{wado}&contentType=application/dicom"));
    assert_eq!(
        links.download_compressed,
        format!("{wado}&contentType=application/dicom&transferSyntax=*")
    );
    assert_matches!(&links.view, ViewKind::Frames { selector } if selector.count() == 12);
    assert_eq!(
        links.view_uri().unwrap(),
        format!("{wado}&contentType=image/jpeg&frameNumber=1")
    );
}

#[test]
fn frame_selection_is_clamped() {
    let mut links = InstanceLinks::for_instance(&instances()[0]).unwrap();
    let selector = links.selector_mut().unwrap();
    selector.select(50);
    assert_eq!(selector.selected(), 11);
    selector.select_next();
    assert_eq!(selector.selected(), 11);
    assert!(links.view_uri().unwrap().ends_with("&frameNumber=12"));
}

#[test]
fn selector_exists_only_for_several_options() {
    assert_eq!(Selector::new("Frame", 0), None);
    assert_eq!(Selector::new("Frame", 1), None);
    let mut selector = Selector::new("Frame", 3).unwrap();
    assert_eq!(selector.options(), vec!["1", "2", "3"]);
    selector.select_previous();
    assert_eq!(selector.selected(), 0);
}

#[test]
fn gsps_references_flatten_across_series() {
    let gsps = &instances()[1];
    let references = referenced_series(gsps);
    assert_eq!(references.len(), 2);
    assert_eq!(number_of_ref_images(&references), 3);

    let base = "?requestType=WADO&studyUID=1.2.840.1&presentationSeriesUID=1.2.840.1.2\
                &presentationUID=1.2.840.1.2.1";
    assert_eq!(
        gsps_uri(gsps, 1).unwrap(),
        format!("{base}&seriesUID=1.2.840.1.1&objectUID=1.2.840.1.1.2&contentType=image/jpeg&frameNumber=1")
    );
    assert_eq!(
        gsps_uri(gsps, 2).unwrap(),
        format!("{base}&seriesUID=1.2.840.1.3&objectUID=1.2.840.1.3.1&contentType=image/jpeg&frameNumber=1")
    );
    assert_eq!(gsps_uri(gsps, 3), None);
}

#[test]
fn gsps_view_follows_the_selector() {
    let mut links = InstanceLinks::for_instance(&instances()[1]).unwrap();
    assert!(links.view_uri().unwrap().contains("&objectUID=1.2.840.1.1.1&"));
    links.selector_mut().unwrap().select(2);
    assert!(links.view_uri().unwrap().contains("&objectUID=1.2.840.1.3.1&"));
}

#[test]
fn gsps_without_references_has_nothing_to_view() {
    let mut gsps = instances()[1].clone();
    let mut stripped = Attributes::new();
    for (name, attribute) in gsps.iter() {
        if name != "ReferencedSeriesSequence" {
            stripped.insert(name, attribute.clone());
        }
    }
    gsps = stripped;

    let links = InstanceLinks::for_instance(&gsps).unwrap();
    assert_matches!(
        &links.view,
        ViewKind::Presentation { selector: None, references } if references.is_empty()
    );
    assert_matches!(links.view_uri(), Err(BrowserError::NoReference(0)));
}

#[test]
fn instance_without_retrieve_uri_has_no_links() {
    assert_matches!(
        InstanceLinks::for_instance(&Attributes::new()),
        Err(BrowserError::MissingAttribute("RetrieveURI"))
    );
}

#[test]
fn link_listing_keeps_going_past_broken_instances() {
    let mut records = instances();
    let mut gsps = Attributes::new();
    for (name, attribute) in records[1].iter() {
        if name != "ReferencedSeriesSequence" {
            gsps.insert(name, attribute.clone());
        }
    }
    records.push(gsps);
    records.insert(1, Attributes::new());

    let listing = list_links(&records);
    assert_eq!(listing.len(), 4);

    assert_eq!(listing[0].sop_instance_uid, "1.2.840.1.1.1");
    assert!(listing[0].view_uri.as_deref().unwrap().ends_with("&frameNumber=1"));
    assert_eq!(listing[0].error, None);

    assert!(listing[1].links.is_none());
    assert!(listing[1].error.as_deref().unwrap().contains("RetrieveURI"));

    assert!(listing[2].view_uri.is_some());

    assert_eq!(listing[3].sop_instance_uid, "1.2.840.1.2.1");
    assert!(listing[3].links.is_some());
    assert_eq!(listing[3].view_uri, None);
    assert!(listing[3].error.is_some());

    let json = serde_json::to_value(&listing).unwrap();
    assert!(json[1].get("links").is_none());
    assert!(json[0].get("error").is_none());
}
