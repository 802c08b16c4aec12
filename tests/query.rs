use arc_browser::domain::Level;
use arc_browser::query::{Flag, QueryBuilder, Range, SearchForm, range_of};

fn form() -> SearchForm {
    SearchForm::new("DCM4CHEE", 20, "-StudyDate")
}

#[test]
fn range_of_empty_bounds_is_omitted() {
    assert_eq!(range_of("StudyDate", "", ""), None);
}

#[test]
fn range_of_equal_bounds_is_a_single_value() {
    assert_eq!(
        range_of("StudyDate", "20240101", "20240101"),
        Some("StudyDate=20240101".to_string())
    );
}

#[test]
fn range_of_open_bounds() {
    assert_eq!(
        range_of("StudyDate", "2024-01-01", ""),
        Some("StudyDate=20240101-".to_string())
    );
    assert_eq!(
        range_of("StudyTime", "", "12:30"),
        Some("StudyTime=-1230".to_string())
    );
}

#[test]
fn range_of_compares_raw_input() {
    // Same digits, different punctuation: still treated as a range.
    assert_eq!(
        range_of("StudyDate", "2024-01-01", "20240101"),
        Some("StudyDate=20240101-20240101".to_string())
    );
}

#[test]
fn studies_path_without_filters() {
    let form = form();
    assert_eq!(
        QueryBuilder::new(&form).studies(0),
        "rs/qido/DCM4CHEE/studies?includefield=all&offset=0&orderby=-StudyDate&limit=20"
    );
}

#[test]
fn studies_path_with_ranges_matchers_and_flags() {
    let mut form = form();
    form.study_date = Range::new("2024-01-01", "2024-01-31");
    form.study_time = Range::new("08:00", "08:00");
    form.set_matcher("PatientID", "P-001");
    form.set_matcher("ModalitiesInStudy", "CT");
    form.flags = vec![
        Flag {
            name: "fuzzymatching".to_string(),
            value: "true".to_string(),
            checked: true,
        },
        Flag {
            name: "withoutstudies".to_string(),
            value: "false".to_string(),
            checked: false,
        },
    ];

    assert_eq!(
        QueryBuilder::new(&form).studies(40),
        "rs/qido/DCM4CHEE/studies?includefield=all&offset=40&orderby=-StudyDate\
         &StudyDate=20240101-20240131&StudyTime=0800&limit=20\
         &PatientID=P-001&ModalitiesInStudy=CT&fuzzymatching=true"
    );
}

#[test]
fn series_and_instance_paths() {
    let form = form();
    let builder = QueryBuilder::new(&form);
    assert_eq!(
        builder.series("1.2.3", 20),
        "rs/qido/DCM4CHEE/studies/1.2.3/series?includefield=all&orderby=SeriesNumber&offset=20&limit=20"
    );
    assert_eq!(
        builder.instances("1.2.3", "1.2.3.4", 0),
        "rs/qido/DCM4CHEE/studies/1.2.3/series/1.2.3.4/instances?includefield=all&orderby=InstanceNumber&offset=0&limit=20"
    );
}

#[test]
fn children_path_depends_on_level() {
    let form = form();
    let builder = QueryBuilder::new(&form);
    assert_eq!(
        builder.children(Level::Study, "1.2.3", None, 0),
        Some(builder.series("1.2.3", 0))
    );
    assert_eq!(
        builder.children(Level::Series, "1.2.3", Some("1.2.3.4"), 0),
        Some(builder.instances("1.2.3", "1.2.3.4", 0))
    );
    assert_eq!(builder.children(Level::Series, "1.2.3", None, 0), None);
    assert_eq!(builder.children(Level::Instance, "1.2.3", Some("1.2.3.4"), 0), None);
}

#[test]
fn store_path_uses_the_form_aet() {
    let mut form = form();
    form.aet = "ARCHIVE".to_string();
    assert_eq!(QueryBuilder::new(&form).store(), "rs/stow/ARCHIVE/studies");
}

#[test]
fn pager_moves_by_page_size() {
    let form = SearchForm::new("DCM4CHEE", 10, "-StudyDate");
    let pager = form.pager();
    assert_eq!(pager.next(0), 10);
    assert_eq!(pager.previous(5), 0);
}
