use std::fs;

use assert_matches::assert_matches;

use arc_browser::config::{
    Config, ConfigLoader, DEFAULT_AET, DEFAULT_BASE_URL, DEFAULT_LIMIT, Overrides,
};
use arc_browser::error::BrowserError;
use arc_browser::query::QueryBuilder;

#[test]
fn config_file_values_feed_the_search_form() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("arc-browser.json");
    fs::write(
        &path,
        r#"{
            "base_url": "https://pacs.example.org/dcm4chee-arc",
            "aet": "ARCHIVE",
            "limit": 50,
            "order_by": "PatientName",
            "download_dir": "/tmp/dicom",
            "matchers": [{ "name": "ModalitiesInStudy", "value": "MR" }],
            "flags": [{ "name": "fuzzymatching", "value": "true", "checked": true }]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.source.as_deref(), Some(path.as_path()));
    assert_eq!(resolved.base_url, "https://pacs.example.org/dcm4chee-arc");
    assert_eq!(resolved.download_dir, "/tmp/dicom");

    let form = resolved.search_form();
    assert_eq!(
        QueryBuilder::new(&form).studies(0),
        "rs/qido/ARCHIVE/studies?includefield=all&offset=0&orderby=PatientName&limit=50\
         &ModalitiesInStudy=MR&fuzzymatching=true"
    );
}

#[test]
fn partial_config_falls_back_to_defaults() {
    let config: Config = serde_json::from_str(r#"{ "aet": "ARCHIVE" }"#).unwrap();
    let resolved = ConfigLoader::resolve_config(config, None).unwrap();
    assert_eq!(resolved.aet, "ARCHIVE");
    assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
    assert_eq!(resolved.limit, DEFAULT_LIMIT);
}

#[test]
fn explicit_config_path_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("missing.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(BrowserError::ConfigRead(path)) if path == missing
    );
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("arc-browser.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(BrowserError::ConfigParse(_))
    );
}

#[test]
fn zero_page_size_is_rejected() {
    let config: Config = serde_json::from_str(r#"{ "limit": 0 }"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config, None),
        Err(BrowserError::InvalidLimit(_))
    );

    let mut resolved = ConfigLoader::resolve_config(Config::default(), None).unwrap();
    assert_matches!(
        resolved.apply(Overrides {
            limit: Some(0),
            ..Overrides::default()
        }),
        Err(BrowserError::InvalidLimit(_))
    );
    assert_eq!(resolved.aet, DEFAULT_AET);
}
