//! Display strings for search results: dates, times, person names, tags and
//! the per-level table columns.

use crate::domain::{Attribute, Attributes, Level, SOP_CLASS_UID};

pub const STUDY_HEADERS: &[&str] = &[
    "Patient Name",
    "Patient ID",
    "Study Date",
    "Study Time",
    "Accession #",
    "Modalities",
    "Study Description",
    "#S",
    "#I",
];

pub const SERIES_HEADERS: &[&str] = &[
    "Station Name",
    "Series #",
    "PPS Date",
    "PPS Time",
    "Body Part",
    "Modality",
    "Series Description",
    "#I",
];

pub const INSTANCE_HEADERS: &[&str] = &[
    "SOP Class UID",
    "Instance #",
    "Content Date",
    "Content Time",
    "Content Description",
    "#F",
];

/// `YYYYMMDD` (or a 10 character `YYYY.MM.DD`) as `YYYY-MM-DD`.
pub fn format_date(value: &str) -> String {
    let chars = value.chars().collect::<Vec<_>>();
    if chars.len() < 8 {
        return value.to_string();
    }
    let month_start = if chars.len() == 10 { 5 } else { 4 };
    let year = chars[..4].iter().collect::<String>();
    let month = chars[month_start..month_start + 2].iter().collect::<String>();
    let day = chars[chars.len() - 2..].iter().collect::<String>();
    format!("{year}-{month}-{day}")
}

/// `HHMMSS[.FFFFFF]` (or an already separated `HH:MM:SS`) as `HH:MM:SS`.
pub fn format_time(value: &str) -> String {
    let chars = value.chars().collect::<Vec<_>>();
    if chars.get(2) == Some(&':') {
        return chars.iter().take(8).collect();
    }
    let digits = chars
        .iter()
        .take_while(|ch| ch.is_ascii_digit())
        .take(6)
        .copied()
        .collect::<Vec<_>>();
    digits
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

pub fn date_of(attribute: Option<&Attribute>) -> String {
    attribute
        .and_then(Attribute::first_string)
        .map(|value| format_date(&value))
        .unwrap_or_default()
}

pub fn time_of(attribute: Option<&Attribute>) -> String {
    attribute
        .and_then(Attribute::first_string)
        .map(|value| format_time(&value))
        .unwrap_or_default()
}

pub fn value_of(attribute: Option<&Attribute>) -> String {
    attribute
        .and_then(Attribute::values)
        .map(|values| values.join(","))
        .unwrap_or_default()
}

pub fn pn_of(attribute: Option<&Attribute>) -> String {
    attribute
        .and_then(Attribute::alphabetic_name)
        .map(str::to_string)
        .unwrap_or_default()
}

pub fn int_of(attribute: Option<&Attribute>) -> usize {
    attribute
        .and_then(Attribute::first_string)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

pub fn tag_to_string(tag: &str) -> String {
    match (tag.get(..4), tag.get(4..)) {
        (Some(group), Some(element)) => format!("({group},{element})"),
        _ => format!("({tag})"),
    }
}

/// Value shown by the attribute inspector.
pub fn display_value(attribute: &Attribute) -> String {
    if let Some(values) = attribute.values() {
        return values.join(",");
    }
    if let Some(name) = attribute.alphabetic_name() {
        return name.to_string();
    }
    if let Some(items) = &attribute.sequence {
        return format!("{} Item", items.len());
    }
    String::new()
}

pub fn content_description_of(instance: &Attributes) -> String {
    if instance.contains("ContentDescription") {
        return value_of(instance.get("ContentDescription"));
    }
    if instance.contains("Rows") {
        return image_description_of(instance);
    }
    if let Some(concept) = instance
        .sequence("ConceptNameCodeSequence")
        .and_then(|items| items.first())
    {
        return sr_description_of(instance, concept);
    }
    value_of(instance.get(SOP_CLASS_UID))
}

fn image_description_of(instance: &Attributes) -> String {
    format!(
        "{}x{} {} bit {}",
        value_of(instance.get("Columns")),
        value_of(instance.get("Rows")),
        value_of(instance.get("BitsAllocated")),
        value_of(instance.get("ImageType"))
    )
}

fn sr_description_of(instance: &Attributes, concept: &Attributes) -> String {
    let mut description = String::new();
    for flag in ["PreliminaryFlag", "CompletionFlag", "VerificationFlag"] {
        if instance.contains(flag) {
            description.push_str(&value_of(instance.get(flag)));
            description.push(' ');
        }
    }
    description.push_str(&value_of(concept.get("CodeMeaning")));
    description
}

pub fn headers(level: Level) -> &'static [&'static str] {
    match level {
        Level::Study => STUDY_HEADERS,
        Level::Series => SERIES_HEADERS,
        Level::Instance => INSTANCE_HEADERS,
    }
}

pub fn columns(level: Level, record: &Attributes) -> Vec<String> {
    match level {
        Level::Study => study_columns(record),
        Level::Series => series_columns(record),
        Level::Instance => instance_columns(record),
    }
}

pub fn study_columns(study: &Attributes) -> Vec<String> {
    vec![
        pn_of(study.get("PatientName")),
        value_of(study.get("PatientID")),
        date_of(study.get("StudyDate")),
        time_of(study.get("StudyTime")),
        value_of(study.get("AccessionNumber")),
        value_of(study.get("ModalitiesInStudy")),
        value_of(study.get("StudyDescription")),
        value_of(study.get("NumberOfStudyRelatedSeries")),
        value_of(study.get("NumberOfStudyRelatedInstances")),
    ]
}

pub fn series_columns(series: &Attributes) -> Vec<String> {
    vec![
        value_of(series.get("StationName")),
        value_of(series.get("SeriesNumber")),
        date_of(series.get("PerformedProcedureStepStartDate")),
        time_of(series.get("PerformedProcedureStepStartTime")),
        value_of(series.get("BodyPartExamined")),
        value_of(series.get("Modality")),
        value_of(series.get("SeriesDescription")),
        value_of(series.get("NumberOfSeriesRelatedInstances")),
    ]
}

pub fn instance_columns(instance: &Attributes) -> Vec<String> {
    let (date, time) = if instance.contains("ContentDate") {
        (instance.get("ContentDate"), instance.get("ContentTime"))
    } else {
        (
            instance.get("PresentationCreationDate"),
            instance.get("PresentationCreationTime"),
        )
    };
    vec![
        instance.first_string(SOP_CLASS_UID).unwrap_or_default(),
        value_of(instance.get("InstanceNumber")),
        date_of(date),
        time_of(time),
        content_description_of(instance),
        value_of(instance.get("NumberOfFrames")),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn formats_dates() {
        assert_eq!(format_date("20240131"), "2024-01-31");
        assert_eq!(format_date("2024.01.31"), "2024-01-31");
        assert_eq!(format_date("2024"), "2024");
    }

    #[test]
    fn formats_times() {
        assert_eq!(format_time("235959"), "23:59:59");
        assert_eq!(format_time("235959.123456"), "23:59:59");
        assert_eq!(format_time("10:30:15.5"), "10:30:15");
        assert_eq!(format_time("1030"), "10:30");
    }

    #[test]
    fn formats_tags() {
        assert_eq!(tag_to_string("0020000D"), "(0020,000D)");
    }

    #[test]
    fn display_value_order() {
        let attrs = record(json!({
            "Modalities": {"tag": "00080061", "vr": "CS", "Value": ["CT", "MR"]},
            "PatientName": {"tag": "00100010", "vr": "PN", "PersonName": [{"Alphabetic": "Doe^Jane"}]},
            "Seq": {"tag": "00081115", "vr": "SQ", "Sequence": [{}, {}]},
            "Empty": {"tag": "00080050", "vr": "SH"}
        }));
        assert_eq!(display_value(attrs.get("Modalities").unwrap()), "CT,MR");
        assert_eq!(display_value(attrs.get("PatientName").unwrap()), "Doe^Jane");
        assert_eq!(display_value(attrs.get("Seq").unwrap()), "2 Item");
        assert_eq!(display_value(attrs.get("Empty").unwrap()), "");
    }

    #[test]
    fn image_content_description() {
        let instance = record(json!({
            "Rows": {"tag": "00280010", "vr": "US", "Value": [512]},
            "Columns": {"tag": "00280011", "vr": "US", "Value": [256]},
            "BitsAllocated": {"tag": "00280100", "vr": "US", "Value": [16]},
            "ImageType": {"tag": "00080008", "vr": "CS", "Value": ["ORIGINAL", "PRIMARY"]}
        }));
        assert_eq!(
            content_description_of(&instance),
            "256x512 16 bit ORIGINAL,PRIMARY"
        );
    }

    #[test]
    fn sr_content_description() {
        let instance = record(json!({
            "CompletionFlag": {"tag": "0040A491", "vr": "CS", "Value": ["COMPLETE"]},
            "VerificationFlag": {"tag": "0040A493", "vr": "CS", "Value": ["VERIFIED"]},
            "ConceptNameCodeSequence": {"tag": "0040A043", "vr": "SQ", "Sequence": [
                {"CodeMeaning": {"tag": "00080104", "vr": "LO", "Value": ["Radiology Report"]}}
            ]}
        }));
        assert_eq!(
            content_description_of(&instance),
            "COMPLETE VERIFIED Radiology Report"
        );
    }

    #[test]
    fn instance_dates_fall_back_to_presentation_creation() {
        let instance = record(json!({
            "SOPClassUID": {"tag": "00080016", "vr": "UI", "Value": ["1.2.840.10008.5.1.4.1.1.11.1"]},
            "PresentationCreationDate": {"tag": "00700082", "vr": "DA", "Value": ["20230102"]},
            "PresentationCreationTime": {"tag": "00700083", "vr": "TM", "Value": ["080910"]}
        }));
        let columns = instance_columns(&instance);
        assert_eq!(columns[2], "2023-01-02");
        assert_eq!(columns[3], "08:09:10");
        assert_eq!(columns[4], "1.2.840.10008.5.1.4.1.1.11.1");
    }
}
