use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::BrowserError;

pub const STUDY_INSTANCE_UID: &str = "StudyInstanceUID";
pub const SERIES_INSTANCE_UID: &str = "SeriesInstanceUID";
pub const SOP_CLASS_UID: &str = "SOPClassUID";
pub const SOP_INSTANCE_UID: &str = "SOPInstanceUID";
pub const RETRIEVE_URI: &str = "RetrieveURI";
pub const NUMBER_OF_FRAMES: &str = "NumberOfFrames";
pub const REFERENCED_SERIES_SEQUENCE: &str = "ReferencedSeriesSequence";
pub const REFERENCED_IMAGE_SEQUENCE: &str = "ReferencedImageSequence";
pub const REFERENCED_SOP_INSTANCE_UID: &str = "ReferencedSOPInstanceUID";

/// Grayscale Softcopy Presentation State Storage.
pub const GSPS_SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.11.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Study,
    Series,
    Instance,
}

impl Level {
    pub fn child(self) -> Option<Level> {
        match self {
            Level::Study => Some(Level::Series),
            Level::Series => Some(Level::Instance),
            Level::Instance => None,
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Level::Study => "studies",
            Level::Series => "series",
            Level::Instance => "instances",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Study => write!(f, "study"),
            Level::Series => write!(f, "series"),
            Level::Instance => write!(f, "instance"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonName {
    #[serde(rename = "Alphabetic", default, skip_serializing_if = "Option::is_none")]
    pub alphabetic: Option<String>,
    #[serde(rename = "Ideographic", default, skip_serializing_if = "Option::is_none")]
    pub ideographic: Option<String>,
    #[serde(rename = "Phonetic", default, skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
}

/// One data element as returned by the archive's JSON search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub vr: String,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<Value>>,
    #[serde(rename = "Sequence", default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<Attributes>>,
    #[serde(rename = "PersonName", default, skip_serializing_if = "Option::is_none")]
    pub person_name: Option<Vec<PersonName>>,
}

impl Attribute {
    pub fn values(&self) -> Option<Vec<String>> {
        self.value
            .as_ref()
            .map(|values| values.iter().map(primitive_to_string).collect())
    }

    pub fn first_string(&self) -> Option<String> {
        self.value
            .as_ref()
            .and_then(|values| values.first())
            .map(primitive_to_string)
    }

    pub fn alphabetic_name(&self) -> Option<&str> {
        self.person_name
            .as_ref()
            .and_then(|names| names.first())
            .and_then(|name| name.alphabetic.as_deref())
    }
}

/// Attribute name to element, in the order the archive sent them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, Attribute)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, attribute: Attribute) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = attribute,
            None => self.entries.push((name, attribute)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, attribute)| attribute)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.entries
            .iter()
            .map(|(name, attribute)| (name.as_str(), attribute))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_string(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Attribute::first_string)
    }

    pub fn require_string(&self, name: &'static str) -> Result<String, BrowserError> {
        self.first_string(name)
            .ok_or(BrowserError::MissingAttribute(name))
    }

    pub fn sequence(&self, name: &str) -> Option<&[Attributes]> {
        self.get(name)
            .and_then(|attribute| attribute.sequence.as_deref())
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, attribute) in &self.entries {
            map.serialize_entry(name, attribute)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttributesVisitor;

        impl<'de> Visitor<'de> for AttributesVisitor {
            type Value = Attributes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of attribute names to elements")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Attributes, A::Error> {
                let mut attributes = Attributes::new();
                while let Some((name, attribute)) = access.next_entry::<String, Attribute>()? {
                    attributes.insert(name, attribute);
                }
                Ok(attributes)
            }
        }

        deserializer.deserialize_map(AttributesVisitor)
    }
}

fn primitive_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        Value::Object(object) => object
            .get("Alphabetic")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Value::Array(_) => value.to_string(),
    }
}
