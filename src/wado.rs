use std::fs;
use std::io;

use camino::Utf8Path;
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::debug;

use crate::domain::{
    Attributes, GSPS_SOP_CLASS_UID, NUMBER_OF_FRAMES, REFERENCED_IMAGE_SEQUENCE,
    REFERENCED_SERIES_SEQUENCE, REFERENCED_SOP_INSTANCE_UID, RETRIEVE_URI, SERIES_INSTANCE_UID,
    SOP_CLASS_UID, SOP_INSTANCE_UID,
};
use crate::error::BrowserError;
use crate::format::int_of;
use crate::qido::{build_http_client, join_url, normalize_base_url, status_text};

const APPLICATION_DICOM: &str = "&contentType=application/dicom";
const ANY_TRANSFER_SYNTAX: &str = "&transferSyntax=*";
const IMAGE_JPEG: &str = "&contentType=image/jpeg";

/// Rewrites a `.../studies/{s}/series/{r}/instances/{i}` retrieve URI into the
/// single-object query form.
pub fn wado_uri_of(retrieve_uri: &str) -> String {
    retrieve_uri
        .replacen("/studies/", "?requestType=WADO&studyUID=", 1)
        .replacen("/series/", "&seriesUID=", 1)
        .replacen("/instances/", "&objectUID=", 1)
}

pub fn download_uri(wado_uri: &str) -> String {
    format!("{wado_uri}{APPLICATION_DICOM}")
}

/// Same as [`download_uri`] but lets the archive keep the stored transfer syntax.
pub fn download_compressed_uri(wado_uri: &str) -> String {
    format!("{wado_uri}{APPLICATION_DICOM}{ANY_TRANSFER_SYNTAX}")
}

pub fn frame_uri(wado_uri: &str, frame: usize) -> String {
    format!("{wado_uri}{IMAGE_JPEG}&frameNumber={frame}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferencedSeries {
    pub series_uid: String,
    pub instance_uids: Vec<String>,
}

pub fn referenced_series(instance: &Attributes) -> Vec<ReferencedSeries> {
    instance
        .sequence(REFERENCED_SERIES_SEQUENCE)
        .unwrap_or_default()
        .iter()
        .map(|series| ReferencedSeries {
            series_uid: series.first_string(SERIES_INSTANCE_UID).unwrap_or_default(),
            instance_uids: series
                .sequence(REFERENCED_IMAGE_SEQUENCE)
                .unwrap_or_default()
                .iter()
                .map(|image| {
                    image
                        .first_string(REFERENCED_SOP_INSTANCE_UID)
                        .unwrap_or_default()
                })
                .collect(),
        })
        .collect()
}

pub fn number_of_ref_images(references: &[ReferencedSeries]) -> usize {
    references
        .iter()
        .map(|series| series.instance_uids.len())
        .sum()
}

/// Maps a flattened referenced-image index onto the referenced series and
/// instance it falls in, and builds the presentation-state view URI for it.
pub fn presentation_uri(
    retrieve_uri: &str,
    references: &[ReferencedSeries],
    index: usize,
) -> Option<String> {
    let mut index = index;
    for series in references {
        if let Some(instance_uid) = series.instance_uids.get(index) {
            let base = retrieve_uri
                .replacen("/studies/", "?requestType=WADO&studyUID=", 1)
                .replacen("/series/", "&presentationSeriesUID=", 1)
                .replacen("/instances/", "&presentationUID=", 1);
            return Some(format!(
                "{base}&seriesUID={}&objectUID={instance_uid}{IMAGE_JPEG}&frameNumber=1",
                series.series_uid
            ));
        }
        index -= series.instance_uids.len();
    }
    None
}

pub fn gsps_uri(instance: &Attributes, index: usize) -> Option<String> {
    let retrieve_uri = instance.first_string(RETRIEVE_URI)?;
    presentation_uri(&retrieve_uri, &referenced_series(instance), index)
}

/// A 1-based picker. Only exists when there is more than one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selector {
    title: &'static str,
    count: usize,
    selected: usize,
}

impl Selector {
    pub fn new(title: &'static str, count: usize) -> Option<Self> {
        if count <= 1 {
            return None;
        }
        Some(Self {
            title,
            count,
            selected: 0,
        })
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// 0-based index of the selected option.
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        self.selected = index.min(self.count - 1);
    }

    pub fn select_next(&mut self) {
        self.select(self.selected + 1);
    }

    pub fn select_previous(&mut self) {
        self.select(self.selected.saturating_sub(1));
    }

    pub fn options(&self) -> Vec<String> {
        (1..=self.count).map(|n| n.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewKind {
    Single,
    Frames {
        selector: Selector,
    },
    Presentation {
        selector: Option<Selector>,
        references: Vec<ReferencedSeries>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceLinks {
    pub retrieve_uri: String,
    pub wado_uri: String,
    pub download: String,
    pub download_compressed: String,
    pub view: ViewKind,
}

impl InstanceLinks {
    pub fn for_instance(instance: &Attributes) -> Result<Self, BrowserError> {
        let retrieve_uri = instance.require_string(RETRIEVE_URI)?;
        let wado_uri = wado_uri_of(&retrieve_uri);
        let is_gsps = instance.first_string(SOP_CLASS_UID).as_deref() == Some(GSPS_SOP_CLASS_UID);
        let view = if is_gsps {
            let references = referenced_series(instance);
            ViewKind::Presentation {
                selector: Selector::new("Referenced Image", number_of_ref_images(&references)),
                references,
            }
        } else {
            match Selector::new("Frame", int_of(instance.get(NUMBER_OF_FRAMES))) {
                Some(selector) => ViewKind::Frames { selector },
                None => ViewKind::Single,
            }
        };
        Ok(Self {
            download: download_uri(&wado_uri),
            download_compressed: download_compressed_uri(&wado_uri),
            retrieve_uri,
            wado_uri,
            view,
        })
    }

    pub fn selector(&self) -> Option<&Selector> {
        match &self.view {
            ViewKind::Single => None,
            ViewKind::Frames { selector } => Some(selector),
            ViewKind::Presentation { selector, .. } => selector.as_ref(),
        }
    }

    pub fn selector_mut(&mut self) -> Option<&mut Selector> {
        match &mut self.view {
            ViewKind::Single => None,
            ViewKind::Frames { selector } => Some(selector),
            ViewKind::Presentation { selector, .. } => selector.as_mut(),
        }
    }

    /// URI opened by the viewer for the current selection.
    pub fn view_uri(&self) -> Result<String, BrowserError> {
        match &self.view {
            ViewKind::Single => Ok(self.wado_uri.clone()),
            ViewKind::Frames { selector } => Ok(frame_uri(&self.wado_uri, selector.selected() + 1)),
            ViewKind::Presentation {
                selector,
                references,
            } => {
                let index = selector.as_ref().map(Selector::selected).unwrap_or(0);
                presentation_uri(&self.retrieve_uri, references, index)
                    .ok_or(BrowserError::NoReference(index))
            }
        }
    }
}

/// Links of one instance in a listing. An instance whose links cannot be
/// built keeps its place with the error instead.
#[derive(Debug, Clone, Serialize)]
pub struct LinkListing {
    pub sop_instance_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<InstanceLinks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn list_links(instances: &[Attributes]) -> Vec<LinkListing> {
    instances
        .iter()
        .map(|instance| {
            let sop_instance_uid = instance.first_string(SOP_INSTANCE_UID).unwrap_or_default();
            let links = match InstanceLinks::for_instance(instance) {
                Ok(links) => links,
                Err(err) => {
                    debug!(sop = %sop_instance_uid, error = %err, "wado.links_failed");
                    return LinkListing {
                        sop_instance_uid,
                        view_uri: None,
                        links: None,
                        error: Some(err.to_string()),
                    };
                }
            };
            let (view_uri, error) = match links.view_uri() {
                Ok(uri) => (Some(uri), None),
                Err(err) => (None, Some(err.to_string())),
            };
            LinkListing {
                sop_instance_uid,
                view_uri,
                links: Some(links),
                error,
            }
        })
        .collect()
}

pub trait WadoClient: Send + Sync {
    /// Fetches `uri` into `destination`, returning the number of bytes written.
    fn download(&self, uri: &str, destination: &Utf8Path) -> Result<u64, BrowserError>;
}

#[derive(Clone)]
pub struct WadoHttpClient {
    client: Client,
    base_url: String,
}

impl WadoHttpClient {
    pub fn new(base_url: &str) -> Result<Self, BrowserError> {
        let client = build_http_client().map_err(|err| BrowserError::WadoHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }
}

impl WadoClient for WadoHttpClient {
    fn download(&self, uri: &str, destination: &Utf8Path) -> Result<u64, BrowserError> {
        let url = join_url(&self.base_url, uri);
        debug!(%url, %destination, "wado.request");
        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| BrowserError::WadoHttp(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrowserError::WadoStatus {
                status: status.as_u16(),
                message: status_text(status),
            });
        }

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| BrowserError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("arc-browser-download")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| BrowserError::Filesystem(err.to_string()))?;
        let written = io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| BrowserError::WadoHttp(err.to_string()))?;
        temp.persist(destination.as_std_path())
            .map_err(|err| BrowserError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}
