use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{
    Attributes, Level, SERIES_INSTANCE_UID, SOP_INSTANCE_UID, STUDY_INSTANCE_UID,
};
use crate::error::BrowserError;
use crate::format;
use crate::inspector::{InspectorLine, inspect};
use crate::qido::QidoClient;
use crate::query::{QueryBuilder, SearchForm};
use crate::tree::{Applied, BrowserTree, ExpandTicket, RowId, SearchTicket};
use crate::wado::InstanceLinks;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// A search that has been issued against the tree but not yet answered.
#[derive(Debug, Clone)]
pub enum Pending {
    Studies { ticket: SearchTicket, path: String },
    Children { ticket: ExpandTicket, path: String },
}

impl Pending {
    pub fn path(&self) -> &str {
        match self {
            Pending::Studies { path, .. } | Pending::Children { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub header: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowSummary {
    pub number: usize,
    pub level: Level,
    pub study_uid: Option<String>,
    pub series_uid: Option<String>,
    pub columns: Vec<Column>,
}

impl RowSummary {
    pub fn new(level: Level, number: usize, record: &Attributes) -> Self {
        let columns = format::headers(level)
            .iter()
            .zip(format::columns(level, record))
            .map(|(header, value)| Column {
                header: *header,
                value,
            })
            .collect();
        Self {
            number,
            level,
            study_uid: record.first_string(STUDY_INSTANCE_UID),
            series_uid: record.first_string(SERIES_INSTANCE_UID),
            columns,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub level: Level,
    pub offset: usize,
    pub rows: Vec<RowSummary>,
}

impl SearchResult {
    pub fn from_records(level: Level, offset: usize, records: &[Attributes]) -> Self {
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| RowSummary::new(level, offset + index + 1, record))
            .collect();
        Self {
            level,
            offset,
            rows,
        }
    }
}

/// One browsing session: the search form, the row tree and the transport.
pub struct Browser<Q: QidoClient> {
    client: Arc<Q>,
    form: SearchForm,
    tree: BrowserTree,
}

impl<Q: QidoClient> Browser<Q> {
    pub fn new(client: Q, form: SearchForm) -> Self {
        Self {
            client: Arc::new(client),
            form,
            tree: BrowserTree::new(),
        }
    }

    pub fn client(&self) -> Arc<Q> {
        Arc::clone(&self.client)
    }

    pub fn form(&self) -> &SearchForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut SearchForm {
        &mut self.form
    }

    pub fn tree(&self) -> &BrowserTree {
        &self.tree
    }

    pub fn prepare_search(&mut self, offset: usize) -> Pending {
        let path = QueryBuilder::new(&self.form).studies(offset);
        let ticket = self.tree.begin_search(offset);
        Pending::Studies { ticket, path }
    }

    pub fn prepare_next_page(&mut self) -> Pending {
        let offset = self.form.pager().next(self.tree.study_offset());
        self.prepare_search(offset)
    }

    pub fn prepare_previous_page(&mut self) -> Pending {
        let offset = self.form.pager().previous(self.tree.study_offset());
        self.prepare_search(offset)
    }

    /// Collapses `row` and issues the fetch of its children at `offset`.
    pub fn prepare_expand(&mut self, row: RowId, offset: usize) -> Result<Pending, BrowserError> {
        let ticket = self.tree.begin_expand(row, offset)?;
        let path = QueryBuilder::new(&self.form)
            .children(
                ticket.level,
                &ticket.study_uid,
                ticket.series_uid.as_deref(),
                offset,
            )
            .ok_or(BrowserError::NotExpandable(ticket.level))?;
        Ok(Pending::Children { ticket, path })
    }

    pub fn prepare_next_children(&mut self, row: RowId) -> Result<Pending, BrowserError> {
        let offset = self
            .tree
            .child_offset(row)
            .map(|offset| self.form.pager().next(offset))
            .unwrap_or(0);
        self.prepare_expand(row, offset)
    }

    pub fn prepare_previous_children(&mut self, row: RowId) -> Result<Pending, BrowserError> {
        let offset = self
            .tree
            .child_offset(row)
            .map(|offset| self.form.pager().previous(offset))
            .unwrap_or(0);
        self.prepare_expand(row, offset)
    }

    /// Applies the answer to a pending search. Stale answers are dropped,
    /// failed ones included.
    pub fn complete(
        &mut self,
        pending: Pending,
        result: Result<Vec<Attributes>, BrowserError>,
        sink: &dyn ProgressSink,
    ) -> Result<Applied, BrowserError> {
        let current = match &pending {
            Pending::Studies { ticket, .. } => self.tree.is_current_search(ticket),
            Pending::Children { ticket, .. } => self.tree.is_current_expand(ticket),
        };
        let applied = if !current {
            // A superseded fetch is dropped whether it succeeded or failed.
            if let Err(error) = &result {
                debug!(path = pending.path(), %error, "search.stale_error");
            }
            Applied::Stale
        } else {
            let records = result?;
            match &pending {
                Pending::Studies { ticket, .. } => self.tree.apply_studies(ticket, records),
                Pending::Children { ticket, .. } => self.tree.apply_children(ticket, records)?,
            }
        };
        match applied {
            Applied::Inserted(count) => {
                info!(path = pending.path(), count, "search.applied");
                sink.event(ProgressEvent {
                    message: format!("{count} rows from {}", pending.path()),
                });
            }
            Applied::Stale => {
                debug!(path = pending.path(), "search.stale");
                sink.event(ProgressEvent {
                    message: format!("discarded stale response from {}", pending.path()),
                });
            }
        }
        Ok(applied)
    }

    /// Runs a pending search on the current thread.
    pub fn run(&mut self, pending: Pending, sink: &dyn ProgressSink) -> Result<Applied, BrowserError> {
        sink.event(ProgressEvent {
            message: format!("GET {}", pending.path()),
        });
        let result = self.client.search(pending.path());
        self.complete(pending, result, sink)
    }

    /// A fresh search from the first page.
    pub fn search(&mut self, sink: &dyn ProgressSink) -> Result<Applied, BrowserError> {
        let pending = self.prepare_search(0);
        self.run(pending, sink)
    }

    pub fn next_page(&mut self, sink: &dyn ProgressSink) -> Result<Applied, BrowserError> {
        let pending = self.prepare_next_page();
        self.run(pending, sink)
    }

    pub fn previous_page(&mut self, sink: &dyn ProgressSink) -> Result<Applied, BrowserError> {
        let pending = self.prepare_previous_page();
        self.run(pending, sink)
    }

    pub fn expand(&mut self, row: RowId, sink: &dyn ProgressSink) -> Result<Applied, BrowserError> {
        let pending = self.prepare_expand(row, 0)?;
        self.run(pending, sink)
    }

    pub fn next_children(
        &mut self,
        row: RowId,
        sink: &dyn ProgressSink,
    ) -> Result<Applied, BrowserError> {
        let pending = self.prepare_next_children(row)?;
        self.run(pending, sink)
    }

    pub fn previous_children(
        &mut self,
        row: RowId,
        sink: &dyn ProgressSink,
    ) -> Result<Applied, BrowserError> {
        let pending = self.prepare_previous_children(row)?;
        self.run(pending, sink)
    }

    pub fn collapse(&mut self, row: RowId) -> Result<usize, BrowserError> {
        self.tree.collapse(row)
    }

    pub fn toggle_attributes(&mut self, row: RowId) -> Result<bool, BrowserError> {
        self.tree.toggle_attributes(row)
    }

    pub fn inspect(&self, row: RowId) -> Result<Vec<InspectorLine>, BrowserError> {
        let group = self.tree.row(row).ok_or(BrowserError::UnknownRow(row))?;
        Ok(inspect(&group.record))
    }

    pub fn instance_links(&self, row: RowId) -> Result<InstanceLinks, BrowserError> {
        let group = self.tree.row(row).ok_or(BrowserError::UnknownRow(row))?;
        if group.level != Level::Instance {
            return Err(BrowserError::NoLinks(group.level));
        }
        InstanceLinks::for_instance(&group.record)
    }

    pub fn studies_page(&self) -> SearchResult {
        let rows = self
            .tree
            .studies()
            .iter()
            .filter_map(|id| self.tree.row(*id))
            .map(|row| RowSummary::new(row.level, row.number, &row.record))
            .collect();
        SearchResult {
            level: Level::Study,
            offset: self.tree.study_offset(),
            rows,
        }
    }

    /// Searches one level directly, bypassing the tree.
    pub fn search_level(
        &self,
        level: Level,
        study_uid: Option<&str>,
        series_uid: Option<&str>,
        offset: usize,
    ) -> Result<Vec<Attributes>, BrowserError> {
        let builder = QueryBuilder::new(&self.form);
        let path = match (level, study_uid, series_uid) {
            (Level::Study, _, _) => builder.studies(offset),
            (Level::Series, Some(study), _) => builder.series(study, offset),
            (Level::Instance, Some(study), Some(series)) => {
                builder.instances(study, series, offset)
            }
            (Level::Series, None, _) | (Level::Instance, None, _) => {
                return Err(BrowserError::MissingAttribute(STUDY_INSTANCE_UID));
            }
            (Level::Instance, Some(_), None) => {
                return Err(BrowserError::MissingAttribute(SERIES_INSTANCE_UID));
            }
        };
        self.client.search(&path)
    }

    /// Pages through `level` under the given parents until the record whose
    /// UID equals `uid` turns up.
    pub fn find_record(
        &self,
        level: Level,
        study_uid: &str,
        series_uid: Option<&str>,
        uid: &str,
    ) -> Result<Attributes, BrowserError> {
        let key = match level {
            Level::Study => STUDY_INSTANCE_UID,
            Level::Series => SERIES_INSTANCE_UID,
            Level::Instance => SOP_INSTANCE_UID,
        };
        let not_found = || BrowserError::RecordNotFound {
            level,
            uid: uid.to_string(),
        };
        let pager = self.form.pager();
        let mut offset = 0;
        loop {
            let records = if level == Level::Study {
                let mut form = self.form.clone();
                form.set_matcher(STUDY_INSTANCE_UID, uid);
                self.client.search(&QueryBuilder::new(&form).studies(offset))?
            } else {
                self.search_level(level, Some(study_uid), series_uid, offset)?
            };
            let count = records.len();
            if let Some(record) = records
                .into_iter()
                .find(|record| record.first_string(key).as_deref() == Some(uid))
            {
                return Ok(record);
            }
            if count < pager.limit() {
                return Err(not_found());
            }
            offset = pager.next(offset);
        }
    }

    pub fn store_path(&self) -> String {
        QueryBuilder::new(&self.form).store()
    }
}
