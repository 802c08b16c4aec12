//! The studies → series → instances table as an explicit tree of row groups.
//!
//! Every row group carries a [`RowState`]; the rows shown on screen are
//! derived from those states by [`BrowserTree::visible_rows`], and the span of
//! a row's expand marker is always `1 +` the number of visible rows beneath it.
//!
//! Fetches are split in two halves. `begin_*` hands out a ticket stamped with
//! the row's current generation, `apply_*` consumes it. Collapsing, paging or
//! re-expanding a row bumps its generation, so a response that arrives for an
//! older request is reported as [`Applied::Stale`] and dropped.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{Attributes, Level, SERIES_INSTANCE_UID, STUDY_INSTANCE_UID};
use crate::error::BrowserError;

pub type RowId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildPage {
    pub offset: usize,
    pub rows: Vec<RowId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowState {
    Collapsed,
    AttributesOpen,
    ChildrenOpen(ChildPage),
    Both(ChildPage),
}

impl RowState {
    pub fn attributes_open(&self) -> bool {
        matches!(self, RowState::AttributesOpen | RowState::Both(_))
    }

    pub fn children(&self) -> Option<&ChildPage> {
        match self {
            RowState::ChildrenOpen(page) | RowState::Both(page) => Some(page),
            RowState::Collapsed | RowState::AttributesOpen => None,
        }
    }

    fn toggle_attributes(self) -> Self {
        match self {
            RowState::Collapsed => RowState::AttributesOpen,
            RowState::AttributesOpen => RowState::Collapsed,
            RowState::ChildrenOpen(page) => RowState::Both(page),
            RowState::Both(page) => RowState::ChildrenOpen(page),
        }
    }

    fn open_children(self, page: ChildPage) -> Self {
        if self.attributes_open() {
            RowState::Both(page)
        } else {
            RowState::ChildrenOpen(page)
        }
    }

    fn close_children(self) -> (Self, Option<ChildPage>) {
        match self {
            RowState::ChildrenOpen(page) => (RowState::Collapsed, Some(page)),
            RowState::Both(page) => (RowState::AttributesOpen, Some(page)),
            other => (other, None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RowGroup {
    pub level: Level,
    /// 1-based position across pages.
    pub number: usize,
    pub record: Attributes,
    pub parent: Option<RowId>,
    pub state: RowState,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Record(RowId),
    Attributes(RowId),
    ChildHeader { owner: RowId, level: Level },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRow {
    pub kind: RowKind,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub offset: usize,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandTicket {
    pub row: RowId,
    /// Level of the row being expanded, not of the rows being fetched.
    pub level: Level,
    pub offset: usize,
    pub study_uid: String,
    pub series_uid: Option<String>,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted(usize),
    Stale,
}

#[derive(Debug, Default)]
pub struct BrowserTree {
    rows: HashMap<RowId, RowGroup>,
    studies: Vec<RowId>,
    study_offset: usize,
    next_id: RowId,
    search_generation: u64,
}

impl BrowserTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn studies(&self) -> &[RowId] {
        &self.studies
    }

    pub fn study_offset(&self) -> usize {
        self.study_offset
    }

    pub fn row(&self, id: RowId) -> Option<&RowGroup> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn begin_search(&mut self, offset: usize) -> SearchTicket {
        self.search_generation += 1;
        SearchTicket {
            offset,
            generation: self.search_generation,
        }
    }

    /// Whether `ticket` belongs to the latest search.
    pub fn is_current_search(&self, ticket: &SearchTicket) -> bool {
        ticket.generation == self.search_generation
    }

    /// Whether `ticket` still matches its row, i.e. the row was not collapsed,
    /// re-paged or dropped by a new search since the ticket was issued.
    pub fn is_current_expand(&self, ticket: &ExpandTicket) -> bool {
        self.rows
            .get(&ticket.row)
            .is_some_and(|row| row.generation == ticket.generation)
    }

    /// Replaces the studies list with a search result.
    pub fn apply_studies(&mut self, ticket: &SearchTicket, records: Vec<Attributes>) -> Applied {
        if !self.is_current_search(ticket) {
            debug!(offset = ticket.offset, "tree.stale_studies");
            return Applied::Stale;
        }
        self.search_generation += 1;
        self.rows.clear();
        self.studies.clear();
        self.study_offset = ticket.offset;
        let count = records.len();
        for (index, record) in records.into_iter().enumerate() {
            let id = self.insert_row(Level::Study, ticket.offset + index + 1, record, None);
            self.studies.push(id);
        }
        Applied::Inserted(count)
    }

    /// Drops any rows currently under `id` and issues a ticket for fetching
    /// its children at `offset`.
    pub fn begin_expand(&mut self, id: RowId, offset: usize) -> Result<ExpandTicket, BrowserError> {
        let row = self.rows.get(&id).ok_or(BrowserError::UnknownRow(id))?;
        let level = row.level;
        if level.child().is_none() {
            return Err(BrowserError::NotExpandable(level));
        }
        let (study_uid, series_uid) = match level {
            Level::Study => (row.record.require_string(STUDY_INSTANCE_UID)?, None),
            _ => {
                let study_uid = match row.record.first_string(STUDY_INSTANCE_UID) {
                    Some(uid) => uid,
                    None => self.parent_study_uid(id)?,
                };
                let series_uid = row.record.require_string(SERIES_INSTANCE_UID)?;
                (study_uid, Some(series_uid))
            }
        };

        self.collapse(id)?;
        let row = self.rows.get(&id).ok_or(BrowserError::UnknownRow(id))?;
        Ok(ExpandTicket {
            row: id,
            level,
            offset,
            study_uid,
            series_uid,
            generation: row.generation,
        })
    }

    /// Inserts a child header and one row group per record beneath the row.
    pub fn apply_children(
        &mut self,
        ticket: &ExpandTicket,
        records: Vec<Attributes>,
    ) -> Result<Applied, BrowserError> {
        if !self.is_current_expand(ticket) {
            debug!(row = ticket.row, offset = ticket.offset, "tree.stale_children");
            return Ok(Applied::Stale);
        }
        let child_level = ticket
            .level
            .child()
            .ok_or(BrowserError::NotExpandable(ticket.level))?;

        let count = records.len();
        let mut children = Vec::with_capacity(count);
        for (index, record) in records.into_iter().enumerate() {
            children.push(self.insert_row(
                child_level,
                ticket.offset + index + 1,
                record,
                Some(ticket.row),
            ));
        }

        let row = self
            .rows
            .get_mut(&ticket.row)
            .ok_or(BrowserError::UnknownRow(ticket.row))?;
        let state = std::mem::replace(&mut row.state, RowState::Collapsed);
        row.state = state.open_children(ChildPage {
            offset: ticket.offset,
            rows: children,
        });
        row.generation += 1;
        Ok(Applied::Inserted(count))
    }

    /// Removes the rows added by the last expansion of `id`. Returns how many
    /// visible rows went away.
    pub fn collapse(&mut self, id: RowId) -> Result<usize, BrowserError> {
        let before = self.span(id);
        let row = self.rows.get_mut(&id).ok_or(BrowserError::UnknownRow(id))?;
        let state = std::mem::replace(&mut row.state, RowState::Collapsed);
        let (state, page) = state.close_children();
        row.state = state;
        row.generation += 1;
        if let Some(page) = page {
            for child in page.rows {
                self.remove_subtree(child);
            }
        }
        Ok(before - self.span(id))
    }

    /// Opens or closes the attribute sub-row. Returns whether it is now open.
    pub fn toggle_attributes(&mut self, id: RowId) -> Result<bool, BrowserError> {
        let row = self.rows.get_mut(&id).ok_or(BrowserError::UnknownRow(id))?;
        let state = std::mem::replace(&mut row.state, RowState::Collapsed);
        row.state = state.toggle_attributes();
        Ok(row.state.attributes_open())
    }

    pub fn child_offset(&self, id: RowId) -> Option<usize> {
        self.rows
            .get(&id)
            .and_then(|row| row.state.children())
            .map(|page| page.offset)
    }

    /// `1 +` the number of visible rows beneath `id`; 0 for unknown rows.
    pub fn span(&self, id: RowId) -> usize {
        let Some(row) = self.rows.get(&id) else {
            return 0;
        };
        let mut span = 1;
        if row.state.attributes_open() {
            span += 1;
        }
        if let Some(page) = row.state.children() {
            span += 1;
            span += page.rows.iter().map(|child| self.span(*child)).sum::<usize>();
        }
        span
    }

    pub fn ancestors(&self, id: RowId) -> Vec<RowId> {
        let mut ancestors = Vec::new();
        let mut current = self.rows.get(&id).and_then(|row| row.parent);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.rows.get(&parent).and_then(|row| row.parent);
        }
        ancestors
    }

    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut out = Vec::new();
        for id in &self.studies {
            self.push_visible(*id, 0, &mut out);
        }
        out
    }

    fn push_visible(&self, id: RowId, depth: usize, out: &mut Vec<VisibleRow>) {
        let Some(row) = self.rows.get(&id) else {
            return;
        };
        out.push(VisibleRow {
            kind: RowKind::Record(id),
            depth,
        });
        if row.state.attributes_open() {
            out.push(VisibleRow {
                kind: RowKind::Attributes(id),
                depth: depth + 1,
            });
        }
        if let (Some(page), Some(level)) = (row.state.children(), row.level.child()) {
            out.push(VisibleRow {
                kind: RowKind::ChildHeader { owner: id, level },
                depth: depth + 1,
            });
            for child in &page.rows {
                self.push_visible(*child, depth + 1, out);
            }
        }
    }

    fn insert_row(
        &mut self,
        level: Level,
        number: usize,
        record: Attributes,
        parent: Option<RowId>,
    ) -> RowId {
        self.next_id += 1;
        let id = self.next_id;
        self.rows.insert(
            id,
            RowGroup {
                level,
                number,
                record,
                parent,
                state: RowState::Collapsed,
                generation: 0,
            },
        );
        id
    }

    fn remove_subtree(&mut self, id: RowId) {
        if let Some(row) = self.rows.remove(&id) {
            if let Some(page) = row.state.children() {
                for child in &page.rows {
                    self.remove_subtree(*child);
                }
            }
        }
    }

    fn parent_study_uid(&self, id: RowId) -> Result<String, BrowserError> {
        self.ancestors(id)
            .into_iter()
            .filter_map(|ancestor| self.rows.get(&ancestor))
            .find(|row| row.level == Level::Study)
            .and_then(|row| row.record.first_string(STUDY_INSTANCE_UID))
            .ok_or(BrowserError::MissingAttribute(STUDY_INSTANCE_UID))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_toggle_is_orthogonal_to_children() {
        let page = ChildPage {
            offset: 0,
            rows: vec![1, 2],
        };
        let state = RowState::ChildrenOpen(page.clone()).toggle_attributes();
        assert_eq!(state, RowState::Both(page.clone()));
        let (state, closed) = state.close_children();
        assert_eq!(state, RowState::AttributesOpen);
        assert_eq!(closed, Some(page));
    }

    #[test]
    fn unknown_rows_have_no_span() {
        let tree = BrowserTree::new();
        assert_eq!(tree.span(42), 0);
    }
}
