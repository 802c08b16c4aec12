use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Level;

const QIDO_PATH: &str = "rs/qido/";
const STOW_PATH: &str = "rs/stow/";

static NON_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());

/// Inclusive `from`/`to` bounds as typed by the user. Either side may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

impl Range {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub name: String,
    pub value: String,
}

/// A checkbox: contributes `name=value` only while checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub name: String,
    pub value: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchForm {
    pub aet: String,
    pub limit: usize,
    pub order_by: String,
    #[serde(default)]
    pub study_date: Range,
    #[serde(default)]
    pub study_time: Range,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub flags: Vec<Flag>,
}

impl SearchForm {
    pub fn new(aet: impl Into<String>, limit: usize, order_by: impl Into<String>) -> Self {
        Self {
            aet: aet.into(),
            limit,
            order_by: order_by.into(),
            study_date: Range::default(),
            study_time: Range::default(),
            matchers: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Sets or replaces a free matcher; an empty value clears it.
    pub fn set_matcher(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        self.matchers.retain(|matcher| matcher.name != name);
        if !value.is_empty() {
            self.matchers.push(Matcher { name, value });
        }
    }

    pub fn pager(&self) -> Pager {
        Pager::new(self.limit)
    }
}

/// `key=from-to` with non-digits stripped from both ends. `None` when both
/// ends are empty; a single value when both ends are equal.
pub fn range_of(key: &str, from: &str, to: &str) -> Option<String> {
    if from.is_empty() && to.is_empty() {
        return None;
    }
    let mut value = format!("{key}=");
    if !from.is_empty() {
        value.push_str(&strip_non_digits(from));
    }
    if to != from {
        value.push('-');
        if !to.is_empty() {
            value.push_str(&strip_non_digits(to));
        }
    }
    Some(value)
}

fn strip_non_digits(value: &str) -> String {
    NON_DIGIT.replace_all(value, "").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    limit: usize,
}

impl Pager {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn next(&self, offset: usize) -> usize {
        offset + self.limit
    }

    pub fn previous(&self, offset: usize) -> usize {
        offset.saturating_sub(self.limit)
    }
}

/// Archive-relative search and store paths for one form.
pub struct QueryBuilder<'a> {
    form: &'a SearchForm,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(form: &'a SearchForm) -> Self {
        Self { form }
    }

    pub fn studies(&self, offset: usize) -> String {
        let form = self.form;
        let mut url = format!(
            "{QIDO_PATH}{}/studies?includefield=all&offset={offset}&orderby={}",
            form.aet, form.order_by
        );
        let ranges = [
            range_of("StudyDate", &form.study_date.from, &form.study_date.to),
            range_of("StudyTime", &form.study_time.from, &form.study_time.to),
        ];
        for range in ranges.into_iter().flatten() {
            url.push('&');
            url.push_str(&range);
        }
        url.push_str(&format!("&limit={}", form.limit));
        for matcher in &form.matchers {
            if !matcher.name.is_empty() && !matcher.value.is_empty() {
                url.push_str(&format!("&{}={}", matcher.name, matcher.value));
            }
        }
        for flag in &form.flags {
            if flag.checked {
                url.push_str(&format!("&{}={}", flag.name, flag.value));
            }
        }
        url
    }

    pub fn series(&self, study_uid: &str, offset: usize) -> String {
        format!(
            "{QIDO_PATH}{}/studies/{study_uid}/series?includefield=all&orderby=SeriesNumber&offset={offset}&limit={}",
            self.form.aet, self.form.limit
        )
    }

    pub fn instances(&self, study_uid: &str, series_uid: &str, offset: usize) -> String {
        format!(
            "{QIDO_PATH}{}/studies/{study_uid}/series/{series_uid}/instances?includefield=all&orderby=InstanceNumber&offset={offset}&limit={}",
            self.form.aet, self.form.limit
        )
    }

    /// Path of the children of a row at `level`, given the UIDs on its path.
    pub fn children(
        &self,
        level: Level,
        study_uid: &str,
        series_uid: Option<&str>,
        offset: usize,
    ) -> Option<String> {
        match (level, series_uid) {
            (Level::Study, _) => Some(self.series(study_uid, offset)),
            (Level::Series, Some(series_uid)) => {
                Some(self.instances(study_uid, series_uid, offset))
            }
            _ => None,
        }
    }

    pub fn store(&self) -> String {
        format!("{STOW_PATH}{}/studies", self.form.aet)
    }
}
