use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::StatusFilter;
use crate::value::Snapshot;

pub const STATE: &str = "state";
pub const TRACKER_HOST: &str = "tracker_host";
pub const LABEL: &str = "label";

const STATES: [&str; 7] = [
    "Downloading",
    "Seeding",
    "Paused",
    "Checking",
    "Queued",
    "Error",
    "Active",
];

/// Per-category value counts, categories in display order.
pub type FilterCounts = Vec<(String, Vec<(String, u64)>)>;

/// Count torrents per state, tracker host and label.
///
/// `Active` counts torrents moving data in either direction. With
/// `show_zero` every known state is listed even when nothing is in it.
pub fn count_filters(torrents: &Snapshot<String>, show_zero: bool, hidden: &[&str]) -> FilterCounts {
    let mut states: BTreeMap<&str, u64> = BTreeMap::new();
    let mut trackers: BTreeMap<String, u64> = BTreeMap::new();
    let mut labels: BTreeMap<String, u64> = BTreeMap::new();

    for (_, record) in torrents.iter() {
        if let Some(state) = record.get(STATE).and_then(|v| v.as_str()) {
            if let Some(known) = STATES.iter().find(|s| **s == state) {
                *states.entry(*known).or_default() += 1;
            }
        }
        let rate = |field: &str| record.get(field).and_then(|v| v.as_f64()).unwrap_or(0.0);
        if rate("download_payload_rate") > 0.0 || rate("upload_payload_rate") > 0.0 {
            *states.entry("Active").or_default() += 1;
        }
        if let Some(host) = record.get(TRACKER_HOST).and_then(|v| v.as_str()) {
            *trackers.entry(host.to_string()).or_default() += 1;
        }
        if let Some(label) = record.get(LABEL).and_then(|v| v.as_str()) {
            let label = if label.is_empty() { "No Label" } else { label };
            *labels.entry(label.to_string()).or_default() += 1;
        }
    }

    let mut state_values = vec![("All".to_string(), torrents.len() as u64)];
    for state in STATES {
        let count = states.get(state).copied().unwrap_or(0);
        if count > 0 || show_zero {
            state_values.push((state.to_string(), count));
        }
    }

    let mut out: FilterCounts = vec![(STATE.to_string(), state_values)];
    if !trackers.is_empty() {
        out.push((TRACKER_HOST.to_string(), trackers.into_iter().collect()));
    }
    if !labels.is_empty() {
        out.push((LABEL.to_string(), labels.into_iter().collect()));
    }
    out.retain(|(category, _)| !hidden.contains(&category.as_str()));
    out
}

/// The status filter a sidebar row stands for; `state = All` is no filter.
pub fn filter_for(category: &str, value: &str) -> StatusFilter {
    let mut filter = StatusFilter::new();
    if category == STATE && value == "All" {
        return filter;
    }
    filter.insert(category.to_string(), value.to_string());
    filter
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterValue {
    pub value: String,
    pub count: u64,
    pub hidden: bool,
}

impl FilterValue {
    pub fn label(&self) -> String {
        format!("{} ({})", self.value, self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCategory {
    pub key: String,
    pub values: Vec<FilterValue>,
    pub hidden: bool,
}

impl FilterCategory {
    pub fn title(&self) -> &str {
        match self.key.as_str() {
            STATE => "States",
            TRACKER_HOST => "Trackers",
            LABEL => "Labels",
            other => other,
        }
    }

    fn update(&mut self, values: &[(String, u64)]) {
        for item in self.values.iter_mut() {
            item.hidden = true;
        }
        for (value, count) in values {
            match self.values.iter_mut().find(|item| item.value == *value) {
                Some(item) => {
                    item.count = *count;
                    item.hidden = false;
                }
                None => self.values.push(FilterValue {
                    value: value.clone(),
                    count: *count,
                    hidden: false,
                }),
            }
        }
    }
}

/// A visible sidebar line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRow<'a> {
    Category(&'a FilterCategory),
    Value(&'a FilterCategory, &'a FilterValue),
}

/// Sidebar model. Items are never destroyed, only hidden, so the selected
/// row stays the same object across polls.
#[derive(Debug, Default)]
pub struct FilterTree {
    categories: Vec<FilterCategory>,
    last: Option<FilterCounts>,
    selected: Option<(String, String)>,
}

impl FilterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> &[FilterCategory] {
        &self.categories
    }

    /// Apply fresh counts. Returns false when nothing changed.
    pub fn update(&mut self, counts: FilterCounts) -> bool {
        if self.last.as_ref() == Some(&counts) {
            return false;
        }
        for category in self.categories.iter_mut() {
            category.hidden = true;
        }
        for (key, values) in &counts {
            match self.categories.iter_mut().find(|c| c.key == *key) {
                Some(category) => {
                    category.update(values);
                    category.hidden = false;
                }
                None => {
                    let mut category = FilterCategory {
                        key: key.clone(),
                        values: Vec::new(),
                        hidden: false,
                    };
                    category.update(values);
                    self.categories.push(category);
                }
            }
        }
        self.last = Some(counts);

        if self.selected.is_none() {
            self.selected = self.first_value();
        }
        debug!(categories = self.categories.len(), "filter counts updated");
        true
    }

    fn first_value(&self) -> Option<(String, String)> {
        self.rows().into_iter().find_map(|row| match row {
            FilterRow::Value(category, value) => Some((category.key.clone(), value.value.clone())),
            FilterRow::Category(_) => None,
        })
    }

    /// Visible lines: each visible category followed by its visible values.
    pub fn rows(&self) -> Vec<FilterRow<'_>> {
        let mut rows = Vec::new();
        for category in self.categories.iter().filter(|c| !c.hidden) {
            rows.push(FilterRow::Category(category));
            for value in category.values.iter().filter(|v| !v.hidden) {
                rows.push(FilterRow::Value(category, value));
            }
        }
        rows
    }

    /// Select a value row. Category rows are not selectable; selecting one
    /// keeps the current selection.
    pub fn select(&mut self, category: &str, value: &str) -> bool {
        let exists = self
            .categories
            .iter()
            .find(|c| c.key == category)
            .map(|c| c.values.iter().any(|v| v.value == value))
            .unwrap_or(false);
        if exists {
            self.selected = Some((category.to_string(), value.to_string()));
        }
        exists
    }

    pub fn select_row(&mut self, row: usize) -> bool {
        let target = match self.rows().get(row) {
            Some(FilterRow::Value(category, value)) => Some((category.key.clone(), value.value.clone())),
            _ => None,
        };
        match target {
            Some(selection) => {
                self.selected = Some(selection);
                true
            }
            None => false,
        }
    }

    pub fn selected(&self) -> Option<(&str, &str)> {
        self.selected.as_ref().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn selected_row(&self) -> Option<usize> {
        let (category, value) = self.selected()?;
        self.rows().iter().position(|row| {
            matches!(row, FilterRow::Value(c, v) if c.key == category && v.value == value)
        })
    }

    /// Status filter for the current selection.
    pub fn current_filter(&self) -> StatusFilter {
        self.selected()
            .map(|(category, value)| filter_for(category, value))
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.categories.clear();
        self.last = None;
        self.selected = None;
    }
}
