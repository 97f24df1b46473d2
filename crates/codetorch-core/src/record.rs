use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::content_hash;

/// One line-addressed explanation inside a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationUnit {
    /// 1-based, relative to the first line of the owning function.
    pub line: usize,
    pub chunk_code: String,
    pub summary: String,
}

impl AnnotationUnit {
    pub fn new(line: usize, chunk_code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            line,
            chunk_code: chunk_code.into(),
            summary: summary.into(),
        }
    }
}

/// Cached annotations for one function instance, identified by its body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionRecord {
    pub live_code: String,
    pub last_saved_code: String,
    pub start_line: usize,
    pub units: Vec<AnnotationUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Matches a current function and was summarized from exactly that text.
    Fresh,
    /// Matches a current function but was summarized from older text.
    Stale,
    /// Matches no current function.
    Orphaned,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Orphaned => "orphaned",
        }
    }
}

impl FunctionRecord {
    pub fn generated(code: impl Into<String>, start_line: usize, units: Vec<AnnotationUnit>) -> Self {
        let code = code.into();
        Self {
            live_code: code.clone(),
            last_saved_code: code,
            start_line,
            units,
        }
    }

    /// State of a record already known to match a current function slice.
    pub fn matched_state(&self) -> RecordState {
        if self.last_saved_code == self.live_code {
            RecordState::Fresh
        } else {
            RecordState::Stale
        }
    }

    /// Moves every unit strictly after `relative_line` (0-based) by `delta`,
    /// never past the edit line so unit order is preserved.
    pub fn shift_units_after(&mut self, relative_line: usize, delta: isize) {
        if delta == 0 {
            return;
        }

        let floor = relative_line as isize + 1;
        for unit in &mut self.units {
            if unit.line.saturating_sub(1) > relative_line {
                unit.line = (unit.line as isize + delta).max(floor) as usize;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveCodeRefresh {
    Unchanged,
    Updated,
    /// Another record already held the new text; the refreshed record was dropped.
    MergedIntoExisting,
}

/// Content-addressed record list for one document: at most one record per `live_code`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<FunctionRecord>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    /// Builds a set, keeping the first record for each distinct `live_code`.
    pub fn from_records(records: Vec<FunctionRecord>) -> Self {
        let mut set = Self::default();
        for record in records {
            let hash = content_hash(&record.live_code);
            if set.index.contains_key(&hash) {
                continue;
            }
            set.index.insert(hash, set.records.len());
            set.records.push(record);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FunctionRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<FunctionRecord> {
        self.records
    }

    pub fn get(&self, index: usize) -> Option<&FunctionRecord> {
        self.records.get(index)
    }

    pub fn find_index(&self, code: &str) -> Option<usize> {
        self.index.get(&content_hash(code)).copied()
    }

    pub fn find(&self, code: &str) -> Option<&FunctionRecord> {
        self.find_index(code).map(|index| &self.records[index])
    }

    pub fn index_at_start_line(&self, start_line: usize) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.start_line == start_line)
    }

    pub fn set_start_line(&mut self, index: usize, start_line: usize) -> bool {
        match self.records.get_mut(index) {
            Some(record) if record.start_line != start_line => {
                record.start_line = start_line;
                true
            }
            _ => false,
        }
    }

    /// Shifts every record starting strictly below `after_line`; none move above it.
    pub fn shift_start_lines(&mut self, after_line: usize, delta: isize) -> usize {
        let mut shifted = 0;
        for record in &mut self.records {
            if record.start_line > after_line {
                let moved = record.start_line as isize + delta;
                record.start_line = moved.max(after_line as isize) as usize;
                shifted += 1;
            }
        }
        shifted
    }

    pub fn shift_units(&mut self, index: usize, relative_line: usize, delta: isize) {
        if let Some(record) = self.records.get_mut(index) {
            record.shift_units_after(relative_line, delta);
        }
    }

    pub fn refresh_live_code(&mut self, index: usize, code: &str) -> LiveCodeRefresh {
        let Some(record) = self.records.get(index) else {
            return LiveCodeRefresh::Unchanged;
        };
        if record.live_code == code {
            return LiveCodeRefresh::Unchanged;
        }

        if self.find_index(code).is_some_and(|existing| existing != index) {
            self.remove(index);
            return LiveCodeRefresh::MergedIntoExisting;
        }

        let old_hash = content_hash(&record.live_code);
        self.index.remove(&old_hash);
        self.index.insert(content_hash(code), index);
        self.records[index].live_code = code.to_owned();
        LiveCodeRefresh::Updated
    }

    /// Replaces the record holding the same `live_code`, or appends.
    pub fn upsert_by_content(&mut self, record: FunctionRecord) -> usize {
        match self.find_index(&record.live_code) {
            Some(index) => {
                self.records[index] = record;
                index
            }
            None => {
                let index = self.records.len();
                self.index.insert(content_hash(&record.live_code), index);
                self.records.push(record);
                index
            }
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(usize, &FunctionRecord) -> bool) -> usize {
        let before = self.records.len();
        let records = std::mem::take(&mut self.records);
        *self = Self::from_records(
            records
                .into_iter()
                .enumerate()
                .filter(|(index, record)| keep(*index, record))
                .map(|(_, record)| record)
                .collect(),
        );
        before - self.records.len()
    }

    fn remove(&mut self, index: usize) {
        self.retain(|candidate, _| candidate != index);
    }
}

impl FromIterator<FunctionRecord> for RecordSet {
    fn from_iter<T: IntoIterator<Item = FunctionRecord>>(iter: T) -> Self {
        Self::from_records(iter.into_iter().collect())
    }
}
