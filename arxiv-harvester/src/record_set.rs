use crate::types::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered collection of records, unique by `id`.
///
/// Order is insertion order; re-adding an id moves it to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Record>", into = "Vec<Record>")]
pub struct RecordSet {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record`, replacing any existing record with the same id.
    pub fn add(&mut self, record: Record) {
        if let Some(pos) = self.index.remove(&record.id) {
            self.records.remove(pos);
            for slot in self.index.values_mut() {
                if *slot > pos {
                    *slot -= 1;
                }
            }
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    /// Left-biased union: `self` wins on id collision, records only in
    /// `other` are appended in their original order.
    pub fn union(&self, other: &RecordSet) -> RecordSet {
        let mut result = self.clone();
        for record in &other.records {
            if !self.contains(&record.id) {
                result.add(record.clone());
            }
        }
        result
    }

    /// Records of `self` whose id is also present in `other`.
    pub fn intersect(&self, other: &RecordSet) -> RecordSet {
        self.retain(|r| other.contains(&r.id))
    }

    /// New set with the records matching `predicate`, order preserved.
    pub fn retain<F>(&self, mut predicate: F) -> RecordSet
    where
        F: FnMut(&Record) -> bool,
    {
        self.records
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.add(record);
        }
        set
    }
}

impl Extend<Record> for RecordSet {
    fn extend<I: IntoIterator<Item = Record>>(&mut self, iter: I) {
        for record in iter {
            self.add(record);
        }
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        records.into_iter().collect()
    }
}

impl From<RecordSet> for Vec<Record> {
    fn from(set: RecordSet) -> Self {
        set.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// The harvest result for one (category-group, date) key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub category_group: String,
    pub records: RecordSet,
}

impl DailySnapshot {
    pub fn new(date: NaiveDate, category_group: impl Into<String>, records: RecordSet) -> Self {
        Self {
            date,
            category_group: category_group.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
