use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::record::{Record, RecordId};
use crate::error::{AppError, AppResult};

/// Ordered records of one owner's partition.
///
/// Every mutation re-stamps `owner` and re-derives ids, so the set always
/// looks exactly like a fresh load of what it would save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    owner: String,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(owner: impl Into<String>, records: Vec<Record>) -> Self {
        let mut set = Self {
            owner: owner.into(),
            records,
        };
        set.reindex();
        set
    }

    pub fn empty(owner: impl Into<String>) -> Self {
        Self::new(owner, Vec::new())
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record and returns it with its assigned id.
    pub fn push(&mut self, record: Record) -> &Record {
        self.records.push(record);
        self.reindex();
        let last = self.records.len() - 1;
        &self.records[last]
    }

    /// Replaces the whole partition (table edit).
    pub fn replace_all(&mut self, records: Vec<Record>) {
        self.records = records;
        self.reindex();
    }

    pub fn remove(&mut self, id: RecordId) -> AppResult<Record> {
        let index = self.position(id)?;
        let removed = self.records.remove(index);
        self.reindex();
        Ok(removed)
    }

    /// Changes the count of one record by `delta`, flooring at zero.
    pub fn adjust_quantity(&mut self, id: RecordId, delta: i64) -> AppResult<&Record> {
        let index = self.position(id)?;
        let record = &mut self.records[index];
        let next = (i64::from(record.count) + delta).clamp(0, i64::from(u32::MAX));
        record.count = next as u32;
        Ok(&self.records[index])
    }

    pub fn total_items(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.count)).sum()
    }

    /// Σ count × unit mass, in kilograms.
    pub fn total_mass_kg(&self) -> f64 {
        self.records.iter().map(Record::total_mass).sum::<f64>() / 1000.0
    }

    /// Distinct category labels in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::<String>::new();
        for record in &self.records {
            let label = record.category.label();
            if !seen.iter().any(|s| s == label) {
                seen.push(label.to_string());
            }
        }
        seen
    }

    /// Records whose category label is in `labels`; all records if empty.
    pub fn with_categories<'a>(&'a self, labels: &[String]) -> Vec<&'a Record> {
        self.records
            .iter()
            .filter(|r| labels.is_empty() || labels.iter().any(|l| l == r.category.label()))
            .collect()
    }

    fn position(&self, id: RecordId) -> AppResult<usize> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))
    }

    fn reindex(&mut self) {
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        for record in &mut self.records {
            record.owner = self.owner.clone();
            let n = occurrences.entry(record.name.clone()).or_insert(0);
            record.id = RecordId::derive(&self.owner, &record.name, *n);
            *n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::Category;

    fn item(name: &str, count: u32, unit_mass: f64) -> Record {
        Record {
            count,
            unit_mass,
            ..Record::new("", name)
        }
    }

    #[test]
    fn test_aggregates() {
        let set = RecordSet::new("anna", vec![item("A", 2, 10.0), item("B", 3, 5.0)]);
        assert_eq!(set.total_items(), 5);
        assert!((set.total_mass_kg() - 0.035).abs() < 1e-12);
        assert_eq!(RecordSet::empty("anna").total_mass_kg(), 0.0);
    }

    #[test]
    fn test_owner_is_forced() {
        let mut set = RecordSet::new("anna", vec![item("A", 1, 1.0)]);
        let pushed = set.push(Record::new("mallory", "B"));
        assert_eq!(pushed.owner, "anna");
        assert!(set.iter().all(|r| r.owner == "anna"));
    }

    #[test]
    fn test_duplicate_names_get_distinct_ids() {
        let set = RecordSet::new("anna", vec![item("Vulkan", 1, 0.0), item("Vulkan", 4, 0.0)]);
        let ids: Vec<_> = set.iter().map(|r| r.id).collect();
        assert_ne!(ids[0], ids[1]);

        let mut set = set;
        set.adjust_quantity(ids[1], 1).unwrap();
        assert_eq!(set.records()[0].count, 1);
        assert_eq!(set.records()[1].count, 5);
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let mut set = RecordSet::new("anna", vec![item("A", 0, 1.0)]);
        let id = set.records()[0].id;
        assert_eq!(set.adjust_quantity(id, -1).unwrap().count, 0);
        assert_eq!(set.adjust_quantity(id, 1).unwrap().count, 1);
    }

    #[test]
    fn test_unknown_id() {
        let mut set = RecordSet::new("anna", vec![item("A", 1, 1.0)]);
        let foreign = RecordId::derive("ben", "A", 0);
        assert!(matches!(set.adjust_quantity(foreign, 1), Err(AppError::NotFound(_))));
        assert!(matches!(set.remove(foreign), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_category_filter() {
        let mut rockets = item("R", 1, 1.0);
        rockets.category = Category::Rockets;
        let set = RecordSet::new("anna", vec![item("A", 1, 1.0), rockets]);

        assert_eq!(set.with_categories(&[]).len(), 2);
        let only = set.with_categories(&["Raketen".to_string()]);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].name, "R");
        assert_eq!(set.categories(), vec!["Sonstiges", "Raketen"]);
    }
}
