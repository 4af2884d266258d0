//! Sorting and paging applied after a scan.
//!
//! Scans return items in no particular order and have no offset, so ordering,
//! offset and limit are applied here, in the adapter.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

/// Sort, offset and limit requested by a `find_many` caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub sort_by: Option<SortBy>,
    pub offset: Option<usize>,
    /// Zero is treated as "no limit", like an absent limit.
    pub limit: Option<usize>,
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.sort_by = Some(SortBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&l| l > 0)
    }

    fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// How many matching items to request from the store.
    ///
    /// Without a sort, the first `limit + offset` matches are enough. With a
    /// sort, any bounded window of an unordered scan could miss rows that
    /// belong on the page, so the whole filtered set is read.
    pub fn fetch_cap(&self) -> Option<usize> {
        match (&self.sort_by, self.effective_limit()) {
            (None, Some(limit)) => Some(limit.saturating_add(self.effective_offset())),
            _ => None,
        }
    }
}

/// Orders two attribute values the way the post-processor sorts them.
///
/// Numbers compare numerically, strings lexically, booleans false < true.
/// Values of different types order by kind: missing or null, booleans,
/// numbers, strings, then lists and maps (which compare equal among
/// themselves). The order is total, so a stable sort keeps ties in input order.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (a, b) => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Applies sort, then offset, then limit.
pub fn apply(mut rows: Vec<Item>, pagination: &Pagination) -> Vec<Item> {
    if let Some(sort) = &pagination.sort_by {
        rows.sort_by(|a, b| {
            let ordering = compare_values(a.get(&sort.field), b.get(&sort.field));
            match sort.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            }
        });
    }

    let offset = pagination.effective_offset();
    let rows = rows.into_iter().skip(offset);
    match pagination.effective_limit() {
        Some(limit) => rows.take(limit).collect(),
        None => rows.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(ages: &[i64]) -> Vec<Item> {
        ages.iter()
            .enumerate()
            .map(|(i, age)| {
                let mut item = Item::new();
                item.insert("id".to_string(), json!(format!("u{i}")));
                item.insert("age".to_string(), json!(age));
                item
            })
            .collect()
    }

    fn ages(rows: &[Item]) -> Vec<i64> {
        rows.iter()
            .map(|r| r.get("age").and_then(Value::as_i64).unwrap())
            .collect()
    }

    #[test]
    fn test_sort_desc_offset_limit() {
        let pagination = Pagination::new()
            .sort_by("age", Direction::Desc)
            .offset(1)
            .limit(2);

        let result = apply(rows(&[10, 30, 20, 50, 40]), &pagination);
        assert_eq!(ages(&result), vec![40, 30]);
    }

    #[test]
    fn test_sort_asc() {
        let pagination = Pagination::new().sort_by("age", Direction::Asc);
        let result = apply(rows(&[10, 30, 20]), &pagination);
        assert_eq!(ages(&result), vec![10, 20, 30]);
    }

    #[test]
    fn test_ties_preserve_input_order() {
        let pagination = Pagination::new().sort_by("age", Direction::Desc);

        let ids: Vec<_> = apply(rows(&[1, 2, 1, 1]), &pagination)
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["u1", "u0", "u2", "u3"]);
    }

    #[test]
    fn test_missing_values_sort_first_ascending() {
        let mut input = rows(&[3, 1, 2]);
        input[0].remove("age");
        let pagination = Pagination::new().sort_by("age", Direction::Asc);

        let ids: Vec<_> = apply(input, &pagination)
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["u0", "u1", "u2"]);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let result = apply(rows(&[1, 2]), &Pagination::new().offset(5));
        assert!(result.is_empty());
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let result = apply(rows(&[1, 2, 3]), &Pagination::new().limit(0));
        assert_eq!(result.len(), 3);
        assert_eq!(Pagination::new().limit(0).fetch_cap(), None);
    }

    #[test]
    fn test_fetch_cap() {
        assert_eq!(Pagination::new().fetch_cap(), None);
        assert_eq!(Pagination::new().limit(10).fetch_cap(), Some(10));
        assert_eq!(Pagination::new().limit(10).offset(5).fetch_cap(), Some(15));
        assert_eq!(
            Pagination::new()
                .limit(10)
                .sort_by("age", Direction::Asc)
                .fetch_cap(),
            None
        );
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!(1.5)), Some(&json!(1))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&json!(false)), Some(&json!(true))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!("1")), Some(&json!(1))),
            Ordering::Greater
        );
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!([1])), Some(&json!([2]))),
            Ordering::Equal
        );
    }

    #[test]
    fn test_sort_by_deserializes_direction() {
        let sort: SortBy = serde_json::from_value(json!({"field": "createdAt", "direction": "desc"}))
            .unwrap();
        assert_eq!(sort.direction, Direction::Desc);

        let sort: SortBy = serde_json::from_value(json!({"field": "createdAt"})).unwrap();
        assert_eq!(sort.direction, Direction::Asc);
    }
}
