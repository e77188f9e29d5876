pub mod filter;

pub use filter::{Filter, FilterError};

use std::cmp::Ordering;

use crate::models::query::{Page, QueryParams, SortSpec};
use crate::models::Record;

/// Filter, sort and paginate a record list in one go
pub fn run(records: Vec<Record>, params: &QueryParams) -> Result<Page, FilterError> {
    let filter = Filter::parse(params.filters.as_ref().unwrap_or(&serde_json::Value::Null))?;
    let filtered: Vec<Record> = if filter.is_empty() {
        records
    } else {
        records.into_iter().filter(|r| filter.matches(r)).collect()
    };
    let sorted = apply_sort(filtered, params.sort.as_ref());
    let (limit, offset) = params.sanitize();
    Ok(paginate(sorted, limit, offset))
}

/// Stable sort on one field. Records missing the field go last in either direction.
pub fn apply_sort(records: Vec<Record>, sort: Option<&SortSpec>) -> Vec<Record> {
    let Some(field) = sort.and_then(|s| s.field.as_deref()).filter(|f| !f.is_empty()) else {
        return records;
    };
    let descending = sort.is_some_and(SortSpec::descending);
    let path: Vec<String> = field.split('.').map(String::from).collect();

    let (mut present, missing): (Vec<Record>, Vec<Record>) = records
        .into_iter()
        .partition(|r| filter::resolve_field(r, &path).is_some());

    present.sort_by(|a, b| {
        let ord = match (filter::resolve_field(a, &path), filter::resolve_field(b, &path)) {
            (Some(x), Some(y)) => sort_order(x, y),
            _ => Ordering::Equal,
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    present.extend(missing);
    present
}

/// Total order for sorting: like types compare by value, mixed types by type rank
fn sort_order(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    filter::compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

fn type_rank(v: &serde_json::Value) -> u8 {
    use serde_json::Value;
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Window `records` starting at `offset`; `None` limit returns the rest
pub fn paginate(records: Vec<Record>, limit: Option<usize>, offset: usize) -> Page {
    let total = records.len();
    let items: Vec<Record> = match limit {
        Some(limit) => records.into_iter().skip(offset).take(limit).collect(),
        None => records.into_iter().skip(offset).collect(),
    };
    let count = items.len();
    Page {
        items,
        total,
        count,
        offset,
        has_more: offset + count < total,
    }
}
