use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::Record;

pub const DEFAULT_LIMIT: usize = 200;
pub const MAX_LIMIT: usize = 5000;

fn default_limit() -> Option<i64> {
    Some(DEFAULT_LIMIT as i64)
}

/// Shared filter/sort/paginate arguments for query tools.
/// Defaults: limit=200, offset=0. Max limit=5000; an explicit null limit returns everything.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub filters: Option<Value>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default = "default_limit", deserialize_with = "nullable")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            filters: None,
            sort: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl QueryParams {
    /// Clamp limit to [1, 5000] and offset to >= 0
    pub fn sanitize(&self) -> (Option<usize>, usize) {
        let limit = self.limit.map(|l| l.clamp(1, MAX_LIMIT as i64) as usize);
        let offset = self.offset.max(0) as usize;
        (limit, offset)
    }

    /// True when the filter argument is absent or an empty object
    pub fn has_filters(&self) -> bool {
        match &self.filters {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }
}

fn nullable<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Option::<i64>::deserialize(d)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SortSpec {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

impl SortSpec {
    pub fn descending(&self) -> bool {
        self.direction
            .as_deref()
            .map(|d| d.eq_ignore_ascii_case("desc"))
            .unwrap_or(false)
    }
}

/// One window of a filtered, sorted record list
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: usize,
    pub count: usize,
    pub offset: usize,
    pub has_more: bool,
}
