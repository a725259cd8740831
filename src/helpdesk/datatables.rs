//! Server-side grid widget protocol.
//!
//! Requests arrive as flat query pairs (`draw`, `start`, `length`,
//! `search[value]`, `order[0][column]`, `columns[3][name]`, ...). Responses
//! carry `{draw, recordsTotal, recordsFiltered, data}`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::helpdesk::db::{OrderBy, SortDir};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSpec {
    pub data: String,
    pub name: String,
    pub searchable: bool,
    pub orderable: bool,
}

impl ColumnSpec {
    /// The column's `name`, or its `data` key when no name was given.
    pub fn key(&self) -> &str {
        if self.name.is_empty() {
            &self.data
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTablesRequest {
    pub draw: i64,
    pub start: usize,
    /// `None` when the widget asks for every row (`length=-1`).
    pub length: Option<usize>,
    pub search: Option<String>,
    pub columns: Vec<ColumnSpec>,
    /// (column index, direction) in priority order.
    pub order: Vec<(usize, SortDir)>,
}

/// Highest `columns[..]`/`order[..]` index accepted; larger ones are ignored.
const MAX_INDEX: usize = 256;

fn flag(value: &str) -> bool {
    value == "true"
}

impl DataTablesRequest {
    pub fn from_pairs(pairs: &[(String, String)], default_length: usize) -> Self {
        let mut draw = 0;
        let mut start = 0;
        let mut length = Some(default_length);
        let mut search = None;
        let mut columns: BTreeMap<usize, ColumnSpec> = BTreeMap::new();
        let mut order: BTreeMap<usize, (Option<usize>, SortDir)> = BTreeMap::new();

        for (key, value) in pairs {
            match key.as_str() {
                "draw" => draw = value.parse().unwrap_or(0),
                "start" => start = value.parse().unwrap_or(0),
                "length" => {
                    length = match value.parse::<i64>() {
                        Ok(n) if n < 0 => None,
                        Ok(n) => Some(n as usize),
                        Err(_) => Some(default_length),
                    }
                }
                "search[value]" => {
                    let v = value.trim();
                    search = (!v.is_empty()).then(|| v.to_string());
                }
                _ => {
                    if let Some((index, field)) = indexed(key, "columns") {
                        let col = columns.entry(index).or_default();
                        match field {
                            "[data]" => col.data = value.clone(),
                            "[name]" => col.name = value.clone(),
                            "[searchable]" => col.searchable = flag(value),
                            "[orderable]" => col.orderable = flag(value),
                            _ => {}
                        }
                    } else if let Some((index, field)) = indexed(key, "order") {
                        let entry = order.entry(index).or_insert((None, SortDir::Asc));
                        match field {
                            "[column]" => entry.0 = value.parse().ok(),
                            "[dir]" => {
                                entry.1 = if value.eq_ignore_ascii_case("desc") {
                                    SortDir::Desc
                                } else {
                                    SortDir::Asc
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        // Sparse column indexes keep their position.
        let max = columns.keys().next_back().map(|m| m + 1).unwrap_or(0);
        let columns = (0..max)
            .map(|i| columns.remove(&i).unwrap_or_default())
            .collect();

        Self {
            draw,
            start,
            length,
            search,
            columns,
            order: order
                .into_values()
                .filter_map(|(col, dir)| col.map(|c| (c, dir)))
                .collect(),
        }
    }

    /// Requested ordering as column names; unknown indexes and
    /// non-orderable columns are dropped. Defaults to id descending.
    pub fn order_by(&self) -> Vec<OrderBy> {
        let order: Vec<OrderBy> = self
            .order
            .iter()
            .filter_map(|(index, dir)| {
                let col = self.columns.get(*index)?;
                (col.orderable && !col.key().is_empty()).then(|| OrderBy {
                    column: col.key().to_string(),
                    dir: *dir,
                })
            })
            .collect();
        if order.is_empty() {
            vec![OrderBy {
                column: "id".to_string(),
                dir: SortDir::Desc,
            }]
        } else {
            order
        }
    }

    pub fn search_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.searchable && !c.key().is_empty())
            .map(|c| c.key().to_string())
            .collect()
    }
}

/// Split `columns[3][name]` into `(3, "[name]")`.
fn indexed<'k>(key: &'k str, prefix: &str) -> Option<(usize, &'k str)> {
    let rest = key.strip_prefix(prefix)?.strip_prefix('[')?;
    let close = rest.find(']')?;
    let index = rest[..close].parse().ok().filter(|i| *i < MAX_INDEX)?;
    Some((index, &rest[close + 1..]))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTablesResponse {
    pub draw: i64,
    pub records_total: i64,
    pub records_filtered: i64,
    pub data: Vec<Map<String, Value>>,
}
