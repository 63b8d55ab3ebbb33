//! Filtered table queries.
//!
//! A [`Query`] is rendered as PostgREST query parameters by the REST backend
//! and evaluated directly against JSON rows by the in-memory backend.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Neq => "neq",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
        }
    }
}

/// `column <op> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Op,
    pub value: Value,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Conjunction of filters with optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<usize>,
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter<T: Serialize>(mut self, column: &str, op: Op, value: T) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: to_value(value),
        });
        self
    }

    pub fn eq<T: Serialize>(self, column: &str, value: T) -> Self {
        self.filter(column, Op::Eq, value)
    }

    pub fn neq<T: Serialize>(self, column: &str, value: T) -> Self {
        self.filter(column, Op::Neq, value)
    }

    pub fn gt<T: Serialize>(self, column: &str, value: T) -> Self {
        self.filter(column, Op::Gt, value)
    }

    pub fn gte<T: Serialize>(self, column: &str, value: T) -> Self {
        self.filter(column, Op::Gte, value)
    }

    pub fn lt<T: Serialize>(self, column: &str, value: T) -> Self {
        self.filter(column, Op::Lt, value)
    }

    pub fn lte<T: Serialize>(self, column: &str, value: T) -> Self {
        self.filter(column, Op::Lte, value)
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order.push((column.to_string(), Direction::Asc));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order.push((column.to_string(), Direction::Desc));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST query parameters (`col=op.value`, `order=...`, `limit=...`).
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| {
                (
                    f.column.clone(),
                    format!("{}.{}", f.op.as_str(), scalar_to_string(&f.value)),
                )
            })
            .collect();

        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(column, dir)| match dir {
                    Direction::Asc => format!("{}.asc", column),
                    Direction::Desc => format!("{}.desc", column),
                })
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Whether a row satisfies every filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| {
            let actual = row.get(&f.column).unwrap_or(&Value::Null);
            let ordering = compare(actual, &f.value);
            match f.op {
                Op::Eq => ordering == Some(Ordering::Equal),
                Op::Neq => ordering != Some(Ordering::Equal),
                Op::Gt => ordering == Some(Ordering::Greater),
                Op::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                Op::Lt => ordering == Some(Ordering::Less),
                Op::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            }
        })
    }

    /// Filter, sort and truncate rows the way the remote backend would.
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut out: Vec<Value> = rows.into_iter().filter(|r| self.matches(r)).collect();
        if !self.order.is_empty() {
            out.sort_by(|a, b| {
                for (column, dir) in &self.order {
                    let left = a.get(column).unwrap_or(&Value::Null);
                    let right = b.get(column).unwrap_or(&Value::Null);
                    let ord = compare(left, right).unwrap_or(Ordering::Equal);
                    let ord = match dir {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Compare two JSON scalars. Timestamps compare chronologically.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_time(x), parse_time(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_to_params() {
        let query = Query::new()
            .eq("platform", "hub")
            .gte("count", 3)
            .eq("read", false)
            .order_desc("created_at")
            .limit(10);
        let params = query.to_params();
        assert_eq!(
            params,
            vec![
                ("platform".to_string(), "eq.hub".to_string()),
                ("count".to_string(), "gte.3".to_string()),
                ("read".to_string(), "eq.false".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_matches_timestamps_chronologically() {
        let now = Utc::now();
        let row = json!({ "expires_at": (now + Duration::minutes(5)).to_rfc3339() });
        assert!(Query::new().gt("expires_at", now).matches(&row));
        assert!(!Query::new().lt("expires_at", now).matches(&row));
    }

    #[test]
    fn test_apply_orders_and_limits() {
        let rows = vec![
            json!({ "id": 1, "room": "a" }),
            json!({ "id": 3, "room": "a" }),
            json!({ "id": 2, "room": "b" }),
            json!({ "id": 4, "room": "a" }),
        ];
        let out = Query::new().eq("room", "a").order_desc("id").limit(2).apply(rows);
        let ids: Vec<i64> = out.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_missing_column_only_matches_neq() {
        let row = json!({ "a": 1 });
        assert!(!Query::new().eq("b", 1).matches(&row));
        assert!(Query::new().neq("b", 1).matches(&row));
    }
}
