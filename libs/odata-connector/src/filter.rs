//! `where` descriptors to `$filter` expressions.
//!
//! Each field contributes at most one parenthesised clause; clauses are
//! joined with ` and ` in field order. When a field object carries several
//! operators only the first in this order applies: `$like`, `$lt`, `$lte`,
//! `$gt`, `$gte`, `$ne`, `$eq`. A bare scalar means `$eq`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How `$like` is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeStyle {
    /// `(substringof('v', Field))`
    #[default]
    Closed,
    /// `(substringof('v', Field)`, byte-compatible with older deployments
    Legacy,
}

const COMPARISONS: [(&str, &str); 6] = [
    ("$lt", "lt"),
    ("$lte", "le"),
    ("$gt", "gt"),
    ("$gte", "ge"),
    ("$ne", "ne"),
    ("$eq", "eq"),
];

/// Renders a filter literal: strings single-quoted (embedded quotes
/// doubled), everything else bare.
#[must_use]
pub fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => quote(s),
        other => other.to_string(),
    }
}

pub(crate) fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// One field's clause, or `None` when the field contributes nothing
/// (empty or unrecognised operator object, `null`, arrays).
#[must_use]
pub fn field_clause(key: &str, condition: &Value, like_style: LikeStyle) -> Option<String> {
    match condition {
        Value::Object(ops) => {
            if let Some(pattern) = ops.get("$like") {
                let close = match like_style {
                    LikeStyle::Closed => ")",
                    LikeStyle::Legacy => "",
                };
                return Some(format!("(substringof({}, {key}){close}", literal(pattern)));
            }
            COMPARISONS.iter().find_map(|(op, odata_op)| {
                ops.get(*op)
                    .map(|value| format!("({key} {odata_op} {})", literal(value)))
            })
        }
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            Some(format!("({key} eq {})", literal(condition)))
        }
        Value::Null | Value::Array(_) => None,
    }
}

/// Appends the clause for `key` to `accumulated`.
#[must_use]
pub fn translate_where_to_query(
    where_clause: &Map<String, Value>,
    accumulated: &str,
    key: &str,
    like_style: LikeStyle,
) -> String {
    let Some(clause) = where_clause
        .get(key)
        .and_then(|condition| field_clause(key, condition, like_style))
    else {
        return accumulated.to_owned();
    };
    if accumulated.is_empty() {
        clause
    } else {
        format!("{accumulated} and {clause}")
    }
}

/// The whole `$filter`, or `None` when no field produced a clause.
#[must_use]
pub fn build_filter(where_clause: &Map<String, Value>, like_style: LikeStyle) -> Option<String> {
    let filter = where_clause.keys().fold(String::new(), |acc, key| {
        translate_where_to_query(where_clause, &acc, key, like_style)
    });
    (!filter.is_empty()).then_some(filter)
}
