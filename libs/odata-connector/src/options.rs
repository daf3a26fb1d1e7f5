//! Query descriptors and their validation.

use crate::error::ConnectorError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MAX_LIMIT: u64 = 1000;

/// The abstract query a caller hands to `query`, `distinct`, `count` and
/// `find_and_modify`.
///
/// `sel` wins over `unsel`; `skip`/`limit` win over `page`/`per_page`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOptions {
    /// Object, or a JSON string holding one
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sel: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsel: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<i64>,
}

/// Resolved `$skip`/`$top`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paging {
    pub skip: Option<u64>,
    pub top: Option<u64>,
}

fn non_negative(name: &str, value: Option<i64>, min: i64) -> Result<Option<u64>, ConnectorError> {
    value
        .map(|v| {
            u64::try_from(v)
                .ok()
                .filter(|_| v >= min)
                .ok_or_else(|| ConnectorError::validation(format!("\"{name}\" must be >= {min}")))
        })
        .transpose()
}

impl QueryOptions {
    /// Reads options from loose JSON (request query, CLI input).
    ///
    /// # Errors
    /// `Validation` for unknown keys or mistyped values.
    pub fn from_value(value: Value) -> Result<Self, ConnectorError> {
        serde_json::from_value(value).map_err(|e| ConnectorError::validation(e.to_string()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn with_where(mut self, where_clause: Value) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks ranges and shapes, and parses a string `where`.
    ///
    /// # Errors
    /// `Validation` describing the first offending option.
    pub fn validated(mut self, max_limit: u64) -> Result<Self, ConnectorError> {
        if let Some(limit) = non_negative("limit", self.limit, 0)?
            && limit > max_limit
        {
            return Err(ConnectorError::validation(format!(
                "\"limit\" must be <= {max_limit}"
            )));
        }
        non_negative("skip", self.skip, 0)?;
        non_negative("page", self.page, 1)?;
        non_negative("per_page", self.per_page, 0)?;

        if let Some(Value::String(raw)) = &self.where_clause {
            let parsed: Value = serde_json::from_str(raw).map_err(|e| {
                ConnectorError::validation(format!("\"where\" is not valid JSON: {e}"))
            })?;
            self.where_clause = Some(parsed);
        }
        match &self.where_clause {
            None | Some(Value::Object(_)) => Ok(self),
            Some(_) => Err(ConnectorError::validation("\"where\" must be an object")),
        }
    }

    /// The `where` object, once validated.
    #[must_use]
    pub fn where_map(&self) -> Option<&Map<String, Value>> {
        self.where_clause.as_ref().and_then(Value::as_object)
    }

    #[must_use]
    pub fn paging(&self) -> Paging {
        let to_u64 = |v: Option<i64>| v.and_then(|v| u64::try_from(v).ok());
        if self.skip.is_some() || self.limit.is_some() {
            return Paging {
                skip: to_u64(self.skip),
                top: to_u64(self.limit),
            };
        }
        match (to_u64(self.page), to_u64(self.per_page)) {
            (Some(page), Some(per_page)) => Paging {
                skip: Some(page.saturating_sub(1).saturating_mul(per_page)),
                top: Some(per_page),
            },
            _ => Paging::default(),
        }
    }
}

/// Keys of a `sel`/`unsel` object whose flag is `1` (or `true`).
pub fn flagged(map: &Map<String, Value>) -> impl Iterator<Item = &str> {
    map.iter()
        .filter(|(_, flag)| flag.as_i64() == Some(1) || flag.as_bool() == Some(true))
        .map(|(name, _)| name.as_str())
}

/// `-1` (number or string) sorts descending; anything else ascending.
pub fn is_descending(direction: &Value) -> bool {
    match direction {
        Value::Number(n) => n.as_i64() == Some(-1),
        Value::String(s) => s.trim().parse::<i64>() == Ok(-1),
        _ => false,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<QueryOptions, ConnectorError> {
        QueryOptions::from_value(value)?.validated(DEFAULT_MAX_LIMIT)
    }

    #[test]
    fn test_valid_options() {
        let options = parse(json!({
            "where": {"Name": "Foo"},
            "order": {"Name": -1},
            "sel": {"Name": 1},
            "skip": 0,
            "limit": 1000
        }))
        .unwrap();
        assert_eq!(options.where_map().unwrap()["Name"], "Foo");
        assert_eq!(
            options.paging(),
            Paging {
                skip: Some(0),
                top: Some(1000)
            }
        );
    }

    #[test]
    fn test_range_checks() {
        assert!(matches!(
            parse(json!({"limit": 1001})),
            Err(ConnectorError::Validation(m)) if m.contains("limit")
        ));
        assert!(parse(json!({"limit": -1})).is_err());
        assert!(parse(json!({"skip": -5})).is_err());
        assert!(parse(json!({"page": 0})).is_err());
        assert!(parse(json!({"per_page": -1})).is_err());
        assert!(parse(json!({"page": 1, "per_page": 0})).is_ok());
        assert!(
            QueryOptions::from_value(json!({"limit": 60}))
                .unwrap()
                .validated(50)
                .is_err()
        );
    }

    #[test]
    fn test_shape_checks() {
        assert!(parse(json!({"limit": 1.5})).is_err());
        assert!(parse(json!({"order": "Name"})).is_err());
        assert!(parse(json!({"sel": ["Name"]})).is_err());
        assert!(parse(json!({"where": 5})).is_err());
        assert!(matches!(
            parse(json!({"fields": {}})),
            Err(ConnectorError::Validation(m)) if m.contains("fields")
        ));
    }

    #[test]
    fn test_string_where_is_parsed() {
        let options = parse(json!({"where": "{\"Age\": {\"$gt\": 3}}"})).unwrap();
        assert_eq!(options.where_map().unwrap()["Age"]["$gt"], 3);

        assert!(matches!(
            parse(json!({"where": "{oops"})),
            Err(ConnectorError::Validation(m)) if m.contains("where")
        ));
        assert!(parse(json!({"where": "[1]"})).is_err());
    }

    #[test]
    fn test_paging_precedence() {
        let page = parse(json!({"page": 3, "per_page": 10})).unwrap();
        assert_eq!(
            page.paging(),
            Paging {
                skip: Some(20),
                top: Some(10)
            }
        );

        let both = parse(json!({"limit": 5, "page": 3, "per_page": 10})).unwrap();
        assert_eq!(
            both.paging(),
            Paging {
                skip: None,
                top: Some(5)
            }
        );

        let page_only = parse(json!({"page": 2})).unwrap();
        assert_eq!(page_only.paging(), Paging::default());
    }

    #[test]
    fn test_flags_and_directions() {
        let sel = json!({"A": 1, "B": 0, "C": true});
        let names: Vec<_> = flagged(sel.as_object().unwrap()).collect();
        assert_eq!(names, ["A", "C"]);

        assert!(is_descending(&json!(-1)));
        assert!(is_descending(&json!("-1")));
        assert!(!is_descending(&json!(1)));
        assert!(!is_descending(&json!("desc")));
    }

    #[test]
    fn test_is_empty() {
        assert!(QueryOptions::default().is_empty());
        assert!(!QueryOptions::default().with_limit(1).is_empty());
    }
}
