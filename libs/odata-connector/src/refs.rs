//! Navigation-link management: `$ref` additions, removals and the diff
//! that drives them on update.

use crate::client::{EntitySetClient, IF_MATCH, Row};
use crate::error::ConnectorError;
use crate::keys::{key_literal, key_of, normalize_key};
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::{Value, json};

const REF_CONTENT_TYPE: &str = "application/json;odata.metadata=minimal";

/// Reference keys to link and unlink, per navigation field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefDiff {
    pub add: IndexMap<String, Vec<Value>>,
    pub remove: IndexMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefOp {
    Add,
    Remove,
}

/// `null` is no reference, an array is many, anything else is one.
fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

impl RefDiff {
    /// Compares the navigation fields of `updated` with the same fields of
    /// `current`. `key_for(field, item)` reduces an item (key or expanded
    /// row) to its key; items without one are ignored.
    #[must_use]
    pub fn compute<F>(updated: &Row, current: Option<&Row>, key_for: F) -> Self
    where
        F: Fn(&str, &Value) -> Option<Value>,
    {
        let keys = |field: &str, value: Option<&Value>| -> Vec<Value> {
            let mut keys: Vec<Value> = Vec::new();
            for key in value
                .map(as_list)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|item| key_for(field, item))
            {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            keys
        };

        let mut diff = Self::default();
        for (field, value) in updated {
            let wanted = keys(field, Some(value));
            let existing = keys(field, current.and_then(|row| row.get(field)));

            let add: Vec<Value> = wanted
                .iter()
                .filter(|k| !existing.contains(k))
                .cloned()
                .collect();
            let remove: Vec<Value> = existing
                .into_iter()
                .filter(|k| !wanted.contains(k))
                .collect();

            if !add.is_empty() {
                diff.add.insert(field.clone(), add);
            }
            if !remove.is_empty() {
                diff.remove.insert(field.clone(), remove);
            }
        }
        diff
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

impl EntitySetClient {
    /// Reduces a navigation value to the related row's key, in the
    /// related model's key type.
    fn ref_key(&self, field: &str, item: &Value) -> Option<Value> {
        let related = self
            .model()
            .and_then(|m| m.ref_model(field))
            .and_then(|name| self.session.registry.model(name));
        key_of(related, item).map(|key| normalize_key(related, &key))
    }

    /// Links every reference in `ref_data` to the row at `key`.
    pub(crate) async fn add_refs(&self, key: &Value, ref_data: &Row) -> Result<(), ConnectorError> {
        let refs: IndexMap<String, Vec<Value>> = ref_data
            .iter()
            .map(|(field, value)| {
                let keys = as_list(value)
                    .into_iter()
                    .filter_map(|item| self.ref_key(field, item))
                    .collect();
                (field.clone(), keys)
            })
            .collect();
        self.manage_refs(RefOp::Add, key, &refs).await
    }

    /// Reads the current links of `key` and applies the difference to
    /// `ref_data`, additions and removals concurrently.
    pub(crate) async fn update_refs(
        &self,
        key: &Value,
        ref_data: &Row,
    ) -> Result<(), ConnectorError> {
        let current = self.find_by_id(key).await?;
        let diff = RefDiff::compute(ref_data, current.as_ref(), |field, item| {
            self.ref_key(field, item)
        });
        tracing::debug!(
            entity_set = %self.name,
            add = diff.add.values().map(Vec::len).sum::<usize>(),
            remove = diff.remove.values().map(Vec::len).sum::<usize>(),
            "reconciling navigation links"
        );

        tokio::try_join!(
            self.manage_refs(RefOp::Add, key, &diff.add),
            self.manage_refs(RefOp::Remove, key, &diff.remove),
        )?;
        Ok(())
    }

    async fn manage_refs(
        &self,
        op: RefOp,
        key: &Value,
        refs: &IndexMap<String, Vec<Value>>,
    ) -> Result<(), ConnectorError> {
        let requests = refs.iter().flat_map(|(field, keys)| {
            keys.iter().map(move |ref_key| self.link(op, key, field, ref_key))
        });
        try_join_all(requests).await?;
        Ok(())
    }

    async fn link(
        &self,
        op: RefOp,
        key: &Value,
        field: &str,
        ref_key: &Value,
    ) -> Result<(), ConnectorError> {
        let model = self.require_model()?;
        let related_name = model
            .ref_model(field)
            .ok_or_else(|| ConnectorError::UnknownModel(format!("{}.{field}", self.name)))?;
        let related = self.session.registry.model(related_name);
        let ref_literal = key_literal(related, ref_key);
        let entity = self.entity_url(key);

        let request = match op {
            RefOp::Add => {
                let url = format!("{entity}/{field}/$ref");
                let body = json!({
                    "@odata.id": format!("{}{related_name}({ref_literal})", self.session.url)
                });
                tracing::debug!(entity_set = %self.name, %url, "POST $ref");
                self.session
                    .http
                    .post(&url)
                    .header("content-type", REF_CONTENT_TYPE)
                    .header("odata-version", "4.0")
                    .json(&body)?
            }
            RefOp::Remove => {
                let url = format!("{entity}/{field}({ref_literal})");
                tracing::debug!(entity_set = %self.name, %url, "DELETE reference");
                self.session.http.delete(&url).header(IF_MATCH, "*")
            }
        };
        self.fetch(request).await?;
        Ok(())
    }
}
