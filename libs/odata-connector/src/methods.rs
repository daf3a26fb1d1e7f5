//! Bulk and conditional operations composed from the single-row ones.

use crate::client::{EntitySetClient, Row};
use crate::error::ConnectorError;
use crate::options::QueryOptions;
use futures::future::try_join_all;
use odata_edm::ModelDefinition;
use serde_json::Value;

/// Whether `data` sets the real key of `model` to something.
pub fn sets_primary_key(model: &ModelDefinition, data: &Row) -> bool {
    data.get(model.primary_key()).is_some_and(|v| !v.is_null())
}

impl EntitySetClient {
    /// Matching-row count for non-empty options, `$count` otherwise.
    ///
    /// # Errors
    /// `Validation` for bad options, otherwise the request failure.
    pub async fn count_matching(&self, options: QueryOptions) -> Result<u64, ConnectorError> {
        if options.is_empty() {
            return self.count().await;
        }
        let rows = self.query(options).await?;
        Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
    }

    /// Creates every row concurrently; rows the service returns no body
    /// for are left out of the result.
    ///
    /// # Errors
    /// The first failed create. The others may already have succeeded.
    pub async fn create_many(&self, rows: &[Row]) -> Result<Vec<Row>, ConnectorError> {
        let created = try_join_all(rows.iter().map(|row| self.create(row))).await?;
        Ok(created.into_iter().flatten().collect())
    }

    /// Writes `payload` back, reconciling the navigation fields named in
    /// `changed`. Returns `payload` when the row was updated.
    ///
    /// # Errors
    /// `Rejected` when `changed` touches the key, `Validation` when
    /// `payload` has no key.
    pub async fn save(&self, payload: &Row, changed: &Row) -> Result<Option<Row>, ConnectorError> {
        let model = self.require_model()?;
        if sets_primary_key(model, changed) {
            return Err(ConnectorError::Rejected(
                "primary key column can't be updated".to_owned(),
            ));
        }
        let key = self.row_key(payload)?;
        let affected = self.update(&key, changed, payload).await?;
        Ok((affected > 0).then(|| payload.clone()))
    }

    /// Applies `doc` to every row concurrently and returns the merged rows.
    ///
    /// # Errors
    /// `Validation` when a row has no key, otherwise the first failed update.
    pub async fn save_many(&self, rows: &[Row], doc: &Row) -> Result<Vec<Row>, ConnectorError> {
        let updates = rows.iter().map(|row| async move {
            let key = self.row_key(row)?;
            let mut merged = row.clone();
            merged.extend(doc.iter().map(|(k, v)| (k.clone(), v.clone())));
            let affected = self.update(&key, doc, &merged).await?;
            Ok::<_, ConnectorError>((affected > 0).then_some(merged))
        });
        let saved = try_join_all(updates).await?;
        Ok(saved.into_iter().flatten().collect())
    }

    /// Applies `doc` to every row matching `options`.
    ///
    /// # Errors
    /// `Rejected` when `doc` sets the key; otherwise as
    /// [`query`](Self::query) and [`save_many`](Self::save_many).
    pub async fn find_and_modify(
        &self,
        options: QueryOptions,
        doc: &Row,
    ) -> Result<Vec<Row>, ConnectorError> {
        let model = self.require_model()?;
        if sets_primary_key(model, doc) {
            return Err(ConnectorError::Rejected(
                "primary key column can't be specified".to_owned(),
            ));
        }
        let rows = self.query(options).await?;
        self.save_many(&rows, doc).await
    }

    /// Updates the row at `id` with `doc`, or creates `doc` when there is
    /// no `id` or no such row.
    ///
    /// # Errors
    /// `Rejected` when `doc` sets the key; otherwise the failed request.
    pub async fn upsert(&self, id: Option<&Value>, doc: &Row) -> Result<Option<Row>, ConnectorError> {
        let model = self.require_model()?;
        if sets_primary_key(model, doc) {
            return Err(ConnectorError::Rejected(
                "primary key column can't be updated".to_owned(),
            ));
        }
        let mut doc = doc.clone();
        doc.remove(model.primary_key());

        let existing = match id {
            Some(id) => self.find_by_id(id).await?,
            None => None,
        };
        match existing {
            Some(row) => Ok(self.save_many(&[row], &doc).await?.into_iter().next()),
            None => {
                tracing::debug!(entity_set = %self.name, found = false, "upsert creates");
                self.create(&doc).await
            }
        }
    }

    /// The key of a row, read from the key field or its shadow.
    fn row_key(&self, row: &Row) -> Result<Value, ConnectorError> {
        let model = self.require_model()?;
        [Some(model.primary_key()), model.shadow_key()]
            .into_iter()
            .flatten()
            .find_map(|field| row.get(field).filter(|v| !v.is_null()).cloned())
            .ok_or_else(|| {
                ConnectorError::validation(format!(
                    "row has no '{}' value",
                    model.primary_key()
                ))
            })
    }
}
