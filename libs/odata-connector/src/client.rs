//! Per-entity-set request engine.

use crate::error::ConnectorError;
use crate::filter::{LikeStyle, build_filter, literal};
use crate::keys::{encode_segment, key_literal, key_of};
use crate::methods::sets_primary_key;
use crate::options::{QueryOptions, flagged, is_descending};
use crate::registry::ModelRegistry;
use futures::future::try_join_all;
use http::StatusCode;
use odata_edm::ModelDefinition;
use odata_http::{ERROR_BODY_PREVIEW_LIMIT, HttpClient, HttpError, HttpResponse, RequestBuilder};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// One entity as a JSON object.
pub type Row = Map<String, Value>;

pub const IF_MATCH: &str = "If-Match";

/// State shared by every client of one connector.
pub struct Session {
    pub http: HttpClient,
    /// Service root, always ending with `/`
    pub url: String,
    pub registry: ModelRegistry,
    pub like_style: LikeStyle,
    pub max_limit: u64,
}

/// Client for one entity set (or singleton).
///
/// Holds nothing but the set name and a handle to the connector session;
/// create as many as needed.
#[derive(Clone)]
pub struct EntitySetClient {
    pub(crate) session: Arc<Session>,
    pub(crate) name: String,
}

impl fmt::Debug for EntitySetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySetClient")
            .field("url", &self.session.url)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// `$name=value` pairs in insertion order; values are percent-encoded.
#[derive(Debug, Default)]
struct QueryParams(Vec<(&'static str, String)>);

impl QueryParams {
    fn push(&mut self, name: &'static str, value: impl Into<String>) {
        self.0.push((name, value.into()));
    }

    fn apply(&self, base: String) -> String {
        self.0
            .iter()
            .enumerate()
            .fold(base, |mut url, (i, (name, value))| {
                url.push(if i == 0 { '?' } else { '&' });
                url.push_str(name);
                url.push('=');
                url.push_str(&urlencoding::encode(value));
                url
            })
    }
}

impl EntitySetClient {
    pub(crate) fn new(session: Arc<Session>, name: &str) -> Self {
        Self {
            session,
            name: name.to_owned(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Service root this client talks to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.session.url
    }

    #[must_use]
    pub fn model(&self) -> Option<&ModelDefinition> {
        self.session.registry.model(&self.name)
    }

    pub(crate) fn require_model(&self) -> Result<&ModelDefinition, ConnectorError> {
        self.model()
            .ok_or_else(|| ConnectorError::UnknownModel(self.name.clone()))
    }

    fn ensure_allowed(&self, action: &str) -> Result<(), ConnectorError> {
        match self.model() {
            Some(model) if !model.allows(action) => Err(ConnectorError::Rejected(format!(
                "{action} is not supported by '{}'",
                self.name
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn set_url(&self) -> String {
        format!("{}{}", self.session.url, self.name)
    }

    pub(crate) fn entity_url(&self, key: &Value) -> String {
        format!("{}({})", self.set_url(), key_literal(self.model(), key))
    }

    /// Real property name for a caller-facing one (shadow key to key).
    fn wire_name<'a>(&'a self, name: &'a str) -> &'a str {
        match self.model() {
            Some(model) if model.shadow_key() == Some(name) => model.primary_key(),
            _ => name,
        }
    }

    /// `$expand` for the navigation fields among `select` (all of them
    /// when nothing is selected).
    fn expand(&self, select: Option<&[String]>) -> Option<String> {
        let model = self.model().filter(|m| m.has_ref_fields())?;
        let fields: Vec<&str> = match select {
            Some(selected) => selected
                .iter()
                .map(String::as_str)
                .filter(|f| model.is_ref_field(f))
                .collect(),
            None => model.ref_fields().map(|(field, _)| field).collect(),
        };
        (!fields.is_empty()).then(|| fields.join(","))
    }

    /// Copies the key into the shadow field so callers can read it back
    /// under the name they write it with.
    fn decorate(&self, mut row: Row) -> Row {
        row.retain(|name, _| !name.contains('@'));
        if let Some(model) = self.model()
            && let Some(shadow) = model.shadow_key()
            && let Some(key) = row.get(model.primary_key()).cloned()
        {
            row.insert(shadow.to_owned(), key);
        }
        row
    }

    pub(crate) async fn fetch(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<Value>, ConnectorError> {
        let response = request.send().await?;
        tracing::trace!(entity_set = %self.name, status = response.status().as_u16(), "response");
        read_payload(response).await
    }

    async fn get_rows(&self, url: &str) -> Result<Vec<Row>, ConnectorError> {
        tracing::debug!(entity_set = %self.name, %url, "GET collection");
        let payload = self.fetch(self.session.http.get(url)).await?;
        Ok(collection(payload)?
            .into_iter()
            .map(|row| self.decorate(row))
            .collect())
    }

    /// Every row, in server order, fetched page by page until `limit`
    /// (clamped to the current count) rows are collected.
    ///
    /// # Errors
    /// The first failed request.
    pub async fn find_all(&self, limit: Option<u64>) -> Result<Vec<Row>, ConnectorError> {
        self.ensure_allowed("findAll")?;
        let count = self.count().await?;
        let limit = match limit {
            Some(limit) if limit > 0 && limit < count => limit,
            _ => count,
        };
        let wanted = usize::try_from(limit).unwrap_or(usize::MAX);
        let expand = self.expand(None);

        let mut items: Vec<Row> = Vec::new();
        while items.len() < wanted {
            let mut params = QueryParams::default();
            params.push("$skip", items.len().to_string());
            if let Some(expand) = &expand {
                params.push("$expand", expand.as_str());
            }
            let page = self.get_rows(&params.apply(self.set_url())).await?;
            if page.is_empty() {
                tracing::warn!(
                    entity_set = %self.name,
                    fetched = items.len(),
                    count = limit,
                    "empty page before reaching the count; stopping"
                );
                break;
            }
            items.extend(page);
        }
        items.truncate(wanted);
        Ok(items)
    }

    /// `None` when the service answers 404.
    ///
    /// # Errors
    /// Any other failure.
    pub async fn find_by_id(&self, key: &Value) -> Result<Option<Row>, ConnectorError> {
        self.ensure_allowed("findByID")?;
        let mut params = QueryParams::default();
        if let Some(expand) = self.expand(None) {
            params.push("$expand", expand);
        }
        let url = params.apply(self.entity_url(key));
        tracing::debug!(entity_set = %self.name, %url, "GET entity");

        match self.fetch(self.session.http.get(&url)).await {
            Ok(payload) => Ok(entity(payload)?.map(|row| self.decorate(row))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Reads a singleton.
    ///
    /// # Errors
    /// `Rejected` for anything but a singleton, otherwise the failed request.
    pub async fn read(&self) -> Result<Option<Row>, ConnectorError> {
        if !self.model().is_some_and(ModelDefinition::is_singleton) {
            return Err(ConnectorError::Rejected(format!(
                "'{}' is not a singleton",
                self.name
            )));
        }
        let mut params = QueryParams::default();
        if let Some(expand) = self.expand(None) {
            params.push("$expand", expand);
        }
        let url = params.apply(self.set_url());
        let payload = self.fetch(self.session.http.get(&url)).await?;
        Ok(entity(payload)?.map(|row| self.decorate(row)))
    }

    /// Runs a query descriptor: `where`, `order`, `sel`/`unsel`, then
    /// `skip`/`limit` or `page`/`per_page`.
    ///
    /// # Errors
    /// `Validation` before any request, otherwise the request failure.
    pub async fn query(&self, options: QueryOptions) -> Result<Vec<Row>, ConnectorError> {
        let options = options.validated(self.session.max_limit)?;
        let mut params = QueryParams::default();

        if let Some(where_map) = options.where_map() {
            let wire: Map<String, Value> = where_map
                .iter()
                .map(|(name, cond)| (self.wire_name(name).to_owned(), cond.clone()))
                .collect();
            if let Some(filter) = build_filter(&wire, self.session.like_style) {
                params.push("$filter", filter);
            }
        }

        if let Some(order) = options.order.as_ref().filter(|o| !o.is_empty()) {
            let orderby = order
                .iter()
                .map(|(name, dir)| {
                    let dir = if is_descending(dir) { "desc" } else { "asc" };
                    format!("{} {dir}", self.wire_name(name))
                })
                .collect::<Vec<_>>()
                .join(",");
            params.push("$orderby", orderby);
        }

        let select = self.select_list(&options);
        if let Some(select) = &select {
            params.push("$select", select.join(","));
        }

        let paging = options.paging();
        if let Some(skip) = paging.skip {
            params.push("$skip", skip.to_string());
        }
        if let Some(top) = paging.top {
            params.push("$top", top.to_string());
        }

        if let Some(expand) = self.expand(select.as_deref()) {
            params.push("$expand", expand);
        }

        self.get_rows(&params.apply(self.set_url())).await
    }

    /// `$select` for `sel` (or, failing that, `unsel`); the key is always
    /// included so rows stay addressable.
    fn select_list(&self, options: &QueryOptions) -> Option<Vec<String>> {
        let model = self.model();
        let mut fields: Vec<String> = if let Some(sel) = &options.sel {
            flagged(sel).map(|f| self.wire_name(f).to_owned()).collect()
        } else if let Some(unsel) = &options.unsel {
            let Some(model) = model else {
                tracing::warn!(entity_set = %self.name, "unsel ignored: model is not registered");
                return None;
            };
            let excluded: Vec<&str> = flagged(unsel).collect();
            model
                .fields
                .keys()
                .filter(|f| !excluded.contains(&f.as_str()))
                .map(|f| self.wire_name(f).to_owned())
                .collect()
        } else {
            return None;
        };

        if let Some(model) = model {
            let key = model.primary_key();
            if !fields.iter().any(|f| f == key) {
                fields.push(key.to_owned());
            }
        }
        let mut seen = Vec::with_capacity(fields.len());
        fields.retain(|f| {
            let fresh = !seen.contains(f);
            if fresh {
                seen.push(f.clone());
            }
            fresh
        });
        Some(fields)
    }

    /// Unique values of `field` across the query result, first
    /// occurrence first.
    ///
    /// # Errors
    /// As [`query`](Self::query).
    pub async fn distinct(
        &self,
        field: &str,
        options: QueryOptions,
    ) -> Result<Vec<Value>, ConnectorError> {
        self.ensure_allowed("distinct")?;
        let mut sel = Map::new();
        sel.insert(field.to_owned(), Value::from(1));
        let options = QueryOptions {
            sel: Some(sel),
            ..options
        };

        let rows = self.query(options).await?;
        let mut values: Vec<Value> = Vec::new();
        for value in rows
            .into_iter()
            .map(|mut row| row.remove(field).unwrap_or(Value::Null))
        {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Posts the scalar fields, then links any navigation values given.
    /// A client-assigned key is passed through its shadow field.
    ///
    /// Returns the created row (with the links merged in), or `None` when
    /// the service answers without a body.
    ///
    /// # Errors
    /// `Rejected` when `data` sets the key itself, otherwise the POST
    /// failure or the first failed link request.
    pub async fn create(&self, data: &Row) -> Result<Option<Row>, ConnectorError> {
        let model = self.require_model()?;
        if sets_primary_key(model, data) {
            return Err(ConnectorError::Rejected(
                "primary key column can't be specified".to_owned(),
            ));
        }
        let ref_data: Row = model
            .ref_fields()
            .filter_map(|(field, _)| data.get(field).map(|v| (field, v)))
            .filter(|(_, value)| !value.is_null())
            .map(|(field, value)| (field.to_owned(), value.clone()))
            .collect();

        let mut body = pick(data, model.main_fields());
        if let Some(shadow) = model.shadow_key()
            && let Some(key) = body.remove(shadow)
            && !key.is_null()
        {
            body.insert(model.primary_key().to_owned(), key);
        }

        let url = self.set_url();
        tracing::debug!(entity_set = %self.name, %url, "POST entity");
        let payload = self
            .fetch(self.session.http.post(&url).json(&body)?)
            .await?;
        let Some(mut row) = entity(payload)? else {
            return Ok(None);
        };

        if let Some(key) = row.get(model.primary_key()).filter(|k| !k.is_null()).cloned()
            && !ref_data.is_empty()
        {
            self.add_refs(&key, &ref_data).await?;
            row.extend(ref_data);
        }
        Ok(Some(self.decorate(row)))
    }

    /// PUTs the scalar fields of `payload` and, concurrently, reconciles
    /// the navigation fields present in `changed`.
    ///
    /// # Errors
    /// The first failed request; already-applied changes are not undone.
    pub async fn update(
        &self,
        key: &Value,
        changed: &Row,
        payload: &Row,
    ) -> Result<u64, ConnectorError> {
        let model = self.require_model()?;
        let ref_data: Row = changed
            .iter()
            .filter(|(field, _)| model.is_ref_field(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        let mut body = pick(payload, model.main_fields());
        body.remove(model.primary_key());
        if let Some(shadow) = model.shadow_key() {
            body.remove(shadow);
        }

        let url = self.entity_url(key);
        tracing::debug!(entity_set = %self.name, %url, refs = ref_data.len(), "PUT entity");
        let put = self.fetch(
            self.session
                .http
                .put(&url)
                .header(IF_MATCH, "*")
                .json(&body)?,
        );
        let refs = async {
            if ref_data.is_empty() {
                Ok(())
            } else {
                self.update_refs(key, &ref_data).await
            }
        };
        tokio::try_join!(put, refs)?;
        Ok(1)
    }

    /// `1` on success, `0` when the row does not exist.
    ///
    /// # Errors
    /// Any failure other than 404.
    pub async fn delete_one(&self, key: &Value) -> Result<u64, ConnectorError> {
        let url = self.entity_url(key);
        tracing::debug!(entity_set = %self.name, %url, "DELETE entity");
        match self
            .fetch(self.session.http.delete(&url).header(IF_MATCH, "*"))
            .await
        {
            Ok(_) => Ok(1),
            Err(err) if err.is_not_found() => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Deletes page after page, each page's rows concurrently, until as
    /// many rows as the initial count are gone.
    ///
    /// # Errors
    /// The first failed request; rows deleted so far stay deleted.
    pub async fn delete_all(&self) -> Result<u64, ConnectorError> {
        let count = self.count().await?;
        let model = self.model();
        let mut deleted = 0u64;

        while deleted < count {
            let rows = self.get_rows(&self.set_url()).await?;
            let keys: Vec<Value> = rows
                .into_iter()
                .filter_map(|row| key_of(model, &Value::Object(row)))
                .collect();
            if keys.is_empty() {
                tracing::warn!(
                    entity_set = %self.name,
                    deleted,
                    count,
                    "no addressable rows left before reaching the count; stopping"
                );
                break;
            }
            try_join_all(keys.iter().map(|key| self.delete_one(key))).await?;
            deleted += u64::try_from(keys.len()).unwrap_or(u64::MAX);
        }

        tracing::debug!(entity_set = %self.name, deleted, "delete_all finished");
        Ok(deleted)
    }

    /// `GET {set}/$count`; an unparseable body counts as `0`.
    ///
    /// # Errors
    /// A failed request.
    pub async fn count(&self) -> Result<u64, ConnectorError> {
        self.ensure_allowed("count")?;
        let url = format!("{}/$count", self.set_url());
        let response = self.session.http.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(service_error(status, &body));
        }

        let text = String::from_utf8_lossy(&body);
        let text = text.trim().trim_start_matches('\u{feff}');
        Ok(text.parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!(entity_set = %self.name, body = %preview(text.as_bytes()), "non-numeric $count; using 0");
            0
        }))
    }

    /// Calls the function or action this client is named after:
    /// `GET {url}{name}(p1=v1,p2=v2)`, each value rendered as a literal.
    ///
    /// Collection and primitive results are unwrapped from `value`.
    ///
    /// # Errors
    /// A failed request.
    pub async fn execute(&self, params: &[(String, Value)]) -> Result<Option<Value>, ConnectorError> {
        let rendered: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| (name.clone(), literal(value)))
            .collect();
        self.call(&rendered).await
    }

    /// [`execute`](Self::execute) with pre-rendered literals.
    pub(crate) async fn call(
        &self,
        params: &[(String, String)],
    ) -> Result<Option<Value>, ConnectorError> {
        let mut url = self.set_url();
        if !params.is_empty() {
            let args: Vec<String> = params
                .iter()
                .map(|(name, value)| format!("{name}={}", encode_segment(value)))
                .collect();
            url.push('(');
            url.push_str(&args.join(","));
            url.push(')');
        }
        tracing::debug!(function = %self.name, %url, "GET function");

        let payload = self.fetch(self.session.http.get(&url)).await?;
        Ok(payload.map(|value| match value {
            Value::Object(mut obj) if obj.contains_key("value") => {
                obj.remove("value").unwrap_or(Value::Null)
            }
            Value::Object(mut obj) => {
                obj.retain(|name, _| !name.contains('@'));
                Value::Object(obj)
            }
            other => other,
        }))
    }
}

/// The listed fields of `data` that are present.
fn pick<'a>(data: &Row, fields: impl Iterator<Item = &'a str>) -> Row {
    fields
        .filter_map(|f| data.get(f).map(|v| (f.to_owned(), v.clone())))
        .collect()
}

/// Reads any response into JSON, turning non-2xx statuses and `error`
/// bodies into [`ConnectorError::Service`]. An empty body is `None`.
async fn read_payload(
    response: HttpResponse,
) -> Result<Option<Value>, ConnectorError> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(service_error(status, &body));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(&body).map_err(HttpError::from)?;
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(ConnectorError::Service {
            status,
            message: error_message(error).unwrap_or_else(|| error.to_string()),
        });
    }
    Ok(Some(value))
}

fn service_error(status: StatusCode, body: &[u8]) -> ConnectorError {
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(error_message))
        .unwrap_or_else(|| {
            let text = preview(body);
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            } else {
                text
            }
        });
    tracing::debug!(status = status.as_u16(), %message, "OData service error");
    ConnectorError::Service { status, message }
}

/// `error.message`, either a string (v4) or `{ "value": ... }` (older services).
fn error_message(error: &Value) -> Option<String> {
    match error.get("message")? {
        Value::String(message) => Some(message.clone()),
        Value::Object(message) => message
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

/// Rows of a collection response: `{ "value": [...] }` or a bare array.
fn collection(payload: Option<Value>) -> Result<Vec<Row>, ConnectorError> {
    let items = match payload {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut obj)) => match obj.remove("value") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ConnectorError::Payload(
                    "collection response without a `value` array".to_owned(),
                ));
            }
        },
        Some(other) => {
            return Err(ConnectorError::Payload(format!(
                "expected a collection, got {other}"
            )));
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(ConnectorError::Payload(format!(
                "expected an entity, got {other}"
            ))),
        })
        .collect()
}

fn entity(payload: Option<Value>) -> Result<Option<Row>, ConnectorError> {
    match payload {
        None => Ok(None),
        Some(Value::Object(row)) => Ok(Some(row)),
        Some(other) => Err(ConnectorError::Payload(format!(
            "expected an entity, got {other}"
        ))),
    }
}

/// Lossy UTF-8 of at most [`ERROR_BODY_PREVIEW_LIMIT`] bytes.
fn preview(body: &[u8]) -> String {
    let end = body.len().min(ERROR_BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&body[..end]).trim().to_owned()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_params_encoding() {
        let mut params = QueryParams::default();
        params.push("$filter", "(Name eq 'a b')");
        params.push("$top", "5");
        assert_eq!(
            params.apply("https://svc/People".to_owned()),
            "https://svc/People?$filter=%28Name%20eq%20%27a%20b%27%29&$top=5"
        );
        assert_eq!(
            QueryParams::default().apply("https://svc/People".to_owned()),
            "https://svc/People"
        );
    }

    #[test]
    fn test_collection_shapes() {
        let wrapped = collection(Some(json!({"@odata.context": "x", "value": [{"a": 1}]}))).unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(collection(Some(json!([{"a": 1}, {"a": 2}]))).unwrap().len(), 2);
        assert!(collection(None).unwrap().is_empty());
        assert!(matches!(
            collection(Some(json!({"a": 1}))),
            Err(ConnectorError::Payload(_))
        ));
        assert!(collection(Some(json!([1]))).is_err());
    }

    #[test]
    fn test_error_message_forms() {
        assert_eq!(
            error_message(&json!({"code": "", "message": "boom"})).as_deref(),
            Some("boom")
        );
        assert_eq!(
            error_message(&json!({"message": {"lang": "en", "value": "old"}})).as_deref(),
            Some("old")
        );
        assert_eq!(error_message(&json!({"code": "1"})), None);
    }

    #[test]
    fn test_service_error_falls_back_to_preview() {
        let err = service_error(StatusCode::BAD_GATEWAY, b"upstream down");
        assert!(matches!(
            err,
            ConnectorError::Service { status, ref message }
                if status == StatusCode::BAD_GATEWAY && message == "upstream down"
        ));

        let err = service_error(StatusCode::NOT_FOUND, b"");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Not Found"));

        let err = service_error(
            StatusCode::BAD_REQUEST,
            br#"{"error":{"code":"","message":"The query specified in the URI is not valid."}}"#,
        );
        assert!(err.to_string().contains("URI is not valid"));
    }

    #[test]
    fn test_pick_keeps_listed_fields() {
        let data = json!({"A": 1, "B": 2, "C": 3});
        let row = pick(data.as_object().unwrap(), ["A", "C", "D"].into_iter());
        assert_eq!(Value::Object(row), json!({"A": 1, "C": 3}));
    }
}
