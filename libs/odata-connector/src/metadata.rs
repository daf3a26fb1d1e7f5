use crate::error::ConnectorError;
use odata_edm::{Edmx, parse_metadata};
use odata_http::HttpClient;

/// Downloads and parses `{url}$metadata`.
///
/// # Errors
/// `Metadata` wrapping the transport, status or parse failure.
pub async fn fetch_metadata(http: &HttpClient, url: &str) -> Result<Edmx, ConnectorError> {
    let wrap = |source: ConnectorError| ConnectorError::Metadata {
        url: url.to_owned(),
        source: Box::new(source),
    };

    tracing::info!(url, "fetching service metadata");
    let xml = async {
        let response = http
            .get(url)
            .header("accept", "application/xml")
            .send()
            .await?;
        Ok::<_, ConnectorError>(response.text().await?)
    }
    .await
    .map_err(wrap)?;

    let edmx = parse_metadata(&xml).map_err(|e| wrap(e.into()))?;
    tracing::debug!(url, schemas = edmx.data_services.schemas.len(), "metadata parsed");
    Ok(edmx)
}
