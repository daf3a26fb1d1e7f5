#![allow(dead_code)]

use httpmock::MockServer;
use odata_connector::{Connector, ConnectorConfig, Row};
use serde_json::Value;

pub const CATALOG: &str = include_str!("../fixtures/catalog.xml");

pub fn config(server: &MockServer) -> ConnectorConfig {
    let mut config = ConnectorConfig::for_url(&server.url("/odata")).unwrap();
    config.allow_insecure_http = true;
    config
}

/// Connector over the catalog schema, pointed at `server`.
pub fn connector(server: &MockServer) -> Connector {
    Connector::from_metadata(config(server), CATALOG).unwrap()
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("object expected, got {other}"),
    }
}
