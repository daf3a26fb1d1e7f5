mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
