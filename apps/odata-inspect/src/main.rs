mod logging;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::providers::Serialized;
use odata_connector::{Connector, ConnectorConfig, QueryOptions};
use serde_json::{Map, Value, json};
use std::path::PathBuf;

/// Inspect and query an `OData` v4 service through the generated models
#[derive(Parser)]
#[command(name = "odata-inspect", version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service root URL (overrides config and `ODATA_URL`)
    #[arg(short, long)]
    url: Option<String>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the models generated from `$metadata`
    Models,
    /// List the function and action endpoints
    Endpoints,
    /// Print the effective configuration and exit
    Config,
    /// Run a query against an entity set
    Query {
        set: String,
        #[command(flatten)]
        options: QueryArgs,
    },
    /// Count rows, optionally filtered
    Count {
        set: String,
        /// `where` object as JSON
        #[arg(long = "where")]
        where_clause: Option<String>,
    },
    /// Fetch every row of an entity set
    All {
        set: String,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Fetch one row by key (JSON literal, or bare text for string keys)
    Find { set: String, key: String },
    /// Unique values of one field
    Distinct {
        set: String,
        field: String,
        #[command(flatten)]
        options: QueryArgs,
    },
    /// Call a function or action import with `name=value` arguments
    Call { endpoint: String, args: Vec<String> },
}

#[derive(Args)]
struct QueryArgs {
    /// `where` object as JSON, e.g. `{"Age": {"$gt": 30}}`
    #[arg(long = "where")]
    where_clause: Option<String>,
    /// `order` object as JSON, e.g. `{"LastName": -1}`
    #[arg(long)]
    order: Option<String>,
    /// Fields to select as JSON, e.g. `{"FirstName": 1}`
    #[arg(long)]
    sel: Option<String>,
    /// Fields to leave out as JSON
    #[arg(long)]
    unsel: Option<String>,
    #[arg(long)]
    skip: Option<i64>,
    #[arg(long)]
    limit: Option<i64>,
    #[arg(long)]
    page: Option<i64>,
    #[arg(long)]
    per_page: Option<i64>,
}

impl QueryArgs {
    fn to_options(&self) -> Result<QueryOptions> {
        let mut raw = Map::new();
        for (name, value) in [
            ("order", &self.order),
            ("sel", &self.sel),
            ("unsel", &self.unsel),
        ] {
            if let Some(value) = value {
                raw.insert(name.to_owned(), parse_json(name, value)?);
            }
        }
        if let Some(where_clause) = &self.where_clause {
            raw.insert("where".to_owned(), Value::String(where_clause.clone()));
        }
        for (name, value) in [
            ("skip", self.skip),
            ("limit", self.limit),
            ("page", self.page),
            ("per_page", self.per_page),
        ] {
            if let Some(value) = value {
                raw.insert(name.to_owned(), Value::from(value));
            }
        }
        Ok(QueryOptions::from_value(Value::Object(raw))?)
    }
}

fn parse_json(name: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--{name} is not valid JSON"))
}

/// A JSON literal when it parses as one, the raw text otherwise.
fn parse_key(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

fn parse_call_args(args: &[String]) -> Result<Map<String, Value>> {
    args.iter()
        .map(|arg| {
            let (name, value) = arg
                .split_once('=')
                .with_context(|| format!("argument '{arg}' is not name=value"))?;
            Ok((name.to_owned(), Value::String(value.to_owned())))
        })
        .collect()
}

fn load_config(cli: &Cli) -> Result<ConnectorConfig> {
    let mut figment = ConnectorConfig::figment(cli.config.as_deref());
    if let Some(url) = &cli.url {
        figment = figment.merge(Serialized::default("url", url));
    }
    ConnectorConfig::from_figment(&figment).context("invalid configuration")
}

fn print(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    if let Some(path) = &cli.config
        && !path.is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }
    let config = load_config(&cli)?;
    tracing::debug!(url = %config.url, "configuration loaded");

    if matches!(cli.command, Commands::Config) {
        return print(&config);
    }

    let connector = Connector::connect(config)
        .await
        .context("failed to connect to the OData service")?;
    run(&connector, cli.command).await
}

async fn run(connector: &Connector, command: Commands) -> Result<()> {
    match command {
        Commands::Config => Ok(()),
        Commands::Models => {
            let summary: Vec<Value> = connector
                .registry()
                .models()
                .values()
                .map(|model| {
                    json!({
                        "name": model.name,
                        "entityType": model.entity_type,
                        "key": model.primary_key(),
                        "shadowKey": model.shadow_key(),
                        "singleton": model.is_singleton(),
                        "fields": model.fields,
                    })
                })
                .collect();
            print(&summary)
        }
        Commands::Endpoints => print(&connector.registry().endpoints()),
        Commands::Query { set, options } => {
            let rows = connector.entity_set(&set)?.query(options.to_options()?).await?;
            print(&rows)
        }
        Commands::Count { set, where_clause } => {
            let options = match where_clause {
                Some(raw) => QueryOptions::default().with_where(Value::String(raw)),
                None => QueryOptions::default(),
            };
            let count = connector.entity_set(&set)?.count_matching(options).await?;
            println!("{count}");
            Ok(())
        }
        Commands::All { set, limit } => {
            let rows = connector.entity_set(&set)?.find_all(limit).await?;
            print(&rows)
        }
        Commands::Find { set, key } => {
            match connector.entity_set(&set)?.find_by_id(&parse_key(&key)).await? {
                Some(row) => print(&row),
                None => anyhow::bail!("no {set} row with key {key}"),
            }
        }
        Commands::Distinct {
            set,
            field,
            options,
        } => {
            let values = connector
                .entity_set(&set)?
                .distinct(&field, options.to_options()?)
                .await?;
            print(&values)
        }
        Commands::Call { endpoint, args } => {
            let result = connector.invoke(&endpoint, &parse_call_args(&args)?).await?;
            print(&result.unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "odata-inspect",
            "--url",
            "https://svc.example/odata",
            "-vv",
            "query",
            "People",
            "--where",
            r#"{"Age": {"$gt": 30}}"#,
            "--order",
            r#"{"LastName": -1}"#,
            "--limit",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let Commands::Query { set, options } = cli.command else {
            panic!("query expected");
        };
        assert_eq!(set, "People");
        let options = options.to_options().unwrap();
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.order.unwrap()["LastName"], -1);
    }

    #[test]
    fn test_bad_json_flag() {
        let args = QueryArgs {
            where_clause: None,
            order: Some("{oops".to_owned()),
            sel: None,
            unsel: None,
            skip: None,
            limit: None,
            page: None,
            per_page: None,
        };
        let err = args.to_options().unwrap_err();
        assert!(err.to_string().contains("--order"));
    }

    #[test]
    fn test_key_and_call_args() {
        assert_eq!(parse_key("42"), json!(42));
        assert_eq!(parse_key("russell"), json!("russell"));
        assert_eq!(parse_key("\"42\""), json!("42"));

        let args = parse_call_args(&["lat=47.6".to_owned(), "lon=-122.3".to_owned()]).unwrap();
        assert_eq!(args["lat"], "47.6");
        assert!(parse_call_args(&["lat".to_owned()]).is_err());
    }

    #[test]
    fn test_url_flag_overrides_config() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ODATA_URL", "https://env.example/svc");
            let cli = Cli::try_parse_from([
                "odata-inspect",
                "--url",
                "https://flag.example/svc",
                "models",
            ])
            .unwrap();
            let config = load_config(&cli).unwrap();
            assert_eq!(config.url, "https://flag.example/svc/");
            Ok(())
        });
    }
}
