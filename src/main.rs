use anyhow::{bail, Context, Result};
use atlasclient::config::CliConfig;
use atlasclient::{Client, FieldValue, Proxy, ResourceRegistry};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Command-line access to an Apache Atlas server
#[derive(Parser, Debug)]
#[command(name = "atlasclient", version, about, long_about = None)]
struct Args {
    /// Atlas server URL (overrides ATLAS_URL and the config file)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Basic-auth username (password comes from ATLAS_PASSWORD)
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the logical resource names
    Resources,

    /// Fetch a single resource, or one of its fields
    Get {
        /// Logical resource name, e.g. entity_guid
        name: String,
        /// Path arguments in template order
        args: Vec<String>,
        /// Print only this field
        #[arg(short, long)]
        field: Option<String>,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Iterate a collection, one JSON item per line
    List {
        /// Logical resource name, e.g. search_basic
        name: String,
        /// Path arguments in template order
        args: Vec<String>,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Stop after this many items
        #[arg(long)]
        max: Option<usize>,
    },

    /// Save connection defaults to the config file
    Configure {
        /// Server version, enables the per-resource version gate
        #[arg(long)]
        server_version: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_level.to_string())),
        )
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("atlasclient started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("atlasclient").join("atlasclient.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".atlasclient").join("atlasclient.log");
    }
    PathBuf::from("atlasclient.log")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level)?;

    let mut config = CliConfig::load();

    if let Command::Configure {
        server_version,
        timeout_secs,
    } = &args.command
    {
        config.url = Some(config.effective_url(args.url.as_deref()));
        config.username = config.effective_username(args.username.as_deref());
        if server_version.is_some() {
            config.server_version = server_version.clone();
        }
        if timeout_secs.is_some() {
            config.timeout_secs = *timeout_secs;
        }
        config.save().context("Failed to save config")?;
        if let Some(path) = CliConfig::config_path() {
            println!("Saved {}", path.display());
        }
        return Ok(());
    }

    let registry = ResourceRegistry::builtin().context("Failed to load resource definitions")?;

    if let Command::Resources = &args.command {
        for name in registry.names() {
            let description = registry
                .get(name)
                .map(|d| d.description.as_str())
                .unwrap_or_default();
            println!("{:<34} {}", name, description);
        }
        return Ok(());
    }

    let client_config = config
        .to_client_config(args.url.as_deref(), args.username.as_deref())
        .context("Invalid client configuration")?;
    tracing::info!("Using Atlas at {}", client_config.base_url);
    let client = Client::new(client_config, registry).context("Failed to create client")?;

    match args.command {
        Command::Get {
            name,
            args: path_args,
            field,
            params,
        } => get(&client, &name, &path_args, field.as_deref(), params),
        Command::List {
            name,
            args: path_args,
            params,
            max,
        } => list(&client, &name, &path_args, params, max),
        Command::Resources | Command::Configure { .. } => Ok(()),
    }
}

fn get(
    client: &Client,
    name: &str,
    path_args: &[String],
    field: Option<&str>,
    params: Vec<(String, String)>,
) -> Result<()> {
    let path_args: Vec<&str> = path_args.iter().map(String::as_str).collect();
    let Proxy::Resource(mut resource) = client.construct(name, &path_args, None)? else {
        bail!("{} is a collection; use `list`", name);
    };
    for (key, value) in params {
        resource = resource.with_param(key, value);
    }

    let output = match field {
        Some(field) => match resource.get(field)? {
            FieldValue::Value(value) => value,
            FieldValue::Relation(relation) => Value::String(relation.url()),
        },
        None => {
            resource.refresh()?;
            Value::Object(resource.snapshot().clone())
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn list(
    client: &Client,
    name: &str,
    path_args: &[String],
    params: Vec<(String, String)>,
    max: Option<usize>,
) -> Result<()> {
    let path_args: Vec<&str> = path_args.iter().map(String::as_str).collect();
    let Proxy::Collection(collection) = client.construct(name, &path_args, None)? else {
        bail!("{} is a single resource; use `get`", name);
    };
    let collection = collection.with_params(params)?;

    for item in collection.into_iter().take(max.unwrap_or(usize::MAX)) {
        let item = item?;
        println!("{}", serde_json::to_string(item.snapshot())?);
    }
    Ok(())
}
