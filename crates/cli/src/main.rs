use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use fnhost_engine::{BlobStore, DispatchHost, DispatchOutcome, FunctionRegistry, MemoryBlobStore};
use fnhost_server::config::{default_config_path, validate_config};
use fnhost_server::listeners::timer_payload;
use fnhost_server::{HostServer, load_config_from_path};
use fnhost_types::{HttpMethod, HttpRequest, Payload, TriggerBinding, TriggerEvent, TriggerSource};
use tracing::{Subscriber, info};
use tracing_subscriber::EnvFilter;

/// Run and exercise functions on a local trigger dispatch host.
#[derive(Parser, Debug)]
#[command(name = "fnhost", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the host with the bundled functions and serve until Ctrl-C.
    Start {
        /// Host configuration file (JSON or YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the HTTP bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Override the blob storage root
        #[arg(long)]
        storage: Option<PathBuf>,
    },
    /// Print registered functions and their triggers.
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Dispatch one synthetic event through an in-memory host.
    Invoke {
        /// Function to invoke
        function: String,

        /// Query parameter for HTTP functions, as key=value
        #[arg(long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// Request body for HTTP functions
        #[arg(long)]
        body: Option<String>,

        /// HTTP method; defaults to the function's first method
        #[arg(long)]
        method: Option<String>,

        /// Blob path for blob functions
        #[arg(long, requires = "data")]
        blob: Option<String>,

        /// Blob contents written before the invocation
        #[arg(long, requires = "blob")]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Start { config, bind, storage } => start(config, bind, storage).await,
        Command::List { json } => list(json),
        Command::Invoke {
            function,
            query,
            body,
            method,
            blob,
            data,
        } => invoke(InvokeRequest {
            function,
            query,
            body,
            method,
            blob: blob.zip(data),
        })
        .await,
    }
}

fn init_tracing() {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let _ = tracing::subscriber::set_global_default(log_subscriber(filter));
}

/// `RUST_LOG` directives, falling back to `info` when unset or invalid.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn log_subscriber(filter: EnvFilter) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt().with_env_filter(filter).finish()
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw.split_once('=').ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn sample_registry() -> Result<FunctionRegistry> {
    let mut registry = FunctionRegistry::new();
    fnhost_functions::register_all(&mut registry).context("failed to register bundled functions")?;
    Ok(registry)
}

async fn start(config_path: Option<PathBuf>, bind: Option<SocketAddr>, storage: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(default_config_path);
    let mut config = load_config_from_path(&config_path)
        .with_context(|| format!("failed to load host configuration from {}", config_path.display()))?;
    if let Some(bind) = bind {
        config.http.bind_address = bind.to_string();
    }
    if let Some(storage) = storage {
        config.storage.root = storage;
    }
    validate_config(&config)?;

    let running = HostServer::new(config, sample_registry()?).start().await?;
    info!(url = %running.function_base_url(), "serving functions; press Ctrl-C to stop");
    for function in running.host().registry().iter() {
        info!(function = %function.name(), trigger = %function.trigger_summary(), "function loaded");
    }

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    let outcome = running.stop().await?;
    info!(outcome = ?outcome, "shutdown complete");
    Ok(())
}

fn list(json: bool) -> Result<()> {
    let registry = sample_registry()?;
    if json {
        let functions: Vec<_> = registry
            .iter()
            .map(|function| {
                serde_json::json!({
                    "name": function.name(),
                    "trigger": function.descriptor().trigger(),
                    "retry": function.descriptor().retry_policy(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&functions)?);
        return Ok(());
    }

    let width = registry.names().map(str::len).max().unwrap_or(0);
    for function in registry.iter() {
        println!("{:width$}  {}", function.name(), function.trigger_summary());
    }
    Ok(())
}

struct InvokeRequest {
    function: String,
    query: Vec<(String, String)>,
    body: Option<String>,
    method: Option<String>,
    blob: Option<(String, String)>,
}

async fn invoke(request: InvokeRequest) -> Result<()> {
    let store = Arc::new(MemoryBlobStore::new());
    let host = DispatchHost::new(sample_registry()?, store.clone());
    let function = host
        .registry()
        .get(&request.function)
        .cloned()
        .ok_or_else(|| anyhow!("unknown function '{}'", request.function))?;

    let (event, source) = match function.descriptor().trigger() {
        TriggerBinding::Http { methods, .. } => {
            let method = match &request.method {
                Some(method) => HttpMethod::from_str(method)?,
                None => methods.first().copied().context("function accepts no HTTP methods")?,
            };
            let path = function
                .route()
                .map(|route| route.as_str().to_string())
                .unwrap_or_else(|| function.name().to_string());
            let mut http_request = HttpRequest::new(method, path.clone()).with_body(request.body.unwrap_or_default());
            let mut event_query = Vec::new();
            for (key, value) in request.query {
                http_request = http_request.with_query(key.as_str(), value.as_str());
                event_query.push((key, value));
            }
            let mut event = TriggerEvent::new(Payload::Http(http_request));
            event.route_params = event_query.into_iter().collect();
            (event, TriggerSource::Http { method, path })
        }
        TriggerBinding::Timer { schedule } => {
            let now = chrono::Utc::now();
            let next = function.schedule().and_then(|schedule| schedule.next_after(&now));
            (
                TriggerEvent::new(timer_payload(None, next, false)).at(now),
                TriggerSource::Timer {
                    schedule: schedule.clone(),
                },
            )
        }
        TriggerBinding::Blob { .. } => {
            let Some((path, data)) = request.blob else {
                bail!("blob functions need --blob PATH --data TEXT");
            };
            store.write(&path, data.as_bytes()).await?;
            (TriggerEvent::new(Payload::Binary(data.into_bytes())), TriggerSource::Blob { path })
        }
    };

    let outcome = host.invoke(function.name(), event, &source).await?;
    print_outcome(&outcome, &store).await?;
    host.shutdown(std::time::Duration::from_secs(1)).await;
    if !outcome.is_success() {
        bail!("invocation of '{}' failed", outcome.function);
    }
    Ok(())
}

async fn print_outcome(outcome: &DispatchOutcome, store: &MemoryBlobStore) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
    if let Some(response) = outcome.response() {
        println!("HTTP {}\n{}", response.status, response.body);
    }
    if let Ok(success) = &outcome.result {
        for path in &success.committed {
            let Some(bytes) = store.read(path).await? else {
                continue;
            };
            println!("{path} ({} bytes): {}", bytes.len(), String::from_utf8_lossy(&bytes));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn rust_log_directives_control_the_level() {
        let subscriber = log_subscriber(log_filter(Some("debug".to_string())));
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(Level::DEBUG));
            assert!(!tracing::enabled!(Level::TRACE));
        });
    }

    #[test]
    fn defaults_to_info() {
        let subscriber = log_subscriber(log_filter(None));
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(Level::INFO));
            assert!(!tracing::enabled!(Level::DEBUG));
        });
    }

    #[test]
    fn parses_query_pairs() {
        assert_eq!(parse_key_value("name=World"), Ok(("name".to_string(), "World".to_string())));
        assert_eq!(parse_key_value("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_key_value("=value").is_err());
        assert!(parse_key_value("novalue").is_err());
    }
}
