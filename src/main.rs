//! Hub server binary.
//!
//! Loads the configuration, wires the hub, starts the upload worker and
//! serves the HTTP/WebSocket API.
//!
//! ## Environment Variables
//!
//! - `MODEL_HUB_CONFIG`: config file path when `--config` is not given
//! - `MODEL_HUB_API_KEY`: bearer token sent to the model registry
//! - `LOG_FORMAT=json`: structured JSON output (production)
//! - `RUST_LOG=info`: log level filter

use std::path::PathBuf;
use std::sync::Arc;

use model_hub_router::config::loader::load_from_file;
use model_hub_router::config::{export_schema, HubConfig};
use model_hub_router::upload::DigestProcessor;
use model_hub_router::{init_tracing, metrics, web_api, HttpRegistry, Hub, HubError};
use tracing::{error, info, warn};

struct Args {
    config: Option<PathBuf>,
    port: Option<u16>,
    print_schema: bool,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = std::env::var("MODEL_HUB_CONFIG").ok().map(PathBuf::from);
    let mut port = None;
    let mut print_schema = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a value".to_string());
                }
                config = Some(PathBuf::from(&args[i]));
            }
            "--port" | "-p" => {
                i += 1;
                if i >= args.len() {
                    return Err("--port requires a value".to_string());
                }
                port = Some(
                    args[i]
                        .parse()
                        .map_err(|_| format!("invalid port: {}", args[i]))?,
                );
            }
            "--schema" => {
                print_schema = true;
            }
            "--help" | "-h" => {
                return Err(usage());
            }
            other => {
                return Err(format!("unknown argument: {other}\n{}", usage()));
            }
        }
        i += 1;
    }

    Ok(Args {
        config,
        port,
        print_schema,
    })
}

fn usage() -> String {
    [
        "Usage: model-hub [OPTIONS]",
        "",
        "Options:",
        "  --config, -c <FILE>   Hub TOML config (default: $MODEL_HUB_CONFIG or built-in defaults)",
        "  --port, -p <PORT>     Override server.port",
        "  --schema              Print the config JSON Schema and exit",
        "  --help, -h            Show this help message",
    ]
    .join("\n")
}

fn load_config(args: &Args) -> Result<HubConfig, HubError> {
    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading hub config");
            load_from_file(path)?
        }
        None => {
            warn!("no config file given, running on defaults");
            HubConfig::default()
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

async fn run(args: Args) -> Result<(), HubError> {
    metrics::init_metrics()?;

    let config = load_config(&args)?;
    let api_key = std::env::var("MODEL_HUB_API_KEY").ok();
    if api_key.is_none() {
        warn!("MODEL_HUB_API_KEY not set, registry calls are unauthenticated");
    }
    let registry = Arc::new(HttpRegistry::from_config(&config.registry, api_key));

    let (hub, queue_rx) = Hub::new(config, registry)?;
    let hub = Arc::new(hub);
    let worker = hub.spawn_worker(queue_rx, Arc::new(DigestProcessor::default()));

    let served = web_api::start_server(hub).await;
    worker.abort();
    served
}

#[tokio::main]
async fn main() {
    let _ = init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(1);
        }
    };

    if args.print_schema {
        match export_schema() {
            Ok(schema) => println!("{schema}"),
            Err(e) => {
                eprintln!("schema export failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = run(args).await {
        error!(error = %e, "hub stopped");
        std::process::exit(1);
    }
}
