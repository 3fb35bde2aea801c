// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use reactik::http::{HttpClient, HttpEvent, HttpRequestOptions, HttpResponse, ParamValue, Params};
use reactik::HttpError;
use reactik::progress::{Listeners, Progress};
use reactik::utils::logging::{format_failure, format_request, format_response};
use reactik::{Config, Validator};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tokio::sync::oneshot;
use tokio::task::LocalSet;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "reactik")]
#[command(version = "0.1.0")]
#[command(about = "Progress-based HTTP client and service toolkit", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URI relative to the configured base URL
    Get {
        /// Request URI, may contain `{name}` placeholders
        uri: String,

        /// Query parameter, repeatable
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        query: Vec<(String, String)>,

        /// Path placeholder value, repeatable
        #[arg(short, long = "path", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        path: Vec<(String, String)>,

        /// Bearer token; enables authorization
        #[arg(long, env = "REACTIK_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Show a download progress bar
        #[arg(long)]
        progress: bool,

        /// Write the body to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config,
}

struct GetArgs {
    uri: String,
    query: Vec<(String, String)>,
    path: Vec<(String, String)>,
    token: Option<String>,
    progress: bool,
    output: Option<PathBuf>,
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    reactik::utils::logging::init_logger(cli.color, cli.verbose);

    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::load(None).unwrap_or_else(|e| {
            warn!("Falling back to built-in defaults: {}", e);
            Config::default_config()
        })
    };

    match cli.command {
        Commands::Get {
            uri,
            query,
            path,
            token,
            progress,
            output,
        } => {
            let args = GetArgs {
                uri,
                query,
                path,
                token,
                progress,
                output,
            };
            if let Err(err) = cmd_get(&config, args, cli.color).await {
                eprintln!("{}", format_failure(&format!("{:#}", err)));
                return Err(err);
            }
        }
        Commands::Config => {
            cmd_config(&config)?;
        }
    }

    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let rendered = serde_json::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

async fn cmd_get(config: &Config, args: GetArgs, colored: bool) -> Result<()> {
    let client = HttpClient::new(config.http.client_options()).context("Failed to create HTTP client")?;

    let mut options = HttpRequestOptions::new()
        .with_uri_params(to_params(args.query))
        .with_path_params(to_params(args.path));
    if let Some(token) = args.token {
        client.set_authorization(token);
        options = options.authorized();
    }
    let show_progress = args.progress || config.http.include_download_progress;
    if show_progress {
        options = options.with_download_progress();
    }

    let url = format!("{}{}", config.http.base_url, args.uri);
    Validator::validate_url(&url)?;
    eprintln!("{}", format_request("GET", &url));

    let bar = if show_progress {
        create_download_bar(colored)
    } else {
        ProgressBar::hidden()
    };

    let response = LocalSet::new()
        .run_until(fetch(&client, &args.uri, options, bar.clone()))
        .await;
    bar.finish_and_clear();
    let response = response?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &response.body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{}",
                format_response(response.status, response.body.len(), Some(path.as_path()))
            );
        }
        None => {
            println!("{}", String::from_utf8_lossy(&response.body));
            eprintln!("{}", format_response(response.status, response.body.len(), None));
        }
    }

    Ok(())
}

type Outcome = std::result::Result<HttpResponse, HttpError>;

async fn fetch(
    client: &HttpClient,
    uri: &str,
    options: HttpRequestOptions,
    bar: ProgressBar,
) -> Result<HttpResponse> {
    let (tx, rx) = oneshot::channel::<Outcome>();
    let tx = Rc::new(RefCell::new(Some(tx)));

    let request: Progress<HttpEvent, HttpError> = client.get(uri, options);
    let (on_emit, on_error, on_finish) = (tx.clone(), tx.clone(), tx);
    request.subscribe(
        Listeners::emit(move |event: &HttpEvent, _| match event {
            HttpEvent::DownloadProgress(transfer) => {
                bar.set_length(100);
                bar.set_position(u64::from(transfer.percentage()));
            }
            HttpEvent::Response(response) => settle(&on_emit, Ok(response.clone())),
        })
        .on_error(move |err: &HttpError| settle(&on_error, Err(err.clone())))
        .on_finish(move || {
            settle(
                &on_finish,
                Err(HttpError::Transport("request ended without a response".to_string())),
            )
        }),
    );

    tokio::select! {
        outcome = rx => {
            let outcome = outcome.context("Request was dropped before completing")?;
            Ok(outcome?)
        }
        _ = tokio::signal::ctrl_c() => {
            debug!("Interrupted, stopping request");
            request.stop();
            Err(anyhow::anyhow!("Request cancelled"))
        }
    }
}

fn settle(tx: &Rc<RefCell<Option<oneshot::Sender<Outcome>>>>, outcome: Outcome) {
    let sender = tx.borrow_mut().take();
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
}

fn to_params(pairs: Vec<(String, String)>) -> Params {
    pairs
        .into_iter()
        .map(|(key, value)| (key, ParamValue::from(value)))
        .collect()
}

fn create_download_bar(colored: bool) -> ProgressBar {
    let bar = ProgressBar::new(100);
    let template = if colored {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}"
    } else {
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}% {msg}"
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .expect("Failed to create progress bar template")
            .progress_chars(if colored { "█▓▒░" } else { "=>-" }),
    );
    bar
}
