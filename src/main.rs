//! `encrypted-api`: send one request through the encrypted pipeline.
//!
//! Prints the status line, the decrypted headers and the decrypted body.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use http::Method;
use serde_json::Value;

use encrypted_api_client::config;
use encrypted_api_client::http::{parse_multipart_json, EncryptedApiClient, RequestOptions};
use encrypted_api_client::observability::logging;
use encrypted_api_client::SecretPair;

#[derive(Parser)]
#[command(name = "encrypted-api")]
#[command(about = "Send requests to an encrypted API", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL, overrides the configuration.
    #[arg(short, long, global = true)]
    url: Option<String>,

    #[arg(long, global = true, requires = "secret2")]
    secret1: Option<String>,

    #[arg(long, global = true, requires = "secret1")]
    secret2: Option<String>,

    /// Extra request header, `Name: value`.
    #[arg(short = 'H', long = "header", global = true)]
    headers: Vec<String>,

    /// Header to also send in clear.
    #[arg(long = "visible-header", global = true)]
    visible_headers: Vec<String>,

    /// Header to send only in clear.
    #[arg(long = "unmanaged-header", global = true)]
    unmanaged_headers: Vec<String>,

    /// Sign this method instead of the real one, once.
    #[arg(long, global = true)]
    spoof: Option<String>,

    /// Send GET as GET.
    #[arg(long, global = true)]
    no_spoofing: bool,

    /// Multipart entries as a JSON array of objects.
    #[arg(long, global = true, conflicts_with_all = ["json", "data"])]
    multipart: Option<String>,

    /// JSON body.
    #[arg(long, global = true, conflicts_with = "data")]
    json: Option<String>,

    /// Raw body.
    #[arg(short, long, global = true)]
    data: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a GET request
    Get { path: String },
    /// Send a POST request
    Post { path: String },
    /// Send a PUT request
    Put { path: String },
    /// Send a PATCH request
    Patch { path: String },
    /// Send a DELETE request
    Delete { path: String },
}

impl Commands {
    fn into_parts(self) -> (Method, String) {
        match self {
            Commands::Get { path } => (Method::GET, path),
            Commands::Post { path } => (Method::POST, path),
            Commands::Put { path } => (Method::PUT, path),
            Commands::Patch { path } => (Method::PATCH, path),
            Commands::Delete { path } => (Method::DELETE, path),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_from_env()?,
    };
    if let Some(url) = &cli.url {
        config.base_url = Some(url.clone());
    }
    logging::init(&config.observability);

    let options = build_options(&cli).await?;
    let (method, path) = cli.command.into_parts();

    tracing::info!(method = %method, path = %path, "Sending request");

    let mut client = EncryptedApiClient::from_config(&config)?;
    let response = client.request(method, &path, options).await?;

    println!("{:?} {}", response.version(), response.status());
    for (name, value) in response.headers() {
        println!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
    println!();
    println!("{}", String::from_utf8_lossy(response.body()));

    Ok(())
}

async fn build_options(cli: &Cli) -> Result<RequestOptions, Box<dyn std::error::Error>> {
    let mut options = RequestOptions::new();

    if let (Some(secret1), Some(secret2)) = (&cli.secret1, &cli.secret2) {
        options = options.secrets(SecretPair::new(secret1.as_str(), secret2.as_str())?);
    }
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header {:?} is not in `Name: value` form", header))?;
        options = options.header(name.trim(), value.trim());
    }
    for name in &cli.visible_headers {
        options = options.visible_header(name.as_str());
    }
    for name in &cli.unmanaged_headers {
        options = options.unmanaged_header(name.as_str());
    }
    if let Some(method) = &cli.spoof {
        options = options.spoofed_method(method.as_str());
    }
    if cli.no_spoofing {
        options = options.automatic_method_spoofing(false);
    }

    if let Some(raw) = &cli.multipart {
        let value: Value = serde_json::from_str(raw)?;
        options = options.multipart(parse_multipart_json(&value).await?);
    }
    if let Some(raw) = &cli.json {
        options = options.json(serde_json::from_str(raw)?);
    }
    if let Some(data) = &cli.data {
        options = options.body(data.clone());
    }

    Ok(options)
}
