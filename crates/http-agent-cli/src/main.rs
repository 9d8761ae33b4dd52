//! http-agent CLI entry point.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::{json, Value};

use http_agent::executor::endpoint_icon;
use http_agent::{
    extract_detailed, AgentConfig, AgentSettings, ContentType, EndpointRegistry, HttpMethod, JinjaRenderer,
    RequestExecutor, RequestSpec, ResponseWrapper,
};

#[derive(Parser)]
#[command(
    name = "http-agent",
    about = "Poll HTTP endpoints and extract values with JSON paths, XPath or CSS selectors",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the endpoints of a config file once and print their readings.
    Poll {
        /// Path to the JSON endpoint configuration.
        config: PathBuf,

        /// Only poll this endpoint.
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// Send a single templated request and print the result.
    Request {
        /// Target URL (may contain template expressions).
        url: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Header as KEY=VALUE. Repeatable.
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request payload (POST, PUT and PATCH only).
        #[arg(short, long)]
        payload: Option<String>,

        /// Content type for non-JSON payloads.
        #[arg(long)]
        content_type: Option<String>,

        /// Query string appended to the URL.
        #[arg(short, long)]
        querystring: Option<String>,

        /// Timeout in seconds (1-300).
        #[arg(
            short,
            long,
            default_value_t = http_agent::config::DEFAULT_TIMEOUT_SECS,
            value_parser = clap::value_parser!(u64).range(1..=300)
        )]
        timeout: u64,

        /// Skip TLS certificate verification.
        #[arg(short = 'k', long)]
        insecure: bool,

        /// Template variable as NAME=VALUE (VALUE parsed as JSON when possible). Repeatable.
        #[arg(long = "var")]
        vars: Vec<String>,
    },

    /// Evaluate a selector against a saved response body.
    ///
    /// Examples:
    ///   http-agent extract --selector a.b --content-type application/json body.json
    ///   curl -s http://device/status.xml | http-agent extract --selector //temp/text()
    Extract {
        /// Selector (JSON path, XPath or CSS).
        #[arg(short, long)]
        selector: String,

        /// Content type the body was served with.
        #[arg(short, long)]
        content_type: Option<String>,

        /// Body file; reads stdin when omitted or "-".
        file: Option<PathBuf>,
    },

    /// Validate an endpoint configuration file.
    Validate {
        /// Path to the JSON endpoint configuration.
        config: PathBuf,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   http-agent completions bash > ~/.local/share/bash-completion/completions/http-agent
    ///   http-agent completions zsh > ~/.zfunc/_http-agent
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let pretty = cli.pretty;
    match cli.command {
        Commands::Poll { config, endpoint } => {
            let config = AgentConfig::load(&config)
                .with_context(|| format!("failed to load config {}", config.display()))?;
            tracing::debug!("loaded {} endpoint(s)", config.endpoints.len());
            let registry = EndpointRegistry::from_config(
                config,
                AgentSettings::from_env(),
                Arc::new(JinjaRenderer::new()),
            )?;

            let polled_all = endpoint.is_none();
            let outcomes = match endpoint {
                Some(name) => {
                    let instance = registry.get(&name)?;
                    match instance.poll().await {
                        Some(outcome) => vec![(name, outcome)],
                        None => bail!("endpoint '{name}' is disabled"),
                    }
                }
                None => registry.poll_all().await,
            };
            registry.shutdown_all();

            let mut report = serde_json::Map::new();
            for (name, outcome) in outcomes {
                let icon = endpoint_icon(Some(&outcome.result), true);
                let mut entry = serde_json::to_value(outcome)?;
                entry["icon"] = json!(icon);
                report.insert(name, entry);
            }
            for instance in registry.iter().filter(|i| polled_all && !i.config().enabled) {
                report
                    .entry(instance.name().to_string())
                    .or_insert_with(|| json!({"enabled": false, "icon": endpoint_icon(None, false)}));
            }
            print_json(&Value::Object(report), pretty)?;
        }

        Commands::Request {
            url,
            method,
            headers,
            payload,
            content_type,
            querystring,
            timeout,
            insecure,
            vars,
        } => {
            let mut spec = RequestSpec::new(url)
                .with_method(method.parse::<HttpMethod>()?)
                .with_timeout(Duration::from_secs(timeout))
                .with_verify_tls(!insecure);
            for header in &headers {
                let (key, value) = split_pair(header, "header")?;
                spec = spec.with_header(key, value);
            }
            for var in &vars {
                let (name, raw) = split_pair(var, "variable")?;
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
                spec = spec.with_variable(name, value);
            }
            if let Some(payload) = payload {
                spec = spec.with_payload(payload);
            }
            if let Some(ct) = content_type {
                spec = spec.with_content_type(ct.parse::<ContentType>()?);
            }
            if let Some(qs) = querystring {
                spec = spec.with_querystring(qs);
            }

            let executor = RequestExecutor::new(
                Arc::new(http_agent::ConnectionPool::new(AgentSettings::from_env().pool)),
                Arc::new(JinjaRenderer::new()),
            );
            let result = executor.execute_result(&spec).await;
            executor.pool().close();
            print_json(&serde_json::to_value(&result)?, pretty)?;
        }

        Commands::Extract {
            selector,
            content_type,
            file,
        } => {
            let body = read_body(file.as_ref())?;
            let response = ResponseWrapper::from_body(content_type.as_deref(), body);
            let extraction = extract_detailed(&response, &selector);
            let found = extraction.value.is_some();
            print_json(
                &json!({
                    "value": extraction.value,
                    "strategy": extraction.strategy,
                    "attempted": extraction.attempted,
                }),
                pretty,
            )?;
            if !found {
                std::process::exit(1);
            }
        }

        Commands::Validate { config } => match AgentConfig::load(&config) {
            Ok(cfg) => {
                println!("Valid config: {}", config.display());
                for endpoint in &cfg.endpoints {
                    println!(
                        "  {} {} {} (every {}s, {} sensor(s){})",
                        endpoint.name,
                        endpoint.method,
                        endpoint.url,
                        endpoint.interval,
                        endpoint.sensors.len(),
                        if endpoint.enabled { "" } else { ", disabled" }
                    );
                }
            }
            Err(e) => {
                eprintln!("Invalid config: {e}");
                std::process::exit(1);
            }
        },

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "http-agent", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn split_pair<'a>(raw: &'a str, what: &str) -> anyhow::Result<(&'a str, &'a str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("{what} must look like NAME=VALUE, got '{raw}'"),
    }
}

fn read_body(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("failed to read stdin")?;
            Ok(body)
        }
    }
}

fn print_json(value: &Value, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
