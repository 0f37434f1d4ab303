//! Fridge monitor CLI
//!
//! Reads and writes the parameters of an instrument data server, using the
//! parameter list from `config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fridge_client::{InstrumentDataClient, Parameter};
use fridge_client::config::{ClientConfig, Directories};
use serde_json::Value;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Fridge monitor - instrument data client
#[derive(Parser, Debug)]
#[command(name = "fridge-monitor")]
#[command(version, about, long_about = None)]
#[command(after_help = "\
Examples:
  fridge-monitor list                     Show configured parameters
  fridge-monitor get temperature          Read one parameter
  fridge-monitor set heater 0.25          Write a get/set parameter
  fridge-monitor snapshot                 Read everything, print as JSON
  fridge-monitor monitor -i 2 temperature Poll every 2 seconds
")]
struct Cli {
    /// Config file (defaults to ~/.config/fridge-monitor/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Server address, overrides the config file
    #[arg(long)]
    address: Option<String>,

    /// Server port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long, env = "FRIDGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Seconds to wait for each remote call
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured parameters without connecting
    List,

    /// Read a parameter (prints the default if the server does not answer)
    Get { name: String },

    /// Write a parameter; VALUE is parsed as JSON, otherwise sent as a string
    Set { name: String, value: String },

    /// Read every parameter and print the snapshot as JSON
    Snapshot,

    /// Poll parameters until interrupted
    Monitor {
        /// Seconds between polls
        #[arg(short, long, default_value_t = 1.0)]
        interval: f64,

        /// Stop after this many polls
        #[arg(short, long)]
        count: Option<u64>,

        /// Parameters to poll (defaults to all)
        names: Vec<String>,
    },
}

/// Log to stderr, and to `log_file` as well when given. The returned guard
/// flushes the file writer when dropped.
fn setup_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,fridge_client=info,fridge_rpc=info,fridge_monitor=info")
    });

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;

            let appender =
                tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.as_deref())?;

    let config = load_config(&cli)?;
    let mut client =
        InstrumentDataClient::from_config(&config).context("Invalid configuration")?;

    if let Commands::List = cli.command {
        print_parameters(&client);
        return Ok(());
    }

    client.connect().await.with_context(|| {
        format!(
            "Failed to connect to {}",
            client.settings().tcp_bind_address()
        )
    })?;

    let result = match cli.command {
        Commands::List => Ok(()),
        Commands::Get { name } => run_get(&mut client, &name).await,
        Commands::Set { name, value } => run_set(&mut client, &name, &value).await,
        Commands::Snapshot => run_snapshot(&mut client).await,
        Commands::Monitor {
            interval,
            count,
            names,
        } => run_monitor(&mut client, interval, count, names).await,
    };

    client.disconnect();
    result
}

/// Config file contents with command-line overrides applied
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Directories::new()?.config_file,
    };
    debug!("Loading config from {}", path.display());

    let mut config = ClientConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(address) = &cli.address {
        config.connection.address.clone_from(address);
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    if let Some(username) = &cli.username {
        config.connection.username = Some(username.clone());
    }
    if let Some(password) = &cli.password {
        config.connection.password = Some(password.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    Ok(config)
}

fn sorted_names(client: &InstrumentDataClient) -> Vec<String> {
    let mut names: Vec<String> = client.parameters().map(|p| p.name().to_string()).collect();
    names.sort();
    names
}

fn print_parameters(client: &InstrumentDataClient) {
    let names = sorted_names(client);
    if names.is_empty() {
        println!("No parameters configured");
        return;
    }

    for name in names {
        let Some(param) = client.parameter(&name) else {
            continue;
        };
        let access = if param.is_settable() { "get/set" } else { "get" };
        let unit = if param.unit().is_empty() {
            String::new()
        } else {
            format!(" [{}]", param.unit())
        };
        println!("{name:<24} {access:<8}{unit}");
        if !param.doc().is_empty() {
            println!("    {}", param.doc());
        }
    }
}

async fn run_get(client: &mut InstrumentDataClient, name: &str) -> Result<()> {
    let value = client.get(name).await?;
    let unit = client.parameter(name).map_or("", Parameter::unit);
    println!("{}", format_reading(&value, unit));
    Ok(())
}

async fn run_set(client: &mut InstrumentDataClient, name: &str, raw: &str) -> Result<()> {
    let value = parse_value(raw);
    client
        .set(name, value.clone())
        .await
        .with_context(|| format!("Failed to set {name}"))?;
    info!("Set {name} to {value}");
    Ok(())
}

async fn run_snapshot(client: &mut InstrumentDataClient) -> Result<()> {
    for name in sorted_names(client) {
        client.get(&name).await?;
    }
    println!("{}", serde_json::to_string_pretty(&client.snapshot())?);
    Ok(())
}

async fn run_monitor(
    client: &mut InstrumentDataClient,
    interval: f64,
    count: Option<u64>,
    names: Vec<String>,
) -> Result<()> {
    let Ok(period) = Duration::try_from_secs_f64(interval) else {
        bail!("Interval must be a non-negative number of seconds, got {interval}");
    };
    if period.is_zero() {
        bail!("Interval must be greater than zero");
    }

    let names = if names.is_empty() {
        sorted_names(client)
    } else {
        names
    };
    if names.is_empty() {
        bail!("No parameters to monitor");
    }

    let interrupted = async {
        let result = tokio::signal::ctrl_c().await;
        info!("Interrupted");
        result
    };
    monitor_loop(client, &names, tokio::time::interval(period), count, interrupted).await
}

/// Poll until `count` lines are printed or `interrupted` resolves. The
/// interrupt is armed once, so it also fires while a poll is in flight.
async fn monitor_loop(
    client: &mut InstrumentDataClient,
    names: &[String],
    mut ticker: tokio::time::Interval,
    count: Option<u64>,
    interrupted: impl Future<Output = std::io::Result<()>>,
) -> Result<()> {
    tokio::pin!(interrupted);
    let mut polls = 0u64;

    loop {
        tokio::select! {
            biased;
            result = &mut interrupted => return Ok(result?),
            result = poll_once(client, names, &mut ticker) => result?,
        }

        polls += 1;
        if count.is_some_and(|limit| polls >= limit) {
            return Ok(());
        }
    }
}

/// Wait for the next tick, then read and print one line of values.
async fn poll_once(
    client: &mut InstrumentDataClient,
    names: &[String],
    ticker: &mut tokio::time::Interval,
) -> Result<()> {
    ticker.tick().await;

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let value = client.get(name).await?;
        let unit = client.parameter(name).map_or("", Parameter::unit);
        fields.push(format!("{name}={}", format_reading(&value, unit)));
    }
    println!("{timestamp}  {}", fields.join("  "));
    Ok(())
}

/// Parse a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn format_reading(value: &Value, unit: &str) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if unit.is_empty() {
        text
    } else {
        format!("{text} {unit}")
    }
}
