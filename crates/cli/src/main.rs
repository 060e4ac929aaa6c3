//! `vaultline`: run one workflow step the way the orchestration host would.
//!
//! The binary stands in for the host during development and incident
//! response: it reads a JSON inputs object, dispatches the named step
//! handler, and emits the outputs (with the updated `workflow_logs` riding
//! along) for the next step. The `login` subcommand covers the connectivity
//! checks that are the only place a token is ever acquired.

use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use vaultline_api::{BackupServerClient, DirectorClient, ManagerClient};
use vaultline_engine::{StepContext, keys};
use vaultline_types::ServiceKind;

#[derive(Parser)]
#[command(name = "vaultline", version, about = "Backup/restore workflow step runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the registered step names.
    Steps,
    /// Run one step with a JSON inputs file.
    Run {
        /// Step name, e.g. `vm:list` (see `vaultline steps`).
        step: String,
        /// Path of the JSON inputs object.
        #[arg(long)]
        inputs: PathBuf,
        /// Write outputs to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Acquire a token from a service (connectivity check; never stored).
    Login {
        /// Which service: `director`, `manager` or `server`.
        service: ServiceKind,
        /// Service host name.
        #[arg(long)]
        host: String,
        /// User name; the password is read from stdin.
        #[arg(long)]
        user: String,
        /// Override the service's default port.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Steps => list_steps(),
        Command::Run { step, inputs, output } => run_step(&step, &inputs, output.as_deref()).await,
        Command::Login { service, host, user, port } => login(service, &host, &user, port).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn list_steps() -> Result<()> {
    for handler in vaultline_engine::handlers() {
        println!("{:<24} {}", handler.name(), handler.summary());
    }
    Ok(())
}

async fn run_step(step: &str, inputs_path: &Path, output: Option<&Path>) -> Result<()> {
    let raw = fs::read_to_string(inputs_path).with_context(|| format!("failed to read inputs file {}", inputs_path.display()))?;
    let inputs: Map<String, Value> = serde_json::from_str::<Value>(&raw)
        .with_context(|| format!("inputs file {} is not valid JSON", inputs_path.display()))?
        .as_object()
        .cloned()
        .context("inputs file must contain a JSON object")?;

    let handler = vaultline_engine::find_handler(step)
        .with_context(|| format!("unknown step '{step}'; run 'vaultline steps' for the list"))?;

    let mut ctx = StepContext::new(inputs);
    match handler.run(&mut ctx).await {
        Ok(mut outputs) => {
            outputs.insert(keys::WORKFLOW_LOGS.to_string(), ctx.log.to_value());
            let rendered = serde_json::to_string_pretty(&Value::Object(outputs))?;
            match output {
                Some(path) => {
                    fs::write(path, rendered).with_context(|| format!("failed to write outputs to {}", path.display()))?;
                    info!(step, path = %path.display(), "step outputs written");
                }
                None => println!("{rendered}"),
            }
            Ok(())
        }
        Err(error) => {
            // The host only reads outputs on success; dump the accumulated
            // log so the failure still tells its story.
            eprintln!("{}", serde_json::to_string_pretty(&ctx.log.to_value())?);
            Err(error.context(format!("step '{step}' failed")))
        }
    }
}

async fn login(service: ServiceKind, host: &str, user: &str, port: Option<u16>) -> Result<()> {
    let password = prompt_password()?;
    let target = format!("{host}:{}", port.unwrap_or(service.default_port()));
    let token = match service {
        ServiceKind::Director => DirectorClient::login(&target, user, &password).await?,
        ServiceKind::Manager => ManagerClient::login(&format!("https://{target}/api"), user, &password).await?,
        ServiceKind::BackupServer => BackupServerClient::login(&format!("https://{target}"), user, &password).await?,
    };
    println!("{token}");
    Ok(())
}

fn prompt_password() -> Result<String> {
    eprint!("password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password.to_string())
}
