//! camsync - Entry Point
//!
//! Keeps the flow running on a vision-AI camera in sync with its cloud
//! application. Runs as an agent, or one command at a time from the shell.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use camsync::app::options::AppOptions;
use camsync::app::run::run;
use camsync::app::state::AppState;
use camsync::errors::AgentError;
use camsync::logs::{init_logging, LogOptions};
use camsync::storage::layout::StorageLayout;
use camsync::storage::settings::Settings;
use camsync::sync::prompt::{FixedPrompter, Prefer, Prompter, StdinPrompter};
use camsync::utils::version_info;
use camsync::workers::poll::{self, no_shutdown};
use camsync::workers::status::{wait_for_services, ServicesState, StartupProgress};
use camsync::workers::update::{self, UpdateCheck};
use camsync::workspace::actions::WorkspaceAction;

/// Flags that run a single command instead of the agent
const COMMANDS: [&str; 14] = [
    "sync",
    "action",
    "save",
    "load",
    "create",
    "list",
    "rename",
    "delete",
    "select",
    "device",
    "wait-services",
    "update-check",
    "update-apply",
    "update-cancel",
];

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        print_json(&version);
        return;
    }

    // Retrieve the settings file
    let layout = match cli_args.get("config-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };
    let settings = match load_settings(&layout).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let app_state = match AppState::init(&settings).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize: {e}");
            std::process::exit(1);
        }
    };

    // Run a single command
    if let Some(command) = COMMANDS.iter().find(|c| cli_args.contains_key(**c)) {
        if let Err(e) = run_command(command, &cli_args, &settings, &app_state).await {
            error!("{} failed: {}", command, e);
            eprintln!("{e}");
            std::process::exit(1);
        }
        return;
    }

    // Run the agent
    let options = AppOptions::from(&settings);
    info!("Running camsync {} with options: {:?}", version.version, options);
    let result = run(options, app_state, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
        std::process::exit(1);
    }
}

async fn load_settings(layout: &StorageLayout) -> Result<Settings, AgentError> {
    let settings_file = layout.settings_file();
    if settings_file.exists().await {
        return settings_file.read_json::<Settings>().await;
    }
    let settings = Settings::default();
    settings_file.write_json(&settings).await?;
    Ok(settings)
}

fn prompter(cli_args: &HashMap<String, String>) -> Result<Box<dyn Prompter>, AgentError> {
    let prefer = cli_args
        .get("prefer")
        .map(|p| p.parse::<Prefer>())
        .transpose()
        .map_err(AgentError::ValidationError)?;
    let yes = cli_args.contains_key("yes");
    if prefer.is_some() || yes {
        return Ok(Box::new(FixedPrompter::new(prefer, yes)));
    }
    Ok(Box::new(StdinPrompter))
}

fn required<'a>(cli_args: &'a HashMap<String, String>, key: &str) -> Result<&'a str, AgentError> {
    cli_args
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty() && *v != "true")
        .ok_or_else(|| AgentError::ValidationError(format!("--{}=<value> is required", key)))
}

async fn run_command(
    command: &str,
    cli_args: &HashMap<String, String>,
    settings: &Settings,
    app_state: &AppState,
) -> Result<(), AgentError> {
    let workspace = &app_state.workspace;
    let system = app_state.collaborators.system.clone();

    match command {
        "sync" => print_json(&workspace.sync(prompter(cli_args)?.as_ref()).await?),
        "action" => {
            let action = WorkspaceAction::parse(
                required(cli_args, "action")?,
                cli_args.get("app-id").map(String::as_str),
                cli_args.get("model-id").map(String::as_str),
            )?;
            print_json(&workspace.apply_action(action, prompter(cli_args)?.as_ref()).await?)
        }
        "save" => print_json(&workspace.save().await?),
        "load" => print_json(&workspace.load(required(cli_args, "load")?).await?),
        "select" => print_json(&workspace.select(required(cli_args, "select")?).await?),
        "create" => {
            let name = cli_args.get("name").cloned();
            print_json(&workspace.create(name).await?)
        }
        "list" => print_json(&workspace.list().await?),
        "rename" => {
            workspace
                .rename(required(cli_args, "rename")?, required(cli_args, "name")?)
                .await?
        }
        "delete" => print_json(&workspace.delete(required(cli_args, "delete")?).await?),
        "device" => print_json(&system.get_device_info().await?),
        "wait-services" => {
            let (progress_tx, _progress_rx) = watch::channel(StartupProgress::default());
            let state = wait_for_services(
                system,
                &poll::Options::from(&settings.polling.service_status),
                progress_tx,
                tokio::time::sleep,
                Box::pin(async {
                    let _ = tokio::signal::ctrl_c().await;
                }),
            )
            .await;
            print_json(&state);
            if state != ServicesState::Running {
                return Err(AgentError::Internal("device services are not running".to_string()));
            }
        }
        "update-check" => print_json(&update::check(system.as_ref()).await?),
        "update-apply" => {
            let options = poll::Options::from(&settings.polling.update_progress);
            let result = match update::check(system.as_ref()).await? {
                UpdateCheck::Available { download_url, .. } => {
                    update::apply(system, &download_url, &options, tokio::time::sleep, no_shutdown())
                        .await?
                }
                UpdateCheck::Updating => {
                    update::follow(system, &options, tokio::time::sleep, no_shutdown()).await?
                }
                other => {
                    print_json(&other);
                    return Ok(());
                }
            };
            print_json(&result);
        }
        "update-cancel" => system.cancel_update().await?,
        other => {
            return Err(AgentError::ValidationError(format!("unknown command: {}", other)));
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render output: {e}"),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            error!("Failed to install signal handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
