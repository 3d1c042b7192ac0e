use crate::cli::args::{Args, Command, ConfigArgs, ConfigCommand, ConnectArgs, PublishArgs, WatchArgs};
use crate::cli::output::{ConsoleWriter, ListSizes, OutputWriter};
use crate::client::LiveClient;
use crate::core::live::{LiveState, NotificationEntry, SessionEntry};
use crate::core::session::ConnectionState;
use crate::domain::config::{GlobalConfig, LiveConfig, TopicConfig};
use crate::domain::error::LiveError;
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use std::time::Duration;
use tracing::debug;

/// Execute CLI command
pub async fn execute_command(args: Args) -> Result<(), LiveError> {
    let writer = ConsoleWriter::new(args.output);

    let config_manager = ConfigManager::new()?;
    let config = if let Some(config_path) = &args.config {
        config_manager.load_config_from_path(config_path.as_ref())?
    } else {
        config_manager.load_config()?
    };

    if !args.quiet {
        setup_logging(&config.global, args.verbose)?;
    }

    match args.command {
        Command::Watch(watch_args) => execute_watch(watch_args, &writer, config).await,
        Command::Publish(publish_args) => execute_publish(publish_args, &writer, config).await,
        Command::Topics => {
            writer.write_topics(&config.topics)?;
            Ok(())
        }
        Command::Config(config_args) => {
            execute_config_command(config_args, &writer, &config, &config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("tarot-live {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

async fn execute_watch(args: WatchArgs, writer: &ConsoleWriter, mut config: LiveConfig) -> Result<(), LiveError> {
    apply_connect_args(&mut config, &args.connect);
    if let Some(max) = args.max {
        config.global.max_list_size = max;
    }
    if !args.topics.is_empty() {
        config.topics = args
            .topics
            .iter()
            .map(|name| TopicConfig {
                name: name.clone(),
                description: String::new(),
            })
            .collect();
    }
    if config.topics.is_empty() {
        return Err(LiveError::InvalidInput("no topics to watch".to_string()));
    }

    let max = config.global.max_list_size;
    let topic_count = config.topics.len();
    let client = LiveClient::connect(config)?;
    let (_subscriptions, mut events) = client.subscribe_configured();

    if writer.format() != crate::cli::args::OutputFormat::Json {
        eprintln!(
            "Watching {} topic(s) on {} (Ctrl+C to stop)",
            topic_count,
            client.endpoint()
        );
    }

    let mut sessions = if args.dedupe {
        LiveState::<SessionEntry>::keyed(max)
    } else {
        LiveState::<SessionEntry>::new(max)
    };
    let mut notifications = LiveState::<NotificationEntry>::new(max);
    let mut state_rx = client.watch_state();
    let mut seen: u64 = 0;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break Ok(());
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *state_rx.borrow_and_update();
                writer.write_state(state)?;
                if state == ConnectionState::Closed {
                    break Err(gave_up(&client));
                }
            }
            event = events.recv() => {
                // Only the connection task giving up drops the senders
                let Some(event) = event else { break Err(gave_up(&client)) };
                sessions.apply_event(&event);
                notifications.apply_event(&event);
                let sizes = ListSizes {
                    sessions: sessions.list().len(),
                    notifications: notifications.list().len(),
                };
                writer.write_event(&event, sizes)?;

                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break Ok(());
                }
            }
        }
    };

    client.disconnect();
    client.session().closed().await;
    writer.write_stats(&client.stats())?;
    outcome
}

async fn execute_publish(args: PublishArgs, writer: &ConsoleWriter, mut config: LiveConfig) -> Result<(), LiveError> {
    serde_json::from_str::<serde_json::Value>(&args.body)
        .map_err(|e| LiveError::InvalidInput(format!("body is not valid JSON: {}", e)))?;

    apply_connect_args(&mut config, &args.connect);
    let client = LiveClient::connect(config)?;

    let wait = Duration::from_secs(args.wait);
    match tokio::time::timeout(wait, client.session().wait_for_state(ConnectionState::Connected)).await {
        Ok(result) => result?,
        Err(_) => {
            client.disconnect();
            return Err(LiveError::transport(format!(
                "not connected to {} after {}s",
                client.endpoint(),
                args.wait
            )));
        }
    }

    client.publish(&args.destination, args.body);
    client.disconnect();
    client.session().closed().await;

    writer.write_message(&format!("Published to {}", args.destination))?;
    Ok(())
}

fn execute_config_command(
    args: ConfigArgs,
    writer: &ConsoleWriter,
    config: &LiveConfig,
    config_manager: &ConfigManager,
) -> Result<(), LiveError> {
    match args.command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
            Ok(())
        }
        ConfigCommand::Validate { file } => {
            let result = match &file {
                Some(path) => config_manager.load_config_from_path(path.as_ref()),
                None => config_manager.load_config(),
            };
            match result {
                Ok(_) => writer.write_message(&format!(
                    "Configuration '{}' is valid",
                    file.as_deref().unwrap_or("(effective)")
                ))?,
                Err(e) => writer.write_error(&format!("Configuration validation failed: {}", e))?,
            }
            Ok(())
        }
        ConfigCommand::Init { dir, global } => {
            if global {
                let global_path = config_manager.global_config_path();
                config_manager.save_config_to_path(global_path, &LiveConfig::default())?;
                writer.write_message(&format!(
                    "Global configuration initialized at '{}'",
                    global_path.display()
                ))?;
            } else {
                let dir = match dir {
                    Some(dir) => dir.into(),
                    None => std::env::current_dir().map_err(|e| {
                        LiveError::config(format!("Failed to get current directory: {}", e))
                    })?,
                };
                let path = config_manager.init_project_config(&dir)?;
                writer.write_message(&format!(
                    "Project configuration initialized at '{}'",
                    path.display()
                ))?;
            }
            Ok(())
        }
        ConfigCommand::Path => {
            writer.write_paths(
                config_manager.global_config_path(),
                config_manager.project_config_path(),
            )?;
            Ok(())
        }
    }
}

fn gave_up(client: &LiveClient) -> LiveError {
    LiveError::transport(format!("gave up reconnecting to {}", client.endpoint()))
}

fn apply_connect_args(config: &mut LiveConfig, args: &ConnectArgs) {
    if let Some(server) = &args.server {
        config.server.origin = server.clone();
    }
    if let Some(transport) = args.transport {
        config.server.transport = transport;
    }
    if args.secure {
        config.server.page_secure = true;
    }
}

fn setup_logging(config: &GlobalConfig, verbose: bool) -> Result<(), LiveError> {
    let level = if verbose {
        "debug"
    } else {
        match config.log_level.as_str() {
            level @ ("error" | "warn" | "info" | "debug" | "trace") => level,
            _ => "info",
        }
    };

    init_logging(level).map_err(|e| LiveError::config(format!("Failed to initialize logging: {}", e)))
}
