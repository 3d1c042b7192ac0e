use crate::cli::args::OutputFormat;
use crate::core::session::{ConnectionState, PipelineStats};
use crate::domain::config::{LiveConfig, TopicConfig};
use crate::domain::event::{DomainEvent, LiveEvent};
use std::io;
use std::path::Path;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    /// One delivered event and the live list sizes after merging it
    fn write_event(&self, event: &LiveEvent, sizes: ListSizes) -> Result<(), OutputError>;
    fn write_state(&self, state: ConnectionState) -> Result<(), OutputError>;
    fn write_stats(&self, stats: &PipelineStats) -> Result<(), OutputError>;
    fn write_config(&self, config: &LiveConfig) -> Result<(), OutputError>;
    fn write_topics(&self, topics: &[TopicConfig]) -> Result<(), OutputError>;
    fn write_paths(&self, global: &Path, project: Option<&Path>) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Current length of each live list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ListSizes {
    pub sessions: usize,
    pub notifications: usize,
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::LiveError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_event(&self, event: &LiveEvent, sizes: ListSizes) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!(
                    "[{}] {} {}: {}  (sessions: {}, notifications: {})",
                    event.received_at.format("%H:%M:%S"),
                    event.topic,
                    event.payload.kind(),
                    summarize(&event.payload),
                    sizes.sessions,
                    sizes.notifications
                );
            }
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "event": event,
                    "liveLists": sizes,
                });
                println!("{}", serde_json::to_string(&output)?);
            }
            OutputFormat::Table => {
                println!("{}", Table::new([EventRow::from(event)]));
            }
            OutputFormat::Csv => {
                println!(
                    "{},{},{},{}",
                    event.received_at.to_rfc3339(),
                    event.topic,
                    event.payload.kind(),
                    csv_field(&summarize(&event.payload))
                );
            }
        }
        Ok(())
    }

    fn write_state(&self, state: ConnectionState) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "state": state,
                    "indicator": state.indicator(),
                });
                println!("{}", serde_json::to_string(&output)?);
            }
            // Keep CSV rows parseable
            OutputFormat::Csv => eprintln!("# {} ({})", state, state.indicator()),
            _ => println!("-- {} ({})", state, state.indicator()),
        }
        Ok(())
    }

    fn write_stats(&self, stats: &PipelineStats) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(stats)?);
            }
            OutputFormat::Table => {
                println!("{}", Table::new([StatsRow::from(stats)]));
            }
            _ => {
                eprintln!("Pipeline statistics:");
                eprintln!("  Frames received: {}", stats.frames_received);
                eprintln!("  Frames dispatched: {}", stats.frames_dispatched);
                eprintln!("  Decode failures: {}", stats.decode_failures);
                eprintln!("  Handler failures: {}", stats.handler_failures);
                eprintln!("  Dropped (no listener): {}", stats.dropped_no_listener);
                eprintln!("  Reconnect attempts: {}", stats.reconnect_attempts);
                eprintln!("  Connections established: {}", stats.connections_established);
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &LiveConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            OutputFormat::Table => {
                let rows = vec![
                    SettingRow::new("server.origin", &config.server.origin),
                    SettingRow::new("server.endpoint_path", &config.server.endpoint_path),
                    SettingRow::new("server.page_secure", config.server.page_secure),
                    SettingRow::new("server.transport", config.server.transport),
                    SettingRow::new("connection.reconnect_delay_ms", config.connection.reconnect_delay_ms),
                    SettingRow::new(
                        "connection.max_reconnect_attempts",
                        config
                            .connection
                            .max_reconnect_attempts
                            .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
                    ),
                    SettingRow::new("connection.heartbeat_outgoing_ms", config.connection.heartbeat_outgoing_ms),
                    SettingRow::new("connection.heartbeat_incoming_ms", config.connection.heartbeat_incoming_ms),
                    SettingRow::new("connection.connect_timeout_ms", config.connection.connect_timeout_ms),
                    SettingRow::new("connection.max_frame_bytes", config.connection.max_frame_bytes),
                    SettingRow::new("global.log_level", &config.global.log_level),
                    SettingRow::new("global.max_list_size", config.global.max_list_size),
                ];
                println!("{}", Table::new(rows));
            }
            _ => {
                print!("{}", toml::to_string_pretty(config)?);
            }
        }
        Ok(())
    }

    fn write_topics(&self, topics: &[TopicConfig]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                for topic in topics {
                    let desc = if topic.description.is_empty() { "No description" } else { &topic.description };
                    println!("{}  {}", topic.name, desc);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(topics)?);
            }
            OutputFormat::Table => {
                if !topics.is_empty() {
                    let rows: Vec<TopicRow> = topics.iter().map(TopicRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
            OutputFormat::Csv => {
                println!("name,description");
                for topic in topics {
                    println!("{},{}", topic.name, csv_field(&topic.description));
                }
            }
        }
        Ok(())
    }

    fn write_paths(&self, global: &Path, project: Option<&Path>) -> Result<(), OutputError> {
        let project_display = project.map(|p| p.display().to_string());
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "global": global.display().to_string(),
                    "project": project_display,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("global:  {}", global.display());
                println!("project: {}", project_display.as_deref().unwrap_or("(none found)"));
            }
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

/// One-line human summary of a payload
pub fn summarize(payload: &DomainEvent) -> String {
    match payload {
        DomainEvent::NewSession(e) => format!(
            "session {} {} with {} via {}",
            e.session_id,
            e.customer_name.as_deref().unwrap_or("?"),
            e.reader_name.as_deref().unwrap_or("?"),
            e.channel.as_deref().unwrap_or("?")
        ),
        DomainEvent::SessionUpdated(e) => format!("session {} is now {}", e.session_id, e.status),
        DomainEvent::Notification(n) => match &n.kind {
            Some(kind) => format!("{} {}", kind, n.message),
            None => n.message.clone(),
        },
        DomainEvent::Raw(value) => value.to_string(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Table row for a delivered event
#[derive(Tabled)]
struct EventRow {
    time: String,
    topic: String,
    kind: String,
    summary: String,
}

impl From<&LiveEvent> for EventRow {
    fn from(event: &LiveEvent) -> Self {
        Self {
            time: event.received_at.format("%H:%M:%S").to_string(),
            topic: event.topic.clone(),
            kind: event.payload.kind().to_string(),
            summary: summarize(&event.payload),
        }
    }
}

/// Table row for pipeline statistics
#[derive(Tabled)]
struct StatsRow {
    received: u64,
    dispatched: u64,
    decode_failures: u64,
    handler_failures: u64,
    no_listener: u64,
    reconnects: u64,
}

impl From<&PipelineStats> for StatsRow {
    fn from(stats: &PipelineStats) -> Self {
        Self {
            received: stats.frames_received,
            dispatched: stats.frames_dispatched,
            decode_failures: stats.decode_failures,
            handler_failures: stats.handler_failures,
            no_listener: stats.dropped_no_listener,
            reconnects: stats.reconnect_attempts,
        }
    }
}

/// Table row for one configuration key
#[derive(Tabled)]
struct SettingRow {
    key: String,
    value: String,
}

impl SettingRow {
    fn new(key: &str, value: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Table row for a configured topic
#[derive(Tabled)]
struct TopicRow {
    name: String,
    description: String,
}

impl From<&TopicConfig> for TopicRow {
    fn from(topic: &TopicConfig) -> Self {
        Self {
            name: topic.name.clone(),
            description: topic.description.clone(),
        }
    }
}
