//! CLI command implementations
//!
//! Both commands load the configuration, set the log level, and run on a
//! current-thread Tokio runtime.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, watch};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::fixture::{Fixture, FixtureStep};
use super::io::{write_error, write_response, write_response_to};
use crate::backend::{BackendClient, ChangeEvent, ChangeFeed, MemoryBackend, WsChangeFeed};
use crate::config::ClientConfig;
use crate::counter::{CounterSpec, CounterState, LiveCounter};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::realtime::{RealtimeSubscription, SubscriptionDescriptor, SubscriptionStatus};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Replay { config, fixture } => replay(&config, &fixture),
        Command::Watch {
            config,
            table,
            schema,
            filter,
            channel,
        } => {
            let config = load_config(&config)?;
            let mut descriptor = SubscriptionDescriptor::new(channel, table)
                .in_schema(schema.unwrap_or_else(|| config.default_schema.clone()));
            if let Some(filter) = filter {
                descriptor = descriptor.with_filter(filter);
            }
            watch(config, descriptor)
        }
    }
}

/// Load configuration and apply its log level
pub fn load_config(path: &Path) -> CliResult<ClientConfig> {
    let config = ClientConfig::load(path)?;
    Logger::set_min_severity(config.severity()?);

    let path_str = path.display().to_string();
    log_event_with_fields(Event::ConfigLoaded, &[("path", path_str.as_str())]);
    Ok(config)
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))
}

/// Replay a fixture, writing one response line per step to stdout
pub fn replay(config_path: &Path, fixture_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let fixture = Fixture::load(fixture_path)?;
    let mut stdout = std::io::stdout();
    replay_to(config, fixture, &mut stdout)
}

/// Replay a fixture, writing one response line per step to `out`.
///
/// Line 0 reports the state after the fixture's initial scope was applied.
/// Mutation steps wait up to `settle_timeout_ms` for the counter to settle.
pub fn replay_to<W: Write>(config: ClientConfig, fixture: Fixture, out: &mut W) -> CliResult<()> {
    log_event_with_fields(Event::CommandStart, &[("command", "replay")]);

    let backend = Arc::new(fixture.backend()?);
    let settle = Duration::from_millis(config.settle_timeout_ms);
    let spec = CounterSpec::unread(&config.unread, config.default_schema.clone());
    let client = BackendClient::from_backend(Arc::clone(&backend), config);

    runtime()?.block_on(drive_counter(client, spec, &backend, &fixture, settle, out))?;

    log_event_with_fields(Event::CommandComplete, &[("command", "replay")]);
    Ok(())
}

async fn drive_counter<W: Write>(
    client: BackendClient,
    spec: CounterSpec,
    backend: &MemoryBackend,
    fixture: &Fixture,
    settle: Duration,
    out: &mut W,
) -> CliResult<()> {
    let mut counter = LiveCounter::new(client, spec);
    let mut states = counter.watch();

    counter.set_scope(fixture.scope.clone()).await;
    write_step(out, 0, "init", &counter)?;

    for (index, step) in fixture.steps.iter().enumerate() {
        states.borrow_and_update();

        match step {
            FixtureStep::Scope { scope } => counter.set_scope(scope.clone()).await,
            FixtureStep::Refresh => counter.refresh().await,
            mutation => {
                mutation.apply(backend)?;
                wait_settled(&mut states, settle).await;
            }
        }

        write_step(out, index + 1, step.op(), &counter)?;
    }

    counter.shutdown();
    Ok(())
}

/// Wait for the next state change, then for loading to clear
async fn wait_settled(states: &mut watch::Receiver<CounterState>, settle: Duration) {
    let _ = tokio::time::timeout(settle, async {
        if states.changed().await.is_ok() {
            let _ = states.wait_for(|state| !state.loading).await;
        }
    })
    .await;
}

fn write_step<W: Write>(
    out: &mut W,
    step: usize,
    op: &str,
    counter: &LiveCounter,
) -> CliResult<()> {
    let state = counter.state();
    write_response_to(
        out,
        json!({
            "step": step,
            "op": op,
            "value": state.value,
            "loading": state.loading,
            "phase": state.phase.as_str(),
            "subscribed": counter.is_subscribed(),
        }),
    )
}

/// Print change events for `descriptor` until Ctrl-C or the feed closes
pub fn watch(config: ClientConfig, descriptor: SubscriptionDescriptor) -> CliResult<()> {
    let feed = WsChangeFeed::from_config(&config)
        .ok_or_else(|| CliError::config_error("realtime_url is required for watch"))?;
    let feed: Arc<dyn ChangeFeed> = Arc::new(feed);

    log_event_with_fields(Event::CommandStart, &[("command", "watch")]);

    runtime()?.block_on(print_events(feed, descriptor))?;

    log_event_with_fields(Event::CommandComplete, &[("command", "watch")]);
    Ok(())
}

async fn print_events(
    feed: Arc<dyn ChangeFeed>,
    descriptor: SubscriptionDescriptor,
) -> CliResult<()> {
    let (tx, mut events) = mpsc::unbounded_channel::<ChangeEvent>();
    let mut subscription = RealtimeSubscription::new(feed, move |event: &ChangeEvent| {
        let _ = tx.send(event.clone());
    });
    let mut status = subscription.status();
    subscription.update(descriptor)?;

    let outcome = loop {
        tokio::select! {
            Some(event) = events.recv() => {
                write_response(serde_json::to_value(&event)?)?;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = status.borrow_and_update().clone();
                match current {
                    SubscriptionStatus::Failed(reason) => {
                        let err = CliError::realtime_error(reason);
                        write_error(err.code_str(), err.message())?;
                        break Err(err);
                    }
                    SubscriptionStatus::Closed => break Ok(()),
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    subscription.release();
    outcome
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use serde_json::Value;
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn run_fixture(fixture: Value) -> Vec<Value> {
        let config = ClientConfig::from_json(r#"{"settle_timeout_ms": 300}"#).unwrap();
        let fixture = Fixture::from_json(&fixture.to_string()).unwrap();
        let mut out = Vec::new();
        replay_to(config, fixture, &mut out).unwrap();

        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["data"].clone())
            .collect()
    }

    #[test]
    fn test_replay_unread_counter() {
        let user = Uuid::new_v4().to_string();
        let lines = run_fixture(json!({
            "user": user,
            "scope": "school-123",
            "tables": {"messages": [
                {"id": "m1", "school_id": "school-123", "recipient_id": user, "is_read": false},
                {"id": "m2", "school_id": "school-123", "recipient_id": user, "is_read": true}
            ]},
            "steps": [
                {"op": "insert", "table": "messages",
                 "row": {"school_id": "school-123", "recipient_id": user, "is_read": false}},
                {"op": "update", "table": "messages", "id": "m1", "patch": {"is_read": true}},
                {"op": "scope", "scope": null}
            ]
        }));

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["value"], 1);
        assert_eq!(lines[0]["phase"], "ready");
        assert_eq!(lines[0]["subscribed"], true);
        assert_eq!(lines[1]["value"], 2);
        assert_eq!(lines[2]["value"], 1);
        assert_eq!(lines[3]["value"], 0);
        assert_eq!(lines[3]["phase"], "idle");
        assert_eq!(lines[3]["subscribed"], false);
    }

    #[test]
    fn test_replay_signed_out() {
        let lines = run_fixture(json!({
            "scope": "school-123",
            "tables": {"messages": []}
        }));

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["loading"], false);
        assert_eq!(lines[0]["subscribed"], false);
    }

    #[test]
    fn test_load_config_rejects_bad_level() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("campusdesk.json");
        fs::write(&config_path, r#"{"log_level": "chatty"}"#).unwrap();

        let err = load_config(&config_path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_watch_requires_realtime_url() {
        let err = watch(
            ClientConfig::default(),
            SubscriptionDescriptor::new("c", "messages"),
        )
        .unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_replay_missing_fixture() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("campusdesk.json");
        fs::write(&config_path, "{}").unwrap();

        let err = replay(&config_path, &temp_dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::FixtureError);
    }
}
