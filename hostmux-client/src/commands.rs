//! Subcommand implementations

use std::sync::Arc;
use std::time::Duration;

use hostmux_client::{transport, Backend, ClientConfig, HookEvent, LivenessMonitor};
use hostmux_protocol::{InsertTextRequest, RunProcessRequest, SetBufferRequest};
use hostmux_utils::{HostmuxError, Result};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cli::{Args, Command};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connect, run one subcommand, disconnect
pub async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load(),
    };
    let url = args.url.unwrap_or_else(|| config.connection.url.clone());

    let socket = transport::connect_with_retry(
        &url,
        config.connection.attempts,
        config.connection.retry_delay(),
    )
    .await?;
    let backend = Arc::new(Backend::new(socket, config.backend_config()));

    let result = match args.command {
        Command::Watch { no_liveness } => match watch(&backend, &config, no_liveness).await {
            Err(e) if e.is_closed() => {
                tracing::info!("Host closed the connection");
                Ok(())
            }
            other => other,
        },
        Command::InsertText {
            session,
            immediate,
            text,
        } => {
            let request = InsertTextRequest {
                immediate: Some(immediate),
                ..InsertTextRequest::text(text)
            };
            let id = backend.insert_text(session, request)?;
            tracing::info!(id = %id, "Text inserted");
            Ok(())
        }
        Command::SetBuffer {
            session,
            cursor,
            text,
        } => {
            let request = SetBufferRequest {
                text,
                cursor_position: cursor,
            };
            let id = backend.set_buffer(session, request)?;
            tracing::info!(id = %id, "Buffer set");
            Ok(())
        }
        Command::Run {
            session,
            cwd,
            executable,
            args,
        } => {
            let request = RunProcessRequest {
                working_directory: cwd,
                ..RunProcessRequest::new(executable, args)
            };
            let response = backend.run_process(session, request).await?;
            print_json(&response)
        }
    };

    // Let queued requests reach the transport before the runtime exits
    backend.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, backend.closed()).await.is_err() {
        tracing::debug!("Transport did not shut down in time");
    }
    result
}

/// Stream hook events to stdout until the host disconnects or ctrl-c
async fn watch(backend: &Arc<Backend>, config: &ClientConfig, no_liveness: bool) -> Result<()> {
    backend.on_edit_buffer_change(|event| print_event("edit_buffer", event));
    backend.on_prompt(|event| print_event("prompt", event));
    backend.on_pre_exec(|event| print_event("pre_exec", event));
    backend.on_post_exec(|event| print_event("post_exec", event));
    backend.on_intercepted_key(|event| print_event("intercepted_key", event));

    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    let _monitor = (!no_liveness).then(|| {
        LivenessMonitor::spawn(backend.clone(), config.liveness_config(), move |reason| {
            let _ = disconnect_tx.send(reason);
        })
    });

    tokio::select! {
        _ = backend.closed() => Err(HostmuxError::ConnectionClosed),
        Some(reason) = disconnect_rx.recv() => {
            Err(HostmuxError::connection(format!("host unresponsive: {}", reason)))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a, T> {
    event: &'a str,
    session_id: &'a str,
    hook: &'a T,
}

fn event_line<T: Serialize>(name: &str, event: &HookEvent<T>) -> serde_json::Result<String> {
    serde_json::to_string(&EventLine {
        event: name,
        session_id: event.session_id.as_str(),
        hook: &event.hook,
    })
}

fn print_event<T: Serialize>(name: &str, event: &HookEvent<T>) {
    match event_line(name, event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, event = name, "Failed to format event"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| HostmuxError::internal(format!("Failed to format output: {}", e)))?;
    println!("{}", text);
    Ok(())
}
