//! Mock desktop runtime for integration testing
//!
//! Serves the simulated runtime over stdio using the Content-Length framed
//! wire protocol, so the harness can be exercised against a real child
//! process without a desktop.

use std::sync::Arc;
use std::time::Duration;

use bounds_harness::common::error::WireError;
use bounds_harness::common::{logging, Error, Result};
use bounds_harness::remote::codec;
use bounds_harness::remote::{
    ConnectArguments, ConnectResponseBody, DisconnectArguments, EntityArguments, EventBody,
    EventMessage, LaunchArguments, LaunchResponseBody, RemoteRuntime, RequestMessage,
    ResponseMessage, RuntimeEvent, SimOptions, SimulatedRuntime, WireMessage,
};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWrite, BufReader, BufWriter};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "mock-runtime", about = "Simulated desktop runtime over stdio")]
struct Args {
    /// Delay between a launch and its ready event, in milliseconds
    #[arg(long, default_value_t = 10)]
    ready_delay_ms: u64,

    /// Name of the ready event
    #[arg(long, default_value = "shown")]
    ready_event: String,

    /// Never send the ready event
    #[arg(long)]
    suppress_ready: bool,

    /// Do not restore saved bounds on relaunch
    #[arg(long)]
    no_persist: bool,

    /// Minimum window width
    #[arg(long, default_value_t = 140)]
    min_width: i32,

    /// Minimum window height
    #[arg(long, default_value_t = 38)]
    min_height: i32,
}

impl Args {
    fn sim_options(&self) -> SimOptions {
        SimOptions {
            min_width: self.min_width,
            min_height: self.min_height,
            ready_event: self.ready_event.clone(),
            ready_delay: Duration::from_millis(self.ready_delay_ms),
            persist_bounds: !self.no_persist,
            suppress_ready: self.suppress_ready,
            ..SimOptions::default()
        }
    }
}

/// Outgoing message before a sequence number is assigned
enum Outgoing {
    Response {
        request_seq: i64,
        command: String,
        result: Result<Value>,
    },
    Event(RuntimeEvent),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Some(path) = logging::init_runtime() {
        tracing::info!("Logging to {}", path.display());
    }

    if let Err(e) = serve(args.sim_options()).await {
        tracing::error!("Mock runtime stopped: {}", e);
        std::process::exit(1);
    }
}

async fn serve(options: SimOptions) -> Result<()> {
    let runtime = SimulatedRuntime::new(options);
    let (tx, rx) = mpsc::unbounded_channel::<Outgoing>();

    let events = tx.clone();
    runtime.watch_all(Arc::new(move |event: &RuntimeEvent| {
        let _ = events.send(Outgoing::Event(event.clone()));
    }));

    let writer = tokio::spawn(write_loop(BufWriter::new(tokio::io::stdout()), rx));
    let mut reader = BufReader::new(tokio::io::stdin());

    loop {
        let request = match codec::read_message(&mut reader).await {
            Ok(WireMessage::Request(request)) => request,
            Ok(_) => {
                tracing::warn!("Ignoring non-request message");
                continue;
            }
            Err(Error::Protocol(reason)) => {
                tracing::warn!("Ignoring malformed message: {}", reason);
                continue;
            }
            // Harness went away
            Err(Error::RuntimeCrashed) => break,
            Err(e) => return Err(e),
        };

        let result = handle(&runtime, &request).await;
        if let Err(e) = &result {
            tracing::debug!(command = %request.command, error = %e, "Request failed");
        }
        let _ = tx.send(Outgoing::Response {
            request_seq: request.seq,
            command: request.command,
            result,
        });
    }

    drop(tx);
    writer.abort();
    Ok(())
}

async fn handle(runtime: &SimulatedRuntime, request: &RequestMessage) -> Result<Value> {
    match request.command.as_str() {
        "connect" => {
            let args: ConnectArguments = arguments(request)?;
            let connection = runtime.connect(&args.identity).await?;
            to_body(&ConnectResponseBody { connection })
        }
        "disconnect" => {
            let args: DisconnectArguments = arguments(request)?;
            runtime.disconnect(&args.connection).await?;
            Ok(Value::Null)
        }
        "launch" => {
            let args: LaunchArguments = arguments(request)?;
            let entity = runtime.launch(&args.connection, &args.spec).await?;
            to_body(&LaunchResponseBody { entity })
        }
        "getBounds" => {
            let args: EntityArguments = arguments(request)?;
            to_body(&runtime.read_bounds(&args.entity).await?)
        }
        "close" => {
            let args: EntityArguments = arguments(request)?;
            runtime.close(&args.entity).await?;
            Ok(Value::Null)
        }
        other => Err(Error::Protocol(format!("Unknown command: {}", other))),
    }
}

fn arguments<T: DeserializeOwned>(request: &RequestMessage) -> Result<T> {
    let value = request.arguments.clone().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        Error::Protocol(format!("Invalid {} arguments: {}", request.command, e))
    })
}

fn to_body<T: Serialize>(body: &T) -> Result<Value> {
    Ok(serde_json::to_value(body)?)
}

async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    let mut seq: i64 = 1;
    while let Some(outgoing) = rx.recv().await {
        let message = match outgoing {
            Outgoing::Response {
                request_seq,
                command,
                result,
            } => {
                let (success, body, error) = match result {
                    Ok(body) => (true, Some(body), None),
                    Err(e) => (false, None, Some(WireError::from(&e))),
                };
                WireMessage::Response(ResponseMessage {
                    seq,
                    request_seq,
                    success,
                    command,
                    error,
                    body,
                })
            }
            Outgoing::Event(event) => WireMessage::Event(EventMessage {
                seq,
                event: event.name,
                body: EventBody {
                    entity: event.entity,
                },
            }),
        };
        seq += 1;

        if let Err(e) = codec::write_message(&mut writer, &message).await {
            tracing::warn!("Failed to write to harness: {}", e);
            break;
        }
    }
}
