//! Demo driver for the event-push system: `serve` runs a sender endpoint
//! that broadcasts a counter event, `watch` points a receiver at any push
//! endpoint and prints what arrives.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use clap::{Parser, Subcommand};
use log::*;

use receiver::{Client, HttpTransport, Options, Payload};
use sender::{event_stream_response, ConnectionOptions, Manager, DEFAULT_HEARTBEAT_INTERVAL};
use wire::{Endpoint, Record};

mod logging;

use logging::Logger;

#[derive(Parser)]
#[command(name = "eventflow", version, about = "One-way event push over long-lived text streams")]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, env = "EVENTFLOW_LOG_LEVEL", default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a demo push endpoint that broadcasts a tick event
    Serve {
        /// Address to bind
        #[arg(long, env = "EVENTFLOW_ADDR", default_value = "127.0.0.1:4500")]
        addr: SocketAddr,

        /// Seconds between demo broadcasts
        #[arg(long, default_value_t = 2)]
        tick_secs: u64,
    },
    /// Connect to a push endpoint and print incoming events
    Watch {
        /// Endpoint URL
        url: String,

        /// Named events to subscribe to (repeatable)
        #[arg(long = "event")]
        events: Vec<String>,

        /// Identify as this user via query parameter
        #[arg(long)]
        user_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    Logger::init(cli.log_level);
    match cli.command {
        Command::Serve { addr, tick_secs } => serve(addr, tick_secs).await,
        Command::Watch {
            url,
            events,
            user_id,
        } => watch(url, events, user_id).await,
    }
}

async fn serve(addr: SocketAddr, tick_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let manager = Manager::new();
    let app = Router::new()
        .route("/events", get(events_handler))
        .with_state(manager.clone());

    let ticker = manager.clone();
    tokio::spawn(async move {
        let mut seq = 0u64;
        loop {
            tokio::time::sleep(Duration::from_secs(tick_secs)).await;
            seq += 1;
            ticker
                .broadcast(
                    &Record::new(serde_json::json!({"seq": seq}))
                        .with_event("tick")
                        .with_id(seq.to_string()),
                )
                .await;
        }
    });

    info!("serving push endpoint on http://{addr}/events");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// One connection per inbound request; the read end of its pipe becomes the
/// response body and the registry reaps it when the stream ends.
async fn events_handler(
    State(manager): State<Manager>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (connection, reader) = manager.create_client(ConnectionOptions {
        user_id: params.get("user_id").cloned(),
        ..ConnectionOptions::default()
    });
    connection.start_heartbeat(DEFAULT_HEARTBEAT_INTERVAL);
    event_stream_response(manager, connection.id().clone(), reader)
}

async fn watch(
    url: String,
    events: Vec<String>,
    user_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Endpoint::new(url).param("user_id", user_id);
    let client = Client::new(
        endpoint,
        Arc::new(HttpTransport::new()),
        Options {
            enabled: true,
            ..Options::default()
        },
    );

    let mut subscriptions = Vec::new();
    subscriptions.push(client.subscribe("open", |_| info!("stream open")));
    subscriptions.push(client.subscribe("message", |payload| {
        if let Payload::Message { data, .. } = payload {
            println!("message: {data}");
        }
    }));
    for name in events {
        let label = name.clone();
        subscriptions.push(client.subscribe(name.as_str(), move |payload| {
            if let Payload::Named { data, .. } = payload {
                println!("{label}: {data}");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    client.disconnect();
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    Ok(())
}
