use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pushlet_client::{
    ClientConfig, Event, EventKind, PushletClient, Query, SessionState, load_config,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

const ACK_TIMEOUT: Duration = Duration::from_secs(10);
const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "pushlet-cli")]
#[command(version)]
#[command(about = "Listen to and publish on a Pushlet server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML); PUSHLET_* env vars override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server endpoint, absolute or relative to the configured origin
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Join, listen and print events until Ctrl-C
    Listen {
        /// Subject to subscribe to (repeatable)
        #[arg(short, long)]
        subject: Vec<String>,

        /// Resume an existing session id
        #[arg(long)]
        session: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Publish one event and wait for the server's answer
    Publish {
        subject: String,

        /// Event fields as key=value
        fields: Vec<String>,

        /// Deliver only to subscribers that are online
        #[arg(long)]
        online: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "pushlet_client=debug,pushlet_cli=debug"
    } else {
        "pushlet_client=warn,pushlet_cli=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let mut config = ClientConfig::from_figment(&load_config(cli.config.as_deref()))
        .context("Failed to load configuration")?;
    if let Some(url) = cli.url {
        config.base_url = url;
    }

    let client = PushletClient::new(config).context("Failed to create client")?;
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_any(move |event| {
        let _ = tx.send(event);
    });
    client.initialize();

    let result = match cli.command {
        Commands::Listen {
            subject,
            session,
            format,
        } => listen(&client, rx, &subject, session.as_deref(), format).await,
        Commands::Publish {
            subject,
            fields,
            online,
        } => publish(&client, rx, &subject, &fields, online).await,
    };
    client.shutdown();
    result
}

async fn listen(
    client: &PushletClient,
    mut rx: mpsc::UnboundedReceiver<Event>,
    subjects: &[String],
    session: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let (first, rest) = match subjects.split_first() {
        Some((first, rest)) => (Some(first.as_str()), rest),
        None => (None, &[][..]),
    };
    client.join_listen(first, session);
    for subject in rest {
        client.subscribe(subject, None);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, leaving");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event.kind() {
                    EventKind::Data => print_event(&event, format)?,
                    EventKind::Error | EventKind::Abort => {
                        bail!("session ended: {}", event.reason().unwrap_or(event.event_type()));
                    }
                    EventKind::Nack => warn!(event = %event.event_type(), reason = event.field_or("p_reason", ""), "request refused"),
                    _ => info!(event = %event.event_type(), "control event"),
                }
            }
        }
    }

    leave(client, &mut rx).await;
    Ok(())
}

async fn publish(
    client: &PushletClient,
    mut rx: mpsc::UnboundedReceiver<Event>,
    subject: &str,
    fields: &[String],
    online: bool,
) -> Result<()> {
    let mut extra = Query::new();
    for field in fields {
        let (name, value) = field
            .split_once('=')
            .with_context(|| format!("Field '{field}' is not key=value"))?;
        extra.push(name, value);
    }

    client.join(None);
    if online {
        client.publish_to_online(subject, Some(extra));
    } else {
        client.publish(subject, Some(extra));
    }

    let outcome = tokio::time::timeout(ACK_TIMEOUT, async {
        while let Some(event) = rx.recv().await {
            match event.kind() {
                EventKind::Error | EventKind::Abort | EventKind::Nack => {
                    bail!(
                        "publish failed: {}",
                        event.reason().unwrap_or(event.event_type())
                    );
                }
                _ if event.event_type().starts_with("publish") => {
                    info!(subject, "published");
                    return Ok(());
                }
                _ => {}
            }
        }
        bail!("client stopped before the server answered")
    })
    .await
    .context("Timed out waiting for the publish ack")?;

    leave(client, &mut rx).await;
    outcome
}

/// Leave the session and give the ack a moment to arrive.
async fn leave(client: &PushletClient, rx: &mut mpsc::UnboundedReceiver<Event>) {
    if client.state().is_terminal() || client.state() == SessionState::Uninitialized {
        return;
    }
    client.leave();
    let _ = tokio::time::timeout(LEAVE_TIMEOUT, async {
        while let Some(event) = rx.recv().await {
            if event.kind() == EventKind::LeaveAck {
                break;
            }
        }
    })
    .await;
}

fn print_event(event: &Event, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{event}"),
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
    }
    Ok(())
}
