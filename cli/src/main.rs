use std::time::Duration;

use clap::{Parser, Subcommand};
use ephaptic::{ClientConfig, EphapticClient, EphapticError, Origin};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid JSON argument: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Client(#[from] EphapticError),
    #[error("event stream ended before any event arrived")]
    StreamEnded,
}

#[derive(Parser, Debug)]
#[command(name = "ephaptic-cli", about = "Ephaptic RPC and event CLI")]
struct Cli {
    /// Server URL; ws/wss used as-is, http/https rewritten.
    #[arg(long, env = "EPHAPTIC_URL")]
    url: Option<String>,

    /// Host (with optional port) for relative or default URLs.
    #[arg(long, env = "EPHAPTIC_ORIGIN_HOST")]
    origin_host: Option<String>,

    /// Use wss when resolving against --origin-host.
    #[arg(long, env = "EPHAPTIC_SECURE", default_value_t = false)]
    secure: bool,

    /// Auth payload, as JSON, forwarded in the handshake.
    #[arg(long, env = "EPHAPTIC_AUTH")]
    auth: Option<String>,

    /// Per-call timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke a remote method and print its result.
    Call {
        name: String,
        /// Positional arguments, each a JSON value.
        args: Vec<String>,
    },
    /// Subscribe to a server event and print each delivery.
    Listen {
        event: String,
        /// Exit after this many events; run until interrupted otherwise.
        #[arg(long)]
        take: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = build_client(&cli)?;

    match cli.command {
        Command::Call { name, args } => run_call(&client, &name, &args).await,
        Command::Listen { event, take } => run_listen(&client, &event, take).await,
    }
}

fn build_client(cli: &Cli) -> Result<EphapticClient, CliError> {
    let auth = cli
        .auth
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()?;
    let origin = cli.origin_host.clone().map(|host| Origin {
        host,
        secure: cli.secure,
    });

    let client = EphapticClient::new(ClientConfig {
        url: cli.url.clone(),
        origin,
        auth,
        call_timeout: Duration::from_secs(cli.timeout),
    })?;
    Ok(client)
}

async fn run_call(client: &EphapticClient, name: &str, args: &[String]) -> Result<(), CliError> {
    let args = args
        .iter()
        .map(|raw| serde_json::from_str::<Value>(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let result = client.call(name, args).await?;
    print_json(&result)?;

    client.disconnect().await;
    Ok(())
}

async fn run_listen(
    client: &EphapticClient,
    event: &str,
    take: Option<usize>,
) -> Result<(), CliError> {
    let mut notifications = client.notifications();
    client.connect();

    let mut seen = 0_usize;
    loop {
        let notification = tokio::select! {
            notification = notifications.recv() => notification,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Ok(notification) = notification else {
            // Sender gone or the channel lagged past us; either way resubscribe
            // is pointless once the client is torn down.
            if seen == 0 {
                return Err(CliError::StreamEnded);
            }
            break;
        };
        if notification.name != event {
            continue;
        }

        print_json(&serde_json::json!({
            "event": notification.name,
            "args": notification.args,
            "kwargs": notification.kwargs,
        }))?;

        seen += 1;
        if take.is_some_and(|limit| seen >= limit) {
            break;
        }
    }

    client.disconnect().await;
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
