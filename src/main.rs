use clap::{Parser, Subcommand};
use kvmux::{ProtocolVersion, SessionBuilder, Transaction};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kvmux")]
#[command(about = "Multiplexed key-value client", long_about = None)]
struct Args {
    /// Engine address
    #[arg(short, long, env = "KVMUX_ADDR", default_value = "127.0.0.1:6379")]
    addr: String,

    /// Name announced in the HELLO handshake
    #[arg(long, env = "KVMUX_CLIENT_NAME")]
    client_name: Option<String>,

    /// Negotiate protocol version 2 instead of 3
    #[arg(long)]
    resp2: bool,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "KVMUX_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Send one command, e.g. `kvmux call SET key value`
    Call {
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Run commands as one atomic transaction, e.g. `kvmux exec "SET a 1" "INCR a"`
    Exec {
        /// Keys to WATCH before submitting
        #[arg(long = "watch")]
        watch: Vec<String>,

        /// Send as a non-atomic pipeline instead
        #[arg(long)]
        pipeline: bool,

        #[arg(required = true, num_args = 1..)]
        commands: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvmux=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut builder = SessionBuilder::new(&args.addr);
    if let Some(name) = &args.client_name {
        builder = builder.client_name(name);
    }
    if args.resp2 {
        builder = builder.protocol(ProtocolVersion::Resp2);
    }
    if let Some(ms) = args.timeout_ms {
        builder = builder.timeout_ms(ms);
    }
    let session = builder.connect().await?;

    match args.command {
        Action::Call { command } => {
            let (name, rest) = command
                .split_first()
                .ok_or_else(|| anyhow::anyhow!("missing command name"))?;
            let value = session.call(name, rest).await?;
            println!("{}", value);
        }
        Action::Exec {
            watch,
            pipeline,
            commands,
        } => {
            if !watch.is_empty() {
                session.watch(&watch).await?;
            }

            let mut tx = if pipeline {
                Transaction::pipeline()
            } else {
                Transaction::new()
            };
            for line in &commands {
                let mut parts = line.split_whitespace();
                let name = parts
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("empty command in transaction"))?;
                tx.append(name, parts)?;
            }

            match session.exec_transaction(&mut tx).await? {
                Some(results) => {
                    for (i, value) in results.iter().enumerate() {
                        println!("{}) {}", i + 1, value);
                    }
                }
                None => println!("(aborted)"),
            }
        }
    }

    session.close().await;
    Ok(())
}
