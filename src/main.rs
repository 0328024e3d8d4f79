use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ringkv::config::Config;
use ringkv::dht::Peer;
use ringkv::logging::init_logging;
use ringkv::logging::LogLevel;
use ringkv::node::RingNode;
use ringkv::rpc::tcp;
use ringkv::rpc::tcp::TcpTransport;
use ringkv::rpc::RingService;
use tokio::net::TcpListener;

const EXIT_BAD_CONFIG: i32 = 1;
const EXIT_BIND_FAILED: i32 = 2;
const EXIT_JOIN_FAILED: i32 = 3;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a default configuration file.")]
    Init(InitCommand),
    #[command(about = "Starts a long-running ring node.")]
    Run(RunCommand),
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        default_value = "~/.ringkv/config.yaml",
        help = "The location of the config file"
    )]
    location: String,
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(
        long,
        short = 'c',
        env,
        default_value = "~/.ringkv/config.yaml",
        help = "Config file location"
    )]
    config: String,

    #[arg(long, short = 'b', env, help = "Listen address, overrides the config file")]
    bind: Option<String>,

    #[arg(long, env, help = "Seed node host:port, overrides the config file")]
    seed: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.into());

    match cli.command {
        Command::Init(cmd) => init(cmd),
        Command::Run(cmd) => run(cmd).await,
    }
}

fn init(cmd: InitCommand) {
    match Config::default().write_fs(&cmd.location) {
        Ok(path) => println!("Initialized config file at: {path}"),
        Err(e) => {
            tracing::error!(error = %e, "failed to write config");
            process::exit(EXIT_BAD_CONFIG);
        }
    }
}

async fn run(cmd: RunCommand) {
    let mut config = match Config::read_fs(&cmd.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            process::exit(EXIT_BAD_CONFIG);
        }
    };
    if let Some(bind) = cmd.bind {
        config.bind = bind;
    }
    if let Some(seed) = cmd.seed {
        config.seed = Some(seed);
    }

    let bind_addr: SocketAddr = match config.bind.parse() {
        Ok(addr) => addr,
        Err(_) => {
            tracing::error!(bind = %config.bind, "invalid listen address");
            process::exit(EXIT_BAD_CONFIG);
        }
    };
    let seed = match config.seed.as_deref().map(str::parse::<Peer>).transpose() {
        Ok(seed) => seed,
        Err(e) => {
            tracing::error!(error = %e, "invalid seed address");
            process::exit(EXIT_BAD_CONFIG);
        }
    };

    let listener = match TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, bind = %bind_addr, "failed to bind endpoint");
            process::exit(EXIT_BIND_FAILED);
        }
    };

    let host = config
        .external_host
        .clone()
        .unwrap_or_else(|| bind_addr.ip().to_string());
    let local = Peer::new(host, bind_addr.port());
    let transport = Arc::new(TcpTransport::new(Duration::from_millis(
        config.rpc.timeout_ms,
    )));
    let node = RingNode::new(local, config, transport);

    tokio::spawn(tcp::serve(
        listener,
        node.clone() as Arc<dyn RingService>,
        node.subscribe_shutdown(),
    ));

    if let Err(e) = node.join(seed).await {
        tracing::error!(error = %e, "failed to join ring");
        process::exit(EXIT_JOIN_FAILED);
    }

    match node.status().await {
        Ok(status) => tracing::info!(?status, "node running"),
        Err(e) => tracing::warn!(error = %e, "status snapshot failed"),
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    if let Err(e) = node.depart().await {
        tracing::warn!(error = %e, "departure was not clean");
    }
}
