// Keyboard operator console: sends drive intents to the robot at a fixed rate
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use teleop_link::config::{
    DriveMode, LOOP_HZ, MAX_LOOP_HZ, OPERATOR_BIND, OperatorConfig, RECV_TIMEOUT, ROBOT_ADDR,
};

#[derive(Debug, Parser)]
#[command(version, about = "Keyboard teleop console for the robot")]
struct Args {
    /// Robot address
    #[arg(long, default_value = ROBOT_ADDR)]
    robot: SocketAddr,

    /// Local address to send from and receive feedback on
    #[arg(long, default_value = OPERATOR_BIND)]
    bind: SocketAddr,

    /// Intents sent per second
    #[arg(long, default_value_t = LOOP_HZ, value_parser = clap::value_parser!(u64).range(1..=MAX_LOOP_HZ))]
    rate: u64,

    /// How long each tick waits for feedback, in milliseconds
    #[arg(long, default_value_t = RECV_TIMEOUT.as_millis() as u64)]
    recv_timeout_ms: u64,

    #[arg(long, value_enum, default_value_t = DriveMode::Tank)]
    mode: DriveMode,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = OperatorConfig {
        robot: args.robot,
        bind: args.bind,
        send_hz: args.rate,
        recv_timeout: Duration::from_millis(args.recv_timeout_ms),
        mode: args.mode,
    };

    if let Err(e) = teleop_link::teleop::run(config).await {
        error!("Operator error: {}", e);
        std::process::exit(1);
    }
}
