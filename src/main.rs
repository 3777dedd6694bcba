use std::net::SocketAddr;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use teleop_link::config::{
    Backend, LOOP_HZ, MAX_LOOP_HZ, PIGPIOD_ADDR, QUEUE_CAPACITY, ROBOT_BIND, RobotConfig,
};
use teleop_link::motor::Wheel;

/// Robot-side teleop runtime: receives drive intents and actuates the motors
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on for operator intents
    #[arg(long, default_value = ROBOT_BIND)]
    bind: SocketAddr,

    /// Control loop rate in Hz
    #[arg(long, default_value_t = LOOP_HZ, value_parser = clap::value_parser!(u64).range(1..=MAX_LOOP_HZ))]
    rate: u64,

    /// Intents buffered between receiver and control loop
    #[arg(long, default_value_t = QUEUE_CAPACITY)]
    queue: usize,

    /// pigpio daemon address
    #[arg(long, default_value = PIGPIOD_ADDR)]
    pigpiod: String,

    /// Run without hardware
    #[arg(long)]
    simulate: bool,

    /// Motors wired backwards, e.g. --invert FL,BR
    #[arg(long, value_delimiter = ',', value_parser = parse_wheel)]
    invert: Vec<Wheel>,

    /// GPIO pin of the IR receiver reporting self-hits
    #[arg(long)]
    hit_pin: Option<u8>,
}

fn parse_wheel(s: &str) -> Result<Wheel, String> {
    Wheel::from_label(s).ok_or_else(|| format!("unknown wheel '{}', expected FL, FR, BL or BR", s))
}

impl From<Args> for RobotConfig {
    fn from(args: Args) -> Self {
        Self {
            bind: args.bind,
            loop_hz: args.rate,
            queue_capacity: args.queue,
            backend: if args.simulate {
                Backend::Simulated
            } else {
                Backend::Pigpiod(args.pigpiod)
            },
            inverted: args.invert,
            hit_pin: args.hit_pin,
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RobotConfig::from(Args::parse());

    if let Err(e) = teleop_link::runtime::run(config).await {
        error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
