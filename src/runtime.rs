// Robot-side runtime: receiver context + fixed-rate control loop
//
// The receiver decodes datagrams into the command queue as fast as they
// arrive. The control loop ticks at its own rate, pops at most one intent,
// and drives all four motors. An empty queue stops the robot for that tick.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelError, CommandChannel, LinkStatsSnapshot};
use crate::codec;
use crate::config::{Backend, CMD_TIMEOUT, RECEIVER_POLL, RobotConfig};
use crate::messages::{Feedback, RuntimeHealth};
use crate::motor::{
    ActuationSignal, Gpio, GpioError, MotorBank, PigpiodClient, SimulatedGpio, Wheel,
    WheelTargets, wheel_targets,
};
use crate::queue::CommandQueue;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Hardware error: {0}")]
    Gpio(#[from] GpioError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Actuating,
}

/// What one control tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Arrival number of the intent consumed, if any
    pub seq: Option<u64>,
    pub targets: WheelTargets,
    pub signals: [ActuationSignal; 4],
    /// Motors whose pin writes failed this tick
    pub failures: usize,
}

pub struct ControlLoop<G: Gpio> {
    queue: Arc<CommandQueue>,
    motors: MotorBank<G>,
    state: LoopState,
    health: RuntimeHealth,
    last_intent_at: Option<Instant>,
    ticks: u64,
}

impl<G: Gpio> ControlLoop<G> {
    pub fn new(queue: Arc<CommandQueue>, motors: MotorBank<G>) -> Self {
        Self {
            queue,
            motors,
            state: LoopState::Idle,
            health: RuntimeHealth::CmdStale, // Start stale until first intent
            last_intent_at: None,
            ticks: 0,
        }
    }

    /// Run kinematics and actuation for all four wheels once
    ///
    /// Pin failures are logged and counted; they never abort the tick.
    pub fn tick(&mut self) -> TickReport {
        self.state = LoopState::Actuating;
        let now = Instant::now();

        let entry = self.queue.pop();
        if entry.is_some() {
            self.last_intent_at = Some(now);
        }
        self.update_health(now);

        let targets = wheel_targets(entry.as_ref().map(|e| &e.intent));
        let mut signals = [ActuationSignal::NEUTRAL; 4];
        let mut failures = 0;
        for wheel in Wheel::ALL {
            // Reported as commanded, like MotorBank::last_signals
            let signal = self.motors.signal_for(wheel, targets.get(wheel));
            signals[wheel.index()] = signal;
            if let Err(e) = self.motors.apply_signal(wheel, signal) {
                failures += 1;
                warn!("Motor {} write failed: {}", wheel, e);
            }
        }

        let report = TickReport {
            tick: self.ticks,
            seq: entry.map(|e| e.seq),
            targets,
            signals,
            failures,
        };
        self.ticks += 1;
        self.state = LoopState::Idle;
        report
    }

    fn update_health(&mut self, now: Instant) {
        let fresh = self
            .last_intent_at
            .is_some_and(|at| now.duration_since(at) <= CMD_TIMEOUT);

        let health = if fresh {
            RuntimeHealth::Ok
        } else {
            RuntimeHealth::CmdStale
        };

        if health != self.health {
            match health {
                RuntimeHealth::Ok => info!("Command stream live"),
                RuntimeHealth::CmdStale => warn!(
                    "No command for {}ms, command stream stale",
                    CMD_TIMEOUT.as_millis()
                ),
            }
            self.health = health;
        }
    }

    /// Status report for the operator. A failed sensor read reports no hit.
    pub fn feedback(&mut self) -> Feedback {
        let is_self_hit = self.motors.self_hit().unwrap_or_else(|e| {
            debug!("Hit sensor read failed: {}", e);
            false
        });
        Feedback::new(is_self_hit)
            .with_field("health", self.health.as_str())
            .with_field("tick", self.ticks)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn motors(&self) -> &MotorBank<G> {
        &self.motors
    }

    pub fn motors_mut(&mut self) -> &mut MotorBank<G> {
        &mut self.motors
    }

    /// Drive every motor to neutral
    pub fn stop(&mut self) -> Result<(), GpioError> {
        self.motors.stop()
    }
}

/// Totals reported when the runtime exits
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub ticks: u64,
    pub link: LinkStatsSnapshot,
    pub evicted: u64,
    /// Signals on the motors at exit; all neutral after a clean stop
    pub final_signals: [ActuationSignal; 4],
}

/// Robot runtime with its channel bound and motors initialized
pub struct RobotRuntime<G: Gpio> {
    channel: Arc<CommandChannel>,
    control: ControlLoop<G>,
    period: Duration,
}

impl<G: Gpio> RobotRuntime<G> {
    /// Initialize the motors, then bind the channel
    ///
    /// On any failure the motors are left neutral.
    pub async fn start(config: &RobotConfig, gpio: G) -> Result<Self, RuntimeError> {
        let mut motors = MotorBank::new(gpio);
        for &wheel in &config.inverted {
            info!("Motor {} inverted", wheel);
            motors.set_inverted(wheel, true);
        }
        motors.set_hit_pin(config.hit_pin);
        motors.initialize()?;

        let channel = Arc::new(CommandChannel::bind(config.bind).await?);
        let queue = Arc::new(CommandQueue::new(config.queue_capacity));

        Ok(Self {
            channel,
            control: ControlLoop::new(queue, motors),
            period: config.tick_period(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RuntimeError> {
        Ok(self.channel.local_addr()?)
    }

    /// Run until `shutdown` turns true, then stop every motor
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<RunSummary, RuntimeError> {
        let Self {
            channel,
            mut control,
            period,
        } = self;

        let queue = control.queue.clone();
        let (peer_tx, peer_rx) = watch::channel(None);

        let receiver = tokio::spawn(receive_loop(
            channel.clone(),
            queue.clone(),
            peer_tx,
            shutdown.clone(),
        ));

        info!(
            "Runtime started: {}us tick, queue capacity {}, {}ms stale timeout",
            period.as_micros(),
            queue.capacity(),
            CMD_TIMEOUT.as_millis()
        );

        control_loop(&mut control, &channel, peer_rx, period, shutdown).await;

        if let Err(e) = receiver.await {
            warn!("Receiver task ended abnormally: {}", e);
        }

        // Fail-safe: nothing keeps its last duty cycle past this point
        let stopped = control.stop();
        let summary = RunSummary {
            ticks: control.ticks(),
            link: channel.stats().snapshot(),
            evicted: queue.evicted(),
            final_signals: control.motors().last_signals(),
        };
        info!(
            "Runtime stopped after {} ticks: {}, evicted={}",
            summary.ticks, summary.link, summary.evicted
        );
        stopped?;
        Ok(summary)
    }
}

/// Receiver context: datagrams -> decoded intents -> queue
async fn receive_loop(
    channel: Arc<CommandChannel>,
    queue: Arc<CommandQueue>,
    peer: watch::Sender<Option<SocketAddr>>,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let dgram = tokio::select! {
            d = channel.try_receive(RECEIVER_POLL) => d,
            _ = shutdown.changed() => break,
        };
        let Some(dgram) = dgram else { continue };

        match codec::decode_intent(&dgram.payload) {
            Ok(intent) => {
                trace!("Intent from {}: {:?}", dgram.from, intent);
                queue.push(intent);
                // Feedback goes to whoever sent the latest intent
                peer.send_if_modified(|p| {
                    if *p == Some(dgram.from) {
                        false
                    } else {
                        info!("Operator at {}", dgram.from);
                        *p = Some(dgram.from);
                        true
                    }
                });
            }
            Err(e) => {
                channel.stats().record_malformed();
                warn!("Failed to parse command from {}: {}", dgram.from, e);
            }
        }
    }
    debug!("Receiver stopped");
}

/// Control context: Idle until the tick boundary, then actuate
async fn control_loop<G: Gpio>(
    control: &mut ControlLoop<G>,
    channel: &CommandChannel,
    peer: watch::Receiver<Option<SocketAddr>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(period);
    // An overrun delays the next tick; no catch-up burst
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => break,
        }

        let report = control.tick();
        trace!(
            "tick {} seq={:?} targets={:?} signals={:?}",
            report.tick, report.seq, report.targets, report.signals
        );

        let dest = *peer.borrow();
        if let Some(dest) = dest {
            match codec::encode(&control.feedback()) {
                Ok(bytes) => channel.send(&bytes, dest).await,
                Err(e) => warn!("Failed to encode feedback: {}", e),
            }
        }
    }
}

/// Raise `shutdown` once `signal` fires
///
/// If the signal cannot be registered the sender is kept alive and never
/// fires, so the runtime keeps running instead of stopping at once.
async fn shutdown_on<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Shutdown requested");
            let _ = shutdown.send(true);
        }
        Err(e) => {
            warn!("Could not listen for Ctrl-C, runtime will not stop on it: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Connect the configured backend and run until Ctrl-C
pub async fn run(config: RobotConfig) -> Result<RunSummary, RuntimeError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_on(tokio::signal::ctrl_c(), shutdown_tx));

    match &config.backend {
        Backend::Simulated => {
            info!("Using simulated GPIO");
            let runtime = RobotRuntime::start(&config, SimulatedGpio::new()).await?;
            runtime.run(shutdown_rx).await
        }
        Backend::Pigpiod(addr) => {
            let gpio = PigpiodClient::connect(addr)?;
            let runtime = RobotRuntime::start(&config, gpio).await?;
            runtime.run(shutdown_rx).await
        }
    }
}
