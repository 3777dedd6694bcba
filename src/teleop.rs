// Operator console: keyboard -> intents at a fixed rate, feedback back
//
// Terminals report key presses and auto-repeats, not key state, so a key
// counts as held for KEY_HOLD after its last press or repeat event.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::channel::CommandChannel;
use crate::codec;
use crate::config::{DriveMode, KEY_HOLD, OperatorConfig};
use crate::messages::{Feedback, Intent};
use crate::runtime::RuntimeError;

// Feedback datagrams handled per tick at most
const MAX_FEEDBACK_PER_TICK: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveKey {
    W,
    S,
    A,
    D,
    Up,
    Down,
    Left,
    Right,
}

impl DriveKey {
    pub fn from_code(code: KeyCode) -> Option<DriveKey> {
        match code {
            KeyCode::Char('w') | KeyCode::Char('W') => Some(DriveKey::W),
            KeyCode::Char('s') | KeyCode::Char('S') => Some(DriveKey::S),
            KeyCode::Char('a') | KeyCode::Char('A') => Some(DriveKey::A),
            KeyCode::Char('d') | KeyCode::Char('D') => Some(DriveKey::D),
            KeyCode::Up => Some(DriveKey::Up),
            KeyCode::Down => Some(DriveKey::Down),
            KeyCode::Left => Some(DriveKey::Left),
            KeyCode::Right => Some(DriveKey::Right),
            _ => None,
        }
    }
}

/// Snapshot of which drive keys are held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveKeys {
    pub w: bool,
    pub s: bool,
    pub a: bool,
    pub d: bool,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DriveKeys {
    fn set(&mut self, key: DriveKey) {
        match key {
            DriveKey::W => self.w = true,
            DriveKey::S => self.s = true,
            DriveKey::A => self.a = true,
            DriveKey::D => self.d = true,
            DriveKey::Up => self.up = true,
            DriveKey::Down => self.down = true,
            DriveKey::Left => self.left = true,
            DriveKey::Right => self.right = true,
        }
    }

    /// Map held keys to an intent
    ///
    /// Tank: w/s drive the left side, Up/Down the right side.
    /// Mecanum: w/s forward/back, a/d strafe, Right/Left rotate.
    /// When both keys of a pair are held the first one listed wins.
    pub fn intent(&self, mode: DriveMode) -> Intent {
        match mode {
            DriveMode::Tank => Intent::tank(axis(self.w, self.s), axis(self.up, self.down)),
            DriveMode::Mecanum => Intent::mecanum(
                axis_negative_first(self.a, self.d),
                axis(self.w, self.s),
                axis(self.right, self.left),
            ),
        }
    }
}

fn axis(positive: bool, negative: bool) -> f64 {
    if positive {
        1.0
    } else if negative {
        -1.0
    } else {
        0.0
    }
}

// Strafe keys: 'a' (left) is checked before 'd'
fn axis_negative_first(negative: bool, positive: bool) -> f64 {
    if negative {
        -1.0
    } else if positive {
        1.0
    } else {
        0.0
    }
}

/// Turns press/repeat/release events into held-key state
#[derive(Debug)]
pub struct KeyTracker {
    last_seen: HashMap<DriveKey, Instant>,
    hold: Duration,
}

impl KeyTracker {
    pub fn new(hold: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            hold,
        }
    }

    pub fn press(&mut self, key: DriveKey, now: Instant) {
        self.last_seen.insert(key, now);
    }

    /// Only terminals with key-release reporting send these
    pub fn release(&mut self, key: DriveKey) {
        self.last_seen.remove(&key);
    }

    pub fn held(&self, now: Instant) -> DriveKeys {
        let mut keys = DriveKeys::default();
        for (&key, &at) in &self.last_seen {
            if now.saturating_duration_since(at) <= self.hold {
                keys.set(key);
            }
        }
        keys
    }
}

/// Operator-side state between ticks
pub struct Operator {
    channel: CommandChannel,
    config: OperatorConfig,
    keys: KeyTracker,
    self_hits: u64,
    last_health: Option<String>,
}

impl Operator {
    pub async fn connect(config: OperatorConfig) -> Result<Self, RuntimeError> {
        let channel = CommandChannel::bind(config.bind).await?;
        Ok(Self {
            channel,
            config,
            keys: KeyTracker::new(KEY_HOLD),
            self_hits: 0,
            last_health: None,
        })
    }

    pub fn keys_mut(&mut self) -> &mut KeyTracker {
        &mut self.keys
    }

    pub fn self_hits(&self) -> u64 {
        self.self_hits
    }

    /// Send this tick's intent, then drain feedback until the receive timeout
    pub async fn step(&mut self, now: Instant) -> Intent {
        let intent = self.keys.held(now).intent(self.config.mode);
        self.send(&intent).await;

        let deadline = Instant::now() + self.config.recv_timeout;
        for _ in 0..MAX_FEEDBACK_PER_TICK {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(dgram) = self.channel.try_receive(remaining).await else {
                break;
            };
            match codec::decode_feedback(&dgram.payload) {
                Ok(fb) => self.on_feedback(&fb),
                Err(e) => {
                    self.channel.stats().record_malformed();
                    debug!("Ignoring bad feedback from {}: {}", dgram.from, e);
                }
            }
        }
        intent
    }

    async fn send(&self, intent: &Intent) {
        match codec::encode(intent) {
            Ok(bytes) => self.channel.send(&bytes, self.config.robot).await,
            Err(e) => warn!("Failed to encode intent: {}", e),
        }
    }

    /// Feedback is informational: log hits and health changes
    pub fn on_feedback(&mut self, fb: &Feedback) {
        if fb.is_self_hit {
            self.self_hits += 1;
            warn!("Self-hit detected: {:?}", fb.fields);
        }
        let health = fb
            .field("health")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if health.is_some() && health != self.last_health {
            info!("Robot health: {}", health.as_deref().unwrap_or_default());
            self.last_health = health;
        }
    }

    /// Best-effort stop so the robot halts before its queue runs dry
    pub async fn send_stop(&self) {
        let stop = DriveKeys::default().intent(self.config.mode);
        self.send(&stop).await;
    }
}

/// Run the console until q / Esc / Ctrl-C
pub async fn run(config: OperatorConfig) -> Result<(), RuntimeError> {
    info!(
        "Driving {} in {:?} mode at {}us per tick",
        config.robot,
        config.mode,
        config.tick_period().as_micros()
    );
    match config.mode {
        DriveMode::Tank => info!("Controls: w/s left side, Up/Down right side, q quit"),
        DriveMode::Mecanum => info!("Controls: w/s drive, a/d strafe, Left/Right rotate, q quit"),
    }

    let period = config.tick_period();
    let mut operator = Operator::connect(config).await?;

    enable_raw_mode()?;
    let result = drive(&mut operator, period).await;
    operator.send_stop().await;
    disable_raw_mode()?;

    info!(
        "Operator stopped: {}, self-hits={}",
        operator.channel.stats().snapshot(),
        operator.self_hits()
    );
    result
}

async fn drive(operator: &mut Operator, period: Duration) -> Result<(), RuntimeError> {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        // Drain pending key events without blocking the tick
        let now = Instant::now();
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if is_quit(&key) {
                    return Ok(());
                }
                if let Some(drive_key) = DriveKey::from_code(key.code) {
                    match key.kind {
                        KeyEventKind::Press | KeyEventKind::Repeat => {
                            operator.keys_mut().press(drive_key, now)
                        }
                        KeyEventKind::Release => operator.keys_mut().release(drive_key),
                    }
                }
            }
        }

        operator.step(now).await;
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        // Raw mode swallows SIGINT
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}
