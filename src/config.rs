// Timeouts, ports, duty thresholds, motor pin map
use std::net::SocketAddr;
use std::time::Duration;

use clap::ValueEnum;

use crate::motor::{MotorPins, Wheel};

// Control loop frequency (robot) and send frequency (operator)
pub const LOOP_HZ: u64 = 30;
// Highest rate accepted on the command line
pub const MAX_LOOP_HZ: u64 = 1000;

// Longest a receive may block the caller
pub const RECV_TIMEOUT: Duration = Duration::from_millis(1);

// Receiver context wakes this often to check for shutdown
pub const RECEIVER_POLL: Duration = Duration::from_millis(50);

// No decoded intent for this long -> health reports stale
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Intents buffered between receiver and control loop
pub const QUEUE_CAPACITY: usize = 3;

// Network defaults
pub const ROBOT_BIND: &str = "0.0.0.0:5005";
pub const ROBOT_ADDR: &str = "127.0.0.1:5005";
pub const OPERATOR_BIND: &str = "0.0.0.0:0";

// Datagrams larger than this are dropped (original receive buffer size)
pub const MAX_DATAGRAM: usize = 1024;
// Smallest payload that can hold a JSON object
pub const MIN_DATAGRAM: usize = 2;

// Motor actuation
pub const DEAD_ZONE: f64 = 1e-3;
pub const MIN_DUTY_FLOOR: u32 = 30; // percent
pub const PURE_DC_THRESHOLD: u32 = 80; // percent
pub const PWM_FREQ_HZ: u32 = 10_000;
pub const DUTY_MAX: u8 = 255;

// pigpio daemon socket
pub const PIGPIOD_ADDR: &str = "127.0.0.1:8888";
pub const PIGPIOD_TIMEOUT: Duration = Duration::from_millis(200);

// Operator keyboard: a key counts as held this long after its last press/repeat
pub const KEY_HOLD: Duration = Duration::from_millis(150);

// Default BCM wiring in Wheel::ALL order [FL, FR, BL, BR]
// FR = motor 1, FL = motor 2, BR = motor 3, BL = motor 4
pub const DEFAULT_PINS: [MotorPins; 4] = [
    MotorPins::new(22, 23, 13), // motor 2
    MotorPins::new(17, 27, 12), // motor 1
    MotorPins::new(24, 25, 19), // motor 4
    MotorPins::new(5, 6, 18),   // motor 3
];

/// How the operator's keys are turned into intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriveMode {
    Tank,
    Mecanum,
}

/// Which GPIO backend the robot drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Pigpiod(String),
    Simulated,
}

/// Robot-side runtime configuration
#[derive(Debug, Clone)]
pub struct RobotConfig {
    pub bind: SocketAddr,
    pub loop_hz: u64,
    pub queue_capacity: usize,
    pub backend: Backend,
    /// Motors whose wiring runs backwards
    pub inverted: Vec<Wheel>,
    /// IR receiver pin reporting self-hit (active low)
    pub hit_pin: Option<u8>,
}

impl RobotConfig {
    pub fn tick_period(&self) -> Duration {
        period(self.loop_hz)
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5005)),
            loop_hz: LOOP_HZ,
            queue_capacity: QUEUE_CAPACITY,
            backend: Backend::Pigpiod(PIGPIOD_ADDR.to_string()),
            inverted: Vec::new(),
            hit_pin: None,
        }
    }
}

/// Operator-side console configuration
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub robot: SocketAddr,
    pub bind: SocketAddr,
    pub send_hz: u64,
    pub recv_timeout: Duration,
    pub mode: DriveMode,
}

impl OperatorConfig {
    pub fn tick_period(&self) -> Duration {
        period(self.send_hz)
    }
}

// Never zero: tokio intervals reject a zero period
fn period(hz: u64) -> Duration {
    Duration::from_micros((1_000_000 / hz.max(1)).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tick_is_thirty_hz() {
        let cfg = RobotConfig::default();
        assert_eq!(cfg.tick_period(), Duration::from_micros(33_333));
    }

    #[test]
    fn test_zero_rate_does_not_divide_by_zero() {
        assert_eq!(period(0), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_rate_keeps_a_nonzero_period() {
        assert_eq!(period(2_000_000), Duration::from_micros(1));
        let cfg = RobotConfig {
            loop_hz: u64::MAX,
            ..RobotConfig::default()
        };
        assert!(!cfg.tick_period().is_zero());
    }

    #[test]
    fn test_default_pins_do_not_overlap() {
        let mut all: Vec<u8> = DEFAULT_PINS
            .iter()
            .flat_map(|p| [p.in1, p.in2, p.en])
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 12);
    }
}
