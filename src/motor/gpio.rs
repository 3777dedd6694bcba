// GPIO/PWM hardware interface used by the motor bank
//
// Two backends: the pigpio daemon (real hardware) and an in-memory simulation
// for running without a robot and for tests.

use std::collections::HashMap;

use tracing::trace;

use super::pigpio::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input = 0,
    Output = 1,
}

/// Error types for the GPIO backends
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("Could not connect to pigpio daemon at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pigpio command {cmd} on pin {pin} failed with code {code}")]
    Command { cmd: u32, pin: u8, code: i32 },

    #[error("Invalid reply to command {cmd}: {reason}")]
    InvalidReply { cmd: u32, reason: String },

    #[error("Timeout waiting for pigpio daemon")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, GpioError>;

/// Pin-level operations the motor bank needs from the hardware
pub trait Gpio {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;

    fn set_pwm_frequency(&mut self, pin: u8, hz: u32) -> Result<()>;

    /// 8-bit duty cycle, 0 = off, 255 = always on
    fn set_duty_cycle(&mut self, pin: u8, duty: u8) -> Result<()>;

    fn write_digital(&mut self, pin: u8, level: Level) -> Result<()>;

    fn read_digital(&mut self, pin: u8) -> Result<Level>;
}

/// State of one simulated pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub mode: PinMode,
    pub level: Level,
    pub duty: u8,
    pub pwm_hz: u32,
}

impl Default for PinState {
    fn default() -> Self {
        Self {
            mode: PinMode::Input,
            level: Level::High,
            duty: 0,
            pwm_hz: 0,
        }
    }
}

/// Every call made on a simulated backend, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioCall {
    SetMode(u8, PinMode),
    SetPwmFrequency(u8, u32),
    SetDutyCycle(u8, u8),
    WriteDigital(u8, Level),
}

/// In-memory GPIO. Inputs read high (idle) unless set with `set_input`.
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    pins: HashMap<u8, PinState>,
    calls: Vec<GpioCall>,
    /// Pins whose writes fail, for exercising error paths
    failing: Vec<u8>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&self, pin: u8) -> PinState {
        self.pins.get(&pin).copied().unwrap_or_default()
    }

    pub fn calls(&self) -> &[GpioCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Drive an input pin as the outside world would
    pub fn set_input(&mut self, pin: u8, level: Level) {
        self.pins.entry(pin).or_default().level = level;
    }

    pub fn fail_pin(&mut self, pin: u8) {
        self.failing.push(pin);
    }

    fn check(&self, cmd: Command, pin: u8) -> Result<()> {
        if self.failing.contains(&pin) {
            return Err(GpioError::Command {
                cmd: cmd as u32,
                pin,
                code: -1,
            });
        }
        Ok(())
    }
}

impl Gpio for SimulatedGpio {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.check(Command::Modes, pin)?;
        trace!("sim: pin {} mode {:?}", pin, mode);
        self.pins.entry(pin).or_default().mode = mode;
        self.calls.push(GpioCall::SetMode(pin, mode));
        Ok(())
    }

    fn set_pwm_frequency(&mut self, pin: u8, hz: u32) -> Result<()> {
        self.check(Command::Pfs, pin)?;
        self.pins.entry(pin).or_default().pwm_hz = hz;
        self.calls.push(GpioCall::SetPwmFrequency(pin, hz));
        Ok(())
    }

    fn set_duty_cycle(&mut self, pin: u8, duty: u8) -> Result<()> {
        self.check(Command::Pwm, pin)?;
        trace!("sim: pin {} duty {}", pin, duty);
        let state = self.pins.entry(pin).or_default();
        state.duty = duty;
        state.level = Level::from(duty > 0);
        self.calls.push(GpioCall::SetDutyCycle(pin, duty));
        Ok(())
    }

    fn write_digital(&mut self, pin: u8, level: Level) -> Result<()> {
        self.check(Command::Write, pin)?;
        trace!("sim: pin {} -> {:?}", pin, level);
        let state = self.pins.entry(pin).or_default();
        state.level = level;
        // A digital write ends PWM on the pin
        state.duty = match level {
            Level::High => 255,
            Level::Low => 0,
        };
        self.calls.push(GpioCall::WriteDigital(pin, level));
        Ok(())
    }

    fn read_digital(&mut self, pin: u8) -> Result<Level> {
        self.check(Command::Read, pin)?;
        Ok(self.pin(pin).level)
    }
}
