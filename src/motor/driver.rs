// Four-motor H-bridge bank
//
// Each motor has two direction pins (IN1, IN2) and a PWM-capable enable pin
// (EN). The bank turns per-wheel targets into pin writes through a `Gpio`
// backend and owns the fail-safe stop.

use tracing::{debug, info, warn};

use super::actuator::{ActuationSignal, Direction, actuate};
use super::gpio::{Gpio, GpioError, Level, PinMode};
use super::kinematics::Wheel;
use crate::config::{DEFAULT_PINS, PWM_FREQ_HZ};

/// BCM pin numbers for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPins {
    pub in1: u8,
    pub in2: u8,
    pub en: u8,
}

impl MotorPins {
    pub const fn new(in1: u8, in2: u8, en: u8) -> Self {
        Self { in1, in2, en }
    }
}

#[derive(Debug, Clone, Copy)]
struct Motor {
    pins: MotorPins,
    inverted: bool,
    last: ActuationSignal,
}

/// Motor bank for the four-wheel base
pub struct MotorBank<G: Gpio> {
    gpio: G,
    motors: [Motor; 4], // Wheel::ALL order
    hit_pin: Option<u8>,
}

impl<G: Gpio> MotorBank<G> {
    /// Bank with the default wiring
    pub fn new(gpio: G) -> Self {
        Self {
            gpio,
            motors: DEFAULT_PINS.map(|pins| Motor {
                pins,
                inverted: false,
                last: ActuationSignal::NEUTRAL,
            }),
            hit_pin: None,
        }
    }

    /// Flip a motor whose wiring runs backwards
    pub fn set_inverted(&mut self, wheel: Wheel, inverted: bool) {
        self.motors[wheel.index()].inverted = inverted;
    }

    /// IR receiver input reporting self-hits (active low)
    pub fn set_hit_pin(&mut self, pin: Option<u8>) {
        self.hit_pin = pin;
    }

    pub fn pins(&self, wheel: Wheel) -> MotorPins {
        self.motors[wheel.index()].pins
    }

    /// Configure every pin and leave all motors neutral
    ///
    /// Must be called before driving. On failure every motor is stopped on a
    /// best-effort basis before the error is returned.
    pub fn initialize(&mut self) -> Result<(), GpioError> {
        info!("Initializing motor bank at {} Hz PWM", PWM_FREQ_HZ);
        if let Err(e) = self.configure() {
            warn!("Motor initialization failed: {}", e);
            if let Err(stop_err) = self.stop() {
                warn!("Failed to stop motors after init failure: {}", stop_err);
            }
            return Err(e);
        }
        info!("Motor bank initialized");
        Ok(())
    }

    fn configure(&mut self) -> Result<(), GpioError> {
        for motor in &self.motors {
            let MotorPins { in1, in2, en } = motor.pins;
            self.gpio.set_mode(in1, PinMode::Output)?;
            self.gpio.set_mode(in2, PinMode::Output)?;
            self.gpio.set_mode(en, PinMode::Output)?;
            self.gpio.set_pwm_frequency(en, PWM_FREQ_HZ)?;
        }
        if let Some(pin) = self.hit_pin {
            self.gpio.set_mode(pin, PinMode::Input)?;
        }
        self.stop()
    }

    /// Signal a wheel's target maps to, after inversion
    pub fn signal_for(&self, wheel: Wheel, target: f64) -> ActuationSignal {
        if self.motors[wheel.index()].inverted {
            actuate(-target)
        } else {
            actuate(target)
        }
    }

    /// Actuate one wheel from its normalized target
    pub fn apply(&mut self, wheel: Wheel, target: f64) -> Result<ActuationSignal, GpioError> {
        let signal = self.signal_for(wheel, target);
        self.apply_signal(wheel, signal)?;
        Ok(signal)
    }

    /// Write an actuation signal to a wheel's pins
    pub fn apply_signal(&mut self, wheel: Wheel, signal: ActuationSignal) -> Result<(), GpioError> {
        let motor = &mut self.motors[wheel.index()];
        let MotorPins { in1, in2, en } = motor.pins;
        // Record first: after a failed write the pins state is unknown, and
        // the next tick rewrites every pin anyway.
        motor.last = signal;

        match signal.direction {
            Direction::Neutral => {
                self.gpio.set_duty_cycle(en, 0)?;
                self.gpio.write_digital(in1, Level::Low)?;
                self.gpio.write_digital(in2, Level::Low)?;
                return Ok(());
            }
            Direction::Forward => {
                self.gpio.write_digital(in1, Level::High)?;
                self.gpio.write_digital(in2, Level::Low)?;
            }
            Direction::Reverse => {
                self.gpio.write_digital(in1, Level::Low)?;
                self.gpio.write_digital(in2, Level::High)?;
            }
        }

        if signal.is_full_drive() {
            self.gpio.write_digital(en, Level::High)
        } else {
            self.gpio.set_duty_cycle(en, signal.duty)
        }
    }

    /// Drive every motor to neutral
    ///
    /// Tries all four even if one fails; returns the first error.
    pub fn stop(&mut self) -> Result<(), GpioError> {
        debug!("Stopping all motors");
        let mut first_err = None;
        for wheel in Wheel::ALL {
            if let Err(e) = self.apply_signal(wheel, ActuationSignal::NEUTRAL) {
                warn!("Failed to stop motor {}: {}", wheel, e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Last signal written to each motor, in `Wheel::ALL` order
    pub fn last_signals(&self) -> [ActuationSignal; 4] {
        self.motors.map(|m| m.last)
    }

    pub fn is_stopped(&self) -> bool {
        self.motors.iter().all(|m| m.last.is_neutral())
    }

    /// Sample the IR receiver. No receiver configured reads as no hit.
    pub fn self_hit(&mut self) -> Result<bool, GpioError> {
        match self.hit_pin {
            Some(pin) => Ok(self.gpio.read_digital(pin)? == Level::Low),
            None => Ok(false),
        }
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }
}

impl<G: Gpio> Drop for MotorBank<G> {
    fn drop(&mut self) {
        // Never leave a motor at its last duty cycle
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
