// Motor control for the four-wheel base
//
// Provides:
// - Tank and mecanum drive kinematics (intent -> wheel targets)
// - Duty-cycle quantization (wheel target -> direction + duty)
// - GPIO backends: pigpio daemon socket and an in-memory simulation
// - Motor bank driving four H-bridges

pub mod actuator;
mod driver;
pub mod gpio;
pub mod kinematics;
pub mod pigpio;

pub use actuator::{ActuationSignal, Direction, actuate};
pub use driver::{MotorBank, MotorPins};
pub use gpio::{Gpio, GpioError, Level, PinMode, SimulatedGpio};
pub use kinematics::{Wheel, WheelTargets, wheel_targets};
pub use pigpio::PigpiodClient;
