// Wheel target -> H-bridge actuation signal
//
// Two regimes: linear PWM between the minimum-duty floor (30%) and 80%, and
// full logic-high drive at or above 80%. Targets inside the dead-zone leave
// the motor neutral.

use crate::config::{DEAD_ZONE, DUTY_MAX, MIN_DUTY_FLOOR, PURE_DC_THRESHOLD};
use crate::messages::unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
    Neutral,
}

/// Direction plus 8-bit duty for one motor. `duty == 0` exactly when neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationSignal {
    pub direction: Direction,
    pub duty: u8,
}

impl ActuationSignal {
    pub const NEUTRAL: ActuationSignal = ActuationSignal {
        direction: Direction::Neutral,
        duty: 0,
    };

    pub fn is_neutral(&self) -> bool {
        self.direction == Direction::Neutral
    }

    /// Enable pin held high instead of switched
    pub fn is_full_drive(&self) -> bool {
        self.duty == DUTY_MAX
    }
}

impl Default for ActuationSignal {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Map a normalized wheel target to a direction and duty cycle
pub fn actuate(target: f64) -> ActuationSignal {
    let target = unit(target);
    if target.abs() < DEAD_ZONE {
        return ActuationSignal::NEUTRAL;
    }

    let direction = if target > 0.0 {
        Direction::Forward
    } else {
        Direction::Reverse
    };

    let pct = (target.abs() * 100.0).round() as u32;
    let duty = if pct >= PURE_DC_THRESHOLD {
        DUTY_MAX
    } else {
        // Integer truncation is part of the duty table
        (pct.max(MIN_DUTY_FLOOR) * DUTY_MAX as u32 / 100) as u8
    };

    ActuationSignal { direction, duty }
}
