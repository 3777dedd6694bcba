// Drive kinematics for the four-wheel base
// Converts a tank or mecanum intent into normalized per-wheel velocity targets.

use crate::messages::{Intent, MecanumIntent, TankIntent, unit};

/// Wheel positions on the base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::BackLeft,
        Wheel::BackRight,
    ];

    /// Position in `Wheel::ALL`
    pub fn index(&self) -> usize {
        match self {
            Wheel::FrontLeft => 0,
            Wheel::FrontRight => 1,
            Wheel::BackLeft => 2,
            Wheel::BackRight => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Wheel::FrontLeft => "FL",
            Wheel::FrontRight => "FR",
            Wheel::BackLeft => "BL",
            Wheel::BackRight => "BR",
        }
    }

    /// Parse "FL", "fr", ... as used on the command line
    pub fn from_label(label: &str) -> Option<Wheel> {
        Wheel::ALL
            .into_iter()
            .find(|w| w.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for Wheel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized velocity targets in [-1, 1], one per wheel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelTargets {
    pub fl: f64,
    pub fr: f64,
    pub bl: f64,
    pub br: f64,
}

impl WheelTargets {
    pub fn new(fl: f64, fr: f64, bl: f64, br: f64) -> Self {
        Self { fl, fr, bl, br }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, wheel: Wheel) -> f64 {
        match wheel {
            Wheel::FrontLeft => self.fl,
            Wheel::FrontRight => self.fr,
            Wheel::BackLeft => self.bl,
            Wheel::BackRight => self.br,
        }
    }

    /// Targets in `Wheel::ALL` order [FL, FR, BL, BR]
    pub fn as_array(&self) -> [f64; 4] {
        [self.fl, self.fr, self.bl, self.br]
    }

    pub fn max_abs(&self) -> f64 {
        self.as_array().iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }
}

/// Tank drive: each side's speed goes straight to its wheel pair
pub fn tank(cmd: &TankIntent) -> WheelTargets {
    let left = unit(cmd.left);
    let right = unit(cmd.right);
    WheelTargets::new(left, right, left, right)
}

/// Mecanum drive with ratio-preserving normalization
///
/// Wheels are only ever scaled down: if any raw wheel speed exceeds 1.0 all
/// four are divided by the largest magnitude, so the direction of travel and
/// turning radius survive saturation.
pub fn mecanum(cmd: &MecanumIntent) -> WheelTargets {
    let (vx, vy, rot) = (unit(cmd.vx), unit(cmd.vy), unit(cmd.rot));

    let raw = WheelTargets::new(
        vy + vx + rot,
        -vy + vx - rot,
        -vy + vx + rot,
        vy + vx - rot,
    );

    let scale = raw.max_abs().max(1.0);
    WheelTargets::new(
        raw.fl / scale,
        raw.fr / scale,
        raw.bl / scale,
        raw.br / scale,
    )
}

/// Resolve this tick's intent. No intent means stop.
pub fn wheel_targets(intent: Option<&Intent>) -> WheelTargets {
    match intent {
        Some(Intent::Tank(cmd)) => tank(cmd),
        Some(Intent::Mecanum(cmd)) => mecanum(cmd),
        None => WheelTargets::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEPS: [f64; 9] = [-1.0, -0.75, -0.5, -0.001, 0.0, 0.3, 0.5, 0.8, 1.0];

    #[test]
    fn test_tank_copies_sides_exactly() {
        for &left in &STEPS {
            for &right in &STEPS {
                let t = tank(&TankIntent { left, right });
                assert_eq!(t.fl, left);
                assert_eq!(t.bl, left);
                assert_eq!(t.fr, right);
                assert_eq!(t.br, right);
            }
        }
    }

    #[test]
    fn test_mecanum_never_exceeds_unit() {
        for &vx in &STEPS {
            for &vy in &STEPS {
                for &rot in &STEPS {
                    let t = mecanum(&MecanumIntent { vx, vy, rot });
                    assert!(
                        t.max_abs() <= 1.0 + 1e-12,
                        "vx={} vy={} rot={} -> {:?}",
                        vx,
                        vy,
                        rot,
                        t
                    );
                }
            }
        }
    }

    #[test]
    fn test_mecanum_does_not_attenuate_small_commands() {
        let t = mecanum(&MecanumIntent {
            vx: 0.25,
            vy: 0.5,
            rot: 0.0,
        });
        assert_eq!(t, WheelTargets::new(0.75, -0.25, -0.25, 0.75));
    }

    #[test]
    fn test_mecanum_saturation_preserves_ratios() {
        // Raw speeds: FL=3, FR=-1, BL=1, BR=1
        let t = mecanum(&MecanumIntent {
            vx: 1.0,
            vy: 1.0,
            rot: 1.0,
        });
        assert!((t.fl - 1.0).abs() < 1e-12);
        assert!((t.fr + 1.0 / 3.0).abs() < 1e-12);
        assert!((t.bl - 1.0 / 3.0).abs() < 1e-12);
        assert!((t.br - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_pure_rotation() {
        let t = mecanum(&MecanumIntent {
            vx: 0.0,
            vy: 0.0,
            rot: 1.0,
        });
        assert_eq!(t, WheelTargets::new(1.0, -1.0, 1.0, -1.0));
    }

    #[test]
    fn test_strafe_right() {
        let t = mecanum(&MecanumIntent {
            vx: 1.0,
            vy: 0.0,
            rot: 0.0,
        });
        assert_eq!(t, WheelTargets::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn test_unclamped_input_is_clamped_first() {
        let t = tank(&TankIntent {
            left: 4.0,
            right: -9.0,
        });
        assert_eq!(t, WheelTargets::new(1.0, -1.0, 1.0, -1.0));
    }

    #[test]
    fn test_no_intent_stops() {
        assert_eq!(wheel_targets(None), WheelTargets::zero());
    }

    #[test]
    fn test_labels_round_trip() {
        for (i, wheel) in Wheel::ALL.into_iter().enumerate() {
            assert_eq!(Wheel::from_label(wheel.label()), Some(wheel));
            assert_eq!(wheel.index(), i);
        }
        assert_eq!(Wheel::from_label("br"), Some(Wheel::BackRight));
        assert_eq!(Wheel::from_label("XX"), None);
    }
}
