// Message types carried over the command channel

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// Tank drive command from operator -> robot
// Field names match the console's wire payload {"Left": .., "Right": ..}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TankIntent {
    #[serde(rename = "Left")]
    pub left: f64,
    #[serde(rename = "Right")]
    pub right: f64,
}

// Mecanum drive command from operator -> robot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MecanumIntent {
    pub vx: f64,
    pub vy: f64,
    pub rot: f64,
}

/// Operator drive intent. The variant is picked once, from the payload's shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Intent {
    Tank(TankIntent),
    Mecanum(MecanumIntent),
}

impl Intent {
    pub fn tank(left: f64, right: f64) -> Self {
        Intent::Tank(TankIntent { left, right })
    }

    pub fn mecanum(vx: f64, vy: f64, rot: f64) -> Self {
        Intent::Mecanum(MecanumIntent { vx, vy, rot })
    }

    /// Copy with every field clamped to [-1, 1]. Wire values are not trusted.
    pub fn clamped(self) -> Self {
        match self {
            Intent::Tank(t) => Intent::tank(unit(t.left), unit(t.right)),
            Intent::Mecanum(m) => Intent::mecanum(unit(m.vx), unit(m.vy), unit(m.rot)),
        }
    }
}

/// Clamp into [-1, 1]; NaN collapses to 0
pub fn unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) }
}

/// Robot -> operator status. Readers that don't know a field ignore it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub is_self_hit: bool,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Feedback {
    pub fn new(is_self_hit: bool) -> Self {
        Self {
            is_self_hit,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Link health reported by the robot runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

impl RuntimeHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeHealth::Ok => "ok",
            RuntimeHealth::CmdStale => "cmd_stale",
        }
    }
}
