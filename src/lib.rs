pub mod channel;
pub mod codec;
pub mod config;
pub mod messages;
pub mod motor;
pub mod queue;
pub mod runtime;
pub mod teleop;
