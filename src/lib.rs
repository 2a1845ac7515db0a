//! # robolink
//!
//! Serial command bridge for a differential-drive mobile robot.
//!
//! A peer on a serial line sends single-letter commands such as `D,100,100`;
//! the bridge validates and tokenizes them, runs the matching operations on
//! the robot's actuator/sensor bus and answers each command with exactly one
//! reply frame. One command starts a reactive obstacle-avoidance loop that
//! keeps driving until another command stops it.
//!
//! ## Quick Start
//!
//! ```rust
//! use robolink::{BridgeAgent, BridgeConfig, MockLink, SimulatedRobot};
//!
//! let mut link = MockLink::new();
//! link.inject(b"D,100,100\r");
//!
//! let mut agent = BridgeAgent::new(BridgeConfig::default(), link, SimulatedRobot::default());
//! agent.process_command().unwrap();
//! assert_eq!(agent.link().written(), b"d\r\n");
//! ```
//!
//! ## Architecture
//!
//! - [`link`] - Byte link to the command peer (serial port or scripted mock)
//! - [`line`] - Command line framing
//! - [`args`] - Argument tokenizer
//! - [`protocol`] - Opcodes, arities and reply encoding
//! - [`telemetry`] - Binary telemetry frame
//! - [`robot`] - Bus interface and the simulated robot
//! - [`subsystems`] - Simulated motor controller, sensors and battery
//! - [`reactive`] - Steering law, stuck detection and recovery
//! - [`agent`] - Dispatcher, reactive loop driver and serve loop
//! - [`config`] - JSON configuration

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod agent;
pub mod args;
pub mod config;
pub mod line;
pub mod link;
pub mod protocol;
pub mod reactive;
pub mod robot;
pub mod subsystems;
pub mod telemetry;

// Re-export main public types for convenience
pub use agent::{AgentError, BridgeAgent, LoopSignal};
pub use config::BridgeConfig;
pub use link::{Link, MockLink, SerialLink};
pub use protocol::{Opcode, Reply};
pub use robot::{RobotBus, SimulatedRobot};
pub use telemetry::TelemetryFrame;
