use crate::args::{tokenize, ArgList};
use crate::config::BridgeConfig;
use crate::line::{LineRead, LineReader};
use crate::link::{Link, LinkError, ReadMode};
use crate::protocol::{error_line, Opcode, ProtocolError, Reply};
use crate::reactive::ReactiveState;
use crate::robot::{
    BusError, MotorMode, PidGains, RobotBus, Rgb, SpeedProfile, StatusLed, LED_COUNT,
    RESET_LED_HOLD,
};
use crate::telemetry::TelemetryFrame;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace, warn};

/// Arguments of the reactive opcode.
const REACTIVE_START: [i32; 2] = [0, 1];
const REACTIVE_STOP: i32 = 2;

/// Whether the innermost reactive loop keeps running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    Continue,
    Stop,
}

/// Why a command was answered with the error sentinel.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("battery selector {0} is out of range")]
    BatterySelector(i32),

    #[error("reactive mode {0} is not supported")]
    ReactiveMode(i32),

    #[error("reactive loops already nested {0} deep")]
    NestingTooDeep(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("link failure: {0}")]
    Link(#[from] LinkError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub commands: u32,
    pub rejected: u32,
    pub reactive_runs: u32,
    pub reactive_cycles: u64,
    pub recoveries: u32,
}

enum Action {
    Reply(Reply),
    StartReactive,
    StopReactive,
}

/// Reasons a reactive run ends other than a stop command.
enum LoopExit {
    Bus(BusError),
    Link(LinkError),
}

impl From<BusError> for LoopExit {
    fn from(e: BusError) -> Self {
        LoopExit::Bus(e)
    }
}

impl From<LinkError> for LoopExit {
    fn from(e: LinkError) -> Self {
        LoopExit::Link(e)
    }
}

impl From<AgentError> for LoopExit {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Link(e) => LoopExit::Link(e),
        }
    }
}

/// Serves the command protocol for one link and one robot.
///
/// The agent owns both exclusively. Every command line gets exactly one
/// reply, written before the next line is read.
pub struct BridgeAgent<L: Link, R: RobotBus> {
    config: BridgeConfig,
    link: L,
    robot: R,
    reader: LineReader,
    depth: usize,
    stats: AgentStats,
}

impl<L: Link, R: RobotBus> BridgeAgent<L, R> {
    pub fn new(config: BridgeConfig, link: L, robot: R) -> Self {
        Self {
            config,
            link,
            robot,
            reader: LineReader::new(),
            depth: 0,
            stats: AgentStats::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Number of reactive loops currently running.
    pub fn loop_depth(&self) -> usize {
        self.depth
    }

    pub fn into_parts(self) -> (L, R) {
        (self.link, self.robot)
    }

    /// Process commands until `quit` is set or the link fails.
    ///
    /// `quit` is only looked at between top-level commands.
    pub fn serve(&mut self, quit: &AtomicBool) -> Result<(), AgentError> {
        info!("Serving commands");
        while !quit.load(Ordering::Relaxed) {
            self.process_command()?;
        }
        info!(
            "Stopped after {} commands ({} rejected)",
            self.stats.commands, self.stats.rejected
        );
        Ok(())
    }

    /// Read one line from the link and dispatch it.
    pub fn process_command(&mut self) -> Result<LoopSignal, AgentError> {
        match self.reader.read_line(&mut self.link)? {
            LineRead::Timeout => Ok(LoopSignal::Continue),
            LineRead::Data(line) => self.dispatch_line(&line),
            LineRead::ShortRead(line) => {
                debug!("Link went quiet after {} bytes", line.len());
                self.dispatch_line(&line)
            }
        }
    }

    /// Decode, execute and answer one command line.
    pub fn dispatch_line(&mut self, line: &[u8]) -> Result<LoopSignal, AgentError> {
        if line.is_empty() {
            return Ok(LoopSignal::Continue);
        }
        self.stats.commands = self.stats.commands.saturating_add(1);

        let action = Self::decode(line).map_err(CommandError::from).and_then(|(opcode, args)| {
            debug!("Command {} with {} arguments", opcode.letter() as char, args.len());
            self.execute(opcode, &args)
        });

        match action {
            Ok(Action::Reply(reply)) => {
                self.send(&reply)?;
                Ok(LoopSignal::Continue)
            }
            Ok(Action::StopReactive) => {
                self.send(&Reply::ack(Opcode::Braitenberg))?;
                Ok(LoopSignal::Stop)
            }
            Ok(Action::StartReactive) => {
                self.send(&Reply::ack(Opcode::Braitenberg))?;
                self.run_reactive()
            }
            Err(e) => {
                warn!("Rejected {:?}: {}", String::from_utf8_lossy(line), e);
                self.stats.rejected = self.stats.rejected.saturating_add(1);
                self.send(&Reply::Error)?;
                Ok(LoopSignal::Continue)
            }
        }
    }

    fn decode(line: &[u8]) -> Result<(Opcode, ArgList), ProtocolError> {
        let code = line[0];
        let opcode = Opcode::from_byte(code).ok_or(ProtocolError::UnknownOpcode(code))?;
        // Byte 1 is the separator after the opcode, whatever it is.
        let args = tokenize(line.get(2..).unwrap_or_default())?;
        opcode.check_arity(args.len())?;
        Ok((opcode, args))
    }

    fn send(&mut self, reply: &Reply) -> Result<(), AgentError> {
        let bytes = reply.encode().unwrap_or_else(|e| {
            warn!("Reply dropped: {}", e);
            error_line().to_vec()
        });
        trace!("Reply {:?}", String::from_utf8_lossy(&bytes));
        self.link.write_all(&bytes)?;
        Ok(())
    }

    /// Arguments are converted in full before the first bus call.
    fn execute(&mut self, opcode: Opcode, args: &ArgList) -> Result<Action, CommandError> {
        let robot = &mut self.robot;

        let reply = match opcode {
            Opcode::Braitenberg => {
                let mode: i32 = args.parse(0)?;
                return if mode == REACTIVE_STOP {
                    Ok(Action::StopReactive)
                } else if REACTIVE_START.contains(&mode) {
                    if self.depth >= self.config.reactive.max_loop_depth {
                        Err(CommandError::NestingTooDeep(self.depth))
                    } else {
                        Ok(Action::StartReactive)
                    }
                } else {
                    Err(CommandError::ReactiveMode(mode))
                };
            }
            Opcode::Revision => {
                let revision = robot.firmware_revision()?;
                let version = char::from(b'A' + (revision >> 4));
                Reply::with_fields(opcode, [version.to_string(), (revision & 0x0F).to_string()])
            }
            Opcode::SetSpeed => {
                let (left, right) = (args.parse(0)?, args.parse(1)?);
                robot.set_mode(MotorMode::Speed)?;
                robot.set_speed(left, right)?;
                Reply::ack(opcode)
            }
            Opcode::GetSpeed => {
                let speed = robot.speed()?;
                Reply::with_fields(opcode, [speed.left, speed.right])
            }
            Opcode::SetTargetPosition => {
                let (left, right) = (args.parse(0)?, args.parse(1)?);
                robot.set_mode(MotorMode::Position)?;
                robot.set_target_position(left, right)?;
                Reply::ack(opcode)
            }
            Opcode::ReadUltrasonic => Reply::with_fields(opcode, robot.ultrasonic()?.0),
            Opcode::ConfigurePid => {
                let gains = PidGains {
                    kp: args.parse(0)?,
                    ki: args.parse(1)?,
                    kd: args.parse(2)?,
                };
                robot.configure_pid(gains)?;
                Reply::ack(opcode)
            }
            Opcode::ResetEncoders => {
                robot.reset_encoders()?;
                Reply::ack(opcode)
            }
            Opcode::ConfigureSpeedProfile => {
                let profile = SpeedProfile {
                    acc_increment: args.parse(0)?,
                    acc_divider: args.parse(1)?,
                    min_speed_acc: args.parse(2)?,
                    min_speed_dec: args.parse(3)?,
                    max_speed: args.parse(4)?,
                };
                robot.set_speed_profile(profile)?;
                Reply::ack(opcode)
            }
            Opcode::SetLeds => {
                let mut leds = [Rgb::default(); LED_COUNT];
                for (i, led) in leds.iter_mut().enumerate() {
                    *led = Rgb {
                        r: args.parse(i * 3)?,
                        g: args.parse(i * 3 + 1)?,
                        b: args.parse(i * 3 + 2)?,
                    };
                }
                robot.set_rgb_leds(leds)?;
                Reply::ack(opcode)
            }
            Opcode::SetSpeedOpenLoop => {
                let (left, right) = (args.parse(0)?, args.parse(1)?);
                robot.set_mode(MotorMode::OpenLoop)?;
                robot.set_speed(left, right)?;
                Reply::ack(opcode)
            }
            Opcode::InitMotors => {
                robot.init_motors()?;
                Reply::ack(opcode)
            }
            Opcode::ReadProximity => Reply::with_fields(opcode, robot.proximity()?.channels()),
            Opcode::ReadAmbient => Reply::with_fields(opcode, robot.ambient()?.channels()),
            Opcode::ConfigurePositionMargin => {
                let margin = args.parse(0)?;
                robot.set_position_margin(margin)?;
                Reply::ack(opcode)
            }
            Opcode::ReadPosition => {
                let position = robot.position()?;
                Reply::with_fields(opcode, [position.left, position.right])
            }
            Opcode::ReadGyroscope => Reply::with_fields(opcode, robot.gyroscope()?.0),
            Opcode::ReadAccelerometer => Reply::with_fields(opcode, robot.accelerometer()?.0),
            Opcode::ConfigureUltrasonic => {
                let mask: u8 = args.parse(0)?;
                robot.activate_ultrasonic(mask)?;
                Reply::ack(opcode)
            }
            Opcode::BatteryStatus => {
                let selector: i32 = args.parse(0)?;
                Reply::with_fields(opcode, [battery_value(robot, selector)?])
            }
            Opcode::BinaryTelemetry => Reply::Binary(TelemetryFrame {
                proximity: robot.proximity()?,
                ambient: robot.ambient()?,
                speed: robot.speed()?,
                position: robot.position()?,
            }),
            Opcode::ResetMicrocontroller => {
                robot.set_status_led(StatusLed::Red)?;
                std::thread::sleep(RESET_LED_HOLD);
                robot.reset_microcontroller()?;
                info!("Microcontroller reset");
                Reply::ack(opcode)
            }
        };

        Ok(Action::Reply(reply))
    }

    /// Run one reactive loop level. Always answers `Stop` unless the link
    /// failed, so a nested run unwinds the run that started it.
    fn run_reactive(&mut self) -> Result<LoopSignal, AgentError> {
        self.depth += 1;
        self.stats.reactive_runs = self.stats.reactive_runs.saturating_add(1);
        info!("Reactive loop started (depth {})", self.depth);

        let outcome = self.reactive_cycles();
        self.reactive_cleanup();
        self.depth -= 1;

        match outcome {
            Ok(()) => info!("Reactive loop stopped (depth {})", self.depth + 1),
            Err(LoopExit::Bus(e)) => warn!("Reactive loop aborted: {}", e),
            Err(LoopExit::Link(e)) => return Err(AgentError::Link(e)),
        }
        Ok(LoopSignal::Stop)
    }

    fn reactive_cycles(&mut self) -> Result<(), LoopExit> {
        self.robot.set_speed_profile(SpeedProfile::REACTIVE)?;
        self.robot.set_mode(MotorMode::SpeedProfile)?;
        let start = self.robot.position()?;
        self.link.set_read_mode(ReadMode::Polling)?;

        let mut state = ReactiveState::new(start);
        loop {
            let report = state.cycle(&mut self.robot, &self.config.reactive)?;
            self.stats.reactive_cycles = self.stats.reactive_cycles.saturating_add(1);
            if report.recovery.is_some() {
                self.stats.recoveries = self.stats.recoveries.saturating_add(1);
            }
            trace!(
                "Cycle {}: speeds {:?}, {:?}",
                state.cycles(),
                report.speeds,
                report.motion
            );

            if self.link.bytes_available()? > 0 && self.process_command()? == LoopSignal::Stop {
                return Ok(());
            }
        }
    }

    fn reactive_cleanup(&mut self) {
        if let Err(e) = self.robot.set_speed(0, 0) {
            warn!("Cannot stop wheels: {}", e);
        }
        if let Err(e) = self.robot.set_mode(MotorMode::Idle) {
            warn!("Cannot idle motors: {}", e);
        }
        if let Err(e) = self.robot.set_speed_profile(SpeedProfile::DEFAULT) {
            warn!("Cannot restore speed profile: {}", e);
        }
        if let Err(e) = self.link.discard_input() {
            warn!("Cannot discard link input: {}", e);
        }
        if let Err(e) = self.link.set_read_mode(ReadMode::Blocking) {
            warn!("Cannot restore blocking reads: {}", e);
        }
    }
}

/// Format one battery value. The selector is checked before the bus is touched.
fn battery_value<R: RobotBus + ?Sized>(robot: &mut R, selector: i32) -> Result<String, CommandError> {
    match selector {
        0..=5 | 7 => {
            let regs = robot.battery()?;
            Ok(match selector {
                0 => format!("{:.0}", regs.voltage_mv()),
                1 => format!("{:.0}", regs.current_ma()),
                2 => format!("{:.0}", regs.average_current_ma()),
                3 => format!("{:.0}", regs.capacity_mah()),
                4 => format!("{:.1}", regs.temperature_c()),
                5 => regs.relative_capacity().to_string(),
                _ => regs.status().to_string(),
            })
        }
        6 => Ok(u8::from(robot.charger_connected()?).to_string()),
        _ => Err(CommandError::BatterySelector(selector)),
    }
}
