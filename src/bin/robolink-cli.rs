use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use robolink::telemetry::{TelemetryFrame, FRAME_LEN, FRAME_TAG};
use robolink::protocol::ERROR_SENTINEL;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD: &str = "115200";
const REPLY_TIMEOUT_MS: u64 = 2000;

const BATTERY_LABELS: [&str; 8] = [
    "Voltage (mV)",
    "Current (mA)",
    "Average current (mA)",
    "Remaining capacity (mAh)",
    "Temperature (°C)",
    "Relative capacity (%)",
    "Charger plugged",
    "Status flags",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("robolink-cli")
        .version("0.1.0")
        .author("Robotics Lab Engineering Team")
        .about("Host-side client for the robolink command bridge")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("device")
                .short("d")
                .long("device")
                .value_name("DEVICE")
                .help("Serial device connected to the bridge")
                .takes_value(true)
                .default_value(DEFAULT_DEVICE)
                .global(true),
        )
        .arg(
            Arg::with_name("baud")
                .short("b")
                .long("baud")
                .value_name("N")
                .help("Baud rate")
                .takes_value(true)
                .default_value(DEFAULT_BAUD)
                .global(true),
        )
        .subcommand(SubCommand::with_name("revision").about("Read the firmware revision"))
        .subcommand(
            SubCommand::with_name("speed")
                .about("Read wheel speeds, or set them when LEFT and RIGHT are given")
                .arg(Arg::with_name("left").allow_hyphen_values(true).requires("right"))
                .arg(Arg::with_name("right").allow_hyphen_values(true)),
        )
        .subcommand(SubCommand::with_name("position").about("Read encoder positions"))
        .subcommand(SubCommand::with_name("proximity").about("Read the 12 proximity channels"))
        .subcommand(
            SubCommand::with_name("battery")
                .about("Read one battery value")
                .arg(
                    Arg::with_name("selector")
                        .help("0 voltage, 1 current, 2 avg current, 3 capacity, 4 temperature, 5 relative capacity, 6 charger, 7 status")
                        .required(true)
                        .possible_values(&["0", "1", "2", "3", "4", "5", "6", "7"]),
                ),
        )
        .subcommand(SubCommand::with_name("telemetry").about("Fetch one binary telemetry frame"))
        .subcommand(
            SubCommand::with_name("braitenberg")
                .about("Start or stop obstacle avoidance")
                .arg(
                    Arg::with_name("action")
                        .required(true)
                        .possible_values(&["start", "stop"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("raw")
                .about("Send a raw command line")
                .arg(Arg::with_name("line").required(true).allow_hyphen_values(true)),
        )
        .get_matches();

    let device = matches.value_of("device").unwrap_or(DEFAULT_DEVICE);
    let baud: u32 = matches.value_of("baud").unwrap_or(DEFAULT_BAUD).parse()?;

    let (name, sub) = matches.subcommand();
    let line = match command_line(name, sub) {
        Some(line) => line,
        None => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            return Ok(());
        }
    };

    println!("{} {} @ {}", "Connecting to".dimmed(), device, baud);
    let mut port = serialport::new(device, baud)
        .timeout(Duration::from_millis(REPLY_TIMEOUT_MS))
        .open()?;

    println!("{} {}", "→".bright_blue(), line);
    port.write_all(line.as_bytes())?;
    port.write_all(b"\r\n")?;
    port.flush()?;

    let reply = read_reply(&mut port)?;
    print_reply(name, sub, &reply);
    Ok(())
}

fn command_line(name: &str, sub: Option<&ArgMatches>) -> Option<String> {
    let line = match name {
        "revision" => "B".to_string(),
        "speed" => match sub.and_then(|m| Some((m.value_of("left")?, m.value_of("right")?))) {
            Some((left, right)) => format!("D,{},{}", left, right),
            None => "E".to_string(),
        },
        "position" => "R".to_string(),
        "proximity" => "N".to_string(),
        "battery" => format!("V,{}", sub?.value_of("selector")?),
        "telemetry" => "X".to_string(),
        "braitenberg" => match sub?.value_of("action")? {
            "stop" => "A,2".to_string(),
            _ => "A,0".to_string(),
        },
        "raw" => sub?.value_of("line")?.to_string(),
        _ => return None,
    };
    Some(line)
}

/// Read one reply: a CRLF-terminated text line, or a fixed-size telemetry frame.
fn read_reply(port: &mut Box<dyn SerialPort>) -> std::io::Result<Vec<u8>> {
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        port.read_exact(&mut byte)?;
        reply.push(byte[0]);

        if reply[0] == FRAME_TAG {
            if reply.len() == FRAME_LEN {
                return Ok(reply);
            }
        } else if byte[0] == b'\n' {
            return Ok(reply);
        }
    }
}

fn print_reply(name: &str, sub: Option<&ArgMatches>, reply: &[u8]) {
    if reply.first() == Some(&ERROR_SENTINEL) {
        println!("{} {}", "✗".red(), "Command rejected".bright_red());
        return;
    }

    if reply.first() == Some(&FRAME_TAG) {
        match TelemetryFrame::decode(reply) {
            Ok(frame) => print_telemetry(&frame),
            Err(e) => println!("{} {}", "✗".red(), e.to_string().bright_red()),
        }
        return;
    }

    let text = String::from_utf8_lossy(reply);
    let fields: Vec<&str> = text.trim_end().split(',').skip(1).collect();

    match name {
        "battery" => {
            let label = sub
                .and_then(|m| m.value_of("selector"))
                .and_then(|s| s.parse::<usize>().ok())
                .and_then(|i| BATTERY_LABELS.get(i))
                .unwrap_or(&"Value");
            println!("{} {}", format!("{}:", label).bright_white(), fields.join(",").bright_green());
        }
        "revision" if fields.len() == 2 => {
            println!(
                "{} {}{}",
                "Firmware:".bright_white(),
                fields[0].bright_green(),
                fields[1].bright_green()
            );
        }
        _ if fields.is_empty() => println!("{} {}", "✓".green(), text.trim_end().bright_green()),
        _ => println!("{} {}", "←".bright_blue(), fields.join(" ").bright_green()),
    }
}

fn print_telemetry(frame: &TelemetryFrame) {
    let join = |values: &[u16]| {
        values
            .iter()
            .map(|v| format!("{:5}", v))
            .collect::<Vec<_>>()
            .join(" ")
    };

    println!("{}", "Telemetry".bright_blue().bold());
    println!("{} {}", "Proximity:".bright_white(), join(&frame.proximity.channels()[..]));
    println!("{} {}", "Ambient:  ".bright_white(), join(&frame.ambient.channels()[..]));
    println!(
        "{} {} / {}",
        "Speed:    ".bright_white(),
        frame.speed.left,
        frame.speed.right
    );
    println!(
        "{} {} / {}",
        "Position: ".bright_white(),
        frame.position.left,
        frame.position.right
    );
}
