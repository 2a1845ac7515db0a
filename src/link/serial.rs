use super::{Link, LinkError, ReadMode};
use crate::config::LinkConfig;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Serial port link (8N1, no flow control).
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    mode: ReadMode,
    char_timeout: Duration,
    poll_timeout: Duration,
}

impl SerialLink {
    pub fn open(config: &LinkConfig) -> Result<Self, LinkError> {
        let char_timeout = Duration::from_millis(config.char_timeout_ms);
        let port = serialport::new(config.device.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(char_timeout)
            .open()?;

        info!("Opened serial link {} at {} baud", config.device, config.baud_rate);

        Ok(Self {
            port,
            mode: ReadMode::Blocking,
            char_timeout,
            poll_timeout: Duration::from_millis(config.poll_char_timeout_ms),
        })
    }
}

impl Link for SerialLink {
    fn read_byte(&mut self) -> nb::Result<u8, LinkError> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            Ok(_) => Err(nb::Error::WouldBlock),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Err(nb::Error::WouldBlock)
            }
            Err(e) => Err(nb::Error::Other(e.into())),
        }
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn set_read_mode(&mut self, mode: ReadMode) -> Result<(), LinkError> {
        let timeout = match mode {
            ReadMode::Blocking => self.char_timeout,
            ReadMode::Polling => self.poll_timeout,
        };
        self.port.set_timeout(timeout)?;
        self.mode = mode;
        debug!("Serial link read mode {:?} ({:?} per byte)", mode, timeout);
        Ok(())
    }

    fn read_mode(&self) -> ReadMode {
        self.mode
    }
}
