
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::Duration;

use serial_core::{
    BaudRate, CharSize, Error as SerialError, FlowControl, Parity, SerialDevice as _,
    SerialPortSettings as _, StopBits,
};
use linux_embedded_hal::{Delay, Serial};

use crate::{HalChannel, Options, Programmer};

/// Programmer bound to a linux tty
pub type LinuxProgrammer = Programmer<HalChannel<Serial>, Delay>;

impl Programmer<HalChannel<Serial>, Delay> {
    /// Create a new linux serial port programmer instance
    pub fn linux<P: AsRef<Path>>(
        port: P,
        baud: usize,
        options: Options,
    ) -> Result<Self, SerialError> {
        debug!("Opening {} at {} baud", port.as_ref().display(), baud);

        // Open port
        let mut port = Serial::open(port.as_ref())?;

        // Apply settings, 8N1 without flow control
        let mut settings = port.0.read_settings()?;

        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::Stop1);
        settings.set_baud_rate(BaudRate::from_speed(baud))?;
        settings.set_flow_control(FlowControl::FlowNone);
        settings.set_parity(Parity::ParityNone);

        port.0.write_settings(&settings)?;

        port.0.set_timeout(Duration::from_secs(options.timeout_s))?;

        // Return instance
        Ok(Self::new(HalChannel::new(port), Delay {}, options))
    }
}

/// Channel errors from a linux tty are reported as io error kinds
pub type LinuxError = crate::Error<IoErrorKind>;
