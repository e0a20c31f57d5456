//! EPROM Serial Programmer.
//!
//! Host side of a small command/response protocol spoken by an AVR based
//! EPROM programmer. Commands are single byte tags with optional little
//! endian payloads, data transfers are verified with an XOR checksum.

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

extern crate embedded_hal;
use embedded_hal::blocking::delay::DelayMs;

#[cfg(feature = "structopt")]
extern crate structopt;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
extern crate serial_core;

#[cfg(feature = "linux")]
pub mod linux;

pub mod channel;
pub mod checksum;
pub mod protocol;
pub mod transfer;

pub use channel::{Channel, HalChannel};
pub use protocol::{Command, Frame};
pub use transfer::{chunks, Session};

use protocol::{HOST_ACK, HOST_NACK, RESPONSE_OK};

/// Handshake round of a chunk write
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Stage {
    /// Device checksum over the bytes it received
    Receive,
    /// Device checksum over the bytes read back after programming
    Program,
    /// Trailing checksum of a read
    Read,
}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error<ChannelError: core::fmt::Debug> {
    #[error("channel error: {0:?}")]
    Channel(ChannelError),

    #[error("device rejected {command:?} (response 0x{response:02x})")]
    Protocol { command: Command, response: u8 },

    #[error("write rejected at offset {offset} (status 0x{status:02x})")]
    WriteRejected { offset: usize, status: u8 },

    #[error("{stage:?} checksum mismatch (local 0x{expected:02x}, device 0x{actual:02x})")]
    ChecksumMismatch { stage: Stage, expected: u8, actual: u8 },

    #[error("no response from device")]
    ResponseTimeout,

    #[error("device stalled after {received} of {expected} bytes")]
    Stalled { received: usize, expected: usize },

    #[error("image of {0} bytes exceeds the 65535 byte transfer limit")]
    ImageTooLarge(usize),

    #[error("verify failed at offset {offset} (expected 0x{expected:02x}, read 0x{actual:02x})")]
    VerifyFailed { offset: usize, expected: u8, actual: u8 },
}

impl<ChannelError: core::fmt::Debug> From<ChannelError> for Error<ChannelError> {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Serial read timeout in seconds
    #[cfg_attr(feature = "structopt", structopt(long = "timeout", default_value = "60"))]
    pub timeout_s: u64,

    /// Period to wait between empty reads while streaming
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,

    /// Abort a read after this many consecutive empty reads (unbounded by default)
    #[cfg_attr(feature = "structopt", structopt(long))]
    pub max_idle_polls: Option<u32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout_s: 60,
            poll_delay_ms: 1,
            max_idle_polls: None,
        }
    }
}

/// Bus posture for the device pin tests
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum PinTest {
    Read,
    Write,
}

impl core::str::FromStr for PinTest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(PinTest::Read),
            "write" => Ok(PinTest::Write),
            _ => Err(format!("unknown pin test '{}' (expected read or write)", s)),
        }
    }
}

pub struct Programmer<C, D> {
    options: Options,
    channel: C,
    delay: D,
}

impl<C, D> Programmer<C, D>
where
    C: Channel,
    D: DelayMs<u32>,
{
    /// Create a new programmer instance
    pub fn new(channel: C, delay: D, options: Options) -> Self {
        Self { options, channel, delay }
    }

    /// Access the underlying channel
    pub fn channel(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Flush the channel and drop it, consuming the programmer
    pub fn close(mut self) -> Result<(), Error<C::Error>> {
        debug!("Closing channel");
        self.channel.close()?;
        Ok(())
    }

    /// Run a single operation then close the channel, whether or not the
    /// operation succeeded. An operation error takes precedence over a close error.
    pub fn scoped<T, F>(mut self, f: F) -> Result<T, Error<C::Error>>
    where
        F: FnOnce(&mut Self) -> Result<T, Error<C::Error>>,
    {
        let res = f(&mut self);
        let closed = self.close();

        let v = res?;
        closed?;

        Ok(v)
    }

    /// Set the base address for the next transfer
    pub fn set_address(&mut self, address: u16) -> Result<(), Error<C::Error>> {
        self.command(Frame::SetAddress(address))
    }

    /// Set the length of the next transfer
    pub fn set_length(&mut self, length: u16) -> Result<(), Error<C::Error>> {
        self.command(Frame::SetLength(length))
    }

    /// Start a chunked write, the device acks before accepting data
    pub fn begin_write(&mut self) -> Result<(), Error<C::Error>> {
        self.command(Frame::WriteData)
    }

    /// Start streaming a read, data follows without an ack
    pub fn begin_read(&mut self) -> Result<(), Error<C::Error>> {
        self.send(Frame::ReadData)
    }

    /// Write a single chunk and run both confirmation rounds,
    /// returning the chunk checksum.
    ///
    /// The chunk is only committed once the device echoes the local checksum
    /// for both the received and the programmed data.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<u8, Error<C::Error>> {
        self.write_chunk_at(0, chunk)
    }

    pub(crate) fn write_chunk_at(
        &mut self,
        offset: usize,
        chunk: &[u8],
    ) -> Result<u8, Error<C::Error>> {
        self.channel.write(chunk)?;

        let crc = checksum::compute(chunk);

        self.confirm(offset, Stage::Receive, crc)?;
        self.confirm(offset, Stage::Program, crc)?;

        Ok(crc)
    }

    fn confirm(&mut self, offset: usize, stage: Stage, crc: u8) -> Result<(), Error<C::Error>> {
        let mut ack = [0u8; 2];
        self.await_response(&mut ack)?;

        let [status, device_crc] = ack;

        if status != RESPONSE_OK {
            error!("Device rejected write at offset {} (status 0x{:02x})", offset, status);
            return Err(Error::WriteRejected { offset, status });
        }

        if device_crc != crc {
            error!(
                "{:?} checksum mismatch at offset {}, local 0x{:02x}, device 0x{:02x}",
                stage, offset, crc, device_crc
            );
            self.channel.write(&[HOST_NACK])?;
            return Err(Error::ChecksumMismatch { stage, expected: crc, actual: device_crc });
        }

        self.channel.write(&[HOST_ACK])?;

        Ok(())
    }

    /// Read up to `max` bytes of a streaming read, short reads are expected
    pub fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>, Error<C::Error>> {
        let mut buff = vec![0u8; max];
        let n = self.channel.read(&mut buff)?;
        buff.truncate(n);
        Ok(buff)
    }

    /// Read the checksum following the final byte of a streaming read
    pub fn read_trailing_checksum(&mut self) -> Result<u8, Error<C::Error>> {
        let mut crc = [0u8; 1];
        self.await_response(&mut crc)?;
        Ok(crc[0])
    }

    /// Read the byte at the device address counter, advancing the counter
    pub fn read_byte(&mut self) -> Result<u8, Error<C::Error>> {
        self.send(Frame::ReadByte)?;

        let mut data = [0u8; 1];
        self.await_response(&mut data)?;

        debug!("Read byte 0x{:02x}", data[0]);

        Ok(data[0])
    }

    /// Read `count` successive bytes with single byte reads
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, Error<C::Error>> {
        (0..count).map(|_| self.read_byte()).collect()
    }

    /// Reset the device address and counter, no response is sent
    pub fn reset(&mut self) -> Result<(), Error<C::Error>> {
        self.send(Frame::Reset)
    }

    /// Place the device bus into a fixed posture for probing
    pub fn pin_test(&mut self, test: PinTest) -> Result<(), Error<C::Error>> {
        match test {
            PinTest::Read => self.send(Frame::TestRead),
            PinTest::Write => self.send(Frame::TestWrite),
        }
    }

    /// Send the abort tag, ignored by an idle device
    pub fn abort(&mut self) -> Result<(), Error<C::Error>> {
        self.send(Frame::Abort)
    }

    fn send(&mut self, frame: Frame) -> Result<(), Error<C::Error>> {
        debug!("Sending {:?}", frame);
        self.channel.write(&frame.encode())?;
        Ok(())
    }

    /// Send a frame and await a single byte OK response
    fn command(&mut self, frame: Frame) -> Result<(), Error<C::Error>> {
        self.send(frame)?;

        let mut ack = [0u8; 1];
        self.await_response(&mut ack)?;

        match ack[0] {
            RESPONSE_OK => {
                debug!("Received ack for {:?}", frame);
                Ok(())
            }
            v => {
                error!("Received unexpected response to {:?}: 0x{:02x}", frame, v);
                Err(Error::Protocol { command: frame.command(), response: v })
            }
        }
    }

    /// Fill a response buffer, an empty read means the channel timed out
    fn await_response(&mut self, buff: &mut [u8]) -> Result<(), Error<C::Error>> {
        let mut n = 0;

        while n < buff.len() {
            match self.channel.read(&mut buff[n..])? {
                0 => {
                    error!("Response timeout ({} of {} bytes)", n, buff.len());
                    return Err(Error::ResponseTimeout);
                }
                v => n += v,
            }
        }

        Ok(())
    }
}
