//! Byte channel abstraction between the programmer and the transport.

use embedded_hal::serial::{Read, Write};

/// Blocking byte transport with a bounded read timeout
pub trait Channel {
    type Error: core::fmt::Debug;

    /// Write all bytes to the channel
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Read up to `buff.len()` bytes, returning fewer (or zero) when the
    /// transport read timeout expires first
    fn read(&mut self, buff: &mut [u8]) -> Result<usize, Self::Error>;

    /// Flush anything pending before the channel is dropped, the
    /// transport itself is released on drop
    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Adapts any `embedded-hal` serial port to a [`Channel`].
///
/// `WouldBlock` from the underlying port is treated as the read timeout
/// expiring, ending the current read with whatever has arrived.
pub struct HalChannel<P> {
    port: P,
}

impl<P> HalChannel<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn inner(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P, E> Channel for HalChannel<P>
where
    P: Write<u8, Error = E> + Read<u8, Error = E>,
    E: core::fmt::Debug,
{
    type Error = E;

    fn write(&mut self, data: &[u8]) -> Result<(), E> {
        for b in data {
            block!(self.port.write(*b))?;
        }
        block!(self.port.flush())
    }

    fn read(&mut self, buff: &mut [u8]) -> Result<usize, E> {
        let mut n = 0;

        while n < buff.len() {
            match self.port.read() {
                Ok(v) => {
                    buff[n] = v;
                    n += 1;
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }

        Ok(n)
    }

    fn close(&mut self) -> Result<(), E> {
        block!(self.port.flush())
    }
}
