//! Chunked image transfers built on the programmer commands.

use core::convert::TryFrom;

use embedded_hal::blocking::delay::DelayMs;

use crate::checksum::Checksum;
use crate::protocol::{READ_CHUNK, WRITE_CHUNK};
use crate::{Channel, Error, Programmer, Stage};

/// Progress of a single image transfer
#[derive(Clone, PartialEq, Debug)]
pub struct Session {
    pub address: u16,
    pub length: usize,
    pub transferred: usize,
    /// Checksum of the last chunk written, or of all data read so far
    pub checksum: u8,
}

impl Session {
    fn new(address: u16, length: usize) -> Self {
        Self { address, length, transferred: 0, checksum: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.length - self.transferred
    }
}

/// Split an image into write sized chunks, the last may be short
pub fn chunks(image: &[u8]) -> core::slice::Chunks<'_, u8> {
    image.chunks(WRITE_CHUNK)
}

impl<C, D> Programmer<C, D>
where
    C: Channel,
    D: DelayMs<u32>,
{
    /// Write an image at the provided address.
    ///
    /// Chunks accepted before a failure stay programmed on the device.
    pub fn write_image<F>(
        &mut self,
        address: u16,
        image: &[u8],
        mut progress: F,
    ) -> Result<(), Error<C::Error>>
    where
        F: FnMut(&Session),
    {
        let length = image_length(image.len())?;

        info!("Writing {} bytes at 0x{:04x}", image.len(), address);

        self.set_address(address)?;
        self.set_length(length)?;
        self.begin_write()?;

        let mut session = Session::new(address, image.len());

        for chunk in chunks(image) {
            session.checksum = self.write_chunk_at(session.transferred, chunk)?;
            session.transferred += chunk.len();

            debug!("Wrote {} of {} bytes", session.transferred, session.length);
            progress(&session);
        }

        info!("Write complete");

        Ok(())
    }

    /// Read `length` bytes from the provided address.
    ///
    /// Empty reads are treated as the device lagging behind and are retried
    /// until `Options::max_idle_polls` (if set) is exhausted.
    pub fn read_image<F>(
        &mut self,
        address: u16,
        length: u16,
        mut progress: F,
    ) -> Result<Vec<u8>, Error<C::Error>>
    where
        F: FnMut(&Session),
    {
        info!("Reading {} bytes from 0x{:04x}", length, address);

        self.set_address(address)?;
        self.set_length(length)?;
        self.begin_read()?;

        let mut session = Session::new(address, length as usize);
        let mut data = Vec::with_capacity(session.length);
        let mut crc = Checksum::new();
        let mut idle = 0u32;

        while session.remaining() > 0 {
            let chunk = self.read_chunk(session.remaining().min(READ_CHUNK))?;

            if chunk.is_empty() {
                idle += 1;

                if let Some(max) = self.options.max_idle_polls {
                    if idle > max {
                        error!(
                            "No data after {} polls ({} of {} bytes)",
                            max, session.transferred, session.length
                        );
                        return Err(Error::Stalled {
                            received: session.transferred,
                            expected: session.length,
                        });
                    }
                }

                warn!("Empty read at {} of {} bytes, polling", session.transferred, session.length);
                self.delay.delay_ms(self.options.poll_delay_ms);
                continue;
            }

            idle = 0;
            crc.update(&chunk);
            data.extend_from_slice(&chunk);

            session.transferred = data.len();
            session.checksum = crc.value();

            debug!("Read {} of {} bytes", session.transferred, session.length);
            progress(&session);
        }

        let device_crc = self.read_trailing_checksum()?;
        let local_crc = crc.value();

        if device_crc != local_crc {
            error!(
                "Read checksum mismatch, local 0x{:02x}, device 0x{:02x}",
                local_crc, device_crc
            );
            return Err(Error::ChecksumMismatch {
                stage: Stage::Read,
                expected: local_crc,
                actual: device_crc,
            });
        }

        info!("Read complete");

        Ok(data)
    }

    /// Read back a region and compare it against the expected image
    pub fn verify_image<F>(
        &mut self,
        address: u16,
        image: &[u8],
        progress: F,
    ) -> Result<(), Error<C::Error>>
    where
        F: FnMut(&Session),
    {
        let length = image_length(image.len())?;

        let data = self.read_image(address, length, progress)?;

        let mismatch = image
            .iter()
            .zip(data.iter())
            .enumerate()
            .find(|(_, (a, b))| a != b);

        if let Some((offset, (expected, actual))) = mismatch {
            error!("Verify mismatch at offset {}", offset);
            return Err(Error::VerifyFailed {
                offset,
                expected: *expected,
                actual: *actual,
            });
        }

        info!("Verify complete");

        Ok(())
    }
}

fn image_length<E: core::fmt::Debug>(len: usize) -> Result<u16, Error<E>> {
    u16::try_from(len).map_err(|_| Error::ImageTooLarge(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_IMAGE;

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn chunk_count_and_order() {
        for len in [1usize, 100, 511, 512, 513, 1024, 1500, 4096].iter() {
            let img = image(*len);
            let parts: Vec<&[u8]> = chunks(&img).collect();

            assert_eq!(parts.len(), (len + WRITE_CHUNK - 1) / WRITE_CHUNK);
            assert_eq!(parts.concat(), img);
            assert!(parts.iter().all(|p| p.len() <= WRITE_CHUNK));

            let last = match len % WRITE_CHUNK {
                0 => WRITE_CHUNK,
                v => v,
            };
            assert_eq!(parts.last().map(|p| p.len()), Some(last));
        }
    }

    #[test]
    fn empty_image_has_no_chunks() {
        assert_eq!(chunks(&[]).count(), 0);
    }

    #[test]
    fn image_length_limits() {
        assert_eq!(image_length::<()>(0), Ok(0));
        assert_eq!(image_length::<()>(MAX_IMAGE), Ok(0xFFFF));
        assert_eq!(image_length::<()>(MAX_IMAGE + 1), Err(Error::ImageTooLarge(MAX_IMAGE + 1)));
    }
}
