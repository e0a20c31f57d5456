//! Single byte XOR checksum used by the programmer firmware.
//!
//! Despite the device calling it a CRC this is a plain running XOR,
//! computed per write chunk and over the whole image on read.

/// Compute the checksum of a byte sequence
pub fn compute(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, b| crc ^ b)
}

/// Streaming checksum accumulator
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Checksum(u8);

impl Checksum {
    pub fn new() -> Self {
        Self(0)
    }

    /// Fold more bytes into the checksum
    pub fn update(&mut self, data: &[u8]) {
        self.0 ^= compute(data);
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}
