
/// Device acknowledgement for an accepted command or chunk
pub const RESPONSE_OK: u8 = 0x01;

/// Host reply accepting a chunk checksum
pub const HOST_ACK: u8 = 0x01;
/// Host reply rejecting a chunk checksum, the device abandons the write
pub const HOST_NACK: u8 = 0xFF;

/// Maximum bytes per write handshake, matches the device buffer
pub const WRITE_CHUNK: usize = 512;
/// Maximum bytes requested per read call
pub const READ_CHUNK: usize = 256;

/// Largest image addressable by a single length frame
pub const MAX_IMAGE: usize = u16::MAX as usize;

#[derive(Copy, Debug, PartialEq, Clone)]
#[repr(u8)]
pub enum Command {
    /// Sets the base address for following transfers
    SetAddress = b's',

    /// Sets the number of bytes for following transfers
    SetLength = b'l',

    /// Starts a chunked write of `length` bytes at the base address
    WriteData = b'd',

    /// Streams `length` bytes from the base address followed by a checksum
    ReadData = b'r',

    /// Reads the byte at the base address plus the device counter, then increments the counter
    ReadByte = b'+',

    /// Resets the device address and counter
    Reset = b'0',

    /// Drives the bus into read posture for probing
    TestRead = b'1',

    /// Drives the bus into write posture with programming strobe held
    TestWrite = b'2',

    /// Ignored by an idle device, used to resync the command loop
    Abort = b'x',
}

impl Command {
    /// Payload bytes the device expects after this command
    pub fn payload_len(&self) -> usize {
        match self {
            Command::SetAddress | Command::SetLength => 2,
            _ => 0,
        }
    }
}

/// A command with its payload, encoded as a single write
#[derive(Copy, Debug, PartialEq, Clone)]
pub enum Frame {
    SetAddress(u16),
    SetLength(u16),
    WriteData,
    ReadData,
    ReadByte,
    Reset,
    TestRead,
    TestWrite,
    Abort,
}

impl Frame {
    pub fn command(&self) -> Command {
        match self {
            Frame::SetAddress(_) => Command::SetAddress,
            Frame::SetLength(_) => Command::SetLength,
            Frame::WriteData => Command::WriteData,
            Frame::ReadData => Command::ReadData,
            Frame::ReadByte => Command::ReadByte,
            Frame::Reset => Command::Reset,
            Frame::TestRead => Command::TestRead,
            Frame::TestWrite => Command::TestWrite,
            Frame::Abort => Command::Abort,
        }
    }

    /// Encode the frame, payloads are little endian
    pub fn encode(&self) -> Vec<u8> {
        let command = self.command();

        let mut buff = Vec::with_capacity(1 + command.payload_len());
        buff.push(command as u8);

        if let Frame::SetAddress(v) | Frame::SetLength(v) = self {
            buff.extend_from_slice(&v.to_le_bytes());
        }

        buff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_little_endian() {
        assert_eq!(Frame::SetAddress(0x1234).encode(), vec![b's', 0x34, 0x12]);
        assert_eq!(Frame::SetLength(1024).encode(), vec![b'l', 0x00, 0x04]);
    }

    #[test]
    fn bare_commands_have_no_payload() {
        let frames = [
            (Frame::WriteData, b'd'),
            (Frame::ReadData, b'r'),
            (Frame::ReadByte, b'+'),
            (Frame::Reset, b'0'),
            (Frame::TestRead, b'1'),
            (Frame::TestWrite, b'2'),
            (Frame::Abort, b'x'),
        ];

        for (f, tag) in frames.iter() {
            assert_eq!(f.encode(), vec![*tag]);
        }
    }

    #[test]
    fn encoded_width_matches_payload_len() {
        let frames = [
            Frame::SetAddress(0),
            Frame::SetLength(0xFFFF),
            Frame::ReadData,
            Frame::Reset,
        ];

        for f in frames.iter() {
            assert_eq!(f.encode().len(), 1 + f.command().payload_len());
        }
    }
}
