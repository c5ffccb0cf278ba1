//! ZCL frame header encoding and decoding
//!
//! Frame format:
//! ```text
//! [Frame control: 1 byte]
//! [Manufacturer code: 2 bytes LE] (only if the manufacturer-specific bit is set)
//! [Transaction ID: 1 byte]
//! [Command ID: 1 byte]
//! [Payload: variable]
//! ```

use crate::types::ZclError;

/// Frame-control bits
pub mod frame_control {
    /// Command is cluster-specific rather than profile-wide
    pub const CLUSTER_SPECIFIC: u8 = 0x01;
    /// A 2-byte manufacturer code follows the frame control
    pub const MANUFACTURER_SPECIFIC: u8 = 0x04;
    /// Direction: server to client
    pub const SERVER_TO_CLIENT: u8 = 0x08;
    /// Suppress the default response
    pub const DISABLE_DEFAULT_RESPONSE: u8 = 0x10;
}

use frame_control as fc;

/// ZCL global (profile-wide) commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GlobalCommand {
    ReadAttributes = 0x00,
    ReadAttributesResponse = 0x01,
    WriteAttributes = 0x02,
    WriteAttributesResponse = 0x04,
    ConfigureReporting = 0x06,
    ConfigureReportingResponse = 0x07,
    ReportAttributes = 0x0A,
    DefaultResponse = 0x0B,
}

/// Parsed ZCL frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclHeader {
    pub frame_control: u8,
    pub manufacturer_code: Option<u16>,
    pub transaction_id: u8,
    pub command_id: u8,
}

impl ZclHeader {
    /// Header for a global command
    #[must_use]
    pub fn global(frame_control: u8, transaction_id: u8, command_id: GlobalCommand) -> Self {
        Self::new(frame_control, transaction_id, command_id as u8)
    }

    #[must_use]
    pub fn new(frame_control: u8, transaction_id: u8, command_id: u8) -> Self {
        Self {
            frame_control,
            manufacturer_code: None,
            transaction_id,
            command_id,
        }
    }

    #[must_use]
    pub fn with_manufacturer_code(mut self, code: u16) -> Self {
        self.manufacturer_code = Some(code);
        self
    }

    /// Serialize the header, ready for the payload to be appended
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(5);
        let mut frame_control = self.frame_control;

        if self.manufacturer_code.is_some() {
            frame_control |= fc::MANUFACTURER_SPECIFIC;
        }

        data.push(frame_control);

        if let Some(code) = self.manufacturer_code {
            data.extend_from_slice(&code.to_le_bytes());
        }

        data.push(self.transaction_id);
        data.push(self.command_id);
        data
    }

    /// Parse a header from the start of a frame, returning the header and
    /// the offset at which the payload begins
    pub fn decode(data: &[u8]) -> Result<(Self, usize), ZclError> {
        if data.len() < 3 {
            return Err(ZclError::FrameTooShort(data.len()));
        }

        let frame_control = data[0];

        if frame_control & fc::MANUFACTURER_SPECIFIC != 0 {
            if data.len() < 5 {
                return Err(ZclError::FrameTooShort(data.len()));
            }

            Ok((
                Self {
                    frame_control: frame_control & !fc::MANUFACTURER_SPECIFIC,
                    manufacturer_code: Some(u16::from_le_bytes([data[1], data[2]])),
                    transaction_id: data[3],
                    command_id: data[4],
                },
                5,
            ))
        } else {
            Ok((
                Self {
                    frame_control,
                    manufacturer_code: None,
                    transaction_id: data[1],
                    command_id: data[2],
                },
                3,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = ZclHeader::new(
            fc::CLUSTER_SPECIFIC | fc::DISABLE_DEFAULT_RESPONSE,
            0x2A,
            0x05,
        );

        let bytes = header.encode();
        let (decoded, offset) = ZclHeader::decode(&bytes).unwrap();

        assert_eq!(offset, 3);
        assert_eq!(decoded, header);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_manufacturer_specific_roundtrip() {
        let header = ZclHeader::new(0x00, 0x10, 0x0A).with_manufacturer_code(0x115F);

        let bytes = header.encode();
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0] & fc::MANUFACTURER_SPECIFIC, 0x04);

        let (decoded, offset) = ZclHeader::decode(&bytes).unwrap();
        assert_eq!(offset, 5);
        assert_eq!(decoded.manufacturer_code, Some(0x115F));
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            ZclHeader::decode(&[0x00, 0x01]),
            Err(ZclError::FrameTooShort(2))
        ));

        // Manufacturer-specific bit set but no room for the code
        assert!(matches!(
            ZclHeader::decode(&[0x04, 0x5F, 0x11, 0x01]),
            Err(ZclError::FrameTooShort(4))
        ));
    }
}
