//! ZCL data types and wire sizes

use thiserror::Error;

/// Codec errors
#[derive(Error, Debug)]
pub enum ZclError {
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("declared length {length} exceeds remaining buffer ({remaining} bytes)")]
    LengthOverrun { length: usize, remaining: usize },

    #[error("unknown data type: {0:#04X}")]
    UnknownDataType(u8),
}

/// ZCL data-type tags used by this implementation
pub mod data_type {
    pub const BOOLEAN: u8 = 0x10;
    pub const BITMAP_8BIT: u8 = 0x18;
    pub const BITMAP_16BIT: u8 = 0x19;
    pub const UNSIGNED_8BIT: u8 = 0x20;
    pub const UNSIGNED_16BIT: u8 = 0x21;
    pub const UNSIGNED_24BIT: u8 = 0x22;
    pub const UNSIGNED_32BIT: u8 = 0x23;
    pub const UNSIGNED_48BIT: u8 = 0x25;
    pub const UNSIGNED_64BIT: u8 = 0x27;
    pub const SIGNED_8BIT: u8 = 0x28;
    pub const SIGNED_16BIT: u8 = 0x29;
    pub const SIGNED_24BIT: u8 = 0x2A;
    pub const SIGNED_32BIT: u8 = 0x2B;
    pub const SIGNED_48BIT: u8 = 0x2D;
    pub const SIGNED_64BIT: u8 = 0x2F;
    pub const ENUM_8BIT: u8 = 0x30;
    pub const ENUM_16BIT: u8 = 0x31;
    pub const SINGLE_PRECISION: u8 = 0x39;
    pub const OCTET_STRING: u8 = 0x41;
    pub const CHARACTER_STRING: u8 = 0x42;
    pub const STRUCTURE: u8 = 0x4C;
    pub const UTC_TIME: u8 = 0xE2;
    pub const IEEE_ADDRESS: u8 = 0xF0;
}

/// ZCL status codes
pub mod status {
    pub const SUCCESS: u8 = 0x00;
    pub const UNSUPPORTED_ATTRIBUTE: u8 = 0x86;
    pub const INSUFFICIENT_SPACE: u8 = 0x89;
    pub const DUPLICATE_EXISTS: u8 = 0x8A;
    pub const NOT_FOUND: u8 = 0x8B;
    pub const NO_IMAGE_AVAILABLE: u8 = 0x98;
}

/// Buffer advance for one typed data element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Bytes to skip before the value (length prefix)
    pub skip: usize,
    /// Value size in bytes
    pub size: usize,
}

impl Advance {
    /// Total advance over the buffer
    #[must_use]
    pub fn total(&self) -> usize {
        self.skip + self.size
    }
}

/// Fixed wire size of a data type, if it has one
#[must_use]
pub fn fixed_size(data_type: u8) -> Option<usize> {
    match data_type {
        data_type::BOOLEAN
        | data_type::BITMAP_8BIT
        | data_type::UNSIGNED_8BIT
        | data_type::SIGNED_8BIT
        | data_type::ENUM_8BIT => Some(1),
        data_type::BITMAP_16BIT
        | data_type::UNSIGNED_16BIT
        | data_type::SIGNED_16BIT
        | data_type::ENUM_16BIT => Some(2),
        data_type::UNSIGNED_24BIT | data_type::SIGNED_24BIT => Some(3),
        data_type::UNSIGNED_32BIT
        | data_type::SIGNED_32BIT
        | data_type::SINGLE_PRECISION
        | data_type::UTC_TIME => Some(4),
        data_type::UNSIGNED_48BIT | data_type::SIGNED_48BIT => Some(6),
        data_type::UNSIGNED_64BIT | data_type::SIGNED_64BIT | data_type::IEEE_ADDRESS => Some(8),
        _ => None,
    }
}

/// Compute the buffer advance of one typed element at the start of `remaining`.
///
/// Octet and character strings are prefixed by a 1-byte length, structures by
/// a 2-byte LE item count followed by typed items; both count the prefix in
/// the returned advance. Errors if a declared length runs past the buffer.
pub fn data_size(data_type: u8, remaining: &[u8]) -> Result<Advance, ZclError> {
    if let Some(size) = fixed_size(data_type) {
        if size > remaining.len() {
            return Err(ZclError::LengthOverrun {
                length: size,
                remaining: remaining.len(),
            });
        }

        return Ok(Advance { skip: 0, size });
    }

    match data_type {
        data_type::OCTET_STRING | data_type::CHARACTER_STRING => {
            let length = *remaining.first().ok_or(ZclError::LengthOverrun {
                length: 1,
                remaining: 0,
            })? as usize;

            if length + 1 > remaining.len() {
                return Err(ZclError::LengthOverrun {
                    length,
                    remaining: remaining.len() - 1,
                });
            }

            Ok(Advance {
                skip: 1,
                size: length,
            })
        }

        data_type::STRUCTURE => {
            if remaining.len() < 2 {
                return Err(ZclError::LengthOverrun {
                    length: 2,
                    remaining: remaining.len(),
                });
            }

            let count = u16::from_le_bytes([remaining[0], remaining[1]]) as usize;
            let mut offset = 2;

            for _ in 0..count {
                let item_type = *remaining.get(offset).ok_or(ZclError::LengthOverrun {
                    length: offset + 1,
                    remaining: remaining.len(),
                })?;

                offset += 1;
                offset += data_size(item_type, &remaining[offset..])?.total();
            }

            // The whole aggregate reads as one opaque value
            Ok(Advance {
                skip: 0,
                size: offset,
            })
        }

        other => Err(ZclError::UnknownDataType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(fixed_size(data_type::BOOLEAN), Some(1));
        assert_eq!(fixed_size(data_type::UNSIGNED_48BIT), Some(6));
        assert_eq!(fixed_size(data_type::IEEE_ADDRESS), Some(8));
        assert_eq!(fixed_size(data_type::SINGLE_PRECISION), Some(4));
        assert_eq!(fixed_size(data_type::CHARACTER_STRING), None);
    }

    #[test]
    fn test_string_advance_includes_prefix() {
        let buffer = [0x03, b'p', b'p', b'm', 0xFF];
        let advance = data_size(data_type::CHARACTER_STRING, &buffer).unwrap();

        assert_eq!(advance, Advance { skip: 1, size: 3 });
        assert_eq!(advance.total(), 4);
    }

    #[test]
    fn test_string_overrun() {
        let buffer = [0x08, b'x', b'y'];
        assert!(matches!(
            data_size(data_type::OCTET_STRING, &buffer),
            Err(ZclError::LengthOverrun { length: 8, .. })
        ));
    }

    #[test]
    fn test_structure_advance() {
        // Two items: bool(1) and u16
        let buffer = [0x02, 0x00, 0x10, 0x01, 0x21, 0x64, 0x00];
        let advance = data_size(data_type::STRUCTURE, &buffer).unwrap();

        assert_eq!(advance.total(), 7);
    }

    #[test]
    fn test_unknown_type() {
        assert!(matches!(
            data_size(0x47, &[0x00]),
            Err(ZclError::UnknownDataType(0x47))
        ));
    }
}
