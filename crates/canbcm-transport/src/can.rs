use std::fmt;

use crate::error::{Result, TransportError};

/// Extended frame format flag (29-bit identifier).
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag.
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
/// Error message frame flag.
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;

/// Standard frame format identifier mask (11 bits).
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
/// Extended frame format identifier mask (29 bits).
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Maximum payload length of a classic CAN frame.
pub const CAN_MAX_DLEN: usize = 8;

/// A CAN identifier including the EFF/RTR/ERR flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CanId(pub u32);

impl CanId {
    /// Raw identifier value with flag bits.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// True for 29-bit identifiers.
    pub fn is_extended(self) -> bool {
        self.0 & CAN_EFF_FLAG != 0
    }

    /// True for remote transmission requests.
    pub fn is_rtr(self) -> bool {
        self.0 & CAN_RTR_FLAG != 0
    }

    /// The same identifier with the RTR flag cleared.
    pub fn without_rtr(self) -> Self {
        Self(self.0 & !CAN_RTR_FLAG)
    }

    /// Most selective mask for registering a receiver on exactly this identifier.
    ///
    /// Keeps the RTR bit of the identifier and selects the identifier bits
    /// of its frame format (plus the EFF flag for extended identifiers).
    pub fn registration_mask(self) -> u32 {
        let rtr = self.0 & CAN_RTR_FLAG;
        if self.is_extended() {
            rtr | CAN_EFF_MASK | CAN_EFF_FLAG
        } else {
            rtr | CAN_SFF_MASK
        }
    }

    /// True if `other` matches this identifier under `mask`.
    pub fn matches(self, other: CanId, mask: u32) -> bool {
        self.0 & mask == other.0 & mask
    }
}

impl From<u32> for CanId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended() {
            write!(f, "{:08X}", self.0 & CAN_EFF_MASK)?;
        } else {
            write!(f, "{:03X}", self.0 & CAN_SFF_MASK)?;
        }
        if self.is_rtr() {
            f.write_str("#R")?;
        }
        Ok(())
    }
}

/// A classic CAN frame: identifier, length and up to eight payload bytes.
///
/// Bytes beyond `len` are kept as-is; the broadcast manager uses the full
/// eight bytes as a bit mask regardless of the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CanFrame {
    /// Identifier with flag bits.
    pub id: CanId,
    len: u8,
    /// Payload storage.
    pub data: [u8; CAN_MAX_DLEN],
}

impl CanFrame {
    /// Create a frame from an identifier and payload slice.
    pub fn new(id: impl Into<CanId>, payload: &[u8]) -> Result<Self> {
        if payload.len() > CAN_MAX_DLEN {
            return Err(TransportError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; CAN_MAX_DLEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id: id.into(),
            len: payload.len() as u8,
            data,
        })
    }

    /// Create a frame from raw parts. `len` must not exceed eight.
    pub fn from_parts(id: impl Into<CanId>, len: u8, data: [u8; CAN_MAX_DLEN]) -> Result<Self> {
        if len as usize > CAN_MAX_DLEN {
            return Err(TransportError::PayloadTooLong(len as usize));
        }
        Ok(Self {
            id: id.into(),
            len,
            data,
        })
    }

    /// Payload length (0..=8).
    pub fn len(&self) -> u8 {
        self.len
    }

    /// True if the frame carries no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// The full data area as a little-endian 64-bit word.
    pub fn data_u64(&self) -> u64 {
        u64::from_le_bytes(self.data)
    }

    /// True if both frames agree on every data bit selected by `mask`.
    pub fn masked_eq(&self, other: &CanFrame, mask: &CanFrame) -> bool {
        let mask = mask.data_u64();
        self.data_u64() & mask == other.data_u64() & mask
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.len)?;
        for byte in self.payload() {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_mask_standard_and_extended() {
        assert_eq!(CanId(0x123).registration_mask(), CAN_SFF_MASK);
        assert_eq!(
            CanId(0x123 | CAN_RTR_FLAG).registration_mask(),
            CAN_SFF_MASK | CAN_RTR_FLAG
        );
        assert_eq!(
            CanId(0x1234_5678 | CAN_EFF_FLAG).registration_mask(),
            CAN_EFF_MASK | CAN_EFF_FLAG
        );
    }

    #[test]
    fn rtr_request_does_not_match_data_frame_registration() {
        let request = CanId(0x123 | CAN_RTR_FLAG);
        let mask = request.registration_mask();
        assert!(request.matches(CanId(0x123 | CAN_RTR_FLAG), mask));
        assert!(!request.matches(CanId(0x123), mask));
    }

    #[test]
    fn new_rejects_long_payload() {
        let err = CanFrame::new(0x100, &[0u8; 9]).unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLong(9)));
    }

    #[test]
    fn masked_eq_uses_little_endian_byte_order() {
        let mask = CanFrame::from_parts(0, 8, 0xFFu64.to_le_bytes()).unwrap();
        let base = CanFrame::new(0x10, &[1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let noise = CanFrame::new(0x10, &[1, 9, 9, 9, 9, 9, 9, 9]).unwrap();
        let changed = CanFrame::new(0x10, &[2, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        assert!(base.masked_eq(&noise, &mask));
        assert!(!base.masked_eq(&changed, &mask));
    }

    #[test]
    fn display_formats() {
        let frame = CanFrame::new(0x7DF | CAN_RTR_FLAG, &[]).unwrap();
        assert_eq!(frame.to_string(), "7DF#R [0]");
        let frame = CanFrame::new(CAN_EFF_FLAG | 0x18DA_F110, &[0xAB, 0x01]).unwrap();
        assert_eq!(frame.to_string(), "18DAF110 [2] AB 01");
    }
}
