//! Item addressing for bulk reads and writes.
//!
//! A variable is addressed by an access area (a data block or a controller
//! memory area), a sub area, an optional symbol checksum and a path of LIDs
//! leading to the element inside the area.
//!
//! # Wire layout
//!
//! | Field | Encoding |
//! |-------|----------|
//! | symbol CRC | VLQ u32 |
//! | access area | VLQ u32 |
//! | LID count + 1 | VLQ u32 |
//! | access sub area | VLQ u32 |
//! | each LID | VLQ u32 |
//!
//! # Example
//!
//! ```
//! use s7commplus::{Area, ItemAddress};
//!
//! // DB1, first element
//! let address = ItemAddress::new(Area::DataBlock(1), vec![1]);
//! assert_eq!(address.access_area, 0x8A0E_0001);
//! assert_eq!(address.field_count(), 5);
//! ```

use std::fmt;
use std::io::{self, Read, Write};

use crate::error::DecodeError;
use crate::ids;
use crate::vlq::{self, DecodeResult};

/// Upper bound for the LID path of a decoded address.
const MAX_LIDS: u32 = 1024;

/// Memory areas that can be addressed on an S7-1200/1500.
///
/// | Area | Access area id | Sub area id |
/// |------|----------------|-------------|
/// | Inputs | 80 | 2551 |
/// | Outputs | 81 | 2551 |
/// | Merker | 82 | 2551 |
/// | Timers | 83 | 2551 |
/// | Counters | 84 | 2551 |
/// | DataBlock(n) | 0x8A0E0000 + n | 2550 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    /// Process image inputs (I).
    Inputs,
    /// Process image outputs (Q).
    Outputs,
    /// Bit memory (M).
    Merker,
    /// S7 timers.
    Timers,
    /// S7 counters.
    Counters,
    /// Data block with the given number.
    DataBlock(u16),
}

impl Area {
    /// Returns the access area id of this area.
    pub fn access_area(self) -> u32 {
        match self {
            Area::Inputs => ids::NATIVE_OBJECTS_THE_I_AREA_RID,
            Area::Outputs => ids::NATIVE_OBJECTS_THE_Q_AREA_RID,
            Area::Merker => ids::NATIVE_OBJECTS_THE_M_AREA_RID,
            Area::Timers => ids::NATIVE_OBJECTS_THE_S7_TIMERS_RID,
            Area::Counters => ids::NATIVE_OBJECTS_THE_S7_COUNTERS_RID,
            Area::DataBlock(number) => ids::DB_ACCESS_AREA_BASE + u32::from(number),
        }
    }

    /// Returns the sub area id holding the actual values of this area.
    pub fn access_sub_area(self) -> u32 {
        match self {
            Area::DataBlock(_) => ids::DB_VALUE_ACTUAL,
            _ => ids::CONTROLLER_AREA_VALUE_ACTUAL,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::Inputs => write!(f, "I"),
            Area::Outputs => write!(f, "Q"),
            Area::Merker => write!(f, "M"),
            Area::Timers => write!(f, "T"),
            Area::Counters => write!(f, "C"),
            Area::DataBlock(number) => write!(f, "DB{number}"),
        }
    }
}

/// Address of one variable in a bulk read or write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemAddress {
    /// Checksum of the symbol, or 0 when the check is not wanted.
    pub symbol_crc: u32,
    /// Access area id.
    pub access_area: u32,
    /// Access sub area id.
    pub access_sub_area: u32,
    /// Path of LIDs inside the area.
    pub lids: Vec<u32>,
}

impl ItemAddress {
    /// Creates an address inside one of the well-known areas.
    ///
    /// # Example
    ///
    /// ```
    /// use s7commplus::{Area, ItemAddress};
    ///
    /// let address = ItemAddress::new(Area::Merker, vec![3]);
    /// assert_eq!(address.access_area, 82);
    /// assert_eq!(address.access_sub_area, 2551);
    /// ```
    pub fn new(area: Area, lids: Vec<u32>) -> Self {
        Self::raw(area.access_area(), area.access_sub_area(), lids)
    }

    /// Creates an address from raw area ids.
    pub fn raw(access_area: u32, access_sub_area: u32, lids: Vec<u32>) -> Self {
        Self {
            symbol_crc: 0,
            access_area,
            access_sub_area,
            lids,
        }
    }

    /// Sets the symbol checksum.
    pub fn with_symbol_crc(mut self, symbol_crc: u32) -> Self {
        self.symbol_crc = symbol_crc;
        self
    }

    /// Number of VLQ fields this address occupies on the wire.
    pub fn field_count(&self) -> u32 {
        4 + self.lids.len() as u32
    }

    /// Writes the address and returns the number of bytes written.
    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        let mut len = vlq::encode_u32(w, self.symbol_crc)?;
        len += vlq::encode_u32(w, self.access_area)?;
        len += vlq::encode_u32(w, self.lids.len() as u32 + 1)?;
        len += vlq::encode_u32(w, self.access_sub_area)?;
        for lid in &self.lids {
            len += vlq::encode_u32(w, *lid)?;
        }
        Ok(len)
    }

    /// Reads an address.
    pub fn decode<R: Read + ?Sized>(r: &mut R) -> DecodeResult<Self> {
        let (symbol_crc, _) = vlq::decode_u32(r)?;
        let (access_area, _) = vlq::decode_u32(r)?;
        let (lid_count, _) = vlq::decode_u32(r)?;
        if lid_count == 0 || lid_count > MAX_LIDS {
            return Err(DecodeError::malformed(format!(
                "invalid LID count {lid_count}"
            )));
        }
        let (access_sub_area, _) = vlq::decode_u32(r)?;
        let lids = (1..lid_count)
            .map(|_| vlq::decode_u32(r).map(|(lid, _)| lid))
            .collect::<DecodeResult<Vec<_>>>()?;
        Ok(Self {
            symbol_crc,
            access_area,
            access_sub_area,
            lids,
        })
    }
}

impl fmt::Display for ItemAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}.{}", self.access_area, self.access_sub_area)?;
        for lid in &self.lids {
            write!(f, ".{lid:X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_ids() {
        assert_eq!(Area::Inputs.access_area(), 80);
        assert_eq!(Area::Outputs.access_area(), 81);
        assert_eq!(Area::Counters.access_area(), 84);
        assert_eq!(Area::DataBlock(100).access_area(), 0x8A0E_0064);
        assert_eq!(Area::DataBlock(100).access_sub_area(), 2550);
        assert_eq!(Area::Timers.access_sub_area(), 2551);
    }

    #[test]
    fn test_area_display() {
        assert_eq!(Area::DataBlock(7).to_string(), "DB7");
        assert_eq!(Area::Merker.to_string(), "M");
    }

    #[test]
    fn test_encode_layout() {
        let address = ItemAddress::new(Area::Merker, vec![0x10, 0x81]);
        let mut buf = Vec::new();
        let len = address.encode(&mut buf).unwrap();
        // crc 0, area 82, count 3, sub area 2551 (0x9377), lids 0x10, 0x81
        assert_eq!(hex::encode(&buf), "0052039377108101");
        assert_eq!(len, buf.len());
        assert_eq!(address.field_count(), 6);
    }

    #[test]
    fn test_decode_roundtrip() {
        let address = ItemAddress::new(Area::DataBlock(1), vec![1, 2, 3]).with_symbol_crc(0xDEAD);
        let mut buf = Vec::new();
        address.encode(&mut buf).unwrap();
        let decoded = ItemAddress::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, address);
    }

    #[test]
    fn test_decode_without_lids() {
        let address = ItemAddress::raw(ids::OBJECT_ROOT, ids::SYSTEM_LIMITS, vec![]);
        assert_eq!(address.field_count(), 4);
        let mut buf = Vec::new();
        address.encode(&mut buf).unwrap();
        assert_eq!(ItemAddress::decode(&mut &buf[..]).unwrap(), address);
    }

    #[test]
    fn test_decode_zero_lid_count() {
        let buf = [0x00, 0x52, 0x00, 0x01];
        assert!(matches!(
            ItemAddress::decode(&mut &buf[..]),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_truncated() {
        let buf = [0x00, 0x52, 0x03, 0x01, 0x05];
        assert!(matches!(
            ItemAddress::decode(&mut &buf[..]),
            Err(DecodeError::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn test_display() {
        let address = ItemAddress::new(Area::DataBlock(1), vec![0xA]);
        assert_eq!(address.to_string(), "8A0E0001.2550.A");
    }
}
