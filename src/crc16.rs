//! Table-driven CRC16 (CRC-CCITT, "false" variant)
//!
//! Both packet types carry a CRC16 computed over every byte except the two
//! trailing CRC bytes, seeded with `0xFFFF`. The lookup table is generated at
//! compile time from the polynomial, so there is no lazy initialisation and
//! no state beyond the table itself.

/// CCITT generator polynomial x^16 + x^12 + x^5 + 1
pub const CCITT_POLY: u16 = 0x1021;

/// Initial register value
pub const CCITT_INIT: u16 = 0xFFFF;

/// Table-driven CRC16 for an arbitrary MSB-first polynomial.
#[derive(Debug, Clone)]
pub struct Crc16 {
    table: [u16; 256],
    init: u16,
}

impl Crc16 {
    /// Precompute the 256-entry table for `poly`.
    pub const fn new(poly: u16, init: u16) -> Self {
        Self {
            table: make_table(poly),
            init,
        }
    }

    /// Fold `data` through the table starting from the initial value.
    pub fn checksum(&self, data: &[u8]) -> u16 {
        data.iter().fold(self.init, |crc, &byte| {
            let index = ((crc >> 8) ^ u16::from(byte)) & 0xFF;
            (crc << 8) ^ self.table[index as usize]
        })
    }

    /// The generated lookup table.
    pub fn table(&self) -> &[u16; 256] {
        &self.table
    }
}

/// Build the lookup table for `poly`.
pub const fn make_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc: u16 = 0;
        let mut c: u16 = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if (crc ^ c) & 0x8000 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
            c <<= 1;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC engine used on the wire.
pub static CCITT: Crc16 = Crc16::new(CCITT_POLY, CCITT_INIT);

/// CRC-CCITT (0x1021, init 0xFFFF) of `data`.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    CCITT.checksum(data)
}

/// Split a CRC into the `(low, high)` byte order used on the wire.
pub fn crc_bytes(crc: u16) -> [u8; 2] {
    crc.to_le_bytes()
}
