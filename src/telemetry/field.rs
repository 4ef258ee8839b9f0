//! Fixed-width scalar fields read from and written to a bit stream.
//!
//! Bits are consumed LSB-first within each byte, the order the OBC's bit writer produces.
//! A little-endian field assembles its value from the consumed bits in order. A big-endian
//! field must span whole bytes; its little-endian value gets its bytes reversed.

use super::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The widest field that can be decoded into a single value
pub const MAX_FIELD_BITS: u8 = 64;

/// How a decoded value is shown. The decoding itself is the same unsigned read for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Presentation {
    #[default]
    Hex,
    Decimal,
    Flags,
    /// Consumed, but left out of the decoded category
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    bits: u8,
    presentation: Presentation,
    byte_order: ByteOrder,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, bits: u8, presentation: Presentation) -> Self {
        FieldSpec { name: name.into(), bits, presentation, byte_order: ByteOrder::Little }
    }

    pub fn hex(name: impl Into<String>, bits: u8) -> Self {
        Self::new(name, bits, Presentation::Hex)
    }

    pub fn decimal(name: impl Into<String>, bits: u8) -> Self {
        Self::new(name, bits, Presentation::Decimal)
    }

    pub fn flags(name: impl Into<String>, bits: u8) -> Self {
        Self::new(name, bits, Presentation::Flags)
    }

    /// A single bit flag
    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, 1, Presentation::Flags)
    }

    pub fn reserved(bits: u8) -> Self {
        Self::new("reserved", bits, Presentation::Reserved)
    }

    #[must_use]
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Checks that the field can be decoded at all. Called when a category is built, so a bad
    /// layout is rejected at startup instead of on the first beacon.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.bits == 0 || self.bits > MAX_FIELD_BITS {
            return Err(TelemetryError::inconsistent(
                &self.name,
                format!("width of {} bits is outside 1..={MAX_FIELD_BITS}", self.bits),
            ));
        }

        if self.byte_order == ByteOrder::Big && self.bits % 8 != 0 {
            return Err(TelemetryError::inconsistent(
                &self.name,
                format!("big endian field spans {} bits, which is not a whole number of bytes", self.bits),
            ));
        }

        Ok(())
    }
}

/// A decoded field. Compares by value, so two decodes of the same bits are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    raw: u64,
    bits: u8,
    presentation: Presentation,
}

impl FieldValue {
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    /// State of a single flag, `None` if `index` lies outside the field
    pub fn bit(&self, index: u8) -> Option<bool> {
        (index < self.bits).then(|| self.raw >> index & 1 == 1)
    }

    /// Indices of all set flags, lowest first
    pub fn set_flags(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.bits).filter(|i| self.raw >> i & 1 == 1)
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = usize::from(self.bits);
        match self.presentation {
            Presentation::Decimal => write!(f, "{}", self.raw),
            Presentation::Flags => write!(f, "0b{:0width$b}", self.raw, width = bits),
            Presentation::Hex | Presentation::Reserved => {
                write!(f, "0x{:0width$X}", self.raw, width = bits.div_ceil(4))
            }
        }
    }
}

/// Read position inside a byte buffer, tracked in bits
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    bit_offset: usize,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitCursor { data, bit_offset: 0 }
    }

    pub fn position(&self) -> usize {
        self.bit_offset
    }

    pub fn total_bits(&self) -> usize {
        self.data.len() * 8
    }

    pub fn remaining_bits(&self) -> usize {
        self.total_bits() - self.bit_offset
    }

    /// Reads `count` bits (at most 64) and advances past them. On error the cursor is unchanged.
    pub fn read_bits(&mut self, count: usize) -> TelemetryResult<u64> {
        self.ensure_available(count)?;
        if count > usize::from(MAX_FIELD_BITS) {
            return Err(TelemetryError::inconsistent(
                "bit read",
                format!("{count} bits do not fit into a single value"),
            ));
        }

        let mut value = 0u64;
        let mut done = 0;
        while done < count {
            let byte = self.data[self.bit_offset / 8];
            let shift = self.bit_offset % 8;
            let take = (8 - shift).min(count - done);

            let chunk = u64::from(byte >> shift) & mask(take);
            value |= chunk << done;

            done += take;
            self.bit_offset += take;
        }

        Ok(value)
    }

    pub fn skip(&mut self, count: usize) -> TelemetryResult<()> {
        self.ensure_available(count)?;
        self.bit_offset += count;
        Ok(())
    }

    fn ensure_available(&self, count: usize) -> TelemetryResult<()> {
        if count > self.remaining_bits() {
            return Err(TelemetryError::OutOfRange {
                offset: self.bit_offset,
                requested: count,
                available: self.total_bits(),
            });
        }
        Ok(())
    }
}

/// Mirror of [`BitCursor`]. Partially filled trailing bytes are zero padded.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Appends the low `count` bits of `value`. Higher bits are ignored.
    pub fn write_bits(&mut self, value: u64, count: usize) {
        let mut done = 0;
        while done < count {
            let shift = self.bit_len % 8;
            if shift == 0 {
                self.bytes.push(0);
            }
            let take = (8 - shift).min(count - done);
            let chunk = (value >> done & mask(take)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= chunk << shift;
            }

            done += take;
            self.bit_len += take;
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads one field at the cursor and advances the cursor by its width
pub fn decode(cursor: &mut BitCursor, spec: &FieldSpec) -> TelemetryResult<FieldValue> {
    spec.validate()?;
    let bits = usize::from(spec.bits);
    let raw = cursor.read_bits(bits)?;

    let raw = match spec.byte_order {
        ByteOrder::Little => raw,
        ByteOrder::Big => swap_bytes(raw, bits),
    };

    Ok(FieldValue { raw, bits: spec.bits, presentation: spec.presentation })
}

/// Appends `value` as the given field
pub fn encode(writer: &mut BitWriter, spec: &FieldSpec, value: u64) -> TelemetryResult<()> {
    spec.validate()?;
    let bits = usize::from(spec.bits);
    if value > mask(bits) {
        return Err(TelemetryError::ValueTooLarge { value, bits: spec.bits });
    }

    let raw = match spec.byte_order {
        ByteOrder::Little => value,
        ByteOrder::Big => swap_bytes(value, bits),
    };
    writer.write_bits(raw, bits);

    Ok(())
}

fn mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Reverses the byte order of a value that is `bits` wide. `bits` must be a multiple of 8.
fn swap_bytes(value: u64, bits: usize) -> u64 {
    value.swap_bytes() >> (64 - bits)
}
