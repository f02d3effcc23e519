//! Access widths, intents and little-endian cell helpers.

/// Data width of one memory or register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8 bits.
    Byte,
    /// 16 bits.
    Word,
    /// 20 bits, stored as two consecutive words.
    Word20,
}

impl AccessWidth {
    /// Mask of significant bits.
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::Word20 => 0xF_FFFF,
        }
    }

    /// Most significant bit of the width.
    #[must_use]
    pub const fn sign_bit(self) -> u32 {
        match self {
            Self::Byte => 0x80,
            Self::Word => 0x8000,
            Self::Word20 => 0x8_0000,
        }
    }

    /// Bytes occupied in memory.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Word20 => 4,
        }
    }

    /// Number of significant bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::Word => 16,
            Self::Word20 => 20,
        }
    }

    /// Returns `true` when an access of this width at `address` is misaligned.
    #[must_use]
    pub const fn is_misaligned(self, address: u32) -> bool {
        !matches!(self, Self::Byte) && address & 1 != 0
    }
}

/// Why memory is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessIntent {
    /// Operand or stack read.
    Read,
    /// Instruction or extension word fetch.
    Fetch,
}

/// Loads a byte or word cell from `bytes` at `address`.
pub(crate) fn load_cell(bytes: &[u8], address: usize, width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Byte => u32::from(bytes[address]),
        AccessWidth::Word | AccessWidth::Word20 => {
            u32::from(u16::from_le_bytes([bytes[address], bytes[address + 1]]))
        }
    }
}

/// Stores a byte or word cell into `bytes` at `address`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn store_cell(bytes: &mut [u8], address: usize, value: u32, width: AccessWidth) {
    match width {
        AccessWidth::Byte => bytes[address] = value as u8,
        AccessWidth::Word | AccessWidth::Word20 => {
            let [low, high] = (value as u16).to_le_bytes();
            bytes[address] = low;
            bytes[address + 1] = high;
        }
    }
}
