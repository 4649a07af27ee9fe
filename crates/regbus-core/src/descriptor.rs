//! Named-register metadata and the persistent store record codec.
//!
//! Descriptors originate in an externally authored address-table schema
//! and are persisted as pipe-delimited records of the form
//! `hex|perm|hex|mode|hex` (address, permissions, mask, mode, size).
//! They are only ever assembled by the record parser feeding
//! [`crate::table::AddressTable`], never ad hoc by callers.

use std::fmt;

use thiserror::Error;

/// Mask value meaning "whole word, block-accessible".
pub const WHOLE_WORD_MASK: u32 = 0xFFFF_FFFF;

/// Access discipline of a named register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessMode {
    /// One scalar 32-bit word.
    Single,
    /// A contiguous multi-word region.
    Block,
    /// A FIFO port: repeated accesses at one address.
    Fifo,
}

impl AccessMode {
    /// Store-record token for this mode.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Block => "block",
            Self::Fifo => "fifo",
        }
    }

    /// Parses a store-record mode token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "single" => Some(Self::Single),
            "block" => Some(Self::Block),
            "fifo" => Some(Self::Fifo),
            _ => None,
        }
    }
}

/// Permission set granted to a named register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Permissions {
    /// Reads allowed.
    pub read: bool,
    /// Writes allowed.
    pub write: bool,
}

impl Permissions {
    /// Read-only permission set.
    pub const R: Self = Self {
        read: true,
        write: false,
    };
    /// Write-only permission set.
    pub const W: Self = Self {
        read: false,
        write: true,
    };
    /// Read-write permission set.
    pub const RW: Self = Self {
        read: true,
        write: true,
    };

    /// Store-record token for this permission set.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match (self.read, self.write) {
            (true, true) => "rw",
            (true, false) => "r",
            (false, true) => "w",
            (false, false) => "",
        }
    }

    /// Parses a store-record permission token (a subset of `rw`).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "rw" => Some(Self::RW),
            "r" => Some(Self::R),
            "w" => Some(Self::W),
            "" => Some(Self::default()),
            _ => None,
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Error produced when a store record cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record did not split into the five expected fields.
    #[error("expected 5 pipe-delimited fields, found {0}")]
    FieldCount(usize),
    /// A numeric field was not valid hexadecimal.
    #[error("invalid hexadecimal {field} field: {value}")]
    Hex {
        /// Name of the offending field.
        field: &'static str,
        /// Raw field content.
        value: String,
    },
    /// The permission token was not a subset of `rw`.
    #[error("invalid permission token: {0}")]
    Permissions(String),
    /// The mode token was not `single`, `block`, or `fifo`.
    #[error("invalid access mode token: {0}")]
    Mode(String),
}

/// Identity of one named hardware register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterDescriptor {
    /// Absolute hardware word address.
    pub address: u32,
    /// Bit-field mask within the 32-bit word; [`WHOLE_WORD_MASK`] means
    /// the whole word is addressable.
    pub mask: u32,
    /// Declared length in 32-bit words (1 for scalars).
    pub size: u32,
    /// Access discipline.
    pub mode: AccessMode,
    /// Granted permissions.
    pub permissions: Permissions,
}

impl RegisterDescriptor {
    /// Returns `true` when this register is a bit subfield of its word.
    #[must_use]
    pub const fn is_masked(&self) -> bool {
        self.mask != WHOLE_WORD_MASK
    }

    /// Serializes to the store record form `hex|perm|hex|mode|hex`.
    #[must_use]
    pub fn to_record(&self) -> String {
        format!(
            "{:x}|{}|{:x}|{}|{:x}",
            self.address,
            self.permissions.token(),
            self.mask,
            self.mode.token(),
            self.size
        )
    }

    /// Parses the store record form produced by [`Self::to_record`].
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] describing the first malformed field.
    pub fn from_record(record: &str) -> Result<Self, RecordError> {
        let fields: Vec<&str> = record.split('|').collect();
        if fields.len() != 5 {
            return Err(RecordError::FieldCount(fields.len()));
        }

        let address = parse_hex("address", fields[0])?;
        let permissions = Permissions::from_token(fields[1])
            .ok_or_else(|| RecordError::Permissions(fields[1].to_owned()))?;
        let mask = parse_hex("mask", fields[2])?;
        let mode = AccessMode::from_token(fields[3])
            .ok_or_else(|| RecordError::Mode(fields[3].to_owned()))?;
        let size = parse_hex("size", fields[4])?;

        Ok(Self {
            address,
            mask,
            size,
            mode,
            permissions,
        })
    }
}

fn parse_hex(field: &'static str, value: &str) -> Result<u32, RecordError> {
    u32::from_str_radix(value, 16).map_err(|_| RecordError::Hex {
        field,
        value: value.to_owned(),
    })
}
