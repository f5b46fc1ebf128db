//! # Identifier & Calculation Primitives
//!
//! Hardcoded constants for identifier decoding and calculation posting.
//!
//! These values describe the identifier format issued by the remote store.
//! They are compiled into the binary and are immutable at runtime.

/// Number of bytes in an identifier issued by a local store.
///
/// Remote identifiers may be longer; only the first six bytes are ever
/// inspected by the classifier.
pub const IDENTIFIER_BYTES: usize = 16;

/// Index of the 16-bit word that carries the service code.
///
/// Words are read big-endian, so word `2` spans bytes `4..6`.
pub const SERVICE_WORD_INDEX: usize = 2;

/// Mask applied to the service word before shifting.
pub const SERVICE_MASK: u16 = 0x0ff0;

/// Right shift applied to the masked service word.
pub const SERVICE_SHIFT: u32 = 6;

/// Largest service code that survives the mask/shift round trip.
pub const MAX_SERVICE_CODE: u16 = SERVICE_MASK >> SERVICE_SHIFT;

/// Level assigned to function applications that are posted without one.
pub const DEFAULT_FUNCTION_LEVEL: u64 = 4;

/// Error message used when substitution reaches a `meta` node.
pub const META_SUBSTITUTION_MESSAGE: &str = "cannot substitute within meta";
