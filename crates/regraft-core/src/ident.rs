//! # Identifiers & Service Classification
//!
//! Every object in the remote store is named by an [`Identifier`]: the hex
//! encoding of a binary token. A reserved bit field inside that token records
//! which service issued it. [`classify`] decodes that field.
//!
//! ## Decoding
//!
//! The token is read as a sequence of big-endian 16-bit words. The third word
//! (bytes `4..6`) holds the service code in `(word & 0x0ff0) >> 6`.
//! Classification is total: anything that cannot be decoded is
//! [`Service::Unknown`].

use crate::primitives::{
    IDENTIFIER_BYTES, MAX_SERVICE_CODE, SERVICE_MASK, SERVICE_SHIFT, SERVICE_WORD_INDEX,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// IDENTIFIER
// =============================================================================

/// Opaque identifier of an object in the store.
///
/// Identifiers compare by equality; `Ord` exists only so they can key
/// `BTreeMap`s and carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap an identifier string as issued by a store.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Build an identifier whose service field encodes `service`.
    ///
    /// All bits outside the service field are taken from `body`.
    #[must_use]
    pub fn forge(service: Service, body: [u8; IDENTIFIER_BYTES]) -> Self {
        let mut bytes = body;
        let at = SERVICE_WORD_INDEX * 2;
        let word = u16::from_be_bytes([bytes[at], bytes[at + 1]]);
        let stamped = (word & !SERVICE_MASK) | ((service.code() & MAX_SERVICE_CODE) << SERVICE_SHIFT);
        let [hi, lo] = stamped.to_be_bytes();
        bytes[at] = hi;
        bytes[at + 1] = lo;
        Self(hex::encode(bytes))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The service that issued this identifier.
    #[must_use]
    pub fn service(&self) -> Service {
        classify(self)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// SERVICE
// =============================================================================

/// The service that owns an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Identity and access management.
    Iam,
    /// App and package registry.
    Apm,
    /// Immutable storage service (typed objects).
    Iss,
    /// Calculations. The only service whose identifiers are expanded.
    Calc,
    /// Content-addressed storage.
    Cas,
    /// Registry key store.
    Rks,
    /// Immutable objects.
    Immutable,
    /// Unrecognized or undecodable.
    Unknown,
}

impl Service {
    /// Decode a service code. Unassigned codes are `Unknown`.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Iam,
            2 => Self::Apm,
            3 => Self::Iss,
            4 => Self::Calc,
            5 => Self::Cas,
            6 => Self::Rks,
            7 => Self::Immutable,
            _ => Self::Unknown,
        }
    }

    /// The code stored in the identifier. `Unknown` encodes as `0`.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Iam => 1,
            Self::Apm => 2,
            Self::Iss => 3,
            Self::Calc => 4,
            Self::Cas => 5,
            Self::Rks => 6,
            Self::Immutable => 7,
            Self::Unknown => 0,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Iam => "iam",
            Self::Apm => "apm",
            Self::Iss => "iss",
            Self::Calc => "calc",
            Self::Cas => "cas",
            Self::Rks => "rks",
            Self::Immutable => "immutable",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Determine which service owns `id`.
///
/// Pure and total: malformed hex, odd lengths and short tokens classify as
/// [`Service::Unknown`].
#[must_use]
pub fn classify(id: &Identifier) -> Service {
    let Ok(bytes) = hex::decode(id.as_str()) else {
        return Service::Unknown;
    };
    let at = SERVICE_WORD_INDEX * 2;
    match bytes.get(at..at + 2) {
        Some(&[hi, lo]) => {
            let word = u16::from_be_bytes([hi, lo]);
            Service::from_code((word & SERVICE_MASK) >> SERVICE_SHIFT)
        }
        _ => Service::Unknown,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Service; 7] = [
        Service::Iam,
        Service::Apm,
        Service::Iss,
        Service::Calc,
        Service::Cas,
        Service::Rks,
        Service::Immutable,
    ];

    #[test]
    fn classifies_big_endian_service_word() {
        // word 2 = 0x0100 -> (0x0100 & 0x0ff0) >> 6 = 4
        let id = Identifier::new("00000000010000000000000000000000");
        assert_eq!(classify(&id), Service::Calc);

        // word 2 = 0x00c0 -> 3
        let id = Identifier::new("0000000000c000000000000000000000");
        assert_eq!(classify(&id), Service::Iss);
    }

    #[test]
    fn byte_order_matters() {
        // Same bytes swapped: word 2 = 0x0001 -> 0
        let id = Identifier::new("00000000000100000000000000000000");
        assert_eq!(classify(&id), Service::Unknown);
    }

    #[test]
    fn bits_outside_mask_are_ignored() {
        // word 2 = 0xf10f keeps code 4 under the mask
        let id = Identifier::new("ffffffff f10fffffffffffffffffffff".replace(' ', ""));
        assert_eq!(classify(&id), Service::Calc);
    }

    #[test]
    fn unassigned_code_is_unknown() {
        // word 2 = 0x0200 -> 8
        let id = Identifier::new("00000000020000000000000000000000");
        assert_eq!(classify(&id), Service::Unknown);
    }

    #[test]
    fn undecodable_identifiers_are_unknown() {
        for raw in ["", "abc", "a-id", "0000000001", "zz000000010000000000"] {
            assert_eq!(classify(&Identifier::new(raw)), Service::Unknown, "{raw}");
        }
    }

    #[test]
    fn forge_round_trips_every_service() {
        for service in ALL {
            let id = Identifier::forge(service, [0xff; IDENTIFIER_BYTES]);
            assert_eq!(id.as_str().len(), IDENTIFIER_BYTES * 2);
            assert_eq!(classify(&id), service);
        }
    }

    #[test]
    fn forge_unknown_is_unknown() {
        let id = Identifier::forge(Service::Unknown, [0x5a; IDENTIFIER_BYTES]);
        assert_eq!(id.service(), Service::Unknown);
    }

    #[test]
    fn service_names_match_serde() {
        for service in ALL {
            let json = serde_json::to_string(&service).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", service.name()));
        }
    }

    #[test]
    fn identifier_serializes_as_string() {
        let id = Identifier::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap_or_default(), "\"abc\"");
    }
}
