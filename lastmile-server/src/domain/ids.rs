//! Identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of any identifier.
const MAX_ID_LEN: usize = 64;

/// Error returned when parsing an invalid identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {reason}")]
pub struct InvalidId {
    kind: &'static str,
    reason: &'static str,
}

fn validate(kind: &'static str, s: &str) -> Result<(), InvalidId> {
    if s.is_empty() {
        return Err(InvalidId {
            kind,
            reason: "must not be empty",
        });
    }

    if s.len() > MAX_ID_LEN {
        return Err(InvalidId {
            kind,
            reason: "must be at most 64 characters",
        });
    }

    let valid = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':');
    if !s.bytes().all(valid) {
        return Err(InvalidId {
            kind,
            reason: "must contain only ASCII letters, digits, '_', '-', '.' or ':'",
        });
    }

    Ok(())
}

/// Defines a validated string identifier.
///
/// Every generated type guarantees 1-64 characters from `[A-Za-z0-9_.:-]`,
/// which keeps `|` free for use as a separator in composite keys.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse an identifier, rejecting empty, overlong or non-ASCII input.
            pub fn parse(s: &str) -> Result<Self, InvalidId> {
                validate($kind, s)?;
                Ok(Self(s.to_string()))
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidId;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                validate($kind, &s)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// A pickup station.
    StationId,
    "station id"
);
string_id!(
    /// A destination area served by routes (e.g. `"WHITEFIELD"`).
    DestArea,
    "destination area"
);
string_id!(RiderId, "rider id");
string_id!(DriverId, "driver id");
string_id!(
    /// A rider request record, assigned by the directory.
    RequestId,
    "request id"
);
string_id!(
    /// A driver route record, assigned by the registry.
    RouteId,
    "route id"
);
string_id!(
    /// A trip record.
    ///
    /// Besides ledger-assigned ids, the orchestrator stamps riders with a
    /// provisional id (see [`TripId::provisional`]) between seat reservation
    /// and trip creation.
    TripId,
    "trip id"
);

/// Prefix of provisional trip ids. Ledger ids never start with it.
const PROVISIONAL_PREFIX: &str = "provisional:";

impl TripId {
    /// Provisional trip id used while a match attempt holds seats under `hold`.
    pub fn provisional(hold: &HoldId) -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", hold.0.simple()))
    }
}

/// Key under which a match attempt holds seats on a route.
///
/// Generated per attempt as a UUID v7, so concurrent orchestrator
/// instances never share one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldId(uuid::Uuid);

impl HoldId {
    /// Generate a fresh hold id.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for HoldId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HoldId({})", self.0.simple())
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
