//! Type-safe identifier wrappers around [`String`].
//!
//! Identifiers arrive on the wire as free-form header values and JSON
//! fields, so they are string-backed rather than [`uuid::Uuid`]-backed.
//! Participants that need a fresh identity (content sources, query
//! clients) generate one with [`SourceId::generate`], which uses a random
//! UUID v4 rendered as text.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identity of a process talking to the aggregator.
    ///
    /// Content sources send it in the `ServerID` header; the aggregator
    /// tracks liveness per source and evicts readings of silent sources.
    SourceId
}

define_id! {
    /// Name of a weather station, taken from the `id` field of a reading.
    StationId
}

impl SourceId {
    /// Generate a fresh, globally unique identity (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
