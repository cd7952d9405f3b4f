use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Structured payload exchanged between threads.
pub type Payload = serde_json::Value;

macro_rules! uuid_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh, process-unique token.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_token!(
    /// Matches a service call to its response.
    CorrelationKey
);

uuid_token!(
    /// Identifies one stream session on a shared channel.
    SessionId
);

uuid_token!(
    /// Private key of a messenger instance, used to drop its own broadcasts.
    InstanceKey
);
