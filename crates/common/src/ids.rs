use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(ArticulumId, "Typed wrapper for articulum UUIDs.");
define_id!(ProxyId, "Typed wrapper for proxy pool row UUIDs.");
define_id!(CatalogTaskId, "Typed wrapper for catalog task UUIDs.");
define_id!(ObjectTaskId, "Typed wrapper for object task UUIDs.");
define_id!(
    CatalogListingId,
    "Typed wrapper for catalog listing row UUIDs."
);
define_id!(ObjectDataId, "Typed wrapper for object data row UUIDs.");
define_id!(
    ValidationResultId,
    "Typed wrapper for validation result row UUIDs."
);
