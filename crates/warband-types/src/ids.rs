//! Type-safe identifier wrappers around store keys.
//!
//! Records in the world store are addressed by string keys (push-style ids
//! generated by whichever subsystem created the record). Every entity gets
//! a strongly-typed wrapper so a group id can never be passed where a unit
//! id is expected. Fresh ids generated by the engine use UUID v7
//! (time-ordered) in simple form, so they sort by creation time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a `String` key with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7().simple().to_string())
            }

            /// Borrow the raw store key.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the key is empty (record arrived without an id).
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }
    };
}

define_id! {
    /// Identifier of a group (a mobile collection of units).
    GroupId
}

define_id! {
    /// Identifier of a single unit inside a group.
    UnitId
}

define_id! {
    /// Identifier of a player account.
    PlayerId
}

define_id! {
    /// Identifier of a structure standing on a tile.
    StructureId
}

define_id! {
    /// Identifier of a battle record.
    BattleId
}

define_id! {
    /// Identifier of an item (loot, inventory, tile treasure).
    ItemId
}

define_id! {
    /// Identifier of a world event-log entry.
    EventId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_non_empty() {
        let a = GroupId::new();
        let b = GroupId::new();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = UnitId::from("u-17");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"u-17\""));
    }

    #[test]
    fn id_display_matches_key() {
        let id = BattleId::from("battle-9");
        assert_eq!(id.to_string(), "battle-9");
    }
}
