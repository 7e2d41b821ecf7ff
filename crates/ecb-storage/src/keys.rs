//! Key namespace of the backing store.
//!
//! Every key the command buffer and tick controller touch lives under the
//! `ECB:` prefix. The layout is shared with other implementations of the
//! same store and must not change.
//!
//! # Key Format
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┬────────────────────────────┐
//! │ Key                                                   │ Value                      │
//! ├───────────────────────────────────────────────────────┼────────────────────────────┤
//! │ ECB:NEXT-ENTITY-ID                                    │ decimal u64                │
//! │ ECB:COMPONENT-VALUE:TYPE-ID-{cid}:ENTITY-ID-{eid}     │ component JSON             │
//! │ ECB:ARCHETYPE-ID:ENTITY-ID-{eid}                      │ decimal archetype id       │
//! │ ECB:ACTIVE-ENTITY-IDS:ARCHETYPE-ID-{aid}              │ JSON array of entity ids   │
//! │ ECB:ARCHETYPE-ID-TO-COMPONENT-TYPES                   │ JSON {aid: [cid, ...]}     │
//! │ ECB:START-TICK / ECB:END-TICK                         │ decimal u64                │
//! │ ECB:PENDING-TRANSACTIONS                              │ JSON array of records      │
//! │ ECB:COMPONENT-SCHEMA:{name}                           │ component schema JSON      │
//! └───────────────────────────────────────────────────────┴────────────────────────────┘
//! ```

use std::fmt;

use ecb_ecs::{ArchetypeId, ComponentId, EntityId};

/// Next unassigned entity id.
pub const NEXT_ENTITY_ID: &str = "ECB:NEXT-ENTITY-ID";

/// Archetype id to component ids table.
pub const ARCHETYPE_TABLE: &str = "ECB:ARCHETYPE-ID-TO-COMPONENT-TYPES";

/// Number of ticks started.
pub const START_TICK: &str = "ECB:START-TICK";

/// Number of ticks finalized.
pub const END_TICK: &str = "ECB:END-TICK";

/// Transactions captured for the tick in flight.
pub const PENDING_TRANSACTIONS: &str = "ECB:PENDING-TRANSACTIONS";

/// Key holding the archetype of an entity.
#[must_use]
pub fn archetype_for_entity(entity: EntityId) -> String {
    format!("ECB:ARCHETYPE-ID:ENTITY-ID-{entity}")
}

/// Key holding the active entity list of an archetype.
#[must_use]
pub fn active_entities(archetype: ArchetypeId) -> String {
    format!("ECB:ACTIVE-ENTITY-IDS:ARCHETYPE-ID-{archetype}")
}

/// Key holding the schema a component was registered with.
#[must_use]
pub fn component_schema(name: &str) -> String {
    format!("ECB:COMPONENT-SCHEMA:{name}")
}

/// A key identifying a specific component on a specific entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentKey {
    /// Component type ID.
    pub component: ComponentId,
    /// Entity the value belongs to.
    pub entity: EntityId,
}

impl ComponentKey {
    /// Create a new component key.
    #[inline]
    #[must_use]
    pub const fn new(component: ComponentId, entity: EntityId) -> Self {
        Self { component, entity }
    }

    /// The store key for this value.
    #[must_use]
    pub fn store_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ECB:COMPONENT-VALUE:TYPE-ID-{}:ENTITY-ID-{}",
            self.component, self.entity
        )
    }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKey({:?}, {:?})", self.component, self.entity)
    }
}
