//! Component type registration and metadata.
//!
//! Components are serializable data types that can be attached to entities.
//! Each component type is registered once under a globally unique name and
//! receives a [`ComponentId`] together with a [`ComponentMetadata`]
//! descriptor holding everything the storage layer needs at runtime:
//! encode/decode functions, the JSON schema fingerprint, and the
//! default-value constructor.
//!
//! Registration is only legal until the registry is locked. After that the
//! set of components is frozen for the lifetime of the process.

use std::{any::Any, fmt, sync::Arc};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use smallvec::SmallVec;

use crate::error::{EcsError, EcsResult};

/// A type that can be attached to entities and persisted.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Health { value: i64 }
///
/// impl Component for Health {
///     const NAME: &'static str = "health";
/// }
/// ```
pub trait Component:
    Serialize + DeserializeOwned + Default + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Globally unique component name.
    const NAME: &'static str;

    /// JSON schema fingerprint used to detect incompatible changes across restarts.
    ///
    /// The default derives the shape of the serialized default value.
    fn schema() -> serde_json::Value {
        serde_json::to_value(Self::default()).map_or(serde_json::Value::Null, |v| shape_of(&v))
    }
}

/// Derive a structural schema from a JSON value.
#[must_use]
pub fn shape_of(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::{Value, json};

    match value {
        Value::Null => json!({ "type": "null" }),
        Value::Bool(_) => json!({ "type": "boolean" }),
        Value::Number(n) if n.is_f64() => json!({ "type": "number" }),
        Value::Number(_) => json!({ "type": "integer" }),
        Value::String(_) => json!({ "type": "string" }),
        Value::Array(items) => match items.first() {
            Some(first) => json!({ "type": "array", "items": shape_of(first) }),
            None => json!({ "type": "array" }),
        },
        Value::Object(fields) => {
            let properties: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(name, field)| (name.clone(), shape_of(field)))
                .collect();
            json!({ "type": "object", "properties": properties })
        }
    }
}

/// Object-safe view of a component value.
///
/// Lets the command buffer hold values of any registered component type
/// behind one pointer type.
pub trait ComponentValue: Any + fmt::Debug + Send + Sync {
    /// Name of the component type this value belongs to.
    fn component_name(&self) -> &'static str;

    /// Encode the value as JSON bytes.
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;

    /// Clone into a new box.
    fn clone_value(&self) -> Box<dyn ComponentValue>;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Component> ComponentValue for T {
    fn component_name(&self) -> &'static str {
        T::NAME
    }

    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    fn clone_value(&self) -> Box<dyn ComponentValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn ComponentValue {
    /// Borrow the concrete value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Check whether this value is a `T`.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl Clone for Box<dyn ComponentValue> {
    fn clone(&self) -> Self {
        self.clone_value()
    }
}

/// Unique identifier for a component type.
///
/// Ids are assigned sequentially starting at 1, in registration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Create a component ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type DecodeFn = fn(&[u8]) -> serde_json::Result<Box<dyn ComponentValue>>;
type DefaultFn = Arc<dyn Fn() -> Box<dyn ComponentValue> + Send + Sync>;

fn decode_value<T: Component>(bytes: &[u8]) -> serde_json::Result<Box<dyn ComponentValue>> {
    Ok(Box::new(serde_json::from_slice::<T>(bytes)?))
}

/// Runtime descriptor for a registered component type.
#[derive(Clone)]
pub struct ComponentMetadata {
    /// Unique ID for this component type.
    id: ComponentId,
    /// Registered name.
    name: &'static str,
    /// Serialized JSON schema.
    schema: Arc<[u8]>,
    decode_fn: DecodeFn,
    default_fn: DefaultFn,
}

impl ComponentMetadata {
    /// Create a descriptor for `T` using `T::default()` as the zero value.
    pub fn of<T: Component>(id: ComponentId) -> EcsResult<Self> {
        Self::with_default(id, T::default())
    }

    /// Create a descriptor for `T` with an explicit zero value.
    pub fn with_default<T: Component>(id: ComponentId, default: T) -> EcsResult<Self> {
        let schema = serde_json::to_vec(&T::schema())?;
        Ok(Self {
            id,
            name: T::NAME,
            schema: schema.into(),
            decode_fn: decode_value::<T>,
            default_fn: Arc::new(move || -> Box<dyn ComponentValue> {
                Box::new(default.clone())
            }),
        })
    }

    /// Get the component ID.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Get the registered name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Get the serialized schema.
    #[must_use]
    pub fn schema(&self) -> &[u8] {
        &self.schema
    }

    /// Check whether a previously stored schema describes the same shape.
    ///
    /// Comparison is structural, so formatting differences are ignored.
    #[must_use]
    pub fn schema_matches(&self, stored: &[u8]) -> bool {
        let ours = serde_json::from_slice::<serde_json::Value>(&self.schema);
        let theirs = serde_json::from_slice::<serde_json::Value>(stored);
        matches!((ours, theirs), (Ok(a), Ok(b)) if a == b)
    }

    /// Decode stored bytes into a value of this component.
    pub fn decode(&self, bytes: &[u8]) -> EcsResult<Box<dyn ComponentValue>> {
        Ok((self.decode_fn)(bytes)?)
    }

    /// Encode a value of this component.
    pub fn encode(&self, value: &dyn ComponentValue) -> EcsResult<Vec<u8>> {
        if value.component_name() != self.name {
            return Err(EcsError::ComponentTypeMismatch {
                expected: self.name,
                actual: value.component_name(),
            });
        }
        Ok(value.to_json()?)
    }

    /// Construct the registered zero value.
    #[must_use]
    pub fn default_value(&self) -> Box<dyn ComponentValue> {
        (self.default_fn)()
    }

    /// Check if this descriptor is for the given type.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.name == T::NAME
    }
}

impl fmt::Debug for ComponentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMetadata")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schema_len", &self.schema.len())
            .finish_non_exhaustive()
    }
}

/// Registry for component types, keyed by name.
#[derive(Default)]
pub struct ComponentRegistry {
    /// Map from component name to ComponentId.
    name_to_id: HashMap<&'static str, ComponentId>,
    /// Metadata indexed by `id - 1`.
    infos: Vec<ComponentMetadata>,
    locked: bool,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type and return its ID.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        self.insert(T::NAME, ComponentMetadata::of::<T>)
    }

    /// Register a component type with a custom zero value.
    pub fn register_with_default<T: Component>(&mut self, default: T) -> EcsResult<ComponentId> {
        self.insert(T::NAME, |id| ComponentMetadata::with_default(id, default))
    }

    fn insert(
        &mut self,
        name: &'static str,
        build: impl FnOnce(ComponentId) -> EcsResult<ComponentMetadata>,
    ) -> EcsResult<ComponentId> {
        if self.locked {
            return Err(EcsError::RegistryLocked { name });
        }
        if self.name_to_id.contains_key(name) {
            return Err(EcsError::DuplicateName { name });
        }

        let id = ComponentId(self.infos.len() as u32 + 1);
        let info = build(id)?;
        self.name_to_id.insert(name, id);
        self.infos.push(info);

        tracing::trace!("registered component {name} as {id:?}");
        Ok(id)
    }

    /// Freeze the registry. Further registrations fail.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Whether the registry has been locked.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Get the ID for a component type.
    pub fn id_of<T: Component>(&self) -> EcsResult<ComponentId> {
        self.id_by_name(T::NAME)
    }

    /// Get the ID for a component name.
    pub fn id_by_name(&self, name: &str) -> EcsResult<ComponentId> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| EcsError::ComponentNotRegistered {
                name: name.to_owned(),
            })
    }

    /// Get metadata for a component ID.
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&ComponentMetadata> {
        let index = id.as_raw().checked_sub(1)? as usize;
        self.infos.get(index)
    }

    /// Get metadata for a component ID, failing if it is unknown.
    pub fn metadata(&self, id: ComponentId) -> EcsResult<&ComponentMetadata> {
        self.get(id).ok_or(EcsError::UnknownComponentId(id))
    }

    /// Get metadata by component name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&ComponentMetadata> {
        self.name_to_id.get(name).and_then(|&id| self.get(id))
    }

    /// Resolve a list of IDs to their names.
    pub fn names(&self, ids: &[ComponentId]) -> EcsResult<SmallVec<[&'static str; 8]>> {
        ids.iter()
            .map(|&id| self.metadata(id).map(ComponentMetadata::name))
            .collect()
    }

    /// Iterate over all registered components in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentMetadata> {
        self.infos.iter()
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether no components are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.infos)
            .field("locked", &self.locked)
            .finish()
    }
}
