//! Component type registration and metadata.
//!
//! Every component type used in the ECS must be registered at runtime in a
//! [`ComponentRegistry`]. Registration produces a [`ComponentTypeId`] that is
//! used as the key for archetype signatures, column lookups and query matching.
//!
//! Identities are dense, start at zero and are never reused. The registry is
//! owned by a [`World`](crate::world::World); two worlds assign identities
//! independently.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::seq::Seq;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker for types that can be stored as components.
///
/// Storage moves component bytes with raw block copies and zero-fills new
/// cells, so a component must be plain old data: no pointers, no drop glue,
/// every bit pattern (including all zeroes) valid. Deriving
/// [`bytemuck::Pod`] and [`bytemuck::Zeroable`] on a `#[repr(C)]` struct is
/// the usual way to satisfy this.
pub trait Component: bytemuck::Pod + Send + Sync {}

impl<T: bytemuck::Pod + Send + Sync> Component for T {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
///
/// Ordering follows registration order; signatures are sorted by it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// The dense index of this identity.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Layout metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Human-readable name, `std::any::type_name` unless given explicitly.
    pub name: String,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId`, checked by typed cell access.
    pub type_id: TypeId,
}

impl ComponentInfo {
    /// Describe `T` without registering it.
    pub(crate) fn of<T: 'static>(id: ComponentTypeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Whether this info describes the Rust type `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentTypeId`]s and their layouts.
///
/// A type can only be registered once; subsequent registrations of the same
/// Rust `TypeId` return the existing [`ComponentTypeId`].
///
/// Every registry carries a process-unique instance id, so anything holding
/// identities it issued can check it is used with the same registry.
#[derive(Debug)]
pub struct ComponentRegistry {
    instance: u64,
    /// TypeId -> ComponentTypeId for dedup.
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Indexed by ComponentTypeId.0.
    infos: Seq<ComponentInfo>,
}

static NEXT_REGISTRY_INSTANCE: AtomicU64 = AtomicU64::new(0);

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self {
            instance: NEXT_REGISTRY_INSTANCE.fetch_add(1, Ordering::Relaxed),
            by_type: HashMap::new(),
            infos: Seq::new(),
        }
    }
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-unique id of this registry instance.
    #[inline]
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    /// Register `T` under its Rust type name.
    pub fn register<T: Component>(&mut self) -> ComponentTypeId {
        self.register_named::<T>(std::any::type_name::<T>())
    }

    /// Register `T` under the given `name`.
    ///
    /// If the type has already been registered, the existing
    /// [`ComponentTypeId`] is returned and `name` is ignored.
    pub fn register_named<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return existing;
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        let info = ComponentInfo::of::<T>(id, name);
        debug!(
            component = name,
            id = id.0,
            size = info.size,
            align = info.align,
            "registered component type"
        );
        self.infos.push(info);
        self.by_type.insert(rust_type_id, id);
        id
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// The identity assigned to `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered.
    pub fn type_id<T: 'static>(&self) -> ComponentTypeId {
        self.lookup::<T>().unwrap_or_else(|| {
            panic!(
                "component type `{}` is not registered -- call register_component::<T>() first",
                std::any::type_name::<T>()
            )
        })
    }

    /// Layout details of a registered identity.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn details(&self, id: ComponentTypeId) -> &ComponentInfo {
        self.get_info(id)
            .unwrap_or_else(|| panic!("{id:?} was not issued by this registry"))
    }

    /// Get the [`ComponentInfo`] for a component type ID, if issued.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.0 as usize)
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// All registered infos in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
