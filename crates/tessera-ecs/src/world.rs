//! The [`World`] is the top-level container for the ECS. It owns the entity
//! index, the per-entity location records, the component registry, and all
//! archetype storage.
//!
//! Structural changes go through the world: creating an entity places it in
//! the empty archetype, and adding or removing a component *migrates* the
//! entity's row to the archetype whose signature matches its new component
//! set.

use tracing::{debug, trace};

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::config::WorldConfig;
use crate::entity::{EntityId, EntityIndex};
use crate::seq::Seq;
use crate::sparse_map::SparseBitMap;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Entity location
// ---------------------------------------------------------------------------

/// Where an entity lives: which archetype and which row within that archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: ArchetypeId,
    pub row: usize,
}

// ---------------------------------------------------------------------------
// Transitions -- cached archetype edges
// ---------------------------------------------------------------------------

/// Destination archetypes already resolved from one archetype, keyed by the
/// component type added or removed.
#[derive(Debug, Default)]
struct Transitions {
    add: SparseBitMap<ArchetypeId>,
    remove: SparseBitMap<ArchetypeId>,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level ECS container.
///
/// Archetype 0 always has the empty signature. Archetypes are created the
/// first time an entity needs their signature and are never removed.
pub struct World {
    index: EntityIndex,
    /// Indexed by the entity's dense slot in `index`.
    records: Seq<EntityLocation>,
    registry: ComponentRegistry,
    /// All archetypes, indexed by `ArchetypeId.0`.
    archetypes: Seq<Archetype>,
    /// Parallel to `archetypes`.
    transitions: Seq<Transitions>,
    config: WorldConfig,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.index.len())
            .field("archetype_count", &self.archetypes.len())
            .field("component_count", &self.registry.len())
            .finish()
    }
}

impl World {
    /// Create a new world with the default configuration.
    pub fn new() -> Self {
        Self::build(WorldConfig::default(), ComponentRegistry::new())
    }

    /// Create a world from a validated configuration.
    pub fn with_config(config: WorldConfig) -> Result<Self, EcsError> {
        config.validate()?;
        Ok(Self::build(config, ComponentRegistry::new()))
    }

    /// Create a world around an existing registry, keeping its identities.
    pub fn with_registry(registry: ComponentRegistry) -> Self {
        Self::build(WorldConfig::default(), registry)
    }

    fn build(config: WorldConfig, registry: ComponentRegistry) -> Self {
        let mut world = Self {
            index: EntityIndex::with_capacity(config.entity_capacity),
            records: Seq::with_capacity(config.entity_capacity),
            registry,
            archetypes: Seq::new(),
            transitions: Seq::new(),
            config,
        };
        let empty = world.find_or_create_archetype(Seq::new());
        debug_assert_eq!(empty, ArchetypeId::EMPTY);
        world
    }

    /// The configuration this world was built with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type. Idempotent.
    pub fn register_component<T: Component>(&mut self) -> ComponentTypeId {
        self.registry.register::<T>()
    }

    /// Register a component type under an explicit name. Idempotent.
    pub fn register_component_named<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        self.registry.register_named::<T>(name)
    }

    /// The identity assigned to `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered.
    pub fn component_type_id<T: Component>(&self) -> ComponentTypeId {
        self.registry.type_id::<T>()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity with no components.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.index.create();
        let slot = self.index.slot(entity);
        let row = self.archetypes[ArchetypeId::EMPTY.index()].add_entity(entity);
        let location = EntityLocation {
            archetype_id: ArchetypeId::EMPTY,
            row,
        };
        if slot == self.records.len() {
            self.records.push(location);
        } else {
            self.records[slot] = location;
        }
        entity
    }

    /// Destroy an entity, dropping its row and recycling its identity.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not live.
    pub fn destroy_entity(&mut self, entity: EntityId) {
        if let Err(err) = self.try_destroy_entity(entity) {
            panic!("{err}");
        }
    }

    /// Fallible form of [`destroy_entity`](Self::destroy_entity).
    pub fn try_destroy_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let location = self.live_location(entity)?;
        self.remove_row(location);
        if let Some(swap) = self.index.destroy(entity) {
            self.records.swap(swap.freed, swap.last);
        }
        trace!(?entity, archetype = location.archetype_id.0, "destroyed entity");
        Ok(())
    }

    /// Whether `entity` is live.
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.index.is_live(entity)
    }

    /// The live entities, in dense-slot order.
    ///
    /// The slice borrows the world, so the world cannot change while it is held.
    pub fn entities(&self) -> &[EntityId] {
        self.index.live()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.index.len()
    }

    /// Where `entity` is stored, or `None` if it is not live.
    pub fn location_of(&self, entity: EntityId) -> Option<EntityLocation> {
        self.live_location(entity).ok()
    }

    /// The signature of the archetype holding `entity`.
    pub fn signature_of(&self, entity: EntityId) -> Option<&[ComponentTypeId]> {
        let location = self.location_of(entity)?;
        Some(self.archetypes[location.archetype_id.index()].signature())
    }

    // -- component access ---------------------------------------------------

    /// Set a component on an entity.
    ///
    /// If the entity already has `T` the value is overwritten in place.
    /// Otherwise the entity migrates to the archetype whose signature adds `T`.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not live or `T` is not registered.
    pub fn set_component<T: Component>(&mut self, entity: EntityId, value: T) {
        if let Err(err) = self.try_set_component(entity, value) {
            panic!("{err}");
        }
    }

    /// Fallible form of [`set_component`](Self::set_component).
    pub fn try_set_component<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        let type_id = self.lookup::<T>()?;
        let location = self.live_location(entity)?;

        let archetype = &mut self.archetypes[location.archetype_id.index()];
        if archetype.has_component(type_id) {
            archetype.set_component(location.row, type_id, value);
            return Ok(());
        }

        let dest = self.archetype_with_added(location.archetype_id, type_id);
        let new_row = self.migrate(entity, location, dest);
        self.archetypes[dest.index()].set_component(new_row, type_id, value);
        Ok(())
    }

    /// Remove a component from an entity and return its value.
    ///
    /// The entity migrates to the archetype whose signature lacks `T`.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not live, `T` is not registered, or the entity
    /// has no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> T {
        self.try_remove_component(entity)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Fallible form of [`remove_component`](Self::remove_component).
    pub fn try_remove_component<T: Component>(&mut self, entity: EntityId) -> Result<T, EcsError> {
        let type_id = self.lookup::<T>()?;
        let location = self.live_location(entity)?;

        let value = self.archetypes[location.archetype_id.index()]
            .get::<T>(location.row, type_id)
            .copied()
            .ok_or(EcsError::MissingComponent {
                entity,
                component: std::any::type_name::<T>(),
            })?;

        let dest = self.archetype_with_removed(location.archetype_id, type_id);
        self.migrate(entity, location, dest);
        Ok(value)
    }

    /// Get an immutable reference to a component on an entity.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let location = self.location_of(entity)?;
        let type_id = self.registry.lookup::<T>()?;
        self.archetypes[location.archetype_id.index()].get::<T>(location.row, type_id)
    }

    /// Get a mutable reference to a component on an entity.
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let location = self.location_of(entity)?;
        let type_id = self.registry.lookup::<T>()?;
        self.archetypes[location.archetype_id.index()].get_mut::<T>(location.row, type_id)
    }

    /// Check whether an entity has a given component type.
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        let Some(location) = self.location_of(entity) else {
            return false;
        };
        let Some(type_id) = self.registry.lookup::<T>() else {
            return false;
        };
        self.archetypes[location.archetype_id.index()].has_component(type_id)
    }

    // -- archetype access ---------------------------------------------------

    /// Total number of archetypes, including the empty one.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// All archetypes in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        self.archetypes.as_slice()
    }

    // -- internal helpers ---------------------------------------------------

    fn lookup<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.registry
            .lookup::<T>()
            .ok_or(EcsError::UnregisteredComponent {
                name: std::any::type_name::<T>(),
            })
    }

    fn live_location(&self, entity: EntityId) -> Result<EntityLocation, EcsError> {
        if !self.index.is_live(entity) {
            return Err(EcsError::DeadEntity { entity });
        }
        Ok(self.records[self.index.slot(entity)])
    }

    /// Swap-remove the row at `location` and repoint the entity moved into it.
    fn remove_row(&mut self, location: EntityLocation) {
        let moved = self.archetypes[location.archetype_id.index()].remove_row(location.row);
        if let Some(moved) = moved {
            let slot = self.index.slot(moved);
            self.records[slot].row = location.row;
        }
    }

    /// Move `entity` from `from` into a new row of `dest`, carrying over every
    /// component `dest` stores. Returns the new row.
    fn migrate(&mut self, entity: EntityId, from: EntityLocation, dest: ArchetypeId) -> usize {
        let (source, target) = pair_mut(
            self.archetypes.as_mut_slice(),
            from.archetype_id.index(),
            dest.index(),
        );
        let new_row = target.add_entity(entity);
        source.copy_row_into(from.row, target, new_row);

        self.remove_row(from);
        let slot = self.index.slot(entity);
        self.records[slot] = EntityLocation {
            archetype_id: dest,
            row: new_row,
        };
        trace!(
            ?entity,
            from = from.archetype_id.0,
            to = dest.0,
            row = new_row,
            "migrated entity"
        );
        new_row
    }

    /// The archetype reached from `source` by adding `type_id`.
    fn archetype_with_added(&mut self, source: ArchetypeId, type_id: ComponentTypeId) -> ArchetypeId {
        if let Some(&dest) = self.transitions[source.index()].add.get(type_id.index()) {
            return dest;
        }
        let mut signature: Seq<ComponentTypeId> =
            self.archetypes[source.index()].signature().iter().copied().collect();
        match signature.as_slice().binary_search(&type_id) {
            Ok(_) => panic!("{type_id:?} is already in archetype {source:?}"),
            Err(pos) => signature.insert(pos, type_id),
        }
        let dest = self.find_or_create_archetype(signature);
        self.cache_transition(source, dest, type_id);
        dest
    }

    /// The archetype reached from `source` by removing `type_id`.
    fn archetype_with_removed(
        &mut self,
        source: ArchetypeId,
        type_id: ComponentTypeId,
    ) -> ArchetypeId {
        if let Some(&dest) = self.transitions[source.index()].remove.get(type_id.index()) {
            return dest;
        }
        let mut signature: Seq<ComponentTypeId> =
            self.archetypes[source.index()].signature().iter().copied().collect();
        match signature.as_slice().binary_search(&type_id) {
            Ok(pos) => {
                signature.remove(pos);
            }
            Err(_) => panic!("{type_id:?} is not in archetype {source:?}"),
        }
        let dest = self.find_or_create_archetype(signature);
        self.cache_transition(dest, source, type_id);
        dest
    }

    /// Record that `narrow` plus `type_id` is `wide`, in both directions.
    fn cache_transition(&mut self, narrow: ArchetypeId, wide: ArchetypeId, type_id: ComponentTypeId) {
        self.transitions[narrow.index()].add.insert(type_id.index(), wide);
        self.transitions[wide.index()].remove.insert(type_id.index(), narrow);
    }

    /// Find the archetype with exactly `signature`, creating it if needed.
    fn find_or_create_archetype(&mut self, signature: Seq<ComponentTypeId>) -> ArchetypeId {
        if let Some(existing) = self
            .archetypes
            .iter()
            .find(|archetype| archetype.signature() == signature.as_slice())
        {
            return existing.id();
        }

        let id = ArchetypeId(self.archetypes.len() as u32);
        debug!(archetype = id.0, ?signature, "created archetype");
        self.archetypes.push(Archetype::new(
            id,
            signature,
            &self.registry,
            self.config.min_group_capacity,
        ));
        self.transitions.push(Transitions::default());
        id
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrow two distinct archetypes mutably.
fn pair_mut(archetypes: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    assert_ne!(a, b, "cannot migrate an entity into its own archetype");
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
