//! Query system for iterating entities by component set.
//!
//! A query names a tuple of component accesses such as `(&mut Pos, &Vel)`.
//! Its [`QueryShape`] is computed once: the requested identities in declared
//! order, a canonical ascending copy, and the permutation mapping canonical
//! positions back to declared ones. Each archetype is then matched with a
//! single merge walk over its sorted signature, and the callback receives
//! references in the order the caller declared them, whatever the
//! registration order of the types.
//!
//! ## Soundness
//!
//! Mutable iteration ([`Query::each`], [`Query::each_with_entity`]) takes
//! `&mut World`, so nothing else can observe the world while items are live
//! and the callback cannot change its structure. Read-only iteration
//! ([`Query::each_ref`]) takes `&World` and rejects queries containing
//! `&mut T`. A query naming the same component twice is rejected when its
//! shape is built, so two items never alias one cell.

use std::marker::PhantomData;
use std::ptr;

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::EntityId;
use crate::seq::Seq;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// QueryItem trait -- describes one element in a query tuple
// ---------------------------------------------------------------------------

/// A single element of a query: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    /// The component type accessed.
    type Component: Component;
    /// The output type yielded per-row.
    type Item<'w>;
    /// Whether this item borrows mutably.
    const MUTABLE: bool;

    /// Produce the item for `row` of a column starting at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the base pointer of an initialized column of
    /// `Self::Component` with more than `row` rows, valid for `'w`. For
    /// mutable items no other reference to the cell may exist during `'w`.
    unsafe fn fetch<'w>(base: *mut u8, row: usize) -> Self::Item<'w>;
}

impl<T: Component> QueryItem for &T {
    type Component = T;
    type Item<'w> = &'w T;
    const MUTABLE: bool = false;

    #[inline]
    unsafe fn fetch<'w>(base: *mut u8, row: usize) -> Self::Item<'w> {
        &*base.cast::<T>().add(row)
    }
}

impl<T: Component> QueryItem for &mut T {
    type Component = T;
    type Item<'w> = &'w mut T;
    const MUTABLE: bool = true;

    #[inline]
    unsafe fn fetch<'w>(base: *mut u8, row: usize) -> Self::Item<'w> {
        &mut *base.cast::<T>().add(row)
    }
}

// ---------------------------------------------------------------------------
// QueryParams trait -- describes a tuple of QueryItems
// ---------------------------------------------------------------------------

/// A tuple of query items: `(&A,)`, `(&mut A, &B)`, and so on up to six.
pub trait QueryParams {
    /// The per-row output type.
    type Item<'w>;
    /// Whether any item in this tuple borrows mutably.
    const HAS_MUTABLE: bool;

    /// Requested identities in declared order, or the name of the first
    /// component type `registry` does not know.
    fn type_ids(registry: &ComponentRegistry) -> Result<Seq<ComponentTypeId>, &'static str>;

    /// Fetch one row. `columns` is in declared order.
    ///
    /// # Safety
    ///
    /// Every pointer in `columns` must satisfy [`QueryItem::fetch`] for the
    /// matching tuple element and `row`.
    unsafe fn fetch_row<'w>(columns: &[*mut u8], row: usize) -> Self::Item<'w>;
}

macro_rules! impl_query_params {
    ($($name:ident => $idx:tt),+) => {
        impl<$($name: QueryItem),+> QueryParams for ($($name,)+) {
            type Item<'w> = ($(<$name as QueryItem>::Item<'w>,)+);
            const HAS_MUTABLE: bool = false $(|| <$name as QueryItem>::MUTABLE)+;

            fn type_ids(
                registry: &ComponentRegistry,
            ) -> Result<Seq<ComponentTypeId>, &'static str> {
                let mut ids = Seq::new();
                $(
                    let id = registry
                        .lookup::<<$name as QueryItem>::Component>()
                        .ok_or(std::any::type_name::<<$name as QueryItem>::Component>())?;
                    ids.push(id);
                )+
                Ok(ids)
            }

            #[inline]
            unsafe fn fetch_row<'w>(columns: &[*mut u8], row: usize) -> Self::Item<'w> {
                ($(<$name as QueryItem>::fetch(columns[$idx], row),)+)
            }
        }
    };
}

impl_query_params!(A => 0);
impl_query_params!(A => 0, B => 1);
impl_query_params!(A => 0, B => 1, C => 2);
impl_query_params!(A => 0, B => 1, C => 2, D => 3);
impl_query_params!(A => 0, B => 1, C => 2, D => 3, E => 4);
impl_query_params!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

// ---------------------------------------------------------------------------
// QueryShape
// ---------------------------------------------------------------------------

/// The requested component set of a query, in declared and canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    requested: Seq<ComponentTypeId>,
    canonical: Seq<ComponentTypeId>,
    /// `permutation[i]` is the declared position of `canonical[i]`.
    permutation: Seq<usize>,
}

impl QueryShape {
    /// Build the shape for `requested` identities in declared order.
    ///
    /// # Panics
    ///
    /// Panics if an identity appears more than once.
    pub fn new(requested: Seq<ComponentTypeId>) -> Self {
        let mut order: Vec<usize> = (0..requested.len()).collect();
        order.sort_by_key(|&i| requested[i]);

        let canonical: Seq<ComponentTypeId> = order.iter().map(|&i| requested[i]).collect();
        if let Some(pair) = canonical.as_slice().windows(2).find(|w| w[0] == w[1]) {
            panic!(
                "query requests {:?} more than once; a component can appear only once per query",
                pair[0]
            );
        }

        Self {
            requested,
            canonical,
            permutation: order.into_iter().collect(),
        }
    }

    pub fn requested(&self) -> &[ComponentTypeId] {
        self.requested.as_slice()
    }

    pub fn canonical(&self) -> &[ComponentTypeId] {
        self.canonical.as_slice()
    }

    pub fn permutation(&self) -> &[usize] {
        self.permutation.as_slice()
    }

    /// Number of requested components.
    pub fn len(&self) -> usize {
        self.requested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A prepared query over the component tuple `Q`.
///
/// The shape is resolved against a registry once; the query can then be run
/// any number of times against the world that owns that registry.
///
/// ```
/// use tessera_ecs::prelude::*;
///
/// #[repr(C)]
/// #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Pos { x: f32, y: f32 }
///
/// #[repr(C)]
/// #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Vel { dx: f32, dy: f32 }
///
/// let mut world = World::new();
/// world.register_component::<Pos>();
/// world.register_component::<Vel>();
///
/// let e = world.create_entity();
/// world.set_component(e, Pos { x: 0.0, y: 0.0 });
/// world.set_component(e, Vel { dx: 1.0, dy: 2.0 });
///
/// let movement = world.query::<(&Vel, &mut Pos)>();
/// movement.each(&mut world, |(vel, pos)| {
///     pos.x += vel.dx;
///     pos.y += vel.dy;
/// });
/// assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 1.0, y: 2.0 }));
/// ```
pub struct Query<Q: QueryParams> {
    shape: QueryShape,
    /// Instance id of the registry the shape was resolved against.
    registry: u64,
    _marker: PhantomData<fn() -> Q>,
}

impl<Q: QueryParams> std::fmt::Debug for Query<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("params", &std::any::type_name::<Q>())
            .field("shape", &self.shape)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<Q: QueryParams> Query<Q> {
    /// Resolve `Q` against `registry`.
    ///
    /// # Panics
    ///
    /// Panics if a component in `Q` is not registered or appears twice.
    pub fn new(registry: &ComponentRegistry) -> Self {
        Self::try_new(registry).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Fallible form of [`new`](Self::new) for unregistered components.
    ///
    /// # Panics
    ///
    /// Panics if a component appears twice in `Q`.
    pub fn try_new(registry: &ComponentRegistry) -> Result<Self, EcsError> {
        let requested =
            Q::type_ids(registry).map_err(|name| EcsError::UnregisteredComponent { name })?;
        Ok(Self {
            shape: QueryShape::new(requested),
            registry: registry.instance_id(),
            _marker: PhantomData,
        })
    }

    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /// Invoke `f` once per matching row, archetypes in creation order and
    /// rows in storage order.
    ///
    /// # Panics
    ///
    /// Panics if `world` does not own the registry this query was resolved
    /// against. The same holds for every other method taking a world.
    pub fn each<'w, F>(&self, world: &'w mut World, mut f: F)
    where
        F: FnMut(Q::Item<'w>),
    {
        self.each_with_entity(world, |_, item| f(item));
    }

    /// Like [`each`](Self::each), also passing the entity owning the row.
    pub fn each_with_entity<'w, F>(&self, world: &'w mut World, f: F)
    where
        F: FnMut(EntityId, Q::Item<'w>),
    {
        // SAFETY: `world` is borrowed exclusively for `'w`.
        unsafe { self.run(world, f) }
    }

    /// Read-only iteration through a shared borrow of the world.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains a `&mut T` item; use [`each`](Self::each) instead.
    pub fn each_ref<'w, F>(&self, world: &'w World, f: F)
    where
        F: FnMut(EntityId, Q::Item<'w>),
    {
        assert!(
            !Q::HAS_MUTABLE,
            "Query::each_ref() cannot be used with mutable query items (&mut T). \
             Use Query::each() instead, which requires &mut World."
        );
        // SAFETY: every item is a shared reference.
        unsafe { self.run(world, f) }
    }

    /// Number of rows the query would visit.
    pub fn count(&self, world: &World) -> usize {
        self.check_world(world);
        let mut columns = vec![ptr::null_mut(); self.shape.len()];
        world
            .archetypes()
            .iter()
            .map(|archetype| {
                archetype.try_match(
                    self.shape.canonical(),
                    self.shape.permutation(),
                    &mut columns,
                )
            })
            .sum()
    }

    /// # Safety
    ///
    /// If `Q` has mutable items the caller must hold `world` exclusively for `'w`.
    unsafe fn run<'w, F>(&self, world: &'w World, mut f: F)
    where
        F: FnMut(EntityId, Q::Item<'w>),
    {
        self.check_world(world);
        let mut columns = vec![ptr::null_mut(); self.shape.len()];
        for archetype in world.archetypes().iter() {
            let rows = archetype.try_match(
                self.shape.canonical(),
                self.shape.permutation(),
                &mut columns,
            );
            let entities = archetype.entities();
            for (row, &entity) in entities.iter().enumerate().take(rows) {
                // `columns` holds, in declared order, the base pointers of
                // initialized columns with `rows` rows; each row is fetched once.
                f(entity, Q::fetch_row(&columns, row));
            }
        }
    }

    /// Component identities are only meaningful in the registry that issued them.
    fn check_world(&self, world: &World) {
        assert_eq!(
            self.registry,
            world.registry().instance_id(),
            "query was resolved against a different world's component registry"
        );
    }
}

// ---------------------------------------------------------------------------
// World query methods
// ---------------------------------------------------------------------------

impl World {
    /// Prepare a query over `Q`.
    ///
    /// # Panics
    ///
    /// Panics if a component in `Q` is not registered or appears twice.
    pub fn query<Q: QueryParams>(&self) -> Query<Q> {
        Query::new(self.registry())
    }

    /// Prepare a query and run it once with [`Query::each`].
    ///
    /// ```ignore
    /// world.each::<(&mut Pos, &Vel), _>(|(pos, vel)| {
    ///     pos.x += vel.dx;
    ///     pos.y += vel.dy;
    /// });
    /// ```
    pub fn each<'w, Q, F>(&'w mut self, f: F)
    where
        Q: QueryParams,
        F: FnMut(Q::Item<'w>),
    {
        let query = self.query::<Q>();
        query.each(self, f);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Health(u32);

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Frozen([u8; 0]);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Pos>();
        world.register_component::<Vel>();
        world.register_component::<Health>();
        world
    }

    fn spawn_moving(world: &mut World, pos: Pos, vel: Vel) -> EntityId {
        let e = world.create_entity();
        world.set_component(e, pos);
        world.set_component(e, vel);
        e
    }

    #[test]
    fn shape_sorts_and_records_permutation() {
        let ids: Seq<ComponentTypeId> = [2, 0, 1].into_iter().map(ComponentTypeId).collect();
        let shape = QueryShape::new(ids);
        assert_eq!(
            shape.canonical(),
            &[ComponentTypeId(0), ComponentTypeId(1), ComponentTypeId(2)]
        );
        assert_eq!(shape.permutation(), &[1, 2, 0]);
        for (i, &declared) in shape.permutation().iter().enumerate() {
            assert_eq!(shape.requested()[declared], shape.canonical()[i]);
        }
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn duplicate_component_panics() {
        let world = setup_world();
        world.query::<(&mut Pos, &Pos)>();
    }

    #[test]
    fn query_matching_only() {
        let mut world = setup_world();
        let e1 = spawn_moving(
            &mut world,
            Pos { x: 1.0, y: 2.0 },
            Vel { dx: 3.0, dy: 4.0 },
        );
        let lone = world.create_entity();
        world.set_component(lone, Pos { x: 10.0, y: 20.0 });

        let mut seen = Vec::new();
        world
            .query::<(&Pos, &Vel)>()
            .each_ref(&world, |entity, (pos, vel)| seen.push((entity, *pos, *vel)));
        assert_eq!(
            seen,
            vec![(e1, Pos { x: 1.0, y: 2.0 }, Vel { dx: 3.0, dy: 4.0 })]
        );
    }

    #[test]
    fn reversed_order_gets_matching_references() {
        let mut world = setup_world();
        for i in 0..2 {
            let still = world.create_entity();
            world.set_component(still, Pos { x: i as f32, y: 0.0 });
        }
        let e = spawn_moving(
            &mut world,
            Pos { x: 5.0, y: 6.0 },
            Vel { dx: 0.5, dy: -0.5 },
        );

        let mut visited = Vec::new();
        world
            .query::<(&Vel, &mut Pos)>()
            .each_with_entity(&mut world, |entity, (vel, pos)| {
                assert_eq!(*vel, Vel { dx: 0.5, dy: -0.5 });
                pos.x += vel.dx;
                pos.y += vel.dy;
                visited.push(entity);
            });
        assert_eq!(visited, vec![e]);
        assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 5.5, y: 5.5 }));
    }

    #[test]
    fn query_spans_archetypes_in_creation_order() {
        let mut world = setup_world();
        let plain = world.create_entity();
        world.set_component(plain, Pos { x: 1.0, y: 0.0 });
        let moving = spawn_moving(&mut world, Pos { x: 2.0, y: 0.0 }, Vel { dx: 0.0, dy: 0.0 });
        let healthy = world.create_entity();
        world.set_component(healthy, Health(3));
        world.set_component(healthy, Pos { x: 3.0, y: 0.0 });

        let query = world.query::<(&Pos,)>();
        assert_eq!(query.count(&world), 3);

        let mut order = Vec::new();
        query.each_ref(&world, |entity, _| order.push(entity));
        assert_eq!(order, vec![plain, moving, healthy]);
    }

    #[test]
    fn mutable_query_modifies_every_row() {
        let mut world = setup_world();
        let entities: Vec<EntityId> = (0..20)
            .map(|i| {
                spawn_moving(
                    &mut world,
                    Pos { x: i as f32, y: 0.0 },
                    Vel { dx: 1.0, dy: 2.0 },
                )
            })
            .collect();

        let movement = world.query::<(&mut Pos, &Vel)>();
        for _ in 0..3 {
            movement.each(&mut world, |(pos, vel)| {
                pos.x += vel.dx;
                pos.y += vel.dy;
            });
        }

        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(
                world.get_component::<Pos>(e),
                Some(&Pos { x: i as f32 + 3.0, y: 6.0 })
            );
        }
    }

    #[test]
    fn each_with_entity_reports_owner() {
        let mut world = setup_world();
        let a = world.create_entity();
        world.set_component(a, Health(1));
        let b = world.create_entity();
        world.set_component(b, Health(2));

        world
            .query::<(&mut Health,)>()
            .each_with_entity(&mut world, |entity, (health,)| {
                health.0 += entity.to_raw() * 10;
            });
        assert_eq!(world.get_component::<Health>(a), Some(&Health(1)));
        assert_eq!(world.get_component::<Health>(b), Some(&Health(12)));
    }

    #[test]
    fn no_matches_visits_nothing() {
        let mut world = setup_world();
        for i in 0..5 {
            let e = world.create_entity();
            world.set_component(e, Pos { x: i as f32, y: 0.0 });
        }
        let query = world.query::<(&Pos, &Vel)>();
        assert_eq!(query.count(&world), 0);
        query.each(&mut world, |_| panic!("no archetype stores both"));
    }

    #[test]
    fn zero_sized_components_are_queryable() {
        let mut world = setup_world();
        world.register_component::<Frozen>();
        let e = world.create_entity();
        world.set_component(e, Frozen([]));
        world.set_component(e, Health(7));

        let mut seen = Vec::new();
        world
            .query::<(&Frozen, &Health)>()
            .each_ref(&world, |entity, (_, health)| seen.push((entity, health.0)));
        assert_eq!(seen, vec![(e, 7)]);
    }

    #[test]
    fn unregistered_component_is_an_error() {
        let world = setup_world();
        let err = Query::<(&Pos, &Frozen)>::try_new(world.registry()).unwrap_err();
        assert!(matches!(err, EcsError::UnregisteredComponent { .. }));
    }

    #[test]
    #[should_panic(expected = "different world's component registry")]
    fn query_from_another_world_panics() {
        let mut first = World::new();
        first.register_component::<Health>();
        first.register_component::<Pos>();
        let health_query = first.query::<(&mut Health,)>();

        // Same types, opposite identities: Health's id here names Pos.
        let mut second = World::new();
        second.register_component::<Pos>();
        second.register_component::<Health>();
        let e = second.create_entity();
        second.set_component(e, Pos { x: 1.5, y: 2.0 });

        health_query.each(&mut second, |(health,)| health.0 = 0xdead_beef);
    }

    #[test]
    #[should_panic(expected = "different world's component registry")]
    fn count_on_another_world_panics() {
        let first = setup_world();
        let second = setup_world();
        first.query::<(&Pos,)>().count(&second);
    }

    #[test]
    fn query_is_reusable_on_its_own_world() {
        let mut world = setup_world();
        let query = world.query::<(&Health,)>();
        let e = world.create_entity();
        world.set_component(e, Health(4));
        assert_eq!(query.count(&world), 1);
    }

    #[test]
    #[should_panic(expected = "cannot be used with mutable query items")]
    fn each_ref_rejects_mutable_items() {
        let world = setup_world();
        world.query::<(&mut Pos,)>().each_ref(&world, |_, _| {});
    }
}
