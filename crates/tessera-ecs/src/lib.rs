//! Tessera ECS -- archetype-based Entity Component System.
//!
//! Entities are stored in archetypes (one per unique set of component types)
//! using a Structure-of-Arrays layout for cache-friendly iteration. Entity
//! identities are compact `u32` handles allocated from a sparse set and
//! reused after destruction.
//!
//! # Quick Start
//!
//! ```
//! use tessera_ecs::prelude::*;
//!
//! #[repr(C)]
//! #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
//! struct Position { x: f32, y: f32 }
//!
//! #[repr(C)]
//! #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>();
//! world.register_component::<Velocity>();
//!
//! let entity = world.create_entity();
//! world.set_component(entity, Position { x: 0.0, y: 0.0 });
//! world.set_component(entity, Velocity { dx: 1.0, dy: 0.0 });
//!
//! world.each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! });
//!
//! assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 1.0, y: 0.0 }));
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
pub mod component;
pub mod config;
pub mod entity;
#[allow(unsafe_code)]
pub mod query;
pub mod seq;
pub mod sparse_map;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity was destroyed or never created.
    #[error("entity {entity:?} is not live (destroyed or never created)")]
    DeadEntity { entity: entity::EntityId },

    /// A component type was used before being registered.
    #[error("component type `{name}` is not registered -- call register_component::<T>() first")]
    UnregisteredComponent { name: &'static str },

    /// The entity does not have the requested component.
    #[error("entity {entity:?} has no `{component}` component")]
    MissingComponent {
        entity: entity::EntityId,
        component: &'static str,
    },

    /// A configuration value is out of range.
    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A configuration document could not be parsed.
    #[error("failed to parse world config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::config::WorldConfig;
    pub use crate::entity::EntityId;
    pub use crate::query::{Query, QueryItem, QueryParams, QueryShape};
    pub use crate::world::{EntityLocation, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Health(u32);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component_named::<Position>("position");
        world.register_component_named::<Velocity>("velocity");
        world.register_component_named::<Health>("health");
        world
    }

    fn raw(ids: &[u32]) -> Vec<EntityId> {
        ids.iter().copied().map(EntityId::from_raw).collect()
    }

    // -- entity lifecycle ---------------------------------------------------

    #[test]
    fn create_destroy_reuse_sequence() {
        let mut world = World::new();
        let e: Vec<EntityId> = (0..8).map(|_| world.create_entity()).collect();
        assert_eq!(e, raw(&[0, 1, 2, 3, 4, 5, 6, 7]));

        world.destroy_entity(e[5]);
        world.destroy_entity(e[0]);
        assert_eq!(world.entities(), raw(&[6, 1, 2, 3, 4, 7]).as_slice());

        assert_eq!(world.create_entity(), e[0]);
        assert_eq!(world.create_entity(), e[5]);

        let third = world.entities()[3];
        world.destroy_entity(third);
        assert_eq!(world.entities(), raw(&[6, 1, 2, 5, 4, 7, 0]).as_slice());
        assert_eq!(world.entity_count(), 7);
        assert!(world.entities().iter().all(|&id| id.to_raw() < 8));
    }

    #[test]
    fn destroy_entity_verify_gone() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.set_component(e, Position { x: 0.0, y: 0.0 });
        world.destroy_entity(e);
        assert!(!world.is_live(e));
        assert_eq!(world.get_component::<Position>(e), None);
        assert_eq!(world.entity_count(), 0);
    }

    // -- components ---------------------------------------------------------

    #[test]
    fn position_velocity_scenario() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.set_component(e, Position { x: 2.0, y: 3.0 });
        world.set_component(e, Velocity { dx: 1.0, dy: 1.5 });

        let pos_id = world.component_type_id::<Position>();
        let vel_id = world.component_type_id::<Velocity>();
        assert_eq!(world.signature_of(e), Some(&[pos_id, vel_id][..]));

        let mut both = Vec::new();
        world
            .query::<(&Position, &Velocity)>()
            .each_ref(&world, |entity, (pos, vel)| both.push((entity, *pos, *vel)));
        assert_eq!(
            both,
            vec![(e, Position { x: 2.0, y: 3.0 }, Velocity { dx: 1.0, dy: 1.5 })]
        );

        let mut positions = Vec::new();
        world
            .query::<(&Position,)>()
            .each_ref(&world, |entity, (pos,)| positions.push((entity, *pos)));
        assert_eq!(positions, vec![(e, Position { x: 2.0, y: 3.0 })]);

        world.each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
            pos.x += vel.dx;
            pos.y += vel.dy;
        });
        assert_eq!(
            world.get_component::<Position>(e),
            Some(&Position { x: 3.0, y: 4.5 })
        );
    }

    #[test]
    fn reversed_query_order_scenario() {
        let mut world = setup_world();
        let first = world.create_entity();
        world.set_component(first, Position { x: 0.0, y: 0.0 });
        let second = world.create_entity();
        world.set_component(second, Position { x: 1.0, y: 1.0 });
        let third = world.create_entity();
        world.set_component(third, Position { x: 2.0, y: 3.0 });
        world.set_component(third, Velocity { dx: 1.0, dy: 1.5 });

        let mut seen = Vec::new();
        world
            .query::<(&Velocity, &Position)>()
            .each_ref(&world, |entity, (vel, pos)| seen.push((entity, *vel, *pos)));
        assert_eq!(
            seen,
            vec![(third, Velocity { dx: 1.0, dy: 1.5 }, Position { x: 2.0, y: 3.0 })]
        );
        assert_eq!(world.query::<(&Position,)>().count(&world), 3);
    }

    #[test]
    fn remove_component_round_trip() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.set_component(e, Position { x: 1.0, y: 2.0 });
        world.set_component(e, Velocity { dx: 3.0, dy: 4.0 });

        let vel = world.remove_component::<Velocity>(e);
        assert_eq!(vel, Velocity { dx: 3.0, dy: 4.0 });
        assert!(!world.has_component::<Velocity>(e));
        assert_eq!(
            world.get_component::<Position>(e),
            Some(&Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn set_component_overwrite() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.set_component(e, Position { x: 1.0, y: 2.0 });
        world.set_component(e, Position { x: 99.0, y: 100.0 });
        assert_eq!(
            world.get_component::<Position>(e),
            Some(&Position { x: 99.0, y: 100.0 })
        );
    }

    // -- scale test ---------------------------------------------------------

    #[test]
    fn scale_10k_entities() {
        let mut world = setup_world();

        let mut entities = Vec::with_capacity(10_000);
        for i in 0..10_000u32 {
            let e = world.create_entity();
            world.set_component(
                e,
                Position {
                    x: i as f32,
                    y: i as f32 * 2.0,
                },
            );
            world.set_component(e, Velocity { dx: 1.0, dy: -1.0 });
            entities.push(e);
        }

        let moving = world.query::<(&Position, &Velocity)>();
        assert_eq!(moving.count(&world), 10_000);

        world.each::<(&mut Velocity,), _>(|(vel,)| {
            vel.dx *= 2.0;
            vel.dy *= 2.0;
        });
        let vel = world.get_component::<Velocity>(entities[0]).unwrap();
        assert_eq!(vel.dx, 2.0);
        assert_eq!(vel.dy, -2.0);

        for &e in entities.iter().take(5_000) {
            world.destroy_entity(e);
        }
        assert_eq!(moving.count(&world), 5_000);
        assert_eq!(world.entity_count(), 5_000);

        for &e in entities.iter().skip(5_000) {
            let pos = world.get_component::<Position>(e).unwrap();
            assert_eq!(pos.y, pos.x * 2.0);
        }
    }

    // -- errors -------------------------------------------------------------

    #[test]
    fn dead_entity_errors() {
        let mut world = setup_world();
        let e = world.create_entity();
        world.destroy_entity(e);
        assert!(world.try_destroy_entity(e).is_err());
        assert!(world
            .try_set_component(e, Velocity { dx: 1.0, dy: 1.0 })
            .is_err());
    }

    #[test]
    fn error_messages_name_the_problem() {
        let err = EcsError::DeadEntity {
            entity: EntityId::from_raw(4),
        };
        assert_eq!(
            err.to_string(),
            "entity EntityId(4) is not live (destroyed or never created)"
        );

        let err = EcsError::MissingComponent {
            entity: EntityId::from_raw(1),
            component: "velocity",
        };
        assert!(err.to_string().contains("velocity"));
    }
}
