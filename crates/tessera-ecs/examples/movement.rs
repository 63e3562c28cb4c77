//! Movement demo: a handful of entities integrated by a movement system and
//! printed by a render system, with one entity losing its velocity halfway.
//!
//! Run with: `RUST_LOG=tessera_ecs=debug cargo run --example movement`

use tessera_ecs::prelude::*;
use tracing::info;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

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
struct Glyph(u8);

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

fn movement_system(world: &mut World, movement: &Query<(&mut Position, &Velocity)>, dt: f32) {
    movement.each(world, |(pos, vel)| {
        pos.x += vel.dx * dt;
        pos.y += vel.dy * dt;
    });
}

fn render_system(world: &World, sprites: &Query<(&Glyph, &Position)>, tick: u32) {
    sprites.each_ref(world, |entity, (glyph, pos)| {
        println!(
            "tick {tick:>2}  {entity}  '{}' at ({:>6.2}, {:>6.2})",
            glyph.0 as char, pos.x, pos.y
        );
    });
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn main() -> Result<(), EcsError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = WorldConfig::from_json_str(r#"{ "min_group_capacity": 16, "entity_capacity": 64 }"#)?;
    let mut world = World::with_config(config)?;
    world.register_component_named::<Position>("position");
    world.register_component_named::<Velocity>("velocity");
    world.register_component_named::<Glyph>("glyph");

    let mut movers = Vec::new();
    for (i, glyph) in b"@#$%".iter().enumerate() {
        let e = world.create_entity();
        world.try_set_component(e, Position { x: 0.0, y: i as f32 })?;
        world.try_set_component(e, Velocity { dx: 1.0 + i as f32, dy: 0.5 })?;
        world.try_set_component(e, Glyph(*glyph))?;
        movers.push(e);
    }

    let wall = world.create_entity();
    world.try_set_component(wall, Position { x: 10.0, y: 10.0 })?;
    world.try_set_component(wall, Glyph(b'W'))?;

    info!(
        entities = world.entity_count(),
        archetypes = world.archetype_count(),
        "scene ready"
    );

    let movement = world.query::<(&mut Position, &Velocity)>();
    let sprites = world.query::<(&Glyph, &Position)>();

    for tick in 0..6 {
        if tick == 3 {
            let stopped = world.try_remove_component::<Velocity>(movers[0])?;
            info!(entity = %movers[0], ?stopped, "entity stopped");
        }
        movement_system(&mut world, &movement, 0.5);
        render_system(&world, &sprites, tick);
    }

    info!(live = ?world.entities(), "final entities");
    Ok(())
}
