//! End-to-end batching and picking scenarios
//!
//! Each test drives a [`World`] through whole frames and checks what the
//! stage ends up holding.

use approx::assert_relative_eq;

use crate::config::StageConfig;
use crate::foundation::math::Vec3;
use crate::render::{Color, InstanceBatch, PrimitiveKind, Viewport};
use crate::scene::{NodeId, NodeKind, PrimNode, SceneNode};
use crate::spatial::{Layers, RaycastQuery};
use crate::world::World;

fn world() -> World {
    World::new(StageConfig::default()).unwrap()
}

fn add_prim(world: &mut World, kind: PrimitiveKind, color: &str, position: Vec3) -> NodeId {
    let prim = PrimNode::new(kind).with_color(color).unwrap();
    let id = world.add(None, SceneNode::new(NodeKind::Prim(prim))).unwrap();
    world.set_position(id, position).unwrap();
    id
}

fn batch_of(world: &World, node: NodeId) -> &InstanceBatch {
    let handle = world.scene().node(node).and_then(|node| node.handle()).unwrap();
    world.stage().batch_for(handle).unwrap()
}

#[test]
fn test_three_colours_destroy_middle() {
    let mut world = world();
    let red = add_prim(&mut world, PrimitiveKind::Box, "#ff0000", Vec3::new(-2.0, 0.0, 0.0));
    let green = add_prim(&mut world, PrimitiveKind::Box, "#00ff00", Vec3::zeros());
    let blue = add_prim(&mut world, PrimitiveKind::Box, "#0000ff", Vec3::new(2.0, 0.0, 0.0));
    world.tick(0.016, &mut ());

    assert_eq!(world.stage().batch_count(), 1);
    let batch = batch_of(&world, red);
    assert_eq!(batch.instance_count(), 3);
    let hex = |batch: &InstanceBatch, index| batch.draw().color_at(index).unwrap().to_hex();
    assert_eq!(hex(batch, 0), 0xff0000);
    assert_eq!(hex(batch, 1), 0x00ff00);
    assert_eq!(hex(batch, 2), 0x0000ff);

    world.remove(green).unwrap();
    world.tick(0.016, &mut ());

    let batch = batch_of(&world, red);
    assert_eq!(batch.instance_count(), 2);
    assert_eq!(hex(batch, 0), 0xff0000);
    assert_eq!(hex(batch, 1), 0x0000ff);
    assert_eq!(batch.node_at(1), Some(blue));
    assert!(batch.check_density());
}

#[test]
fn test_growth_never_reorders() {
    let mut world = world();
    let mut nodes = Vec::new();
    let mut capacities = Vec::new();
    for i in 0..150 {
        let x = (i % 15) as f32 * 2.0;
        let z = (i / 15) as f32 * -2.0;
        nodes.push(add_prim(&mut world, PrimitiveKind::Box, "#ffffff", Vec3::new(x, 0.0, z)));
        world.tick(0.016, &mut ());

        let batch = batch_of(&world, nodes[0]);
        if capacities.last() != Some(&batch.capacity()) {
            capacities.push(batch.capacity());
        }
        if nodes.len() >= 110 {
            assert_eq!(batch.node_at(109), Some(nodes[109]));
        }
        assert_eq!(batch.instance_count(), nodes.len());
    }
    assert_eq!(capacities, vec![10, 110, 210]);
    assert!(batch_of(&world, nodes[0]).check_density());
}

#[test]
fn test_reticle_first_hit_and_layer_mask() {
    let mut world = world();
    world.stage_mut().set_viewport(Some(Viewport::new(800.0, 600.0)));
    let near = add_prim(&mut world, PrimitiveKind::Box, "#ffffff", Vec3::new(0.1, 0.13, 0.0));
    let far = add_prim(&mut world, PrimitiveKind::Box, "#ffffff", Vec3::new(0.1, 0.13, -3.0));
    world.tick(0.016, &mut ());

    let hits = world.raycast_reticle(None, 0.0, f32::INFINITY).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node, near);
    assert_relative_eq!(hits[0].distance, 4.5, epsilon = 1e-3);

    let masked = world.raycast_reticle(Some(Layers::HELPER), 0.0, f32::INFINITY).unwrap();
    assert!(masked.is_empty());

    let ray = world.stage().camera().ray_from_ndc(crate::foundation::math::Vec2::zeros()).unwrap();
    let all = world.stage().raycast(&RaycastQuery::new(ray).first_hit_only(false));
    let order: Vec<_> = all.iter().map(|hit| hit.node).collect();
    assert_eq!(order, vec![near, far]);
}

#[test]
fn test_kind_change_moves_between_batches() {
    let mut world = world();
    let stays = add_prim(&mut world, PrimitiveKind::Box, "#ffffff", Vec3::new(-2.0, 0.0, 0.0));
    let changes = add_prim(&mut world, PrimitiveKind::Box, "#ffffff", Vec3::new(2.0, 0.0, 0.0));
    let sphere = add_prim(&mut world, PrimitiveKind::Sphere, "#ffffff", Vec3::new(0.0, 2.0, 0.0));
    world.tick(0.016, &mut ());
    assert_eq!(batch_of(&world, stays).instance_count(), 2);
    assert_eq!(batch_of(&world, sphere).instance_count(), 1);

    world.set_prim_kind(changes, "sphere").unwrap();
    assert!(world.scene().node(changes).unwrap().needs_rebuild());
    world.tick(0.016, &mut ());

    let boxes = batch_of(&world, stays);
    assert_eq!(boxes.instance_count(), 1);
    assert_eq!(boxes.len(), 1);
    assert!(boxes.check_density());
    let spheres = batch_of(&world, sphere);
    assert_eq!(spheres.instance_count(), 2);
    assert_eq!(batch_of(&world, changes).signature(), spheres.signature());
    assert_eq!(world.stage().spatial().len(), 3);
}

#[test]
fn test_moved_prim_is_picked_at_new_position() {
    let mut world = world();
    world.stage_mut().set_viewport(Some(Viewport::new(800.0, 800.0)));
    let prim = add_prim(&mut world, PrimitiveKind::Box, "#ffffff", Vec3::new(10.0, 0.0, 0.0));
    world.tick(0.016, &mut ());
    assert!(world.raycast_reticle(None, 0.0, f32::INFINITY).unwrap().is_empty());

    world.set_position(prim, Vec3::new(0.1, 0.05, 0.0)).unwrap();
    world.set_prim_size(prim, &[2.0]).unwrap();
    world.tick(0.016, &mut ());
    let hits = world.raycast_reticle(None, 0.0, f32::INFINITY).unwrap();
    assert_eq!(hits.len(), 1);
    assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-3);
    assert_eq!(batch_of(&world, prim).draw().color_at(0), Some(Color::WHITE));
}
