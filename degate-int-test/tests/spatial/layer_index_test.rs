//! A layer of placed objects kept in a quadtree while it is edited.

use degate_spatial::{pick_object_at, reposition, BoundingBox, LayerIndex, ObjectKind, PlacedObject, QuadTree, Spatial};
use std::sync::Arc;

fn layer() -> LayerIndex {
    QuadTree::new(BoundingBox::new(0.0, 2048.0, 0.0, 2048.0), 8)
}

/// A row of gates, each with two ports, plus a wire along the row.
fn populate(layer: &mut LayerIndex) -> Vec<Arc<PlacedObject>> {
    let mut objects = Vec::new();
    let mut id = 0;
    for column in 0..10 {
        let x = 100.0 + column as f64 * 150.0;
        id += 1;
        let gate = PlacedObject::new(id, ObjectKind::Gate, BoundingBox::new(x, x + 100.0, 400.0, 480.0));
        for port in 0..2 {
            id += 1;
            let px = x + 10.0 + port as f64 * 70.0;
            let port = PlacedObject::with_parent(
                id,
                ObjectKind::GatePort,
                BoundingBox::new(px, px + 6.0, 410.0, 416.0),
                &gate,
            );
            objects.push(port);
        }
        objects.push(gate);
    }
    id += 1;
    objects.push(PlacedObject::new(id, ObjectKind::Wire, BoundingBox::new(100.0, 1600.0, 500.0, 502.0)));

    for object in &objects {
        layer.insert(Arc::clone(object));
    }
    objects
}

#[test]
fn test_picking_prefers_ports_over_gates() {
    let mut layer = layer();
    let objects = populate(&mut layer);
    assert_eq!(layer.total_size(), objects.len());

    let port = pick_object_at(&layer, 113.0, 413.0, 0.0).unwrap();
    assert_eq!(port.kind(), ObjectKind::GatePort);
    assert_eq!(port.parent().map(|gate| gate.id()), Some(1));

    let gate = pick_object_at(&layer, 150.0, 450.0, 0.0).unwrap();
    assert_eq!(gate.kind(), ObjectKind::Gate);

    let wire = pick_object_at(&layer, 800.0, 503.0, 2.0).unwrap();
    assert_eq!(wire.kind(), ObjectKind::Wire);

    assert!(pick_object_at(&layer, 1900.0, 1900.0, 5.0).is_none());
}

#[test]
fn test_moving_gate_and_ports_keeps_index_in_sync() {
    let mut layer = layer();
    let objects = populate(&mut layer);

    let gate = objects.iter().find(|o| o.id() == 1).cloned().unwrap();
    let ports: Vec<_> = objects
        .iter()
        .filter(|o| o.parent().is_some_and(|p| p.id() == 1))
        .cloned()
        .collect();
    assert_eq!(ports.len(), 2);

    // drag the gate and its ports down by 1000 pixels
    for object in ports.iter().chain(std::iter::once(&gate)) {
        let mut moved = object.bounding_box();
        moved.shift_y(1000.0);
        assert!(reposition(&mut layer, object, moved));
    }
    assert_eq!(layer.total_size(), objects.len());

    let old_area = BoundingBox::new(100.0, 200.0, 400.0, 480.0);
    assert!(layer.region_iter_in(&old_area).all(|o| o.parent().map_or(o.id() != 1, |p| p.id() != 1)));

    let new_area = BoundingBox::new(100.0, 200.0, 1400.0, 1480.0);
    let mut found: Vec<u64> = layer.region_iter_in(&new_area).map(|o| o.id()).collect();
    found.sort_unstable();
    assert_eq!(found, vec![1, 2, 3]);

    assert_eq!(pick_object_at(&layer, 113.0, 1413.0, 0.0).map(|o| o.id()), Some(2));
}

#[test]
fn test_deleting_gate_leaves_ports_orphaned() {
    let mut layer = layer();
    let mut objects = populate(&mut layer);

    let index = objects.iter().position(|o| o.id() == 1).unwrap();
    let gate = objects.remove(index);
    assert!(layer.remove(&gate));
    drop(gate);

    let port = pick_object_at(&layer, 113.0, 413.0, 0.0).unwrap();
    assert_eq!(port.id(), 2);
    assert!(port.parent().is_none());
    assert_eq!(layer.total_size(), objects.len());
}

#[test]
fn test_stale_move_is_reported() {
    let mut layer = layer();
    let objects = populate(&mut layer);
    let port = objects.iter().find(|o| o.id() == 2).cloned().unwrap();

    // geometry changed behind the index's back
    port.shift(0.0, 1500.0);
    assert!(!reposition(&mut layer, &port, BoundingBox::new(110.0, 116.0, 1950.0, 1956.0)));
    assert_eq!(layer.total_size(), objects.len());

    // the entry is still found under the box it was indexed with
    let indexed = BoundingBox::new(110.0, 116.0, 410.0, 416.0);
    assert!(layer.notify_shape_change(&port, &indexed));
    assert_eq!(pick_object_at(&layer, 113.0, 1953.0, 0.0).map(|o| o.id()), Some(2));
}
