//! Quadtree behaviour over whole workloads.

use degate_spatial::{BoundingBox, QuadTree, Rectangle, Spatial};
use rand::Rng;

fn square(min: f64, size: f64) -> Rectangle {
    Rectangle::new(min, min + size, min, min + size)
}

#[test]
fn test_diagonal_objects_region_query() {
    let mut tree = QuadTree::new(BoundingBox::new(0.0, 1000.0, 0.0, 1000.0), 4);
    for start in [10.0, 90.0, 190.0, 500.0, 600.0, 700.0, 800.0, 900.0] {
        tree.insert(square(start, 10.0));
    }
    assert_eq!(tree.total_size(), 8);
    assert!(!tree.is_leaf());

    let query = BoundingBox::new(480.0, 620.0, 480.0, 620.0);
    let mut found: Vec<f64> = tree.region_iter_in(&query).map(|r| r.min_x()).collect();
    found.sort_by(f64::total_cmp);
    assert_eq!(found, vec![500.0, 600.0]);
}

#[test]
fn test_region_query_matches_brute_force() {
    let mut rng = rand::thread_rng();
    let mut tree = QuadTree::new(BoundingBox::new(0.0, 4096.0, 0.0, 4096.0), 8);
    let mut all = Vec::new();
    for _ in 0..2000 {
        let x = rng.gen_range(0.0..4000.0);
        let y = rng.gen_range(0.0..4000.0);
        let w = rng.gen_range(1.0..90.0);
        let h = rng.gen_range(1.0..90.0);
        let rect = Rectangle::new(x, x + w, y, y + h);
        tree.insert(rect);
        all.push(rect);
    }
    assert_eq!(tree.total_size(), all.len());

    for _ in 0..50 {
        let x = rng.gen_range(0.0..4096.0);
        let y = rng.gen_range(0.0..4096.0);
        let query = BoundingBox::new(x, x + rng.gen_range(0.0..600.0), y, y + rng.gen_range(0.0..600.0));

        let from_tree = tree.region_iter_in(&query).count();
        let expected = all.iter().filter(|r| r.bounding_box().intersects(&query)).count();
        assert_eq!(from_tree, expected, "query {}", query);
    }
}

#[test]
fn test_remove_hides_object_from_queries() {
    let mut tree = QuadTree::new(BoundingBox::new(0.0, 1000.0, 0.0, 1000.0), 4);
    let rects: Vec<_> = (0..40).map(|i| square(i as f64 * 24.0, 12.0)).collect();
    tree.extend(rects.iter().copied());

    for (removed, rect) in rects.iter().enumerate() {
        assert!(tree.remove(rect));
        assert_eq!(tree.total_size(), rects.len() - removed - 1);
        let area = rect.bounding_box();
        assert!(tree.region_iter_in(&area).all(|other| other != rect));
    }
    assert!(tree.is_leaf());
    assert!(tree.is_empty());
}

#[test]
fn test_repeated_fill_and_drain_collapses() {
    let mut tree = QuadTree::new(BoundingBox::new(0.0, 1024.0, 0.0, 1024.0), 4);
    let rects: Vec<_> = (0..64)
        .map(|i| {
            let x = (i % 8) as f64 * 128.0 + 3.0;
            let y = (i / 8) as f64 * 128.0 + 3.0;
            Rectangle::new(x, x + 20.0, y, y + 20.0)
        })
        .collect();

    for _ in 0..5 {
        tree.extend(rects.iter().copied());
        assert_eq!(tree.total_size(), 64);
        assert!(tree.depth() > 1);
        for rect in &rects {
            assert!(tree.remove(rect));
        }
        assert!(tree.is_leaf());
        assert_eq!(tree.total_size(), 0);
    }
}
