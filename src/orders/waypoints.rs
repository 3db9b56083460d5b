//! Waypoint expansion for accepted orders.
//!
//! The host applies waypoints verbatim, so the geometry of each command
//! semantic is computed here once, at validation time.

use rand::Rng;

use crate::types::{AoBounds, Position};

/// Clearance between the AO edge and a vehicle spawn seed, in meters.
pub const SEED_CLEARANCE_M: f64 = 2_000.0;

/// Four-point compass patrol (N, E, S, W) at the given radius.
pub fn compass_patrol(center: Position, radius: f64) -> Vec<Position> {
    vec![
        Position::new(center.x, center.y + radius, center.z),
        Position::new(center.x + radius, center.y, center.z),
        Position::new(center.x, center.y - radius, center.z),
        Position::new(center.x - radius, center.y, center.z),
    ]
}

/// Five pseudo-random seek-and-destroy waypoints inside the radius.
pub fn sad_scatter<R: Rng>(rng: &mut R, center: Position, radius: f64) -> Vec<Position> {
    scatter(rng, center, radius, 0.0, 1.0, 5)
}

/// Five aggressive fire-support waypoints at 40–100% of the radius.
pub fn fire_support_ring<R: Rng>(rng: &mut R, center: Position, radius: f64) -> Vec<Position> {
    scatter(rng, center, radius, 0.4, 1.0, 5)
}

fn scatter<R: Rng>(
    rng: &mut R,
    center: Position,
    radius: f64,
    min_frac: f64,
    max_frac: f64,
    count: usize,
) -> Vec<Position> {
    (0..count)
        .map(|_| {
            let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
            let reach = radius * rng.gen_range(min_frac..=max_frac);
            Position::new(
                center.x + reach * bearing.cos(),
                center.y + reach * bearing.sin(),
                center.z,
            )
        })
        .collect()
}

/// Seed position for a vehicle deployment: at least 2 km outside the AO,
/// on the bearing from the AO center through the destination so the drive
/// in approaches from the ordered direction. `None` when no bounds are
/// configured — the host spawns at the destination instead.
pub fn deploy_seed<R: Rng>(
    rng: &mut R,
    bounds: Option<&AoBounds>,
    destination: Position,
) -> Option<Position> {
    let bounds = bounds?;
    let center = bounds.center();
    let reach = bounds.outer_radius() + SEED_CLEARANCE_M + rng.gen_range(0.0..500.0);

    let dx = destination.x - center.x;
    let dy = destination.y - center.y;
    let norm = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = if norm < 1.0 {
        // Destination at the center: pick any bearing
        let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
        (bearing.cos(), bearing.sin())
    } else {
        (dx / norm, dy / norm)
    };

    Some(Position::new(
        center.x + ux * reach,
        center.y + uy * reach,
        0.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn compass_points_sit_on_radius() {
        let center = Position::new(5000.0, 5000.0, 0.0);
        let points = compass_patrol(center, 150.0);
        assert_eq!(points.len(), 4);
        for p in points {
            assert!((p.distance_2d(&center) - 150.0).abs() < 1e-9);
        }
    }

    #[test]
    fn sad_scatter_stays_inside_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        let center = Position::new(1000.0, 2000.0, 0.0);
        let points = sad_scatter(&mut rng, center, 300.0);
        assert_eq!(points.len(), 5);
        for p in points {
            assert!(p.distance_2d(&center) <= 300.0 + 1e-9);
        }
    }

    #[test]
    fn fire_support_ring_keeps_minimum_reach() {
        let mut rng = StdRng::seed_from_u64(7);
        let center = Position::new(0.0, 0.0, 0.0);
        for p in fire_support_ring(&mut rng, center, 500.0) {
            let d = p.distance_2d(&center);
            assert!(d >= 200.0 - 1e-9 && d <= 500.0 + 1e-9);
        }
    }

    #[test]
    fn seed_lands_outside_bounds_with_clearance() {
        let mut rng = StdRng::seed_from_u64(3);
        let bounds = AoBounds::Circle {
            center: [5000.0, 5000.0],
            radius: 1500.0,
        };
        let destination = Position::new(5800.0, 5200.0, 0.0);
        let seed = deploy_seed(&mut rng, Some(&bounds), destination).unwrap();
        let from_center = seed.distance_2d(&bounds.center());
        assert!(from_center >= 1500.0 + SEED_CLEARANCE_M);
        assert!(!bounds.contains(&seed));
    }

    #[test]
    fn seed_absent_without_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(deploy_seed(&mut rng, None, Position::new(1.0, 2.0, 0.0)).is_none());
    }

    #[test]
    fn central_destination_still_seeds() {
        let mut rng = StdRng::seed_from_u64(11);
        let bounds = AoBounds::Rectangle {
            min: [0.0, 0.0],
            max: [10000.0, 10000.0],
        };
        let seed = deploy_seed(&mut rng, Some(&bounds), bounds.center()).unwrap();
        assert!(!bounds.contains(&seed));
    }
}
