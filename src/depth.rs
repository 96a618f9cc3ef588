use crate::models::{BookSnapshot, DepthPoint, DepthProfile, PriceLevel};

pub const DEFAULT_DEPTH_LIMIT: usize = 20;
pub const MAX_DEPTH_LIMIT: usize = 20;
pub const DEFAULT_DEPTH_FLOOR: f64 = 1_000.0;

pub fn aggregate(snapshot: &BookSnapshot, depth_limit: usize) -> DepthProfile {
    aggregate_with_floor(snapshot, depth_limit, DEFAULT_DEPTH_FLOOR)
}

/// Cumulative depth walking outward from the best price on each side.
///
/// `max_quantity` is the largest cumulative value across both sides but never
/// drops below `floor`, so a thin or empty book still has a usable scale.
pub fn aggregate_with_floor(snapshot: &BookSnapshot, depth_limit: usize, floor: f64) -> DepthProfile {
    let bid_points = cumulative_points(&snapshot.bids, depth_limit);
    let ask_points = cumulative_points(&snapshot.asks, depth_limit);

    let deepest = bid_points
        .last()
        .map(|point| point.cumulative_quantity)
        .unwrap_or(0.0)
        .max(
            ask_points
                .last()
                .map(|point| point.cumulative_quantity)
                .unwrap_or(0.0),
        );

    let floor = if floor.is_finite() { floor.max(0.0) } else { DEFAULT_DEPTH_FLOOR };

    DepthProfile {
        bid_points,
        ask_points,
        max_quantity: deepest.max(floor),
    }
}

fn cumulative_points(levels: &[PriceLevel], depth_limit: usize) -> Vec<DepthPoint> {
    let mut points = Vec::with_capacity(depth_limit.min(levels.len()));
    let mut cumulative = 0.0;

    for (offset_index, level) in levels.iter().take(depth_limit).enumerate() {
        cumulative += level.quantity.max(0.0);
        points.push(DepthPoint {
            offset_index,
            cumulative_quantity: cumulative,
        });
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> BookSnapshot {
        let to_levels = |rows: &[(f64, f64)]| {
            rows.iter()
                .map(|(price, quantity)| PriceLevel::new(*price, *quantity))
                .collect::<Vec<_>>()
        };
        BookSnapshot {
            bids: to_levels(bids),
            asks: to_levels(asks),
            ..BookSnapshot::empty()
        }
    }

    fn ladder(start: f64, step: f64, count: usize) -> Vec<(f64, f64)> {
        (0..count)
            .map(|index| (start + step * index as f64, 1.0 + (index % 7) as f64 * 250.0))
            .collect()
    }

    #[test]
    fn accumulates_outward_from_best_price() {
        let snapshot = book(&[(100.0, 1.5), (99.0, 2.0), (98.0, 3.0)], &[(101.0, 4.0)]);
        let profile = aggregate(&snapshot, 20);

        let bids = profile
            .bid_points
            .iter()
            .map(|point| (point.offset_index, point.cumulative_quantity))
            .collect::<Vec<_>>();
        assert_eq!(bids, vec![(0, 1.5), (1, 3.5), (2, 6.5)]);
        assert_eq!(profile.ask_points.len(), 1);
        assert_eq!(profile.ask_points[0].cumulative_quantity, 4.0);
    }

    #[test]
    fn truncates_each_side_to_depth_limit_and_stays_non_decreasing() {
        let snapshot = book(&ladder(100.0, -0.5, 35), &ladder(101.0, 0.5, 7));
        let profile = aggregate(&snapshot, 20);

        assert_eq!(profile.bid_points.len(), 20);
        assert_eq!(profile.ask_points.len(), 7);
        for side in [&profile.bid_points, &profile.ask_points] {
            assert!(side
                .windows(2)
                .all(|pair| pair[1].cumulative_quantity >= pair[0].cumulative_quantity));
        }
    }

    #[test]
    fn max_quantity_is_floored_for_thin_and_empty_books() {
        let empty = aggregate(&BookSnapshot::empty(), 20);
        assert!(empty.bid_points.is_empty());
        assert!(empty.ask_points.is_empty());
        assert_eq!(empty.max_quantity, DEFAULT_DEPTH_FLOOR);

        let thin = aggregate(&book(&[(100.0, 2.0)], &[]), 20);
        assert_eq!(thin.max_quantity, DEFAULT_DEPTH_FLOOR);
    }

    #[test]
    fn max_quantity_tracks_the_deeper_side_above_the_floor() {
        let snapshot = book(&[(100.0, 900.0), (99.0, 400.0)], &[(101.0, 700.0)]);
        let profile = aggregate(&snapshot, 20);
        assert_eq!(profile.max_quantity, 1_300.0);

        let custom = aggregate_with_floor(&snapshot, 1, 5.0);
        assert_eq!(custom.max_quantity, 900.0);
    }

    #[test]
    fn output_is_deterministic_for_identical_input() {
        let snapshot = book(&ladder(100.0, -0.1, 25), &ladder(100.1, 0.1, 25));
        let first = aggregate(&snapshot, 15);
        let second = aggregate(&snapshot.clone(), 15);

        assert_eq!(first, second);
        for (left, right) in first.bid_points.iter().zip(second.bid_points.iter()) {
            assert_eq!(
                left.cumulative_quantity.to_bits(),
                right.cumulative_quantity.to_bits()
            );
        }
    }

    #[test]
    fn zero_depth_limit_produces_empty_sides() {
        let snapshot = book(&[(100.0, 1.0)], &[(101.0, 1.0)]);
        let profile = aggregate(&snapshot, 0);
        assert!(profile.bid_points.is_empty());
        assert!(profile.ask_points.is_empty());
        assert_eq!(profile.max_quantity, DEFAULT_DEPTH_FLOOR);
    }
}
