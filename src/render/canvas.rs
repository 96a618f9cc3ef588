use crate::models::{DepthPoint, DepthProfile};

pub const BID_FILL: char = '#';
pub const ASK_FILL: char = '=';

/// Depth chart geometry in canvas units, origin top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthGeometry {
    pub mid_x: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    /// `(x, y)` per bid point, nearest the mid first.
    pub bid_points: Vec<(f64, f64)>,
    pub ask_points: Vec<(f64, f64)>,
}

pub fn layout_depth(profile: &DepthProfile, width: f64, height: f64, depth_limit: usize) -> DepthGeometry {
    let mid_x = width / 2.0;
    let x_scale = if depth_limit == 0 {
        0.0
    } else {
        (width / 2.0) / depth_limit as f64
    };
    let y_scale = if profile.max_quantity > 0.0 && profile.max_quantity.is_finite() {
        height / profile.max_quantity
    } else {
        0.0
    };

    let place = |points: &[DepthPoint], direction: f64| {
        points
            .iter()
            .map(|point| {
                let x = mid_x + direction * (point.offset_index + 1) as f64 * x_scale;
                let y = height - point.cumulative_quantity * y_scale;
                (x, y)
            })
            .collect::<Vec<_>>()
    };

    DepthGeometry {
        mid_x,
        x_scale,
        y_scale,
        bid_points: place(&profile.bid_points, -1.0),
        ask_points: place(&profile.ask_points, 1.0),
    }
}

/// Fills the area under each side's step curve on a `cols` x `rows` grid.
/// Columns left of the mid belong to bids, columns right of it to asks.
pub fn rasterize_depth(profile: &DepthProfile, cols: usize, rows: usize, depth_limit: usize) -> Vec<String> {
    if cols == 0 || rows == 0 {
        return Vec::new();
    }

    let geometry = layout_depth(profile, cols as f64, rows as f64, depth_limit);
    let mut grid = vec![vec![' '; cols]; rows];
    if geometry.x_scale <= 0.0 {
        return grid.into_iter().map(|row| row.into_iter().collect()).collect();
    }

    for col in 0..cols {
        let center = col as f64 + 0.5;
        let (points, fill) = if center < geometry.mid_x {
            (&profile.bid_points, BID_FILL)
        } else {
            (&profile.ask_points, ASK_FILL)
        };

        let offset = ((center - geometry.mid_x).abs() / geometry.x_scale).floor() as usize;
        let Some(point) = points.get(offset) else {
            continue;
        };

        let filled = ((point.cumulative_quantity * geometry.y_scale).round() as usize).min(rows);
        for row in grid.iter_mut().skip(rows - filled) {
            row[col] = fill;
        }
    }

    grid.into_iter().map(|row| row.into_iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(bids: &[f64], asks: &[f64], max_quantity: f64) -> DepthProfile {
        let points = |values: &[f64]| {
            values
                .iter()
                .enumerate()
                .map(|(offset_index, cumulative_quantity)| DepthPoint {
                    offset_index,
                    cumulative_quantity: *cumulative_quantity,
                })
                .collect::<Vec<_>>()
        };
        DepthProfile {
            bid_points: points(bids),
            ask_points: points(asks),
            max_quantity,
        }
    }

    #[test]
    fn places_bids_left_and_asks_right_of_mid() {
        let geometry = layout_depth(&profile(&[25.0, 50.0], &[100.0], 100.0), 200.0, 100.0, 20);

        assert_eq!(geometry.mid_x, 100.0);
        assert_eq!(geometry.x_scale, 5.0);
        assert_eq!(geometry.y_scale, 1.0);
        assert_eq!(geometry.bid_points, vec![(95.0, 75.0), (90.0, 50.0)]);
        assert_eq!(geometry.ask_points, vec![(105.0, 0.0)]);
    }

    #[test]
    fn degenerate_scales_do_not_divide_by_zero() {
        let geometry = layout_depth(&profile(&[1.0], &[], 0.0), 80.0, 10.0, 0);
        assert_eq!(geometry.x_scale, 0.0);
        assert_eq!(geometry.y_scale, 0.0);
        assert_eq!(geometry.bid_points, vec![(40.0, 10.0)]);
    }

    #[test]
    fn rasterizes_step_areas() {
        let lines = rasterize_depth(&profile(&[500.0], &[1_000.0], 1_000.0), 8, 4, 2);
        assert_eq!(lines, vec!["    ==  ", "    ==  ", "  ##==  ", "  ##==  "]);
    }

    #[test]
    fn empty_book_rasterizes_to_blank_rows() {
        let lines = rasterize_depth(&profile(&[], &[], 1_000.0), 6, 3, 20);
        assert_eq!(lines, vec!["      "; 3]);
        assert!(rasterize_depth(&profile(&[], &[], 1_000.0), 0, 3, 20).is_empty());
    }
}
