//! Packs multi-part geometry into batches that fit a renderer's vertex budget.

use log::debug;

use crate::mvt::{Point, Ring};
use crate::simplify::simplify;

/// Groups the parts of a multi-line into batches of at most `max_vertices` vertices.
///
/// A line that alone exceeds the budget is simplified first; if it is still too large it
/// forms a batch of its own.
#[must_use]
pub fn split_multi_line_string(lines: &[Ring], max_vertices: usize) -> Vec<Vec<Ring>> {
    let parts = lines.iter().map(|line| {
        if line.len() > max_vertices {
            debug!("Simplifying line of {} vertices", line.len());
            let mut simplified = simplify(std::slice::from_ref(line), max_vertices);
            simplified.pop().map_or_else(|| vec![line.clone()], |line| vec![line])
        } else {
            vec![line.clone()]
        }
    });
    pack(parts, max_vertices)
}

/// Groups a flat polygon ring sequence into batches of whole polygons.
///
/// Rings are first regrouped into polygons by winding: an exterior (clockwise in y-down
/// tile space) ring opens a new polygon, counter-clockwise rings are holes of the polygon
/// before them. The input must list every exterior ring before its own holes.
/// A polygon over budget is simplified across its own rings only.
#[must_use]
pub fn split_multi_polygon(rings: &[Ring], max_vertices: usize) -> Vec<Vec<Ring>> {
    let parts = group_polygons(rings).into_iter().map(|polygon| {
        if vertex_count(polygon) > max_vertices {
            debug!("Simplifying polygon of {} vertices", vertex_count(polygon));
            let simplified = simplify(polygon, max_vertices);
            if simplified.is_empty() {
                polygon.to_vec()
            } else {
                simplified
            }
        } else {
            polygon.to_vec()
        }
    });
    pack(parts, max_vertices)
}

/// Whether `ring` winds counter-clockwise on screen, i.e. is a polygon hole.
#[must_use]
pub fn is_ccw(ring: &[Point]) -> bool {
    signed_area(ring) < 0.
}

fn signed_area(ring: &[Point]) -> f64 {
    let Some(&last) = ring.last() else {
        return 0.;
    };
    let mut prev = last;
    let mut sum = 0.;
    for &point in ring {
        sum += prev.x * point.y - point.x * prev.y;
        prev = point;
    }
    sum / 2.
}

fn group_polygons(rings: &[Ring]) -> Vec<&[Ring]> {
    let mut polygons = Vec::new();
    let mut start = 0;
    for (idx, ring) in rings.iter().enumerate() {
        if idx > start && !is_ccw(ring) {
            polygons.push(&rings[start..idx]);
            start = idx;
        }
    }
    if start < rings.len() {
        polygons.push(&rings[start..]);
    }
    polygons
}

fn vertex_count(rings: &[Ring]) -> usize {
    rings.iter().map(Vec::len).sum()
}

/// Greedy packing of indivisible parts; a batch closes when the next part would overflow it.
fn pack(parts: impl Iterator<Item = Vec<Ring>>, max_vertices: usize) -> Vec<Vec<Ring>> {
    let mut batches = Vec::new();
    let mut current: Vec<Ring> = Vec::new();
    let mut current_vertices = 0;

    for part in parts {
        let count = vertex_count(&part);
        if !current.is_empty() && current_vertices + count > max_vertices {
            batches.push(std::mem::take(&mut current));
            current_vertices = 0;
        }
        current.extend(part);
        current_vertices += count;
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[expect(clippy::cast_precision_loss)]
    fn line(n: usize, offset: f64) -> Ring {
        (0..n)
            .map(|i| Point::new(i as f64, offset + (i as f64 * 1.3).sin() * i as f64))
            .collect()
    }

    fn square(x: f64, y: f64, size: f64, hole: bool) -> Ring {
        let mut ring = vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
            Point::new(x, y),
        ];
        if hole {
            ring.reverse();
        }
        ring
    }

    #[test]
    fn winding() {
        assert!(!is_ccw(&square(0., 0., 10., false)));
        assert!(is_ccw(&square(0., 0., 10., true)));
        assert!(!is_ccw(&[]));
    }

    #[test]
    fn empty_inputs_yield_no_batches() {
        assert!(split_multi_line_string(&[], 10).is_empty());
        assert!(split_multi_polygon(&[], 10).is_empty());
    }

    #[test]
    fn lines_pack_greedily() {
        let lines = vec![line(3, 0.), line(4, 1.), line(2, 2.), line(5, 3.)];
        let batches = split_multi_line_string(&lines, 7);

        let sizes: Vec<Vec<usize>> = batches
            .iter()
            .map(|b| b.iter().map(Vec::len).collect())
            .collect();
        assert_eq!(sizes, vec![vec![3, 4], vec![2, 5]]);
    }

    #[test]
    fn long_line_is_simplified_to_budget() {
        let batches = split_multi_line_string(&[line(10, 0.)], 5);
        assert!(!batches.is_empty());
        for batch in &batches {
            let count = vertex_count(batch);
            assert!(count <= 5 || batch.len() == 1, "batch of {count}");
        }
    }

    #[test]
    fn unshrinkable_line_stays_as_singleton() {
        let long = line(10, 0.);
        let batches = split_multi_line_string(&[line(2, 5.), long.clone()], 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1], vec![long]);
    }

    #[test]
    fn holes_stay_with_their_exterior() {
        let rings = vec![
            square(0., 0., 10., false),
            square(2., 2., 2., true),
            square(20., 0., 10., false),
            square(22., 2., 2., true),
            square(40., 0., 10., false),
        ];
        let batches = split_multi_polygon(&rings, 10);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], rings[0..2].to_vec());
        assert_eq!(batches[1], rings[2..4].to_vec());
        assert_eq!(batches[2], rings[4..5].to_vec());
    }

    #[test]
    fn small_polygons_share_a_batch() {
        let rings = vec![
            square(0., 0., 10., false),
            square(20., 0., 10., false),
            square(40., 0., 10., false),
        ];
        let batches = split_multi_polygon(&rings, 12);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn oversized_polygon_is_simplified_alone() {
        #[expect(clippy::cast_precision_loss)]
        let mut big: Ring = (0..40)
            .map(|i| {
                let angle = i as f64 / 40. * std::f64::consts::TAU;
                Point::new(100. + angle.cos() * 50., 100. + angle.sin() * 50.)
            })
            .collect();
        big.push(big[0]);
        assert!(!is_ccw(&big));

        let rings = vec![square(0., 0., 10., false), big];
        let batches = split_multi_polygon(&rings, 20);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec![square(0., 0., 10., false)]);
        assert!(vertex_count(&batches[1]) <= 20);
    }
}
