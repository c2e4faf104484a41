//! Post processing of solved charts: relative scaling and packing in the unit square.

use std::f64::consts::FRAC_PI_2;

use crate::chart::Chart;

const BISECTION_STEPS: usize = 60;

/// Scale every chart about the center of its uv bounds so that the ratio of 3d area to uv area
/// is the same for all of them. The overall uv area is kept.
pub(crate) fn average(charts: &mut [Chart]) {
    let areas: Vec<(f64, f64)> = charts.iter().map(|c| (c.area_3d(), c.area_uv())).collect();
    let usable = |&(a3, auv): &(f64, f64)| a3 > 0. && auv > 0.;
    let tot_3d: f64 = areas.iter().filter(|a| usable(*a)).map(|a| a.0).sum();
    let tot_uv: f64 = areas.iter().filter(|a| usable(*a)).map(|a| a.1).sum();
    if !(tot_3d > 0.) || !(tot_uv > 0.) {
        return;
    }
    let tot = tot_3d / tot_uv;
    for (chart, area) in charts.iter_mut().zip(&areas) {
        if !usable(area) {
            continue;
        }
        let fac = ((area.0 / area.1) / tot).sqrt();
        let (min, max) = chart.uv_bounds();
        let center = [0.5 * (min[0] + max[0]), 0.5 * (min[1] + max[1])];
        chart.map_uvs(|uv| {
            [
                center[0] + (uv[0] - center[0]) * fac,
                center[1] + (uv[1] - center[1]) * fac,
            ]
        });
    }
}

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

/// Convex hull in counter clockwise order, monotone chain.
fn convex_hull(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let mut hull: Vec<[f64; 2]> = Vec::with_capacity(2 * pts.len());
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0. {
            hull.pop();
        }
        hull.push(p);
    }
    let lower = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0. {
            hull.pop();
        }
        hull.push(p);
    }
    // the upper chain ends on the first point
    hull.pop();
    hull
}

fn rotate(p: [f64; 2], angle: f64) -> [f64; 2] {
    let (s, c) = angle.sin_cos();
    [c * p[0] - s * p[1], s * p[0] + c * p[1]]
}

fn bounds(points: impl Iterator<Item = [f64; 2]>) -> ([f64; 2], [f64; 2]) {
    let mut min = [f64::INFINITY; 2];
    let mut max = [f64::NEG_INFINITY; 2];
    for p in points {
        for i in 0..2 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    (min, max)
}

/// Rotation giving the smallest bounding box, with its long side along `u`.
///
/// The optimal box has a side along a hull edge, so only those directions are tried.
fn best_rotation(points: &[[f64; 2]]) -> f64 {
    let hull = convex_hull(points);
    if hull.len() < 2 {
        return 0.;
    }
    let mut best = 0.;
    let mut best_area = f64::INFINITY;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let angle = -(b[1] - a[1]).atan2(b[0] - a[0]);
        let (min, max) = bounds(hull.iter().map(|&p| rotate(p, angle)));
        let area = (max[0] - min[0]) * (max[1] - min[1]);
        if area < best_area {
            best_area = area;
            best = angle;
        }
    }
    let (min, max) = bounds(hull.iter().map(|&p| rotate(p, best)));
    if max[1] - min[1] > max[0] - min[0] {
        best + FRAC_PI_2
    } else {
        best
    }
}

/// Padded box of one chart to place.
#[derive(Clone, Copy, Debug)]
struct PackBox {
    chart: usize,
    min: [f64; 2],
    size: [f64; 2],
}

/// Shelf placement of `boxes` scaled by `scale` and padded by `margin`, `None` when they do not
/// fit in the unit square. Boxes must be sorted by decreasing height.
fn shelf_layout(boxes: &[PackBox], scale: f64, margin: f64) -> Option<Vec<[f64; 2]>> {
    // (y, height, used width)
    let mut shelves: Vec<(f64, f64, f64)> = Vec::new();
    let mut top = 0.;
    let mut res = Vec::with_capacity(boxes.len());
    for b in boxes {
        let w = b.size[0] * scale + margin;
        let h = b.size[1] * scale + margin;
        if w > 1. {
            return None;
        }
        match shelves.iter_mut().find(|s| s.2 + w <= 1. && h <= s.1) {
            Some(shelf) => {
                res.push([shelf.2, shelf.0]);
                shelf.2 += w;
            }
            None => {
                if top + h > 1. {
                    return None;
                }
                res.push([0., top]);
                shelves.push((top, h, w));
                top += h;
            }
        }
    }
    Some(res)
}

/// Lay the charts in the unit square without overlap.
///
/// Charts are sorted by decreasing height (then larger area, then chart order) and placed left to
/// right in the first shelf with enough room, opening a new shelf otherwise. The largest scale for
/// which this layout fits is found by bisection. Every chart keeps `margin / 2` of free space on
/// each side, so chart bounds end up at least `margin` apart and inside
/// `[margin / 2, 1 - margin / 2]`. Works on image space uvs, scaled by `aspect` internally.
pub(crate) fn pack(charts: &mut [Chart], margin: f64, allow_rotation: bool, aspect: [f64; 2]) {
    if charts.is_empty() {
        return;
    }
    let mut margin = if margin.is_finite() { margin.max(0.) } else { 0. };
    let mut points: Vec<Vec<[f64; 2]>> = charts
        .iter()
        .map(|c| {
            c.uvs()
                .map(|uv| [uv[0] / aspect[0], uv[1] / aspect[1]])
                .collect()
        })
        .collect();
    if allow_rotation {
        for p in points.iter_mut() {
            let angle = best_rotation(p);
            for q in p.iter_mut() {
                *q = rotate(*q, angle);
            }
        }
    }

    let mut boxes: Vec<PackBox> = points
        .iter()
        .enumerate()
        .map(|(chart, p)| {
            let (min, max) = bounds(p.iter().copied());
            PackBox {
                chart,
                min,
                size: [max[0] - min[0], max[1] - min[1]],
            }
        })
        .collect();
    boxes.sort_by(|a, b| {
        b.size[1]
            .total_cmp(&a.size[1])
            .then((b.size[0] * b.size[1]).total_cmp(&(a.size[0] * a.size[1])))
            .then(a.chart.cmp(&b.chart))
    });

    if shelf_layout(&boxes, 0., margin).is_none() {
        log::warn!("margin {margin} leaves no room for {} charts, packing without margin", charts.len());
        margin = 0.;
    }
    let largest = boxes
        .iter()
        .map(|b| b.size[0].max(b.size[1]))
        .fold(0., f64::max);
    let mut lo = 0.;
    let mut hi = if largest > 0. { (1. - margin) / largest } else { 1. };
    if shelf_layout(&boxes, hi, margin).is_some() {
        lo = hi;
    } else {
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if shelf_layout(&boxes, mid, margin).is_some() {
                lo = mid;
            } else {
                hi = mid;
            }
        }
    }
    let Some(origins) = shelf_layout(&boxes, lo, margin) else {
        return;
    };
    log::debug!("packed {} charts at scale {lo}", charts.len());

    for (b, origin) in boxes.iter().zip(origins) {
        let off = [origin[0] + 0.5 * margin, origin[1] + 0.5 * margin];
        let uvs: Vec<[f64; 2]> = points[b.chart]
            .iter()
            .map(|p| {
                [
                    ((p[0] - b.min[0]) * lo + off[0]) * aspect[0],
                    ((p[1] - b.min[1]) * lo + off[1]) * aspect[1],
                ]
            })
            .collect();
        charts[b.chart].set_uvs(&uvs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartVertex;

    /// Rectangle chart of 3d size `w` x `h` with uvs `uv_scale` times its 3d coordinates, moved
    /// by `off` and rotated by `angle`.
    fn rect(w: f64, h: f64, uv_scale: f64, off: [f64; 2], angle: f64) -> Chart {
        let co = [[0., 0.], [w, 0.], [w, h], [0., h]];
        let verts = co
            .iter()
            .map(|p| {
                let uv = rotate([p[0] * uv_scale, p[1] * uv_scale], angle);
                ChartVertex {
                    key: 0,
                    co: [p[0], p[1], 0.],
                    uv: [uv[0] + off[0], uv[1] + off[1]],
                    snapshot: [0.; 2],
                    pinned: false,
                    selected: false,
                    weight: 1.,
                    on_boundary: true,
                }
            })
            .collect();
        Chart::new(verts, vec![[0, 1, 2], [0, 2, 3]])
    }

    #[test]
    fn average_equalizes_ratios() {
        let mut charts = vec![
            rect(1., 1., 0.5, [0., 0.], 0.),
            rect(2., 1., 3., [5., 5.], 0.),
            rect(1., 3., 1., [-2., 1.], 0.3),
        ];
        average(&mut charts);
        let ratios: Vec<f64> = charts.iter().map(|c| c.area_3d() / c.area_uv()).collect();
        for r in &ratios {
            assert!((r - ratios[0]).abs() < 1e-9 * ratios[0]);
        }
        assert!(charts.iter().all(|c| c.is_modified()));
    }

    fn check_packing(charts: &[Chart], margin: f64) {
        let bounds: Vec<_> = charts.iter().map(|c| c.uv_bounds()).collect();
        let eps = 1e-9;
        for (min, max) in &bounds {
            assert!(min[0] >= 0.5 * margin - eps && min[1] >= 0.5 * margin - eps);
            assert!(max[0] <= 1. - 0.5 * margin + eps && max[1] <= 1. - 0.5 * margin + eps);
        }
        for i in 0..bounds.len() {
            for j in i + 1..bounds.len() {
                let (a, b) = (bounds[i], bounds[j]);
                let gap_x = (b.0[0] - a.1[0]).max(a.0[0] - b.1[0]);
                let gap_y = (b.0[1] - a.1[1]).max(a.0[1] - b.1[1]);
                assert!(gap_x.max(gap_y) >= margin - eps, "charts {i} and {j} overlap");
            }
        }
    }

    #[test]
    fn pack_fits_unit_square() {
        let mut charts: Vec<Chart> = (0..7)
            .map(|i| rect(1. + i as f64 * 0.3, 0.5 + (i % 3) as f64, 1., [i as f64, -3.], 0.))
            .collect();
        pack(&mut charts, 0.02, false, [1., 1.]);
        check_packing(&charts, 0.02);
        // the tallest and widest chart opens the first shelf
        let (min, _) = charts[5].uv_bounds();
        assert!((min[0] - 0.01).abs() < 1e-9 && (min[1] - 0.01).abs() < 1e-9);
    }

    #[test]
    fn pack_with_rotation_lays_long_side_horizontally() {
        let mut charts = vec![rect(4., 1., 1., [0., 0.], 1.1), rect(1., 1., 1., [3., 3.], 0.4)];
        pack(&mut charts, 0.01, true, [1., 1.]);
        check_packing(&charts, 0.01);
        let (min, max) = charts[0].uv_bounds();
        assert!((max[0] - min[0]) / (max[1] - min[1]) > 3.99);
    }

    #[test]
    fn oversized_margin_is_dropped() {
        let mut charts: Vec<Chart> = (0..4).map(|i| rect(1., 1., 1., [i as f64, 0.], 0.)).collect();
        pack(&mut charts, 0.8, false, [1., 1.]);
        check_packing(&charts, 0.);
    }

    #[test]
    fn hull_of_square_with_inner_point() {
        let hull = convex_hull(&[[0., 0.], [1., 0.], [0.5, 0.5], [1., 1.], [0., 1.]]);
        assert_eq!(hull, vec![[0., 0.], [1., 0.], [1., 1.], [0., 1.]]);
    }
}
