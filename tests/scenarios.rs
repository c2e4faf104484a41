use std::collections::HashMap;

use uvparam_rs::{
    ConstructOptions, Construction, FaceInput, ParamError, ParamHandle, ParamKey, SlimOptions,
    UnwrapMethod, UnwrapOptions,
};

type UvMap = HashMap<(ParamKey, usize), [f64; 2]>;

/// Quad faces of a `nx` x `ny` grid, vertex key `j * (nx + 1) + i`.
struct Grid {
    positions: Vec<[f64; 3]>,
    quads: Vec<[usize; 4]>,
}

impl Grid {
    fn new(nx: usize, ny: usize, f: impl Fn(f64, f64) -> [f64; 3]) -> Self {
        let mut positions = Vec::new();
        for j in 0..=ny {
            for i in 0..=nx {
                positions.push(f(i as f64, j as f64));
            }
        }
        let mut quads = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let v = j * (nx + 1) + i;
                quads.push([v, v + 1, v + nx + 2, v + nx + 1]);
            }
        }
        Grid { positions, quads }
    }

    fn add_to(&self, c: &mut Construction, key_offset: ParamKey) {
        for (fi, q) in self.quads.iter().enumerate() {
            c.add_face(&FaceInput {
                key: key_offset + fi as ParamKey,
                vertex_keys: &q.map(|v| key_offset + v as ParamKey),
                positions: &q.map(|v| self.positions[v]),
                uvs: &[[0.; 2]; 4],
                weights: None,
                pinned: &[false; 4],
                selected: &[true; 4],
                normal: None,
            })
            .unwrap();
        }
    }
}

fn flush(handle: &ParamHandle) -> UvMap {
    let mut out = HashMap::new();
    handle.flush(&mut |f: ParamKey, c: usize, uv: [f64; 2]| {
        out.insert((f, c), uv);
    });
    out
}

fn signed_area(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]))
}

fn assert_close(a: [f64; 2], b: [f64; 2]) {
    assert!(
        (a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9,
        "{a:?} != {b:?}"
    );
}

#[test]
fn pinned_quad_maps_to_unit_square() {
    let mut c = Construction::begin();
    c.add_face(&FaceInput {
        key: 0,
        vertex_keys: &[10, 11, 12, 13],
        positions: &[[0., 0., 0.], [1., 0., 0.], [1., 1., 0.], [0., 1., 0.]],
        uvs: &[[0., 0.], [1., 0.], [0.5, 0.5], [0.5, 0.5]],
        weights: None,
        pinned: &[true, true, false, false],
        selected: &[true; 4],
        normal: None,
    })
    .unwrap();
    let mut handle = c.end(ConstructOptions::default());
    handle.lscm_begin(false, false).unwrap();
    let stats = handle.lscm_solve().unwrap();
    handle.lscm_end().unwrap();
    assert_eq!(stats.solved, 1);
    let uv = flush(&handle);
    assert_close(uv[&(0, 0)], [0., 0.]);
    assert_close(uv[&(0, 1)], [1., 0.]);
    assert_close(uv[&(0, 2)], [1., 1.]);
    assert_close(uv[&(0, 3)], [0., 1.]);
}

#[test]
fn seam_splits_into_two_packed_islands() {
    // a strip of 2x1 quads bent along its middle edge
    let grid = Grid::new(2, 1, |x, y| [x.min(1.), y, (x - 1.).max(0.)]);
    let mut c = Construction::begin();
    grid.add_to(&mut c, 0);
    c.set_edge_seam(1, 4);
    let mut handle = c.end(ConstructOptions::default());
    assert_eq!(handle.charts().len(), 2);

    let options = UnwrapOptions::default()
        .with_method(UnwrapMethod::Conformal)
        .with_margin(0.05);
    let stats = handle.unwrap(&options).unwrap();
    assert_eq!(stats.solved, 2);

    let bounds: Vec<_> = handle.charts().iter().map(|c| c.uv_bounds()).collect();
    for (min, max) in &bounds {
        assert!(min[0] >= 0.025 - 1e-9 && min[1] >= 0.025 - 1e-9);
        assert!(max[0] <= 0.975 + 1e-9 && max[1] <= 0.975 + 1e-9);
    }
    let (a, b) = (bounds[0], bounds[1]);
    let gap_x = (b.0[0] - a.1[0]).max(a.0[0] - b.1[0]);
    let gap_y = (b.0[1] - a.1[1]).max(a.0[1] - b.1[1]);
    assert!(gap_x.max(gap_y) >= 0.05 - 1e-9);

    // the seam vertices get one uv per side
    let uv = flush(&handle);
    assert_ne!(uv[&(0, 1)], uv[&(1, 0)]);
}

#[test]
fn degenerate_face_is_skipped() {
    let grid = Grid::new(2, 2, |x, y| [x, y, 0.]);
    let mut c = Construction::begin();
    grid.add_to(&mut c, 0);
    let res = c.add_face(&FaceInput {
        key: 99,
        vertex_keys: &[100, 101, 102],
        positions: &[[5., 5., 0.], [6., 5., 0.], [7., 5., 0.]],
        uvs: &[[0.; 2]; 3],
        weights: None,
        pinned: &[false; 3],
        selected: &[true; 3],
        normal: None,
    });
    assert_eq!(res, Err(ParamError::ZeroArea { face: 99 }));
    let mut handle = c.end(ConstructOptions::default());
    assert_eq!(handle.skipped_faces(), 1);
    assert_eq!(handle.charts().len(), 1);

    let stats = handle
        .unwrap(&UnwrapOptions::default().with_method(UnwrapMethod::Conformal))
        .unwrap();
    assert_eq!(stats.failed, 0);
    let uv = flush(&handle);
    assert_eq!(uv.len(), 16);
    assert!(!uv.keys().any(|(f, _)| *f == 99));
}

#[test]
fn quad_with_doubled_corner_does_not_fail_its_chart() {
    let grid = Grid::new(2, 1, |x, y| [x, y, 0.]);
    let mut c = Construction::begin();
    grid.add_to(&mut c, 0);
    // glued on edge 2-5, corners 6 and 7 at the same place
    let res = c.add_face(&FaceInput {
        key: 2,
        vertex_keys: &[2, 6, 7, 5],
        positions: &[[2., 0., 0.], [3., 0., 0.], [3., 0., 0.], [2., 1., 0.]],
        uvs: &[[0.; 2]; 4],
        weights: None,
        pinned: &[false; 4],
        selected: &[true; 4],
        normal: None,
    });
    assert_eq!(res, Err(ParamError::ZeroArea { face: 2 }));
    let mut handle = c.end(ConstructOptions::default());
    assert_eq!(handle.charts().len(), 1);
    assert_eq!(handle.charts()[0].vertex_count(), 6);

    let stats = handle
        .unwrap(&UnwrapOptions::default().with_method(UnwrapMethod::Conformal))
        .unwrap();
    assert_eq!(stats.solved, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(flush(&handle).len(), 8);
}

#[test]
fn slim_fills_holes_left_open_at_construction() {
    // 3x3 grid without its middle quad
    let grid = Grid::new(3, 3, |x, y| [x, y, 0.1 * x * y]);
    let mut c = Construction::begin();
    for (fi, q) in grid.quads.iter().enumerate().filter(|(fi, _)| *fi != 4) {
        c.add_face(&FaceInput {
            key: fi as ParamKey,
            vertex_keys: &q.map(|v| v as ParamKey),
            positions: &q.map(|v| grid.positions[v]),
            uvs: &[[0.; 2]; 4],
            weights: None,
            pinned: &[false; 4],
            selected: &[true; 4],
            normal: None,
        })
        .unwrap();
    }
    let mut handle = c.end(ConstructOptions::default().with_fill_holes(false));
    assert_eq!(handle.charts()[0].boundary_loop_count(), 2);
    assert_eq!(handle.charts()[0].virtual_face_count(), 0);

    handle.slim_begin(&SlimOptions::default()).unwrap();
    assert!(handle.charts()[0].virtual_face_count() > 0);
    let stats = handle.slim_solve_iteration().unwrap();
    handle.slim_end().unwrap();
    assert_eq!(stats.solved, 1);

    // virtual faces are never flushed
    let uv = flush(&handle);
    assert_eq!(uv.len(), 32);
    assert!(!uv.keys().any(|(f, _)| *f == 4));
}

#[test]
fn average_gives_equal_area_ratios() {
    let small = Grid::new(1, 1, |x, y| [x, y, 0.]);
    let large = Grid::new(2, 3, |x, y| [10. + 2. * x, y * 1.5, 0.3 * x]);
    let mut c = Construction::begin();
    small.add_to(&mut c, 0);
    large.add_to(&mut c, 1000);
    let mut handle = c.end(ConstructOptions::default());
    assert_eq!(handle.charts().len(), 2);
    handle
        .unwrap(
            &UnwrapOptions::default()
                .with_method(UnwrapMethod::Conformal)
                .solve_only(),
        )
        .unwrap();
    handle.average();
    let ratios: Vec<f64> = handle
        .charts()
        .iter()
        .map(|c| c.area_3d() / c.area_uv())
        .collect();
    assert!((ratios[0] - ratios[1]).abs() < 1e-9 * ratios[0]);
}

#[test]
fn flush_is_idempotent() {
    let grid = Grid::new(3, 2, |x, y| [x, y, 0.1 * x * y]);
    let mut c = Construction::begin();
    grid.add_to(&mut c, 0);
    let mut handle = c.end(ConstructOptions::default());
    handle.unwrap(&UnwrapOptions::default()).unwrap();
    let first = flush(&handle);
    let second = flush(&handle);
    assert_eq!(first, second);
    assert_eq!(first.len(), 24);
}

#[test]
fn cancelled_solve_restores_exact_uvs() {
    let mut c = Construction::begin();
    let uvs = [[0.1234, 0.5], [0.9, 0.11], [0.3, 0.777]];
    c.set_aspect_ratio(1.7, 0.9);
    c.add_face(&FaceInput {
        key: 4,
        vertex_keys: &[0, 1, 2],
        positions: &[[0., 0., 0.], [1., 0., 0.], [0., 1., 1.]],
        uvs: &uvs,
        weights: None,
        pinned: &[false; 3],
        selected: &[true; 3],
        normal: None,
    })
    .unwrap();
    let mut handle = c.end(ConstructOptions::default());
    handle.slim_begin(&SlimOptions::default()).unwrap();
    handle.slim_solve_iteration().unwrap();
    handle.slim_end().unwrap();
    let mut restored = HashMap::new();
    handle.flush_restore(&mut |f: ParamKey, c: usize, uv: [f64; 2]| {
        restored.insert((f, c), uv);
    });
    for (i, uv) in uvs.iter().enumerate() {
        assert_eq!(restored[&(4, i)], *uv);
    }
}

#[test]
fn slim_unwraps_curved_patch_without_flips() {
    // quarter of a cylinder
    let grid = Grid::new(6, 3, |x, y| {
        let a = x / 6. * std::f64::consts::FRAC_PI_2;
        [a.cos(), a.sin(), y / 3.]
    });
    let mut c = Construction::begin();
    grid.add_to(&mut c, 0);
    let mut handle = c.end(ConstructOptions::default());
    let stats = handle
        .unwrap(&UnwrapOptions::default().with_slim(SlimOptions::default().with_iterations(5)))
        .unwrap();
    assert_eq!(stats.solved, 1);

    let uv = flush(&handle);
    let mut sign = 0.;
    for fi in 0..grid.quads.len() as ParamKey {
        let q: Vec<[f64; 2]> = (0..4).map(|c| uv[&(fi, c)]).collect();
        for t in [[0, 1, 2], [0, 2, 3]] {
            let a = signed_area(q[t[0]], q[t[1]], q[t[2]]);
            assert!(a.abs() > 1e-9);
            if sign == 0. {
                sign = a.signum();
            }
            assert_eq!(a.signum(), sign);
        }
        for p in &q {
            assert!((0. ..=1.).contains(&p[0]) && (0. ..=1.).contains(&p[1]));
        }
    }
}

#[test]
fn abf_unwrap_of_raised_fan() {
    let n = 7;
    let mut c = Construction::begin();
    for i in 0..n {
        let a0 = 2. * std::f64::consts::PI * i as f64 / n as f64;
        let a1 = 2. * std::f64::consts::PI * (i + 1) as f64 / n as f64;
        let j = (i + 1) % n;
        c.add_face(&FaceInput {
            key: i as ParamKey,
            vertex_keys: &[0, 1 + i as ParamKey, 1 + j as ParamKey],
            positions: &[[0., 0., 0.6], [a0.cos(), a0.sin(), 0.], [a1.cos(), a1.sin(), 0.]],
            uvs: &[[0.; 2]; 3],
            weights: None,
            pinned: &[false; 3],
            selected: &[true; 3],
            normal: None,
        })
        .unwrap();
    }
    let mut handle = c.end(ConstructOptions::default());
    let stats = handle
        .unwrap(&UnwrapOptions::default().with_method(UnwrapMethod::AngleBased))
        .unwrap();
    assert_eq!(stats.solved, 1);
    let uv = flush(&handle);
    for i in 0..n as ParamKey {
        let a = signed_area(uv[&(i, 0)], uv[&(i, 1)], uv[&(i, 2)]);
        assert!(a > 0.);
    }
}

#[test]
fn implicit_mode_keeps_existing_islands() {
    let grid = Grid::new(2, 1, |x, y| [x, y, 0.]);
    let mut c = Construction::begin();
    // two uv islands: the right quad is moved away
    for (fi, q) in grid.quads.iter().enumerate() {
        let uvs = q.map(|v| {
            let p = grid.positions[v];
            if fi == 1 {
                [p[0] + 5., p[1]]
            } else {
                [p[0], p[1]]
            }
        });
        c.add_face(&FaceInput {
            key: fi as ParamKey,
            vertex_keys: &q.map(|v| v as ParamKey),
            positions: &q.map(|v| grid.positions[v]),
            uvs: &uvs,
            weights: None,
            pinned: &[false; 4],
            selected: &[true; 4],
            normal: None,
        })
        .unwrap();
    }
    let handle = c.end(ConstructOptions::default().with_implicit(true));
    assert_eq!(handle.charts().len(), 2);
}

#[test]
fn packing_respects_aspect_ratio() {
    let a = Grid::new(2, 1, |x, y| [x, y, 0.]);
    let b = Grid::new(1, 1, |x, y| [x, y, 1.]);
    let mut c = Construction::begin();
    a.add_to(&mut c, 0);
    b.add_to(&mut c, 100);
    c.set_aspect_ratio(2., 1.);
    let mut handle = c.end(ConstructOptions::default());
    handle
        .unwrap(&UnwrapOptions::default().with_method(UnwrapMethod::Conformal))
        .unwrap();
    for uv in flush(&handle).values() {
        assert!(uv[0] >= 0. && uv[0] <= 1. && uv[1] >= 0. && uv[1] <= 1.);
    }
}
