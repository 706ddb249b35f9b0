//! Movement paths across the scene.
//!
//! Each path is a polyline of scene points. Entities hold a progress scalar in
//! [0, 1] along their path; the discrete point index and facing angle clients
//! render are derived from it here. Paths 1..=8 are open to every kind; the
//! special paths 9 and 10 are reserved for the oversized kinds.

/// A polyline path through the scene.
#[derive(Debug, Clone)]
pub struct Path {
    pub id: u32,
    pub points: Vec<(f64, f64)>,
    length: f64,
}

impl Path {
    fn new(id: u32, points: Vec<(f64, f64)>) -> Self {
        let length = points
            .windows(2)
            .map(|w| dist(w[0], w[1]))
            .sum();
        Self { id, points, length }
    }

    /// Total polyline length in scene units.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Scene position at `progress` in [0, 1].
    pub fn position_at(&self, progress: f64) -> (f64, f64) {
        let progress = progress.clamp(0.0, 1.0);
        let mut remaining = progress * self.length;
        for w in self.points.windows(2) {
            let seg = dist(w[0], w[1]);
            if remaining <= seg {
                let t = if seg == 0.0 { 0.0 } else { remaining / seg };
                return (
                    w[0].0 + (w[1].0 - w[0].0) * t,
                    w[0].1 + (w[1].1 - w[0].1) * t,
                );
            }
            remaining -= seg;
        }
        *self.points.last().expect("paths have at least two points")
    }

    /// Facing angle in radians from the path tangent at `progress`.
    pub fn facing_at(&self, progress: f64) -> f64 {
        let progress = progress.clamp(0.0, 1.0);
        let mut remaining = progress * self.length;
        for w in self.points.windows(2) {
            let seg = dist(w[0], w[1]);
            if remaining <= seg {
                return (w[1].1 - w[0].1).atan2(w[1].0 - w[0].0);
            }
            remaining -= seg;
        }
        let n = self.points.len();
        let a = self.points[n - 2];
        let b = self.points[n - 1];
        (b.1 - a.1).atan2(b.0 - a.0)
    }

    /// Discrete point index for the wire, derived from progress.
    pub fn point_index(&self, progress: f64) -> u32 {
        let last = (self.points.len() - 1) as f64;
        (progress.clamp(0.0, 1.0) * last).round() as u32
    }

    /// Distance along the path between two progress values.
    pub fn distance_between(&self, a: f64, b: f64) -> f64 {
        (a - b).abs() * self.length
    }
}

fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// First path id reserved for special kinds.
pub const SPECIAL_PATH_START: u32 = 9;

/// The full path table for the scene. The scene is 1280x720; paths sweep left
/// to right at varied heights with gentle bends, the special pair runs close
/// to the screen center.
pub fn path_table() -> Vec<Path> {
    vec![
        Path::new(1, vec![(-80.0, 80.0), (400.0, 110.0), (900.0, 70.0), (1360.0, 100.0)]),
        Path::new(2, vec![(-80.0, 170.0), (500.0, 150.0), (1360.0, 190.0)]),
        Path::new(3, vec![(-80.0, 260.0), (350.0, 290.0), (800.0, 240.0), (1360.0, 280.0)]),
        Path::new(4, vec![(-80.0, 350.0), (640.0, 330.0), (1360.0, 360.0)]),
        Path::new(5, vec![(-80.0, 440.0), (450.0, 470.0), (1000.0, 420.0), (1360.0, 450.0)]),
        Path::new(6, vec![(-80.0, 530.0), (700.0, 550.0), (1360.0, 520.0)]),
        Path::new(7, vec![(-80.0, 620.0), (400.0, 590.0), (900.0, 640.0), (1360.0, 610.0)]),
        Path::new(8, vec![(-80.0, 680.0), (640.0, 660.0), (1360.0, 690.0)]),
        Path::new(9, vec![(-120.0, 300.0), (640.0, 360.0), (1400.0, 320.0)]),
        Path::new(10, vec![(-120.0, 400.0), (640.0, 380.0), (1400.0, 420.0)]),
    ]
}

/// Path ids a kind may travel.
pub fn allowed_paths(special: bool) -> std::ops::RangeInclusive<u32> {
    if special {
        SPECIAL_PATH_START..=10
    } else {
        1..=10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ids_are_sequential() {
        let table = path_table();
        for (i, path) in table.iter().enumerate() {
            assert_eq!(path.id, i as u32 + 1);
            assert!(path.points.len() >= 2);
            assert!(path.length() > 0.0);
        }
    }

    #[test]
    fn position_endpoints() {
        let table = path_table();
        let path = &table[0];
        assert_eq!(path.position_at(0.0), path.points[0]);
        assert_eq!(path.position_at(1.0), *path.points.last().unwrap());
    }

    #[test]
    fn point_index_spans_polyline() {
        let table = path_table();
        let path = &table[2];
        assert_eq!(path.point_index(0.0), 0);
        assert_eq!(path.point_index(1.0), (path.points.len() - 1) as u32);
    }

    #[test]
    fn distance_between_is_symmetric() {
        let table = path_table();
        let path = &table[1];
        let d1 = path.distance_between(0.2, 0.5);
        let d2 = path.distance_between(0.5, 0.2);
        assert_eq!(d1, d2);
        assert!((d1 - 0.3 * path.length()).abs() < 1e-9);
    }

    #[test]
    fn special_paths_exclude_commons_only() {
        assert!(allowed_paths(true).contains(&9));
        assert!(!allowed_paths(true).contains(&1));
        assert!(allowed_paths(false).contains(&1));
        assert!(allowed_paths(false).contains(&10));
    }
}
