use serde::{Deserialize, Serialize};

/// Axial coordinate of a hexagon in a city grid.
///
/// The implied third cube coordinate is `s = -q - r`. Hop distance and ring
/// enumeration over these coordinates match the k-ring semantics of the
/// upstream tessellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

/// The six axial direction vectors, counter-clockwise.
const DIRECTIONS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

impl HexCoord {
    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub fn neighbor(self, direction: usize) -> Self {
        let (dq, dr) = DIRECTIONS[direction % 6];
        Self {
            q: self.q + dq,
            r: self.r + dr,
        }
    }

    /// Hop distance between two hexagons.
    pub fn distance(self, other: Self) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        ((dq.abs() + dr.abs() + (dq + dr).abs()) / 2) as u32
    }

    /// All coordinates at exact hop distance `k`, in deterministic order.
    ///
    /// `ring(0)` is the cell itself; `ring(k)` has `6 * k` entries. Walks the
    /// ring starting `k` steps out in direction 4, turning through the six
    /// edge directions.
    pub fn ring(self, k: u32) -> Vec<HexCoord> {
        if k == 0 {
            return vec![self];
        }
        let k = k as i32;
        let (dq, dr) = DIRECTIONS[4];
        let mut cursor = HexCoord {
            q: self.q + dq * k,
            r: self.r + dr * k,
        };
        let mut out = Vec::with_capacity(6 * k as usize);
        for direction in 0..6 {
            for _ in 0..k {
                out.push(cursor);
                cursor = cursor.neighbor(direction);
            }
        }
        out
    }

    /// All coordinates within hop distance `k`, rings concatenated in order.
    pub fn disk(self, k: u32) -> Vec<HexCoord> {
        (0..=k).flat_map(|i| self.ring(i)).collect()
    }
}
