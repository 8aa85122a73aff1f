use std::collections::HashMap;

use tracing::warn;

use sitescope_common::{Cell, CellId, HexCoord};

/// Ring lookup over one city's cell set.
///
/// `ring(cell, 0)` is always the cell itself. For k > 0, only cells that
/// exist in the covered set are returned — the grid has edges, and a ring
/// near the boundary is simply smaller.
pub trait RingIndex {
    fn ring(&self, cell: &CellId, k: u32) -> Vec<CellId>;
}

/// Adjacency index over the axial coordinates of a single city's cells.
#[derive(Debug, Default)]
pub struct HexGridIndex {
    by_coord: HashMap<HexCoord, CellId>,
    coords: HashMap<CellId, HexCoord>,
}

impl HexGridIndex {
    /// Build the index from a city's cells. Cells without a grid coordinate
    /// are left out — they keep ring 0 but have no neighbors.
    pub fn build(cells: &[Cell]) -> Self {
        let mut index = Self::default();
        for cell in cells {
            let Some(coord) = cell.grid else { continue };
            if let Some(existing) = index.by_coord.get(&coord) {
                warn!(
                    coord = ?coord,
                    kept = existing.as_str(),
                    dropped = cell.id.as_str(),
                    "Duplicate grid coordinate; keeping first cell"
                );
                continue;
            }
            index.by_coord.insert(coord, cell.id.clone());
            index.coords.insert(cell.id.clone(), coord);
        }
        index
    }

    pub fn has_coordinate(&self, cell: &CellId) -> bool {
        self.coords.contains_key(cell)
    }
}

impl RingIndex for HexGridIndex {
    fn ring(&self, cell: &CellId, k: u32) -> Vec<CellId> {
        if k == 0 {
            return vec![cell.clone()];
        }
        let Some(coord) = self.coords.get(cell) else {
            // No adjacency data: the cell is its own whole neighborhood.
            return Vec::new();
        };
        coord
            .ring(k)
            .into_iter()
            .filter_map(|c| self.by_coord.get(&c).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitescope_common::{FeatureRow, GeoPoint};

    fn cell(id: &str, grid: Option<HexCoord>) -> Cell {
        Cell {
            id: CellId::from(id),
            city: "testville".to_string(),
            centroid: GeoPoint { lat: 0.0, lng: 0.0 },
            boundary: Vec::new(),
            grid,
            area_class: None,
            raw: FeatureRow::new(),
            smoothed: FeatureRow::new(),
        }
    }

    #[test]
    fn ring_zero_is_self_even_without_coordinate() {
        let cells = vec![cell("lone", None)];
        let index = HexGridIndex::build(&cells);
        assert_eq!(index.ring(&CellId::from("lone"), 0), vec![CellId::from("lone")]);
        assert!(index.ring(&CellId::from("lone"), 1).is_empty());
    }

    #[test]
    fn ring_one_finds_only_covered_neighbors() {
        // Center plus two of its six neighbors
        let cells = vec![
            cell("c", Some(HexCoord::new(0, 0))),
            cell("n1", Some(HexCoord::new(1, 0))),
            cell("n2", Some(HexCoord::new(0, 1))),
            cell("far", Some(HexCoord::new(5, 5))),
        ];
        let index = HexGridIndex::build(&cells);
        let mut ring = index.ring(&CellId::from("c"), 1);
        ring.sort();
        assert_eq!(ring, vec![CellId::from("n1"), CellId::from("n2")]);
    }

    #[test]
    fn full_first_ring_has_six_members() {
        let center = HexCoord::new(0, 0);
        let mut cells = vec![cell("c", Some(center))];
        for (i, coord) in center.ring(1).into_iter().enumerate() {
            cells.push(cell(&format!("n{i}"), Some(coord)));
        }
        let index = HexGridIndex::build(&cells);
        assert_eq!(index.ring(&CellId::from("c"), 1).len(), 6);
    }
}
