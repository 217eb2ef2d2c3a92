//! Cluster topology: cells, membranes, gap junctions, membrane sites and the
//! cached linear operators that depend on them.

use crate::error::SimulationError;
use crate::grid::{pseudo_inverse, EnvGrid};
use anyhow::Result;
use bioelectric_common::{SimParams, Vec2};
use log::{debug, info};
use nalgebra::DMatrix;
use std::f64::consts::PI;

/// Neighbour search tolerance, as a multiple of the lattice spacing.
const NEIGHBOUR_TOL: f64 = 1.1;

/// Read-mostly cluster geometry shared by every phase of a run.
#[derive(Debug, Clone)]
pub struct Cells {
    /// Undeformed cell centres. Deformation is always applied relative to these.
    pub reference_centres: Vec<Vec2>,
    pub centres: Vec<Vec2>,
    pub cell_vol: Vec<f64>,
    pub cell_sa: Vec<f64>,
    pub mems_per_cell: usize,

    // Membranes, cell-major: membranes of cell c are c*mems_per_cell..(c+1)*mems_per_cell
    pub mem_mids: Vec<Vec2>,
    pub mem_normals: Vec<Vec2>,
    pub mem_sa: Vec<f64>,
    pub mem_to_cell: Vec<usize>,

    // Gap junctions, one per nearest-neighbour pair (a < b)
    pub gj_pairs: Vec<(usize, usize)>,
    pub gj_len: Vec<f64>,
    /// Unit vector from the first to the second cell of the pair.
    pub gj_tangent: Vec<Vec2>,
    /// Shared membrane face area (m^2).
    pub gj_face: Vec<f64>,
    /// Open junction area, `gj_surface * face` (m^2).
    pub gj_sa: Vec<f64>,

    /// Membrane sites: one lumped site per cell without the ECM, one per membrane with it.
    pub sites: SiteLayout,

    pub env_grid: Option<EnvGrid>,
    /// Grid point just outside each membrane (ECM only).
    pub map_mem2ecm: Vec<usize>,

    /// Divergence-of-gradient operator on the cell network (1/m^2).
    pub lap_cells: DMatrix<f64>,
    /// Pseudo-inverse of `lap_cells`.
    pub lap_gj_inv: DMatrix<f64>,
    /// Inverse Maxwell capacitance matrix over `[cells; grid points]` (ECM only).
    pub cap_inv: Option<DMatrix<f64>>,

    /// Bumped whenever the geometry (and with it every cached operator) is rebuilt.
    pub geometry_revision: u64,
}

/// Index space of membrane-resolved quantities.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteLayout {
    pub site_to_cell: Vec<usize>,
    pub site_sa: Vec<f64>,
    /// Environmental compartment facing each site.
    pub site_to_env: Vec<usize>,
}

impl SiteLayout {
    pub fn len(&self) -> usize {
        self.site_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.site_to_cell.is_empty()
    }
}

impl Cells {
    /// Builds a hexagonally packed cluster of regular polygonal cells inside a disk.
    pub fn new(p: &SimParams) -> Result<Self> {
        if p.mems_per_cell < 3 {
            return Err(SimulationError::Config("cluster.mems_per_cell must be at least 3".into()).into());
        }
        let n_sides = p.mems_per_cell as f64;
        let apothem = p.cell_radius * (PI / n_sides).cos();
        let spacing = 2.0 * apothem + p.cell_spacing;
        let a1 = Vec2::new(spacing, 0.0);
        let a2 = Vec2::new(0.5 * spacing, 0.5 * spacing * 3f64.sqrt());

        let reach = (p.cluster_radius / spacing).ceil() as i64 + 1;
        let mut centres = Vec::new();
        for j in -reach..=reach {
            for i in -reach..=reach {
                let pos = a1 * i as f64 + a2 * j as f64;
                if pos.length() <= p.cluster_radius * (1.0 + 1.0e-9) {
                    centres.push(pos);
                }
            }
        }
        if centres.is_empty() {
            centres.push(Vec2::zero());
        }

        let n_cells = centres.len();
        let area = 0.5 * n_sides * p.cell_radius * p.cell_radius * (2.0 * PI / n_sides).sin();
        let mem_len = 2.0 * p.cell_radius * (PI / n_sides).sin();
        let mem_area = mem_len * p.cell_height;

        let mut gj_pairs = Vec::new();
        for a in 0..n_cells {
            for b in (a + 1)..n_cells {
                if centres[a].distance(centres[b]) < NEIGHBOUR_TOL * spacing {
                    gj_pairs.push((a, b));
                }
            }
        }

        let mut cells = Cells {
            reference_centres: centres.clone(),
            centres,
            cell_vol: vec![area * p.cell_height; n_cells],
            cell_sa: vec![mem_area * n_sides; n_cells],
            mems_per_cell: p.mems_per_cell,
            mem_mids: Vec::new(),
            mem_normals: Vec::new(),
            mem_sa: vec![mem_area; n_cells * p.mems_per_cell],
            mem_to_cell: (0..n_cells * p.mems_per_cell).map(|m| m / p.mems_per_cell).collect(),
            gj_face: vec![mem_area; gj_pairs.len()],
            gj_sa: vec![p.gj_surface * mem_area; gj_pairs.len()],
            gj_len: Vec::new(),
            gj_tangent: Vec::new(),
            gj_pairs,
            sites: SiteLayout { site_to_cell: Vec::new(), site_sa: Vec::new(), site_to_env: Vec::new() },
            env_grid: None,
            map_mem2ecm: Vec::new(),
            lap_cells: DMatrix::zeros(0, 0),
            lap_gj_inv: DMatrix::zeros(0, 0),
            cap_inv: None,
            geometry_revision: 0,
        };

        if p.sim_ecm {
            let (min, max) = cells.bounding_box(p.cell_radius);
            cells.env_grid = Some(EnvGrid::new(min, max, p.grid_margin, p.grid_size, p.cell_height)?);
        }
        cells.rebuild(p)?;

        info!(
            "Built cluster: {} cells, {} membranes, {} gap junctions{}.",
            cells.n_cells(),
            cells.n_mems(),
            cells.n_gj(),
            cells
                .env_grid
                .as_ref()
                .map(|g| format!(", {}x{} environmental grid", g.nx, g.ny))
                .unwrap_or_default()
        );
        Ok(cells)
    }

    pub fn n_cells(&self) -> usize {
        self.centres.len()
    }

    pub fn n_mems(&self) -> usize {
        self.mem_to_cell.len()
    }

    pub fn n_gj(&self) -> usize {
        self.gj_pairs.len()
    }

    pub fn n_sites(&self) -> usize {
        self.sites.len()
    }

    /// Number of environmental compartments (grid points or per-cell pools).
    pub fn n_env(&self) -> usize {
        self.env_grid.as_ref().map_or(self.n_cells(), |g| g.len())
    }

    /// Membrane indices of cell `c`, in ring order.
    pub fn cell_mems(&self, c: usize) -> std::ops::Range<usize> {
        c * self.mems_per_cell..(c + 1) * self.mems_per_cell
    }

    /// Shortest gap-junction length, the smallest resolved length scale of the network.
    pub fn min_length(&self) -> f64 {
        self.gj_len.iter().copied().fold(f64::INFINITY, f64::min)
    }

    fn bounding_box(&self, pad: f64) -> (Vec2, Vec2) {
        let mut min = Vec2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in &self.reference_centres {
            min = Vec2::new(min.x.min(c.x), min.y.min(c.y));
            max = Vec2::new(max.x.max(c.x), max.y.max(c.y));
        }
        (min - Vec2::new(pad, pad), max + Vec2::new(pad, pad))
    }

    /// Moves cell centres to `reference + (dx, dy)` and rebuilds everything that
    /// depends on vertex positions.
    pub fn deform_world(&mut self, dx: &[f64], dy: &[f64], p: &SimParams) -> Result<()> {
        if dx.len() != self.n_cells() || dy.len() != self.n_cells() {
            return Err(SimulationError::Config(format!(
                "displacement has {}x{} entries for {} cells",
                dx.len(),
                dy.len(),
                self.n_cells()
            ))
            .into());
        }
        for (c, centre) in self.centres.iter_mut().enumerate() {
            *centre = self.reference_centres[c] + Vec2::new(dx[c], dy[c]);
        }
        self.rebuild(p)?;
        self.geometry_revision += 1;
        debug!("Cluster geometry rebuilt (revision {}).", self.geometry_revision);
        Ok(())
    }

    fn rebuild(&mut self, p: &SimParams) -> Result<()> {
        let n_sides = self.mems_per_cell as f64;
        let apothem = p.cell_radius * (PI / n_sides).cos();

        self.mem_mids.clear();
        self.mem_normals.clear();
        for centre in &self.centres {
            for k in 0..self.mems_per_cell {
                let normal = Vec2::from_angle(2.0 * PI * k as f64 / n_sides);
                self.mem_normals.push(normal);
                self.mem_mids.push(*centre + normal * apothem);
            }
        }

        self.gj_len.clear();
        self.gj_tangent.clear();
        for &(a, b) in &self.gj_pairs {
            let delta = self.centres[b] - self.centres[a];
            self.gj_len.push(delta.length());
            self.gj_tangent.push(delta.normalize_or_zero());
        }

        if let Some(grid) = &self.env_grid {
            self.map_mem2ecm = self
                .mem_mids
                .iter()
                .zip(&self.mem_normals)
                .map(|(mid, normal)| grid.cell_at(*mid + *normal * p.cell_spacing))
                .collect();
            self.sites = SiteLayout {
                site_to_cell: self.mem_to_cell.clone(),
                site_sa: self.mem_sa.clone(),
                site_to_env: self.map_mem2ecm.clone(),
            };
        } else {
            self.sites = SiteLayout {
                site_to_cell: (0..self.n_cells()).collect(),
                site_sa: self.cell_sa.clone(),
                site_to_env: (0..self.n_cells()).collect(),
            };
        }

        self.lap_cells = self.network_laplacian();
        self.lap_gj_inv = pseudo_inverse(self.lap_cells.clone())?;
        self.cap_inv = match &self.env_grid {
            Some(grid) => Some(self.capacitance_inverse(grid, p)?),
            None => None,
        };
        Ok(())
    }

    /// `(L x)_a = sum_j face_j / (vol_a len_j) (x_b - x_a)` over the junctions of `a`.
    fn network_laplacian(&self) -> DMatrix<f64> {
        let n = self.n_cells();
        let mut lap = DMatrix::zeros(n, n);
        for (j, &(a, b)) in self.gj_pairs.iter().enumerate() {
            let w = self.gj_face[j] / self.gj_len[j];
            let wa = w / self.cell_vol[a];
            let wb = w / self.cell_vol[b];
            lap[(a, a)] -= wa;
            lap[(a, b)] += wa;
            lap[(b, b)] -= wb;
            lap[(b, a)] += wb;
        }
        lap
    }

    /// Maxwell capacitance matrix over cell and grid nodes. Membranes couple a cell to
    /// the grid point they face; every grid point is tied to ground.
    fn capacitance_inverse(&self, grid: &EnvGrid, p: &SimParams) -> Result<DMatrix<f64>> {
        let n_cells = self.n_cells();
        let n = n_cells + grid.len();
        let mut cap = DMatrix::zeros(n, n);
        for (m, &c) in self.mem_to_cell.iter().enumerate() {
            let e = n_cells + self.map_mem2ecm[m];
            let c_mem = p.cm * self.mem_sa[m];
            cap[(c, c)] += c_mem;
            cap[(e, e)] += c_mem;
            cap[(c, e)] -= c_mem;
            cap[(e, c)] -= c_mem;
        }
        let c_ground = p.env_capacitance * grid.dx * grid.dy;
        for e in 0..grid.len() {
            cap[(n_cells + e, n_cells + e)] += c_ground;
        }
        cap.try_inverse()
            .ok_or_else(|| SimulationError::Operator("capacitance matrix is singular".into()).into())
    }

    /// Value on every junction of the gradient `(x_b - x_a) / len`.
    pub fn gradient_gj(&self, x: &[f64]) -> Vec<f64> {
        self.gj_pairs
            .iter()
            .zip(&self.gj_len)
            .map(|(&(a, b), len)| (x[b] - x[a]) / len)
            .collect()
    }

    /// Averages a junction-normal field (`value * tangent`) onto cell centres.
    pub fn gj_to_cells(&self, values: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let n = self.n_cells();
        let mut sx = vec![0.0; n];
        let mut sy = vec![0.0; n];
        let mut count = vec![0usize; n];
        for (j, &(a, b)) in self.gj_pairs.iter().enumerate() {
            let v = self.gj_tangent[j] * values[j];
            for c in [a, b] {
                sx[c] += v.x;
                sy[c] += v.y;
                count[c] += 1;
            }
        }
        for c in 0..n {
            if count[c] > 0 {
                sx[c] /= count[c] as f64;
                sy[c] /= count[c] as f64;
            }
        }
        (sx, sy)
    }

    /// Component of a cell-centred vector field along each junction, midpoint-averaged.
    pub fn cells_to_gj(&self, vx: &[f64], vy: &[f64]) -> Vec<f64> {
        self.gj_pairs
            .iter()
            .zip(&self.gj_tangent)
            .map(|(&(a, b), t)| 0.5 * ((vx[a] + vx[b]) * t.x + (vy[a] + vy[b]) * t.y))
            .collect()
    }

    /// Net outflow per unit volume of a junction-normal field.
    pub fn divergence_gj(&self, u_gj: &[f64]) -> Vec<f64> {
        let mut div = vec![0.0; self.n_cells()];
        for (j, &(a, b)) in self.gj_pairs.iter().enumerate() {
            let q = u_gj[j] * self.gj_face[j];
            div[a] += q / self.cell_vol[a];
            div[b] -= q / self.cell_vol[b];
        }
        div
    }

    /// Projects a cell-centred vector field onto its divergence-free part.
    ///
    /// Returns the corrected junction-normal component and the corrected centre values.
    pub fn project_divergence_free(&self, vx: &[f64], vy: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let u_gj = self.cells_to_gj(vx, vy);
        let div = nalgebra::DVector::from_vec(self.divergence_gj(&u_gj));
        let pressure = &self.lap_gj_inv * div;
        let grad = self.gradient_gj(pressure.as_slice());
        let corrected: Vec<f64> = u_gj.iter().zip(&grad).map(|(u, g)| u - g).collect();
        let (gx, gy) = self.gj_to_cells(&grad);
        let out_x = vx.iter().zip(&gx).map(|(v, g)| v - g).collect();
        let out_y = vy.iter().zip(&gy).map(|(v, g)| v - g).collect();
        (corrected, out_x, out_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::default_params;

    #[test]
    fn default_cluster_is_a_seven_cell_rosette() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        assert_eq!(cells.n_cells(), 7);
        assert_eq!(cells.n_mems(), 42);
        // Six spokes from the centre plus six around the ring
        assert_eq!(cells.n_gj(), 12);
        assert_eq!(cells.n_sites(), 7);
        assert!(cells.env_grid.is_none());
    }

    #[test]
    fn hexagon_geometry_matches_closed_forms() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let r = p.cell_radius;
        let h = p.cell_height;
        let area = 1.5 * 3f64.sqrt() * r * r;
        assert!((cells.cell_vol[0] - area * h).abs() < 1e-12 * area * h);
        // Hexagon side equals the circumradius
        assert!((cells.cell_sa[0] - 6.0 * r * h).abs() < 1e-12 * r * h);
        let expected_len = 3f64.sqrt() * r + p.cell_spacing;
        for len in &cells.gj_len {
            assert!((len - expected_len).abs() < 1e-12);
        }
    }

    #[test]
    fn membrane_normals_face_the_neighbours() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        for (j, &(a, b)) in cells.gj_pairs.iter().enumerate() {
            let t = cells.gj_tangent[j];
            let best = cells.cell_mems(a).map(|m| cells.mem_normals[m].dot(t)).fold(f64::MIN, f64::max);
            assert!((best - 1.0).abs() < 1e-9, "pair ({a}, {b})");
        }
    }

    #[test]
    fn network_laplacian_annihilates_constants() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        let ones = nalgebra::DVector::from_element(cells.n_cells(), 1.0);
        assert!((&cells.lap_cells * ones).norm() < 1e-3);
    }

    #[test]
    fn projection_removes_divergence() {
        let p = default_params();
        let cells = Cells::new(&p).unwrap();
        // Purely radial field: maximal divergence
        let vx: Vec<f64> = cells.centres.iter().map(|c| c.x * 1e3).collect();
        let vy: Vec<f64> = cells.centres.iter().map(|c| c.y * 1e3).collect();
        let before = cells.divergence_gj(&cells.cells_to_gj(&vx, &vy));
        let (u_gj, _, _) = cells.project_divergence_free(&vx, &vy);
        let after = cells.divergence_gj(&u_gj);
        let scale = before.iter().map(|d| d.abs()).fold(0.0, f64::max);
        assert!(scale > 0.0);
        for d in after {
            assert!(d.abs() < 1e-8 * scale);
        }
    }

    #[test]
    fn ecm_sites_are_membranes_mapped_into_the_grid() {
        let mut p = default_params();
        p.sim_ecm = true;
        let cells = Cells::new(&p).unwrap();
        let grid = cells.env_grid.as_ref().unwrap();
        assert_eq!(cells.n_sites(), cells.n_mems());
        assert!(cells.map_mem2ecm.iter().all(|&e| e < grid.len()));
        assert!(cells.cap_inv.is_some());
    }

    #[test]
    fn deform_world_moves_centres_and_bumps_revision() {
        let p = default_params();
        let mut cells = Cells::new(&p).unwrap();
        let dx = vec![1.0e-7; cells.n_cells()];
        let dy = vec![0.0; cells.n_cells()];
        cells.deform_world(&dx, &dy, &p).unwrap();
        assert_eq!(cells.geometry_revision, 1);
        assert!((cells.centres[0].x - cells.reference_centres[0].x - 1.0e-7).abs() < 1e-15);
        // Rigid translation keeps junction lengths
        let expected_len = 3f64.sqrt() * p.cell_radius + p.cell_spacing;
        assert!(cells.gj_len.iter().all(|l| (l - expected_len).abs() < 1e-12));
        assert!(cells.deform_world(&dx[..1], &dy, &p).is_err());
    }
}
