use crate::error::SimulationError;
use anyhow::Result;
use bioelectric_common::Vec2;
use nalgebra::DMatrix;

/// Regular extracellular grid covering the cluster plus a margin.
///
/// Values live at cell centres, indexed row-major (`iy * nx + ix`). Fluxes are
/// evaluated on the staggered faces between neighbouring centres.
#[derive(Debug, Clone)]
pub struct EnvGrid {
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
    /// Lower-left corner of the grid.
    pub origin: Vec2,
    /// Volume of one grid point (m^3).
    pub env_vol: f64,
    /// Pseudo-inverse of the Neumann Laplacian, used by the flow projection.
    pub lap_env_inv: DMatrix<f64>,
}

impl EnvGrid {
    /// Builds a grid of spacing `grid_size` around the bounding box `[min, max]`
    /// grown by `margin`.
    pub fn new(min: Vec2, max: Vec2, margin: f64, grid_size: f64, height: f64) -> Result<Self> {
        if grid_size <= 0.0 {
            return Err(SimulationError::Config("ecm.grid_size must be positive".into()).into());
        }
        let width = (max.x - min.x) + 2.0 * margin;
        let depth = (max.y - min.y) + 2.0 * margin;
        let nx = ((width / grid_size).ceil() as usize).max(1);
        let ny = ((depth / grid_size).ceil() as usize).max(1);
        let centre = (min + max) * 0.5;
        let origin = Vec2::new(
            centre.x - 0.5 * nx as f64 * grid_size,
            centre.y - 0.5 * ny as f64 * grid_size,
        );
        let mut grid = EnvGrid {
            nx,
            ny,
            dx: grid_size,
            dy: grid_size,
            origin,
            env_vol: grid_size * grid_size * height,
            lap_env_inv: DMatrix::zeros(0, 0),
        };
        grid.lap_env_inv = pseudo_inverse(grid.laplacian_matrix())?;
        Ok(grid)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn index(&self, ix: usize, iy: usize) -> usize {
        iy * self.nx + ix
    }

    /// Grid point containing `pos`, clamped to the grid.
    #[inline(always)]
    pub fn cell_at(&self, pos: Vec2) -> usize {
        let gx = ((pos.x - self.origin.x) / self.dx).floor() as i64;
        let gy = ((pos.y - self.origin.y) / self.dy).floor() as i64;
        let ix = gx.clamp(0, self.nx as i64 - 1) as usize;
        let iy = gy.clamp(0, self.ny as i64 - 1) as usize;
        self.index(ix, iy)
    }

    pub fn centre(&self, i: usize) -> Vec2 {
        let ix = i % self.nx;
        let iy = i / self.nx;
        Vec2::new(
            self.origin.x + (ix as f64 + 0.5) * self.dx,
            self.origin.y + (iy as f64 + 0.5) * self.dy,
        )
    }

    /// Whether grid point `i` lies on the outer ring.
    pub fn is_boundary(&self, i: usize) -> bool {
        let ix = i % self.nx;
        let iy = i / self.nx;
        ix == 0 || iy == 0 || ix + 1 == self.nx || iy + 1 == self.ny
    }

    /// Centred differences inside, one-sided at the edges.
    pub fn gradient(&self, field: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut gx = vec![0.0; self.len()];
        let mut gy = vec![0.0; self.len()];
        for iy in 0..self.ny {
            for ix in 0..self.nx {
                let i = self.index(ix, iy);
                if self.nx > 1 {
                    let lo = self.index(ix.saturating_sub(1), iy);
                    let hi = self.index((ix + 1).min(self.nx - 1), iy);
                    let span = (hi % self.nx - lo % self.nx) as f64 * self.dx;
                    gx[i] = (field[hi] - field[lo]) / span;
                }
                if self.ny > 1 {
                    let lo = self.index(ix, iy.saturating_sub(1));
                    let hi = self.index(ix, (iy + 1).min(self.ny - 1));
                    let span = (hi / self.nx - lo / self.nx) as f64 * self.dy;
                    gy[i] = (field[hi] - field[lo]) / span;
                }
            }
        }
        (gx, gy)
    }

    /// Divergence of a centre-valued vector field, with zero normal component at the edges.
    pub fn divergence(&self, fx: &[f64], fy: &[f64]) -> Vec<f64> {
        let mut div = vec![0.0; self.len()];
        for iy in 0..self.ny {
            for ix in 0..self.nx {
                let i = self.index(ix, iy);
                if ix + 1 < self.nx {
                    let j = self.index(ix + 1, iy);
                    let face = 0.5 * (fx[i] + fx[j]) / self.dx;
                    div[i] += face;
                    div[j] -= face;
                }
                if iy + 1 < self.ny {
                    let j = self.index(ix, iy + 1);
                    let face = 0.5 * (fy[i] + fy[j]) / self.dy;
                    div[i] += face;
                    div[j] -= face;
                }
            }
        }
        div
    }

    /// Removes the divergent part of a centre-valued velocity field.
    ///
    /// Face velocities are averaged from the centres, a reaction pressure is solved
    /// from `lap(P) = div(u)` and its face gradient is subtracted. Returns the
    /// corrected centre velocities (mean of the two adjacent faces per axis).
    pub fn project(&self, ux: &[f64], uy: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let div = nalgebra::DVector::from_vec(self.divergence(ux, uy));
        let pressure = &self.lap_env_inv * div;

        let mut out_x = vec![0.0; self.len()];
        let mut out_y = vec![0.0; self.len()];
        for iy in 0..self.ny {
            for ix in 0..self.nx {
                let i = self.index(ix, iy);
                if ix + 1 < self.nx {
                    let j = self.index(ix + 1, iy);
                    let face = 0.5 * (ux[i] + ux[j]) - (pressure[j] - pressure[i]) / self.dx;
                    out_x[i] += 0.5 * face;
                    out_x[j] += 0.5 * face;
                }
                if iy + 1 < self.ny {
                    let j = self.index(ix, iy + 1);
                    let face = 0.5 * (uy[i] + uy[j]) - (pressure[j] - pressure[i]) / self.dy;
                    out_y[i] += 0.5 * face;
                    out_y[j] += 0.5 * face;
                }
            }
        }
        (out_x, out_y)
    }

    /// Five-point Laplacian with zero-flux edges. Singular: constants span its null space.
    pub fn laplacian_matrix(&self) -> DMatrix<f64> {
        let n = self.len();
        let mut lap = DMatrix::zeros(n, n);
        for iy in 0..self.ny {
            for ix in 0..self.nx {
                let i = self.index(ix, iy);
                if ix + 1 < self.nx {
                    let j = self.index(ix + 1, iy);
                    let w = 1.0 / (self.dx * self.dx);
                    lap[(i, i)] -= w;
                    lap[(j, j)] -= w;
                    lap[(i, j)] += w;
                    lap[(j, i)] += w;
                }
                if iy + 1 < self.ny {
                    let j = self.index(ix, iy + 1);
                    let w = 1.0 / (self.dy * self.dy);
                    lap[(i, i)] -= w;
                    lap[(j, j)] -= w;
                    lap[(i, j)] += w;
                    lap[(j, i)] += w;
                }
            }
        }
        lap
    }

    /// Separable Gaussian filter, `sigma` in grid points. Edges repeat the border value.
    pub fn gaussian_smooth(&self, field: &[f64], sigma: f64) -> Vec<f64> {
        if sigma <= 0.0 {
            return field.to_vec();
        }
        let radius = (3.0 * sigma).ceil() as i64;
        let kernel: Vec<f64> = (-radius..=radius)
            .map(|k| (-(k * k) as f64 / (2.0 * sigma * sigma)).exp())
            .collect();
        let norm: f64 = kernel.iter().sum();

        let mut rows = vec![0.0; self.len()];
        for iy in 0..self.ny {
            for ix in 0..self.nx {
                let mut acc = 0.0;
                for (k, w) in (-radius..=radius).zip(&kernel) {
                    let sx = (ix as i64 + k).clamp(0, self.nx as i64 - 1) as usize;
                    acc += w * field[self.index(sx, iy)];
                }
                rows[self.index(ix, iy)] = acc / norm;
            }
        }
        let mut out = vec![0.0; self.len()];
        for iy in 0..self.ny {
            for ix in 0..self.nx {
                let mut acc = 0.0;
                for (k, w) in (-radius..=radius).zip(&kernel) {
                    let sy = (iy as i64 + k).clamp(0, self.ny as i64 - 1) as usize;
                    acc += w * rows[self.index(ix, sy)];
                }
                out[self.index(ix, iy)] = acc / norm;
            }
        }
        out
    }
}

/// Moore-Penrose pseudo-inverse with a cutoff relative to the largest singular value.
pub fn pseudo_inverse(m: DMatrix<f64>) -> Result<DMatrix<f64>> {
    if m.is_empty() {
        return Ok(m);
    }
    let svd = m.svd(true, true);
    let tol = svd.singular_values.max() * 1.0e-10;
    svd.pseudo_inverse(tol)
        .map_err(|e| SimulationError::Operator(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> EnvGrid {
        EnvGrid::new(Vec2::new(-10e-6, -10e-6), Vec2::new(10e-6, 10e-6), 4e-6, 10e-6, 5e-6).unwrap()
    }

    #[test]
    fn grid_covers_box_and_margin() {
        let g = grid();
        assert_eq!((g.nx, g.ny), (3, 3));
        assert_eq!(g.cell_at(Vec2::zero()), g.index(1, 1));
        // Points outside clamp to the edge
        assert_eq!(g.cell_at(Vec2::new(-1.0, -1.0)), 0);
        assert_eq!(g.cell_at(Vec2::new(1.0, 1.0)), g.len() - 1);
        assert!((g.env_vol - 10e-6 * 10e-6 * 5e-6).abs() < 1e-25);
    }

    #[test]
    fn gradient_of_linear_field_is_exact() {
        let g = grid();
        let field: Vec<f64> = (0..g.len()).map(|i| 3.0 * g.centre(i).x - 2.0 * g.centre(i).y).collect();
        let (gx, gy) = g.gradient(&field);
        for i in 0..g.len() {
            assert!((gx[i] - 3.0).abs() < 1e-9);
            assert!((gy[i] + 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn smoothing_preserves_constants() {
        let g = grid();
        let field = vec![0.25; g.len()];
        let out = g.gaussian_smooth(&field, 1.0);
        for v in out {
            assert!((v - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn divergence_sums_to_zero() {
        let g = grid();
        let fx: Vec<f64> = (0..g.len()).map(|i| i as f64).collect();
        let fy: Vec<f64> = (0..g.len()).map(|i| (i * i) as f64).collect();
        let total: f64 = g.divergence(&fx, &fy).iter().sum();
        assert!(total.abs() < 1e-6);
    }

    #[test]
    fn laplacian_pseudo_inverse_solves_zero_mean_problems() {
        let g = grid();
        let lap = g.laplacian_matrix();
        let mut b = nalgebra::DVector::from_fn(g.len(), |i, _| (i as f64).sin());
        let mean = b.mean();
        b.add_scalar_mut(-mean);
        let x = &g.lap_env_inv * &b;
        let residual = (&lap * x - &b).norm();
        assert!(residual < 1e-8 * b.norm().max(1.0));
    }
}
