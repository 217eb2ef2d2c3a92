//! Finite-volume electrodiffusion on the environmental grid.

use crate::flux::np_flux_special;
use crate::grid::EnvGrid;
use bioelectric_common::SimParams;

/// One species as seen by the grid solver.
pub struct GridSpecies<'a> {
    pub z: f64,
    /// Effective diffusion constant (free diffusion times tortuosity).
    pub diff: f64,
    pub c_bound: f64,
    pub v_env: &'a [f64],
    pub ux: &'a [f64],
    pub uy: &'a [f64],
}

/// Face-centred inputs of the MAC discretisation along one axis.
struct Faces {
    lo: Vec<usize>,
    hi: Vec<usize>,
    c: Vec<f64>,
    gc: Vec<f64>,
    gv: Vec<f64>,
    u: Vec<f64>,
    diff: Vec<f64>,
}

impl Faces {
    fn build(grid: &EnvGrid, cc: &[f64], sp: &GridSpecies<'_>, along_x: bool) -> Self {
        let (h, vel) = if along_x { (grid.dx, sp.ux) } else { (grid.dy, sp.uy) };
        let mut faces = Faces {
            lo: Vec::new(),
            hi: Vec::new(),
            c: Vec::new(),
            gc: Vec::new(),
            gv: Vec::new(),
            u: Vec::new(),
            diff: Vec::new(),
        };
        for iy in 0..grid.ny {
            for ix in 0..grid.nx {
                let (jx, jy) = if along_x { (ix + 1, iy) } else { (ix, iy + 1) };
                if jx >= grid.nx || jy >= grid.ny {
                    continue;
                }
                let i = grid.index(ix, iy);
                let j = grid.index(jx, jy);
                faces.lo.push(i);
                faces.hi.push(j);
                faces.c.push(0.5 * (cc[i] + cc[j]));
                faces.gc.push((cc[j] - cc[i]) / h);
                faces.gv.push((sp.v_env[j] - sp.v_env[i]) / h);
                faces.u.push(0.5 * (vel[i] + vel[j]));
                faces.diff.push(sp.diff);
            }
        }
        faces
    }
}

/// Advances the environmental concentration `cc` of one species by one time step.
///
/// Only interior faces carry flux, so a closed grid conserves mass exactly. With
/// open boundaries the outer ring is reset to the boundary concentration afterwards.
pub fn update_ecm(cc: &mut [f64], sp: &GridSpecies<'_>, grid: &EnvGrid, p: &SimParams) {
    let fx = Faces::build(grid, cc, sp, true);
    let fy = Faces::build(grid, cc, sp, false);

    let mut dcc = vec![0.0; grid.len()];
    for k in 0..fx.lo.len() {
        let (flux, _) = np_flux_special(
            fx.c[k], 0.0, fx.gc[k], 0.0, fx.gv[k], 0.0, fx.u[k], 0.0, fx.diff[k], 0.0, sp.z, p,
        );
        dcc[fx.lo[k]] -= flux / grid.dx;
        dcc[fx.hi[k]] += flux / grid.dx;
    }
    for k in 0..fy.lo.len() {
        let (_, flux) = np_flux_special(
            0.0, fy.c[k], 0.0, fy.gc[k], 0.0, fy.gv[k], 0.0, fy.u[k], 0.0, fy.diff[k], sp.z, p,
        );
        dcc[fy.lo[k]] -= flux / grid.dy;
        dcc[fy.hi[k]] += flux / grid.dy;
    }

    for (c, d) in cc.iter_mut().zip(&dcc) {
        *c += d * p.dt;
    }
    if !p.closed_bound {
        for (i, c) in cc.iter_mut().enumerate() {
            if grid.is_boundary(i) {
                *c = sp.c_bound;
            }
        }
    }
}
