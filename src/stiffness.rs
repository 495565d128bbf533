use indicatif::ProgressBar;
use nalgebra::SMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

use crate::{
    datatypes::Material,
    error::BrickError,
    jacobian::{compute_global_derivatives, compute_jacobians, GlobalShapeDerivatives},
    mesher::Mesh,
    shape::{shape_tables, VOLUME_GAUSS_POINTS, VOLUME_NODES},
};

pub const DOF: usize = 3;
pub const ELEMENT_DOFS: usize = DOF * VOLUME_NODES;

/// Element stiffness, x dofs of the 20 nodes first, then y, then z
pub type ElementStiffness = SMatrix<f64, ELEMENT_DOFS, ELEMENT_DOFS>;

/// Maps an element dof to its global dof
///
/// # Arguments
/// * `connectivity` - The element's global node indexes
/// * `local_dof` - Row or column of the element matrix
pub fn global_dof(connectivity: &[usize; VOLUME_NODES], local_dof: usize) -> usize {
    let component = local_dof / VOLUME_NODES;
    let node = local_dof % VOLUME_NODES;
    DOF * connectivity[node] + component
}

/// Computes the stiffness matrix for a given element
///
/// # Arguments
/// * `derivatives` - Global shape function gradients of the element
/// * `determinants` - Jacobian determinants at the gauss points
/// * `material` - The model material
///
/// # Returns
/// A 60x60 stiffness matrix for the element
pub fn compute_element_stiffness_matrix(
    derivatives: &GlobalShapeDerivatives,
    determinants: &[f64; VOLUME_GAUSS_POINTS],
    material: &Material,
) -> Box<ElementStiffness> {
    let (lambda, mu) = material.lame_parameters();
    let nu = material.poisson_ratio;
    let normal = lambda * (1.0 - nu);
    let coupling = lambda * nu;
    let weights = &shape_tables().volume_weights;

    let mut stiffness: Box<ElementStiffness> = Box::new(SMatrix::zeros());

    for i in 0..VOLUME_NODES {
        for j in 0..VOLUME_NODES {
            let (mut a11, mut a22, mut a33) = (0.0, 0.0, 0.0);
            let (mut a12, mut a13, mut a23) = (0.0, 0.0, 0.0);

            for gp in 0..VOLUME_GAUSS_POINTS {
                let gi = &derivatives[gp][i];
                let gj = &derivatives[gp][j];
                let factor = weights[gp] * determinants[gp];

                a11 += factor * (normal * gi.x * gj.x + mu * (gi.y * gj.y + gi.z * gj.z));
                a22 += factor * (normal * gi.y * gj.y + mu * (gi.x * gj.x + gi.z * gj.z));
                a33 += factor * (normal * gi.z * gj.z + mu * (gi.x * gj.x + gi.y * gj.y));

                a12 += factor * (coupling * gi.x * gj.y + mu * gi.y * gj.x);
                a13 += factor * (coupling * gi.x * gj.z + mu * gi.z * gj.x);
                a23 += factor * (coupling * gi.y * gj.z + mu * gi.z * gj.y);
            }

            let (x, y, z) = (0, VOLUME_NODES, 2 * VOLUME_NODES);

            stiffness[(x + i, x + j)] = a11;
            stiffness[(y + i, y + j)] = a22;
            stiffness[(z + i, z + j)] = a33;

            stiffness[(x + i, y + j)] = a12;
            stiffness[(y + j, x + i)] = a12;
            stiffness[(x + i, z + j)] = a13;
            stiffness[(z + j, x + i)] = a13;
            stiffness[(y + i, z + j)] = a23;
            stiffness[(z + j, y + i)] = a23;
        }
    }

    stiffness
}

/// Builds the stiffness matrix of every element in parallel
///
/// # Arguments
/// * `mesh` - The mesh to target
/// * `material` - The model material
/// * `bar` - Progress bar advanced once per element
///
/// # Returns
/// The element stiffness matrices in element order
pub fn compute_element_stiffness_matrices(
    mesh: &Mesh,
    material: &Material,
    bar: &ProgressBar,
) -> Result<Vec<Box<ElementStiffness>>, BrickError> {
    mesh.elements()
        .par_iter()
        .enumerate()
        .map(|(index, element)| {
            let jacobian = compute_jacobians(element);
            let derivatives = compute_global_derivatives(index, &jacobian)?;
            let stiffness =
                compute_element_stiffness_matrix(&derivatives, &jacobian.determinants, material);
            bar.inc(1);
            Ok(stiffness)
        })
        .collect()
}

/// Compiles element stiffness matrices into a total stiffness matrix
///
/// # Arguments
/// * `mesh` - The mesh the element matrices belong to
/// * `element_stiffness_matrices` - One matrix per mesh element, in element order
///
/// # Returns
/// The global stiffness matrix in CSR format. Overlapping entries are summed.
pub fn build_total_stiffness_matrix(
    mesh: &Mesh,
    element_stiffness_matrices: &[Box<ElementStiffness>],
) -> CsrMatrix<f64> {
    let num_dofs = mesh.num_dofs();
    let mut coo: CooMatrix<f64> = CooMatrix::new(num_dofs, num_dofs);

    for (stiffness, connectivity) in element_stiffness_matrices
        .iter()
        .zip(mesh.element_nodes())
    {
        for local_row in 0..ELEMENT_DOFS {
            let global_row = global_dof(connectivity, local_row);

            for local_col in 0..ELEMENT_DOFS {
                let global_col = global_dof(connectivity, local_col);
                coo.push(global_row, global_col, stiffness[(local_row, local_col)]);
            }
        }
    }

    CsrMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector};

    fn to_dense(matrix: &CsrMatrix<f64>) -> DMatrix<f64> {
        let mut dense = DMatrix::<f64>::zeros(matrix.nrows(), matrix.ncols());
        for (row, col, value) in matrix.triplet_iter() {
            dense[(row, col)] += *value;
        }
        dense
    }

    fn assemble(size: [f64; 3], split: [usize; 3], material: &Material) -> (Mesh, CsrMatrix<f64>) {
        let mesh = Mesh::build(size, split).unwrap();
        let matrices =
            compute_element_stiffness_matrices(&mesh, material, &ProgressBar::hidden()).unwrap();
        let total = build_total_stiffness_matrix(&mesh, &matrices);
        (mesh, total)
    }

    #[test]
    fn dof_layout_is_component_major() {
        let connectivity: [usize; 20] = std::array::from_fn(|i| 100 + i);

        assert_eq!(global_dof(&connectivity, 0), 300);
        assert_eq!(global_dof(&connectivity, 21), 3 * 101 + 1);
        assert_eq!(global_dof(&connectivity, 59), 3 * 119 + 2);
    }

    #[test]
    fn element_stiffness_is_symmetric() {
        let material = Material::new(4.0, 0.3).unwrap();
        let mesh = Mesh::build([4.0, 5.0, 3.0], [1, 1, 1]).unwrap();
        let matrices =
            compute_element_stiffness_matrices(&mesh, &material, &ProgressBar::hidden()).unwrap();
        let stiffness = &matrices[0];

        let scale = stiffness.amax();
        for i in 0..ELEMENT_DOFS {
            assert!(stiffness[(i, i)] > 0.0);
            for j in 0..ELEMENT_DOFS {
                assert_abs_diff_eq!(
                    stiffness[(i, j)],
                    stiffness[(j, i)],
                    epsilon = 1e-12 * scale
                );
            }
        }
    }

    #[test]
    fn global_stiffness_is_symmetric() {
        let material = Material::new(4.0, 0.3).unwrap();
        let (_, total) = assemble([4.0, 5.0, 3.0], [2, 3, 2], &material);
        let dense = to_dense(&total);

        let scale = dense.amax();
        assert_abs_diff_eq!(dense.clone(), dense.transpose(), epsilon = 1e-12 * scale);
    }

    #[test]
    fn rigid_translation_produces_no_force() {
        let material = Material::new(4.0, 0.3).unwrap();
        let (mesh, total) = assemble([4.0, 5.0, 3.0], [2, 2, 2], &material);
        let dense = to_dense(&total);
        let scale = dense.amax();

        for translation in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.3, -2.0, 0.7]] {
            let displacement =
                DVector::from_fn(mesh.num_dofs(), |dof, _| translation[dof % DOF]);
            let force = &dense * displacement;
            assert!(force.amax() < 1e-10 * scale);
        }
    }

    #[test]
    fn rigid_rotation_produces_no_force() {
        let material = Material::new(10.0, 0.25).unwrap();
        let (mesh, total) = assemble([1.0, 2.0, 1.0], [1, 2, 1], &material);
        let dense = to_dense(&total);

        // infinitesimal rotation about z: u = (-y, x, 0)
        let displacement = DVector::from_fn(mesh.num_dofs(), |dof, _| {
            let node = mesh.nodes()[dof / DOF];
            match dof % DOF {
                0 => -node.y,
                1 => node.x,
                _ => 0.0,
            }
        });
        let force = &dense * displacement;
        assert!(force.amax() < 1e-10 * dense.amax());
    }

    #[test]
    fn uniform_stretch_energy_matches_continuum() {
        // u = (eps x, 0, 0) on a box: energy = V * C11 * eps^2 / 2
        let material = Material::new(7.0, 0.2).unwrap();
        let size = [2.0, 1.0, 3.0];
        let (mesh, total) = assemble(size, [2, 1, 2], &material);
        let dense = to_dense(&total);

        let eps = 0.01;
        let displacement = DVector::from_fn(mesh.num_dofs(), |dof, _| {
            if dof % DOF == 0 {
                eps * mesh.nodes()[dof / DOF].x
            } else {
                0.0
            }
        });

        let energy = 0.5 * displacement.dot(&(&dense * &displacement));
        let (lambda, _) = material.lame_parameters();
        let c11 = lambda * (1.0 - material.poisson_ratio);
        let volume = size[0] * size[1] * size[2];

        assert_abs_diff_eq!(energy, 0.5 * volume * c11 * eps * eps, epsilon = 1e-10);
    }
}
