use nalgebra::{DVector, SVector};

use crate::{
    datatypes::{BoundaryConditionSet, Element, Point3},
    error::BrickError,
    mesher::Mesh,
    shape::{face_local_nodes, shape_tables, FACE_GAUSS_POINTS, FACE_NODES, VOLUME_NODES},
    stiffness::{global_dof, DOF, ELEMENT_DOFS},
};

pub type ElementForce = SVector<f64, ELEMENT_DOFS>;

/// Selects the 8 vertices of an element side in face winding order
pub fn face_nodes(element: &Element, side: usize) -> Result<[Point3; FACE_NODES], BrickError> {
    Ok(face_local_nodes(side)?.map(|local| element.vertices[local]))
}

/// Integrates a pressure over a face into nodal forces
///
/// The pressure acts along the face normal `dX/d(eta) x dX/d(tau)`, which
/// points outward for faces taken from `face_nodes`.
///
/// # Arguments
/// * `pressure` - Pressure magnitude
/// * `nodes` - The face vertices in face winding order
///
/// # Returns
/// The x, y and z force on each face node
pub fn compute_face_force(pressure: f64, nodes: &[Point3; FACE_NODES]) -> [[f64; FACE_NODES]; 3] {
    let tables = shape_tables();
    let mut force = [[0.0; FACE_NODES]; 3];

    for gp in 0..FACE_GAUSS_POINTS {
        // tangents[c] = (dX_c/d(eta), dX_c/d(tau))
        let mut tangents = [[0.0; 2]; 3];
        for (node, derivative) in nodes.iter().zip(tables.face_derivatives[gp].iter()) {
            for (c, tangent) in tangents.iter_mut().enumerate() {
                tangent[0] += node.coord(c) * derivative[0];
                tangent[1] += node.coord(c) * derivative[1];
            }
        }

        let normal = [
            tangents[1][0] * tangents[2][1] - tangents[2][0] * tangents[1][1],
            tangents[2][0] * tangents[0][1] - tangents[0][0] * tangents[2][1],
            tangents[0][0] * tangents[1][1] - tangents[1][0] * tangents[0][1],
        ];

        let factor = tables.face_weights[gp] * pressure;
        for k in 0..FACE_NODES {
            let shape = tables.face_values[gp][k];
            for c in 0..3 {
                force[c][k] += factor * normal[c] * shape;
            }
        }
    }

    force
}

/// Computes the force vector of an element loaded on one side
///
/// # Arguments
/// * `element` - The element to target
/// * `side` - The loaded side
/// * `pressure` - Pressure magnitude
///
/// # Returns
/// The 60-entry element force vector, in the element stiffness dof layout,
/// or an error if `side` is not in `0..6`
pub fn compute_element_force(
    element: &Element,
    side: usize,
    pressure: f64,
) -> Result<ElementForce, BrickError> {
    let local_nodes = face_local_nodes(side)?;
    let face_force = compute_face_force(pressure, &face_nodes(element, side)?);
    let mut force = ElementForce::zeros();

    for (k, local) in local_nodes.iter().enumerate() {
        for (c, component) in face_force.iter().enumerate() {
            force[c * VOLUME_NODES + local] += component[k];
        }
    }

    Ok(force)
}

/// Builds the global force vector from the pushed sides
///
/// # Arguments
/// * `mesh` - The mesh to target
/// * `bcs` - Boundary conditions; only pushed sides contribute
/// * `pressure` - Pressure applied to every pushed side
pub fn build_total_force_vector(
    mesh: &Mesh,
    bcs: &BoundaryConditionSet,
    pressure: f64,
) -> Result<DVector<f64>, BrickError> {
    let mut total = DVector::<f64>::zeros(DOF * mesh.nodes().len());

    for side in bcs.pushed() {
        side.validate(mesh.elements().len())?;
        let element_force =
            compute_element_force(&mesh.elements()[side.element], side.side, pressure)?;
        let connectivity = &mesh.element_nodes()[side.element];

        for local in 0..ELEMENT_DOFS {
            total[global_dof(connectivity, local)] += element_force[local];
        }
    }

    Ok(total)
}
