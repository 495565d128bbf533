use std::collections::HashMap;

use crate::{
    datatypes::{validate_side_index, Element, ElementSide, Point3},
    error::BrickError,
    shape::{self, LOCAL_NODES_3D, VOLUME_NODES},
};

/// Structured mesh of a box split into 20-node hexahedra
#[derive(Debug, Clone)]
pub struct Mesh {
    size: [f64; 3],
    split: [usize; 3],
    elements: Vec<Element>,
    nodes: Vec<Point3>,
    element_nodes: Vec<[usize; VOLUME_NODES]>,
    lattice_points: Vec<[usize; 3]>,
    lattice_index: HashMap<[usize; 3], usize>,
}

/// Checks the box dimensions and split counts before anything is allocated
///
/// # Arguments
/// * `size` - Box extent along each axis
/// * `split` - Number of elements along each axis
pub fn validate_box(size: [f64; 3], split: [usize; 3]) -> Result<(), BrickError> {
    for (axis, value) in size.iter().enumerate() {
        if !value.is_finite() || *value <= 0.0 {
            return Err(BrickError::InvalidParameter(format!(
                "box size along axis {axis} must be positive, got {value}"
            )));
        }
    }
    for (axis, value) in split.iter().enumerate() {
        if *value == 0 {
            return Err(BrickError::InvalidParameter(format!(
                "split along axis {axis} must be at least 1"
            )));
        }
    }
    checked_counts(split)?;
    Ok(())
}

/// Counts the mesh nodes of a split without building it
///
/// # Returns
/// The node count, or `None` if it does not fit in a `usize`
pub fn expected_node_count(split: [usize; 3]) -> Option<usize> {
    let [nx, ny, nz] = split;

    let row = nx.checked_mul(2)?.checked_add(1)?.checked_mul(ny.checked_add(1)?)?;
    let columns = nx.checked_add(1)?.checked_mul(ny)?;
    let layers = row.checked_add(columns)?.checked_mul(nz.checked_add(1)?)?;
    let verticals = nz
        .checked_mul(nx.checked_add(1)?)?
        .checked_mul(ny.checked_add(1)?)?;

    layers.checked_add(verticals)
}

/// Node and element counts of a split. Every dof index must fit in a `usize`.
fn checked_counts(split: [usize; 3]) -> Result<(usize, usize), BrickError> {
    let nodes = expected_node_count(split).filter(|n| n.checked_mul(3).is_some());
    let elements = split[0]
        .checked_mul(split[1])
        .and_then(|n| n.checked_mul(split[2]));

    match (nodes, elements) {
        (Some(nodes), Some(elements)) => Ok((nodes, elements)),
        _ => Err(BrickError::InvalidParameter(format!(
            "split {split:?} is too large to index"
        ))),
    }
}

/// Whether a half-step lattice point is an element corner or edge midpoint.
/// Face and body centers have two or more odd indices.
fn is_serendipity_point(point: [usize; 3]) -> bool {
    point.iter().filter(|i| *i % 2 == 1).count() <= 1
}

impl Mesh {
    /// Builds the mesh of a box spanning `[0, size]` on every axis
    ///
    /// # Arguments
    /// * `size` - Box extent `(w, h, d)`
    /// * `split` - Number of elements `(nx, ny, nz)`
    ///
    /// # Returns
    /// The mesh, with nodes ordered C-major over the half-step lattice
    pub fn build(size: [f64; 3], split: [usize; 3]) -> Result<Mesh, BrickError> {
        validate_box(size, split)?;

        let (node_count, num_elements) = checked_counts(split)?;
        // bounded by the node count, which did not overflow
        let resolution = split.map(|n| 2 * n + 1);

        let mut nodes: Vec<Point3> = Vec::with_capacity(node_count);
        let mut lattice_points: Vec<[usize; 3]> = Vec::with_capacity(node_count);
        let mut lattice_index: HashMap<[usize; 3], usize> = HashMap::with_capacity(node_count);

        for k in 0..resolution[2] {
            for j in 0..resolution[1] {
                for i in 0..resolution[0] {
                    let point = [i, j, k];
                    if !is_serendipity_point(point) {
                        continue;
                    }

                    lattice_index.insert(point, nodes.len());
                    lattice_points.push(point);
                    nodes.push(Point3::new(
                        size[0] * i as f64 / (2 * split[0]) as f64,
                        size[1] * j as f64 / (2 * split[1]) as f64,
                        size[2] * k as f64 / (2 * split[2]) as f64,
                    ));
                }
            }
        }

        let mut elements: Vec<Element> = Vec::with_capacity(num_elements);
        let mut element_nodes: Vec<[usize; VOLUME_NODES]> = Vec::with_capacity(num_elements);

        for k in 0..split[2] {
            for j in 0..split[1] {
                for i in 0..split[0] {
                    let center = [2 * i + 1, 2 * j + 1, 2 * k + 1];
                    let mut indexes = [0; VOLUME_NODES];

                    for (local, reference) in LOCAL_NODES_3D.iter().enumerate() {
                        let key = [
                            (center[0] as f64 + reference[0]) as usize,
                            (center[1] as f64 + reference[1]) as usize,
                            (center[2] as f64 + reference[2]) as usize,
                        ];

                        indexes[local] = match lattice_index.get(&key) {
                            Some(index) => *index,
                            None => {
                                return Err(BrickError::Geometry(format!(
                                    "local node {local} of element ({i}, {j}, {k}) has no mesh node at lattice point {key:?}"
                                )))
                            }
                        };
                    }

                    elements.push(Element {
                        vertices: indexes.map(|index| nodes[index]),
                    });
                    element_nodes.push(indexes);
                }
            }
        }

        println!(
            "info: built {} elements and {} nodes",
            elements.len(),
            nodes.len()
        );

        Ok(Mesh {
            size,
            split,
            elements,
            nodes,
            element_nodes,
            lattice_points,
            lattice_index,
        })
    }

    pub fn size(&self) -> [f64; 3] {
        self.size
    }

    pub fn split(&self) -> [usize; 3] {
        self.split
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn nodes(&self) -> &[Point3] {
        &self.nodes
    }

    /// Element to global node connectivity, one row of 20 indexes per element
    pub fn element_nodes(&self) -> &[[usize; VOLUME_NODES]] {
        &self.element_nodes
    }

    pub fn num_dofs(&self) -> usize {
        3 * self.nodes.len()
    }

    /// Global node index at a half-step lattice position
    pub fn node_at(&self, lattice: [usize; 3]) -> Option<usize> {
        self.lattice_index.get(&lattice).copied()
    }

    /// Half-step lattice position of a global node
    pub fn lattice_of(&self, node: usize) -> Option<[usize; 3]> {
        self.lattice_points.get(node).copied()
    }

    /// Index of the element at position `(i, j, k)` of the split
    pub fn element_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.split[0] * (j + self.split[1] * k)
    }

    /// Indexes of the nodes lying on the outer surface of the box
    pub fn surface_nodes(&self) -> Vec<usize> {
        let last = self.split.map(|n| 2 * n);

        self.lattice_points
            .iter()
            .enumerate()
            .filter(|(_, point)| (0..3).any(|axis| point[axis] == 0 || point[axis] == last[axis]))
            .map(|(index, _)| index)
            .collect()
    }

    /// Element sides that lie on the box face with the same numbering as
    /// element sides, e.g. side 4 selects the bottom face of the bottom layer
    ///
    /// # Returns
    /// The sides in element order, or an error if `side` is not in `0..6`
    pub fn boundary_sides(&self, side: usize) -> Result<Vec<ElementSide>, BrickError> {
        validate_side_index(side)?;
        let (axis, sign) = shape::side_axis(side);
        let layer = if sign > 0.0 { self.split[axis] - 1 } else { 0 };

        let mut sides = Vec::new();
        for k in 0..self.split[2] {
            for j in 0..self.split[1] {
                for i in 0..self.split[0] {
                    if [i, j, k][axis] == layer {
                        sides.push(ElementSide::new(self.element_index(i, j, k), side));
                    }
                }
            }
        }
        Ok(sides)
    }

    /// Global node indexes of an element side, in face winding order
    ///
    /// # Returns
    /// The 8 face nodes, or an error if the side is not part of this mesh
    pub fn side_nodes(&self, side: &ElementSide) -> Result<[usize; 8], BrickError> {
        side.validate(self.elements.len())?;
        let connectivity = &self.element_nodes[side.element];
        Ok(shape::face_local_nodes(side.side)?.map(|local| connectivity[local]))
    }
}
