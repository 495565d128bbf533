use std::collections::BTreeSet;

use crate::error::BrickError;

/// Number of faces on a hexahedron
pub const SIDES_PER_ELEMENT: usize = 6;

/// Checks that `side` names one of the six faces of a hexahedron
pub fn validate_side_index(side: usize) -> Result<(), BrickError> {
    if side >= SIDES_PER_ELEMENT {
        return Err(BrickError::InvalidParameter(format!(
            "side index {side} is out of range [0, {SIDES_PER_ELEMENT})"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Point3 {
        Point3 { x, y, z }
    }

    /// Coordinate along `axis` (0 = x, 1 = y, 2 = z)
    pub fn coord(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn translated(&self, offset: [f64; 3]) -> Point3 {
        Point3 {
            x: self.x + offset[0],
            y: self.y + offset[1],
            z: self.z + offset[2],
        }
    }
}

/// A 20-node hexahedron in global coordinates. Vertices follow the local node
/// order of `shape::LOCAL_NODES_3D`: corners first, then mid-edges.
#[derive(Debug, Clone)]
pub struct Element {
    pub vertices: [Point3; 20],
}

/// One of the six faces of an element.
///
/// Sides 0/1 are the -/+ faces along A, 2/3 along B and 4/5 along C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementSide {
    pub element: usize,
    pub side: usize,
}

impl ElementSide {
    pub fn new(element: usize, side: usize) -> ElementSide {
        ElementSide { element, side }
    }

    /// Checks that the side refers to an existing element face
    ///
    /// # Arguments
    /// * `num_elements` - Number of elements in the mesh
    pub fn validate(&self, num_elements: usize) -> Result<(), BrickError> {
        validate_side_index(self.side)?;
        if self.element >= num_elements {
            return Err(BrickError::InvalidParameter(format!(
                "element index {} is out of range, mesh has {num_elements} elements",
                self.element
            )));
        }
        Ok(())
    }
}

/// Fixed (Dirichlet) and pushed (pressure) element sides.
///
/// A side is never in both sets: fixing a side releases any push on it and the
/// other way around.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryConditionSet {
    fixed: BTreeSet<ElementSide>,
    pushed: BTreeSet<ElementSide>,
}

impl BoundaryConditionSet {
    pub fn new() -> BoundaryConditionSet {
        BoundaryConditionSet::default()
    }

    /// Builds a set from explicit side lists
    ///
    /// # Arguments
    /// * `fixed` - Sides whose nodes are held in place
    /// * `pushed` - Sides that carry the pressure load
    ///
    /// # Returns
    /// The boundary condition set, or an error if a side appears in both lists
    pub fn from_sides<F, P>(fixed: F, pushed: P) -> Result<BoundaryConditionSet, BrickError>
    where
        F: IntoIterator<Item = ElementSide>,
        P: IntoIterator<Item = ElementSide>,
    {
        let fixed: BTreeSet<ElementSide> = fixed.into_iter().collect();
        let pushed: BTreeSet<ElementSide> = pushed.into_iter().collect();

        if let Some(side) = fixed.intersection(&pushed).next() {
            return Err(BrickError::InvalidParameter(format!(
                "side {} of element {} is both fixed and pushed",
                side.side, side.element
            )));
        }

        Ok(BoundaryConditionSet { fixed, pushed })
    }

    pub fn fix(&mut self, side: ElementSide) {
        self.pushed.remove(&side);
        self.fixed.insert(side);
    }

    pub fn push(&mut self, side: ElementSide) {
        self.fixed.remove(&side);
        self.pushed.insert(side);
    }

    /// Removes any condition from `side`
    pub fn release(&mut self, side: ElementSide) {
        self.fixed.remove(&side);
        self.pushed.remove(&side);
    }

    pub fn is_fixed(&self, side: &ElementSide) -> bool {
        self.fixed.contains(side)
    }

    pub fn is_pushed(&self, side: &ElementSide) -> bool {
        self.pushed.contains(side)
    }

    pub fn fixed(&self) -> impl Iterator<Item = &ElementSide> {
        self.fixed.iter()
    }

    pub fn pushed(&self) -> impl Iterator<Item = &ElementSide> {
        self.pushed.iter()
    }

    /// Checks that every side refers to an existing element face
    pub fn validate(&self, num_elements: usize) -> Result<(), BrickError> {
        for side in self.fixed.iter().chain(self.pushed.iter()) {
            side.validate(num_elements)?;
        }

        Ok(())
    }
}

/// Isotropic linear-elastic material
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
}

impl Material {
    pub fn new(youngs_modulus: f64, poisson_ratio: f64) -> Result<Material, BrickError> {
        let material = Material {
            youngs_modulus,
            poisson_ratio,
        };
        material.validate()?;
        Ok(material)
    }

    pub fn validate(&self) -> Result<(), BrickError> {
        if !self.youngs_modulus.is_finite() || self.youngs_modulus <= 0.0 {
            return Err(BrickError::InvalidParameter(format!(
                "Young's modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        if !(0.0..0.5).contains(&self.poisson_ratio) {
            return Err(BrickError::InvalidParameter(format!(
                "Poisson ratio must be in [0, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        Ok(())
    }

    /// Calculates the material constants used by the stiffness integrand
    ///
    /// # Returns
    /// `(lambda, mu)` where `lambda = E/((1+nu)(1-2nu))` and `mu = E/(2(1+nu))`
    pub fn lame_parameters(&self) -> (f64, f64) {
        let e = self.youngs_modulus;
        let nu = self.poisson_ratio;

        let lambda = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let mu = e / (2.0 * (1.0 + nu));

        (lambda, mu)
    }
}

/// Settings for the linear solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// Target residual relative to the right hand side
    pub tolerance: f64,
    pub max_iterations: u64,
    /// Show progress bars
    pub progress: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            tolerance: 1e-9,
            max_iterations: 100_000,
            progress: true,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), BrickError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(BrickError::InvalidParameter(format!(
                "solver tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(BrickError::InvalidParameter(
                "solver needs at least one iteration".to_owned(),
            ));
        }
        Ok(())
    }
}
