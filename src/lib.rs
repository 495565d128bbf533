//! Linear elastic analysis of a rectangular box meshed with 20-node
//! serendipity hexahedra.

pub mod datatypes;
pub mod error;
pub mod input;
pub mod jacobian;
pub mod loads;
pub mod mesher;
pub mod post_processor;
pub mod shape;
pub mod solver;
pub mod stiffness;

pub use datatypes::{BoundaryConditionSet, ElementSide, Material, Point3, SolverSettings};
pub use error::BrickError;
pub use mesher::Mesh;
pub use solver::Solution;
