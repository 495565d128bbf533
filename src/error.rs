use std::fmt::Display;

#[derive(Debug)]
pub enum BrickError {
    Input(String),
    InvalidParameter(String),
    Geometry(String),
    SingularJacobian {
        element: usize,
        gauss_point: usize,
        determinant: f64,
    },
    SolverDivergence {
        iterations: u64,
        residual: f64,
    },
    Solver(String),
    PostProcessor(String),
}

impl Display for BrickError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            BrickError::Input(v) => ("Input", v.clone()),
            BrickError::InvalidParameter(v) => ("Invalid parameter", v.clone()),
            BrickError::Geometry(v) => ("Geometry", v.clone()),
            BrickError::SingularJacobian {
                element,
                gauss_point,
                determinant,
            } => (
                "Singular Jacobian",
                format!(
                    "element {element} has determinant {determinant:e} at gauss point {gauss_point}"
                ),
            ),
            BrickError::SolverDivergence {
                iterations,
                residual,
            } => (
                "Solver divergence",
                format!(
                    "conjugate gradient stopped after {iterations} iterations with residual {residual:e}"
                ),
            ),
            BrickError::Solver(v) => ("Solver", v.clone()),
            BrickError::PostProcessor(v) => ("Post Processor", v.clone()),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}

impl std::error::Error for BrickError {}
