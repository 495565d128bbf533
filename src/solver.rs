use std::collections::BTreeSet;

use crate::{
    datatypes::{BoundaryConditionSet, Material, Point3, SolverSettings},
    error::BrickError,
    loads::build_total_force_vector,
    mesher::Mesh,
    stiffness::{build_total_stiffness_matrix, compute_element_stiffness_matrices, DOF},
};
use indicatif::ProgressBar;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};

/// Diagonal value that pins a fixed dof in place
pub const PENALTY: f64 = 1e16;

/// Result of a solve, index-aligned with the mesh nodes
#[derive(Debug, Clone)]
pub struct Solution {
    /// Displacement of node `n` along axis `c` is entry `3n + c`
    pub displacements: DVector<f64>,
    pub deformed: Vec<Point3>,
    pub iterations: u64,
}

impl Solution {
    pub fn displacement(&self, node: usize) -> [f64; 3] {
        [
            self.displacements[DOF * node],
            self.displacements[DOF * node + 1],
            self.displacements[DOF * node + 2],
        ]
    }
}

fn progress_bar(len: u64, settings: &SolverSettings) -> ProgressBar {
    if settings.progress {
        ProgressBar::new(len)
    } else {
        ProgressBar::hidden()
    }
}

/// Runs multiplication for Conjugate Gradient Solver
struct ConjugateGradientOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok((self.a * &DVector::from_vec(x.to_vec()))
            .data
            .as_vec()
            .clone())
    }
}

/// Symmetric Jacobi scaling `S a S` with `S = diag(scale)`
fn jacobi_scaled(a: &CsrMatrix<f64>, scale: &DVector<f64>) -> CsrMatrix<f64> {
    let mut scaled = a.clone();
    for (row, col, value) in scaled.triplet_iter_mut() {
        *value *= scale[row] * scale[col];
    }
    scaled
}

/// Observer bar for argmin solver
struct ConjugateGradientObserverBar {
    bar: ProgressBar,
    initial_mag: Option<f64>,
    final_mag: f64,
}

impl ConjugateGradientObserverBar {
    /// `target_cost` is in the units of the solver cost, the squared residual norm
    fn new(target_cost: f64) -> ConjugateGradientObserverBar {
        ConjugateGradientObserverBar {
            bar: ProgressBar::new(1000),
            initial_mag: None,
            final_mag: target_cost.log10(),
        }
    }
}

impl<I> Observe<I> for ConjugateGradientObserverBar
where
    I: State<Float = f64>,
{
    fn observe_init(&mut self, _name: &str, _state: &I, _kv: &KV) -> Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        let cost_mag = state.get_cost().log10();
        if !cost_mag.is_finite() {
            return Ok(());
        }

        let initial_mag = *self.initial_mag.get_or_insert(cost_mag);
        let span = initial_mag - self.final_mag;
        if span > 0.0 {
            let progress = ((initial_mag - cost_mag) / span).clamp(0.0, 1.0);
            self.bar.set_position((1000.0 * progress) as u64);
        }

        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> Result<(), Error> {
        self.bar.finish();
        Ok(())
    }
}

/// Solves a system of equations using the conjugate gradient method.
///
/// The system is Jacobi-scaled before the solve so that penalty diagonals do
/// not dominate the conditioning. The solve stops once the residual norm of the
/// scaled system drops to `tolerance` times the norm of its right hand side.
///
/// # Arguments
/// * `a` - A square symmetric positive definite matrix
/// * `b` - The right hand side of the system
/// * `settings` - Tolerance and iteration budget
///
/// # Returns
/// `x` from `Ax=b` and the number of iterations spent
pub fn run_conjugate_gradient(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    settings: &SolverSettings,
) -> Result<(DVector<f64>, u64), BrickError> {
    let mut diagonal = DVector::<f64>::zeros(a.nrows());
    for (row, col, value) in a.triplet_iter() {
        if row == col {
            diagonal[row] += *value;
        }
    }

    if let Some(dof) = diagonal.iter().position(|d| *d <= 0.0 || !d.is_finite()) {
        return Err(BrickError::Solver(format!(
            "stiffness matrix has non-positive diagonal {} at dof {dof}",
            diagonal[dof]
        )));
    }

    let scale = diagonal.map(|d| 1.0 / d.sqrt());
    let scaled_b = b.component_mul(&scale);
    let b_norm = scaled_b.norm();

    if b_norm == 0.0 {
        return Ok((DVector::zeros(b.nrows()), 0));
    }

    // argmin reports the squared residual norm as the cost
    let target_residual = settings.tolerance * b_norm;
    let target_cost = target_residual * target_residual;
    let solver: ConjugateGradient<_, f64> =
        ConjugateGradient::new(scaled_b.iter().copied().collect::<Vec<f64>>());
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];

    let scaled_a = jacobi_scaled(a, &scale);
    let operator = ConjugateGradientOperator { a: &scaled_a };

    let mut executor = Executor::new(operator, solver).configure(|state| {
        state
            .param(initial_guess)
            .max_iters(settings.max_iterations)
            .target_cost(target_cost)
    });
    if settings.progress {
        executor = executor.add_observer(
            ConjugateGradientObserverBar::new(target_cost),
            ObserverMode::NewBest,
        );
    }

    let res = match executor.run() {
        Ok(r) => r,
        Err(err) => {
            return Err(BrickError::Solver(format!(
                "Conjugate Gradient error: {err}"
            )))
        }
    };

    let state = res.state();
    let residual = state.get_best_cost().sqrt();
    let iterations = state.get_iter();

    if !(residual <= target_residual) {
        return Err(BrickError::SolverDivergence {
            iterations,
            residual: residual / b_norm,
        });
    }

    let best_param = match &state.best_param {
        Some(vec) => DVector::from_vec(vec.clone()),
        None => {
            return Err(BrickError::Solver(
                "Conjugate Gradient could not produce best parameter".to_owned(),
            ))
        }
    };

    Ok((best_param.component_mul(&scale), iterations))
}

/// Collects the global dofs of every node on a fixed side
pub fn fixed_dofs(mesh: &Mesh, bcs: &BoundaryConditionSet) -> Result<BTreeSet<usize>, BrickError> {
    let mut dofs = BTreeSet::new();

    for side in bcs.fixed() {
        for node in mesh.side_nodes(side)? {
            for component in 0..DOF {
                dofs.insert(DOF * node + component);
            }
        }
    }

    Ok(dofs)
}

/// Pins fixed dofs by overwriting their diagonal with `PENALTY`
///
/// # Arguments
/// * `total_stiffness_matrix` - The assembled stiffness matrix
/// * `fixed` - Global dofs to hold in place
pub fn apply_fixed_penalty(total_stiffness_matrix: &mut CsrMatrix<f64>, fixed: &BTreeSet<usize>) {
    for (row, col, value) in total_stiffness_matrix.triplet_iter_mut() {
        if row == col && fixed.contains(&row) {
            *value = PENALTY;
        }
    }
}

/// Moves every node by its displacement
pub fn deform(nodes: &[Point3], displacements: &DVector<f64>) -> Vec<Point3> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            node.translated([
                displacements[DOF * i],
                displacements[DOF * i + 1],
                displacements[DOF * i + 2],
            ])
        })
        .collect()
}

/// Runs the solver.
///
/// # Arguments
/// * `mesh` - The mesh to deform
/// * `bcs` - Fixed and pushed sides
/// * `material` - The model material
/// * `pressure` - Pressure on every pushed side, positive pulls outward
/// * `settings` - Linear solver settings
///
/// # Returns
/// The displacement field and the deformed nodes
pub fn run(
    mesh: &Mesh,
    bcs: &BoundaryConditionSet,
    material: &Material,
    pressure: f64,
    settings: &SolverSettings,
) -> Result<Solution, BrickError> {
    material.validate()?;
    settings.validate()?;
    bcs.validate(mesh.elements().len())?;
    if !pressure.is_finite() {
        return Err(BrickError::InvalidParameter(format!(
            "pressure must be finite, got {pressure}"
        )));
    }

    let fixed = fixed_dofs(mesh, bcs)?;
    if fixed.is_empty() {
        println!("warning [solver]: no fixed sides, the stiffness matrix is singular");
    }

    // Build element stiffness matrix for each element
    println!("info: building element stiffness matrices...");
    let bar = progress_bar(mesh.elements().len() as u64, settings);
    let element_stiffness_matrices = compute_element_stiffness_matrices(mesh, material, &bar)?;
    bar.finish_with_message(format!(
        "info: successfully built {} stiffness matrices\n",
        element_stiffness_matrices.len()
    ));

    // Compile matrices into total stiffness matrix
    println!("info: building total stiffness matrix...");
    let mut total_stiffness_matrix = build_total_stiffness_matrix(mesh, &element_stiffness_matrices);
    apply_fixed_penalty(&mut total_stiffness_matrix, &fixed);

    let total_force_vector = build_total_force_vector(mesh, bcs, pressure)?;
    println!(
        "info: {} dofs, {} fixed, {} pushed sides",
        mesh.num_dofs(),
        fixed.len(),
        bcs.pushed().count()
    );

    // Solve system
    let start = std::time::Instant::now();

    println!("info: solving...");
    let (displacements, iterations) =
        run_conjugate_gradient(&total_stiffness_matrix, &total_force_vector, settings)?;

    let elapsed = (std::time::Instant::now() - start).as_secs_f32();
    println!(
        "info: solved system in {:.3} seconds ({} iterations)",
        elapsed, iterations
    );

    let residual = (&total_stiffness_matrix * &displacements - &total_force_vector).norm();
    println!("info: unscaled residual norm {residual:e}");

    let deformed = deform(mesh.nodes(), &displacements);

    Ok(Solution {
        displacements,
        deformed,
        iterations,
    })
}
