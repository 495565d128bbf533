use std::io::{BufWriter, Write};

use crate::{error::BrickError, mesher::Mesh, solver::Solution};

fn create_file(path: &str) -> Result<BufWriter<std::fs::File>, BrickError> {
    match std::fs::File::create(path) {
        Ok(f) => Ok(BufWriter::new(f)),
        Err(err) => Err(BrickError::PostProcessor(format!(
            "Failed to create {path}: {err}"
        ))),
    }
}

fn write_error(path: &str, err: std::io::Error) -> BrickError {
    BrickError::PostProcessor(format!("Failed to write {path}: {err}"))
}

/// Writes the node table: original position, displacement and deformed position
///
/// # Arguments
/// * `out` - Destination of the csv text
/// * `mesh` - The solved mesh
/// * `solution` - Displacements of the mesh nodes
pub fn write_nodes<W: Write>(
    out: &mut W,
    mesh: &Mesh,
    solution: &Solution,
) -> std::io::Result<()> {
    writeln!(out, "x,y,z,ux,uy,uz,dx,dy,dz")?;
    for (i, (node, deformed)) in mesh.nodes().iter().zip(&solution.deformed).enumerate() {
        let [ux, uy, uz] = solution.displacement(i);
        writeln!(
            out,
            "{},{},{},{ux},{uy},{uz},{},{},{}",
            node.x, node.y, node.z, deformed.x, deformed.y, deformed.z
        )?;
    }
    out.flush()
}

/// Writes the connectivity table, one row of 20 node indexes per element
pub fn write_elements<W: Write>(out: &mut W, mesh: &Mesh) -> std::io::Result<()> {
    let header: Vec<String> = (0..20).map(|n| format!("n{n}")).collect();
    writeln!(out, "{}", header.join(","))?;

    for connectivity in mesh.element_nodes() {
        let row: Vec<String> = connectivity.iter().map(|n| n.to_string()).collect();
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `solution` - The displacement field of the mesh
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    mesh: &Mesh,
    solution: &Solution,
    nodes_output: &str,
    elements_output: &str,
) -> Result<(), BrickError> {
    if solution.deformed.len() != mesh.nodes().len() {
        return Err(BrickError::PostProcessor(format!(
            "Solution has {} nodes but the mesh has {}",
            solution.deformed.len(),
            mesh.nodes().len()
        )));
    }

    let mut nodes_file = create_file(nodes_output)?;
    let mut elements_file = create_file(elements_output)?;

    write_nodes(&mut nodes_file, mesh, solution).map_err(|e| write_error(nodes_output, e))?;
    write_elements(&mut elements_file, mesh).map_err(|e| write_error(elements_output, e))?;

    println!(
        "info: wrote output to {} and {}",
        nodes_output, elements_output
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::deform;
    use nalgebra::DVector;

    fn solved_cube() -> (Mesh, Solution) {
        let mesh = Mesh::build([1.0, 1.0, 1.0], [1, 1, 1]).unwrap();
        let displacements = DVector::from_fn(mesh.num_dofs(), |dof, _| {
            if dof % 3 == 2 {
                0.5
            } else {
                0.0
            }
        });
        let deformed = deform(mesh.nodes(), &displacements);
        let solution = Solution {
            displacements,
            deformed,
            iterations: 1,
        };
        (mesh, solution)
    }

    #[test]
    fn node_table_has_one_row_per_node() {
        let (mesh, solution) = solved_cube();
        let mut out = Vec::new();
        write_nodes(&mut out, &mesh, &solution).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "x,y,z,ux,uy,uz,dx,dy,dz");
        assert_eq!(lines.len(), 1 + 20);
        assert_eq!(lines[1], "0,0,0,0,0,0.5,0,0,0.5");
    }

    #[test]
    fn element_table_lists_connectivity() {
        let (mesh, _) = solved_cube();
        let mut out = Vec::new();
        write_elements(&mut out, &mesh).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("n0,n1,"));
        assert!(lines[0].ends_with(",n19"));
        assert_eq!(lines[1].split(',').count(), 20);
    }

    #[test]
    fn unwritable_path_is_reported() {
        let (mesh, solution) = solved_cube();
        assert!(matches!(
            csv_output(
                &mesh,
                &solution,
                "/nonexistent/brickfem/nodes.csv",
                "/nonexistent/brickfem/elements.csv"
            ),
            Err(BrickError::PostProcessor(_))
        ));
    }
}
