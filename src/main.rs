use brickfem::{error::BrickError, input, mesher::Mesh, post_processor, solver};
use clap::Parser;

/// Deforms a pressure-loaded elastic box
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the json model file
    input: String,

    /// Where to write the node table
    #[arg(long, default_value = "nodes.csv")]
    nodes_output: String,

    /// Where to write the element table
    #[arg(long, default_value = "elements.csv")]
    elements_output: String,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

fn run(args: &Args) -> Result<(), BrickError> {
    let mut model = input::run(&args.input)?;
    model.settings.progress = !args.no_progress;

    let mesh = Mesh::build(model.size, model.split)?;
    let bcs = model.boundary_conditions(&mesh)?;

    let solution = solver::run(&mesh, &bcs, &model.material, model.pressure, &model.settings)?;

    post_processor::csv_output(&mesh, &solution, &args.nodes_output, &args.elements_output)
}

fn main() {
    let args = Args::parse();

    if let Err(err) = run(&args) {
        println!("error: {err}");
        std::process::exit(1)
    }
}
