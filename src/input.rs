use json::JsonValue;

use crate::{
    datatypes::{BoundaryConditionSet, ElementSide, Material, SolverSettings},
    error::BrickError,
    mesher::{validate_box, Mesh},
};

/// Box faces by name, indexed like element sides
const FACE_NAMES: [&str; 6] = ["x-", "x+", "y-", "y+", "z-", "z+"];

/// A side selection read from the input file
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SideSelection {
    /// Every element side on a face of the box
    BoxFace(usize),
    Element(ElementSide),
}

/// Everything needed for one run, as read from the input file
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub size: [f64; 3],
    pub split: [usize; 3],
    pub material: Material,
    pub pressure: f64,
    pub fixed: Vec<SideSelection>,
    pub pushed: Vec<SideSelection>,
    pub settings: SolverSettings,
}

impl ModelInput {
    /// Resolves the side selections against a mesh
    ///
    /// # Arguments
    /// * `mesh` - The mesh built from this input
    ///
    /// # Returns
    /// The boundary condition set, or an error when a side is both fixed and pushed
    pub fn boundary_conditions(&self, mesh: &Mesh) -> Result<BoundaryConditionSet, BrickError> {
        let resolve = |selections: &[SideSelection]| -> Result<Vec<ElementSide>, BrickError> {
            let mut sides = Vec::new();
            for selection in selections {
                match selection {
                    SideSelection::BoxFace(side) => sides.extend(mesh.boundary_sides(*side)?),
                    SideSelection::Element(side) => sides.push(*side),
                }
            }
            Ok(sides)
        };

        let bcs = BoundaryConditionSet::from_sides(resolve(&self.fixed)?, resolve(&self.pushed)?)?;
        bcs.validate(mesh.elements().len())?;

        println!(
            "info: loaded {} fixed and {} pushed sides from input file",
            bcs.fixed().count(),
            bcs.pushed().count()
        );

        Ok(bcs)
    }
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
fn load_input_file(input_file: &str) -> Result<JsonValue, BrickError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(BrickError::Input(format!(
                "Unable to open input file {input_file}: {err}"
            )))
        }
    };

    match json::parse(&file_string) {
        Ok(f) => Ok(f),
        Err(err) => Err(BrickError::Input(format!(
            "Error in input file json: {err}"
        ))),
    }
}

fn parse_f64_triple(value: &JsonValue, name: &str) -> Result<[f64; 3], BrickError> {
    if !value.is_array() || value.len() != 3 {
        return Err(BrickError::Input(format!(
            "{name} must be an array of three numbers"
        )));
    }

    let mut triple = [0.0; 3];
    for (i, entry) in triple.iter_mut().enumerate() {
        *entry = match value[i].as_f64() {
            Some(v) => v,
            None => {
                return Err(BrickError::Input(format!(
                    "Non-float value at position {i} of {name}"
                )))
            }
        };
    }
    Ok(triple)
}

fn parse_usize_triple(value: &JsonValue, name: &str) -> Result<[usize; 3], BrickError> {
    if !value.is_array() || value.len() != 3 {
        return Err(BrickError::Input(format!(
            "{name} must be an array of three integers"
        )));
    }

    let mut triple = [0; 3];
    for (i, entry) in triple.iter_mut().enumerate() {
        *entry = match value[i].as_usize() {
            Some(v) => v,
            None => {
                return Err(BrickError::Input(format!(
                    "Non-integer value at position {i} of {name}"
                )))
            }
        };
    }
    Ok(triple)
}

fn parse_sides(value: &JsonValue, name: &str) -> Result<Vec<SideSelection>, BrickError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    if !value.is_array() {
        return Err(BrickError::Input(format!(
            "boundary_conditions.{name} must be an array"
        )));
    }

    let mut selections = Vec::new();
    for entry in value.members() {
        if let Some(face) = entry.as_str() {
            match FACE_NAMES.iter().position(|n| *n == face.trim()) {
                Some(side) => selections.push(SideSelection::BoxFace(side)),
                None => {
                    return Err(BrickError::Input(format!(
                        "Unknown box face '{face}' in {name}. Expected one of {FACE_NAMES:?}"
                    )))
                }
            }
        } else if entry.is_object() {
            let element = entry["element"].as_usize();
            let side = entry["side"].as_usize();

            match (element, side) {
                (Some(element), Some(side)) => {
                    selections.push(SideSelection::Element(ElementSide::new(element, side)))
                }
                _ => {
                    return Err(BrickError::Input(format!(
                        "Side in {name} needs integer element and side fields"
                    )))
                }
            }
        } else {
            return Err(BrickError::Input(format!(
                "Entries of {name} must be a face name or an {{element, side}} object"
            )));
        }
    }

    Ok(selections)
}

/// Parses a model from the contents of an input file
///
/// # Arguments
/// * `contents` - The input file as a json string
///
/// # Returns
/// The parsed and range-checked model input
pub fn parse_input(contents: &str) -> Result<ModelInput, BrickError> {
    let input_json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(BrickError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    parse_input_json(&input_json)
}

fn parse_input_json(input_json: &JsonValue) -> Result<ModelInput, BrickError> {
    for key in ["body", "material", "pressure", "boundary_conditions"] {
        if !input_json.has_key(key) {
            return Err(BrickError::Input(format!("Input json missing {key} field")));
        }
    }
    if !input_json["body"].has_key("size") || !input_json["body"].has_key("split") {
        return Err(BrickError::Input(
            "Input json missing size or split field in body section".to_owned(),
        ));
    }

    let size = parse_f64_triple(&input_json["body"]["size"], "body.size")?;
    let split = parse_usize_triple(&input_json["body"]["split"], "body.split")?;
    validate_box(size, split)?;

    let youngs_modulus = input_json["material"]["youngs_modulus"].as_f64();
    let poisson_ratio = input_json["material"]["poisson_ratio"].as_f64();

    let material = match (youngs_modulus, poisson_ratio) {
        (Some(e), Some(nu)) => Material::new(e, nu)?,
        (None, _) => {
            return Err(BrickError::Input(
                "Input json missing youngs_modulus in material section".to_owned(),
            ))
        }
        (_, None) => {
            return Err(BrickError::Input(
                "Input json missing poisson_ratio in material section".to_owned(),
            ))
        }
    };

    let pressure = match input_json["pressure"].as_f64() {
        Some(p) => p,
        None => return Err(BrickError::Input("Non-float pressure".to_owned())),
    };

    let fixed = parse_sides(&input_json["boundary_conditions"]["fixed"], "fixed")?;
    let pushed = parse_sides(&input_json["boundary_conditions"]["pushed"], "pushed")?;

    if fixed.is_empty() {
        println!("warning [input]: no fixed sides, the body is free to move");
    }

    let mut settings = SolverSettings::default();
    if input_json.has_key("solver") {
        let solver = &input_json["solver"];
        if solver.has_key("tolerance") {
            settings.tolerance = solver["tolerance"]
                .as_f64()
                .ok_or_else(|| BrickError::Input("Bad value for solver.tolerance".to_owned()))?;
        }
        if solver.has_key("max_iterations") {
            settings.max_iterations = solver["max_iterations"].as_u64().ok_or_else(|| {
                BrickError::Input("Bad value for solver.max_iterations".to_owned())
            })?;
        }
    }
    settings.validate()?;

    Ok(ModelInput {
        size,
        split,
        material,
        pressure,
        fixed,
        pushed,
        settings,
    })
}

/// Loads and parses a model input file
///
/// # Arguments
/// * `input_file` - The path to the input file
pub fn run(input_file: &str) -> Result<ModelInput, BrickError> {
    let input_json = load_input_file(input_file)?;
    parse_input_json(&input_json)
}
