//! Contract command - show what the provider will be asked to return.

use std::path::PathBuf;

use magicrows::{OutputSpec, build_contract, load_preset};

pub fn run(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_preset(&config_path)?;

    if config.combine_outputs {
        let outputs: Vec<&OutputSpec> = config.outputs.iter().collect();
        let schema = build_contract(&outputs).to_json_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
    } else {
        // One call per output, so one schema per output
        let schemas: serde_json::Map<String, serde_json::Value> = config
            .outputs
            .iter()
            .map(|output| (output.name.clone(), build_contract(&[output]).to_json_schema()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&schemas)?);
    }

    Ok(())
}
