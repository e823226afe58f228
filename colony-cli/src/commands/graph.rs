use color_eyre::Result;
use colony_service::Colony;

/// Print the batch partition of the whole colony as JSON
pub fn execute(colony: &Colony) -> Result<i32> {
    let snapshot = colony.graph()?.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(0)
}
