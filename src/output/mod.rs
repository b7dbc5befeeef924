//! Output formatting for CLI results

use serde::Serialize;

use tokenkeeper::error::Result;

pub mod json;

/// Print `data` wrapped in the JSON envelope
pub fn print_json<T: Serialize + ?Sized>(data: &T) -> Result<()> {
    println!("{}", json::format_json(data)?);
    Ok(())
}
