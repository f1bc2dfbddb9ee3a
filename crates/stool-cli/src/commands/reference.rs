//! Reference commands - convert between arguments and serialized references

use console::style;
use stool_repo::DirectionsRef;

use crate::commands::parse_reference;
use crate::error::Result;

/// Print the serialized form of a directions argument
pub fn encode(arg: &str) -> Result<()> {
    println!("{}", parse_reference(arg)?.serialize());
    Ok(())
}

pub fn decode(serialized: &str) -> Result<()> {
    let reference = DirectionsRef::parse(serialized)?;
    println!("{} {}", style("type:").dim(), reference.kind().as_str());
    println!("{} {}", style("origin:").dim(), reference.origin());
    println!("{}", style("value:").dim());
    for line in reference.value().lines() {
        println!("  {line}");
    }
    Ok(())
}
