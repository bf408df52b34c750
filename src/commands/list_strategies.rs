use crate::strategy;
use anyhow::Result;

pub fn run() -> Result<()> {
    println!("\n=== AVAILABLE STRATEGIES ===\n");
    for info in strategy::CATALOG {
        println!("{} ({})", info.id, info.label);
        println!("  Defaults:");
        for (name, value) in info.defaults {
            println!("    {}: {}", name, value);
        }
        println!("  Default grid:");
        for (name, values) in info.default_grid {
            println!("    {}: {:?}", name, values);
        }
        println!();
    }
    Ok(())
}
