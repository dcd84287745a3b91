//! Registry configuration and customization
//!
//! This example demonstrates how the configuration presets change what a
//! coverage statement resolves to and how many results a search keeps.

use libmatch::data_processing::{TestDataConfig, test_data::test_dataset};
use libmatch::{Coverage, Library, LibraryRegistry, RegistryConfig, RegistryConfigBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Calabasas is not in the gazetteer; only the ZIP index knows it.
    let coverage: Coverage = r#"{"US": ["Calabasas, CA", "Irvine, CA"]}"#.parse()?;

    println!("Resolving {coverage} under each preset:\n");
    for (label, config) in [
        ("Default", RegistryConfigBuilder::new().build()),
        ("Strict", RegistryConfigBuilder::strict().build()),
        ("Permissive", RegistryConfigBuilder::permissive().build()),
    ] {
        compare_config(label, config, &coverage)?;
    }

    // Invalid settings are caught by try_build.
    match RegistryConfigBuilder::new().strategy_limit(0).try_build() {
        Ok(_) => println!("\nUnexpectedly accepted a zero strategy limit"),
        Err(e) => println!("\nRejected configuration: {e}"),
    }

    Ok(())
}

fn compare_config(
    label: &str,
    config: RegistryConfig,
    coverage: &Coverage,
) -> Result<(), Box<dyn std::error::Error>> {
    let limit = config.strategy_limit;
    let mut registry = LibraryRegistry::from_dataset(test_dataset(&TestDataConfig::sample())?, config)?;
    for i in 0..25 {
        registry.add_library(Library::new(format!("Branch Library {i}")));
    }

    let resolution = registry.resolve_coverage(coverage);
    let results = registry.search(None, "branch library", false);
    println!(
        "  {label:<11} {} places, {} unknown, {} search results (limit: {limit})",
        resolution.places.len(),
        resolution.unknown.values().map(|v| v.names().len()).sum::<usize>(),
        results.len(),
    );
    Ok(())
}
