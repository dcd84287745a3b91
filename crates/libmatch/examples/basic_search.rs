//! Basic library search functionality
//!
//! This example demonstrates the fundamental search operations:
//! - Creating a registry over the fixture gazetteer
//! - Registering libraries and the areas they serve
//! - Free-text and proximity searches

use libmatch::data_processing::{TestDataConfig, test_data::test_dataset};
use libmatch::{Coverage, Library, LibraryRegistry, LibraryStage, Location, RegistryConfigBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RegistryConfigBuilder::new().default_nation("US").build();
    let mut registry = LibraryRegistry::from_dataset(test_dataset(&TestDataConfig::sample())?, config)?;

    for (name, coverage) in [
        ("Boston Public Library", r#"["Boston, MA"]"#),
        ("Chicago Public Library", r#"["Cook County, IL"]"#),
        ("New York Public Library", r#"["New York, NY"]"#),
    ] {
        let id = registry.add_library(
            Library::new(name).with_stages(LibraryStage::Production, LibraryStage::Production),
        );
        let coverage: Coverage = coverage.parse()?;
        registry.register_coverage(id, Some(&coverage), None)?;
    }

    let origin: Location = "42.36, -71.06".parse()?;

    println!("Searching for 'public library' from {origin}:");
    print_libraries(&registry, &registry.search(Some(origin.point()), "public library", true));

    println!("\nSearching for '10018':");
    print_libraries(&registry, &registry.search(None, "10018", true));

    println!("\nLibraries within 400 km of {origin}:");
    for (library, meters) in registry.nearby(origin.point(), Some(400.0), true) {
        println!("  {} - {:.1} km", library.name, meters / 1000.0);
    }

    Ok(())
}

fn print_libraries(registry: &LibraryRegistry, libraries: &[&Library]) {
    for (i, library) in libraries.iter().enumerate() {
        println!(
            "  {}. {} ({})",
            i + 1,
            library.name,
            registry
                .service_area_name(library.id())
                .unwrap_or_else(|| "no single service area".to_string())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_env() {
        let _ = libmatch::init_logging(tracing::Level::WARN);
    }

    #[test]
    fn test_basic_search_example() {
        setup_test_env();
        assert!(main().is_ok(), "Basic search example should run successfully");
    }
}
