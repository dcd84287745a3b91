//! Data source and initialization patterns
//!
//! This example demonstrates the different ways to get places into a
//! registry: the in-memory fixture dataset, an NDJSON file on disk, and a
//! hand-built store.

use std::io::BufReader;

use libmatch::data_processing::{
    TestDataConfig, create_test_data, load_dataset_from, test_data::write_test_data_dir,
};
use libmatch::{
    InMemoryPlaceStore, LibraryRegistry, LibraryStore, Place, PlaceStore, PlaceType, RegistryConfig,
    RegistryConfigBuilder,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("libmatch LibraryRegistry - Data Source Examples\n");

    // Method 1: Write the fixture files into a directory and load them as a dataset
    println!("1. Loading a dataset directory:");
    let dir = tempfile::TempDir::new()?;
    write_test_data_dir(dir.path(), &TestDataConfig::sample())?;
    let dataset = load_dataset_from(dir.path())?;
    println!(
        "   {} place records, ZIP index for {} states",
        dataset.metadata.place_rows, dataset.metadata.zip_states
    );
    let registry = LibraryRegistry::from_dataset(dataset, RegistryConfig::default())?;
    println!("   Registry holds {} places\n", registry.places().len());

    // Method 2: Stream a places NDJSON file straight into a store
    println!("2. Reading a places NDJSON file:");
    let (places_file, _zips_file) = create_test_data(&TestDataConfig::minimal())?;
    let reader = BufReader::new(std::fs::File::open(places_file.path())?);
    let store = InMemoryPlaceStore::from_ndjson(reader)?;
    println!("   Store holds {} places\n", store.len());

    // Method 3: Build places by hand
    println!("3. Building a store by hand:");
    let mut store = InMemoryPlaceStore::new();
    let nation = store.insert(Place::new(PlaceType::Nation, "Freedonia").with_abbreviation("FR"));
    store.insert(Place::new(PlaceType::City, "Fredville").with_parent(nation));
    let registry = LibraryRegistry::new(
        store,
        LibraryStore::new(),
        RegistryConfigBuilder::new().default_nation("FR").build(),
    )?;
    println!(
        "   Default nation: {}",
        registry
            .places()
            .find_by_name("FR", Some(PlaceType::Nation))
            .first()
            .map_or("none", |p| p.external_name.as_str())
    );

    Ok(())
}
