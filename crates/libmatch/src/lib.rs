//! libmatch - Library coverage and discovery engine
//!
//! libmatch answers two questions for a registry of libraries:
//!
//! - **Where does a library serve?** A coverage statement such as
//!   `{"US": ["Boston, MA", "Kern County, CA"]}` is resolved against a
//!   hierarchy of nations, states, counties, cities and postal codes, and
//!   the resulting places become the library's service areas.
//! - **Which libraries serve me?** Free-text queries ("boston public
//!   library", "94103") and geographic proximity are matched against those
//!   service areas.
//!
//! # Quick Start
//!
//! ```rust
//! use libmatch::{Coverage, Library, LibraryRegistry, LibraryStage, RegistryConfigBuilder};
//! use libmatch::data_processing::{TestDataConfig, test_data::test_dataset};
//!
//! let config = RegistryConfigBuilder::new().default_nation("US").build();
//! let mut registry = LibraryRegistry::from_dataset(test_dataset(&TestDataConfig::sample())?, config)?;
//!
//! let boston = registry.add_library(
//!     Library::new("Boston Public Library")
//!         .with_stages(LibraryStage::Production, LibraryStage::Production),
//! );
//! let coverage: Coverage = r#"["Boston, MA"]"#.parse()?;
//! registry.register_coverage(boston, Some(&coverage), None)?;
//!
//! let found = registry.search(None, "boston public library", true);
//! assert_eq!(found[0].id(), boston);
//! # Ok::<(), libmatch::error::LibMatchError>(())
//! ```
//!
//! # Data
//!
//! Places are read from an NDJSON stream and postal codes for cities the
//! gazetteer does not know come from a city/ZIP index; see
//! [`data_processing`].
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod config;
mod core;
pub mod coverage;
pub mod error;
pub mod library;
mod location;
pub mod place;
pub mod reconcile;
pub mod resolve;
pub mod search;

pub use crate::core::{LibraryRegistry, LibraryRegistryBuilder};

pub use config::{RegistryConfig, RegistryConfigBuilder};
pub use coverage::{Coverage, CoverageResolution, CoverageValue, EVERYWHERE};
pub use libmatch_data_processing as data_processing;
pub use libmatch_data_processing::{Dataset, PlaceType};
pub use library::{Library, LibraryId, LibraryStage, LibraryStore, ServiceAreaRole};
pub use location::{Location, LocationError};
pub use place::{InMemoryPlaceStore, Place, PlaceId, PlaceStore};
pub use reconcile::{Diagnostic, Reconciliation};
pub use resolve::{GeocodeOracle, LookupOptions, Resolver};
pub use search::LibraryMatcher;

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the libmatch library.
///
/// Installs a formatting subscriber that honours `RUST_LOG` and falls back
/// to `level`. Only the first call has any effect.
///
/// ```rust
/// use libmatch::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), libmatch::error::LibMatchError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), error::LibMatchError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("hyper_util=warn".parse()?)
            .add_directive("reqwest=warn".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}
