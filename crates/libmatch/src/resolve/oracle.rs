use std::{
    sync::{Arc, mpsc},
    time::Duration,
};

use ahash::AHashMap as HashMap;
use libmatch_data_processing::{CityZipIndex, ZipRecord};
use tracing::trace;

use super::error::{OracleError, OracleResult};

/// An outside source of city → postal code knowledge, consulted when a city
/// inside a state is unknown to the place store.
pub trait GeocodeOracle: Send + Sync {
    /// Every city the source knows in a state, with its postal codes.
    fn cities_and_zips_for_state(
        &self,
        state_abbreviation: &str,
    ) -> OracleResult<HashMap<String, Vec<ZipRecord>>>;

    /// Postal codes for an exact city name inside a state.
    fn zipcodes_for_city(&self, state_abbreviation: &str, city: &str) -> OracleResult<Vec<String>> {
        Ok(self
            .cities_and_zips_for_state(state_abbreviation)?
            .remove(city)
            .unwrap_or_default()
            .into_iter()
            .map(|z| z.zipcode)
            .collect())
    }
}

impl GeocodeOracle for CityZipIndex {
    fn cities_and_zips_for_state(
        &self,
        state_abbreviation: &str,
    ) -> OracleResult<HashMap<String, Vec<ZipRecord>>> {
        Ok(CityZipIndex::cities_and_zips_for_state(self, state_abbreviation)
            .cloned()
            .unwrap_or_default())
    }

    fn zipcodes_for_city(&self, state_abbreviation: &str, city: &str) -> OracleResult<Vec<String>> {
        Ok(self
            .zips_for_city(state_abbreviation, city)
            .iter()
            .map(|z| z.zipcode.clone())
            .collect())
    }
}

type Job = Box<dyn FnOnce(&dyn GeocodeOracle) + Send>;

/// Runs the calls of a slow oracle, one at a time, on a single worker
/// thread and gives up on each after `timeout`.
///
/// A call that times out keeps the worker busy until it finishes; calls
/// queued behind it count their wait against their own timeout.
pub struct TimeoutOracle {
    jobs: mpsc::Sender<Job>,
    timeout: Duration,
}

impl TimeoutOracle {
    /// Start the worker thread for `inner`. It exits when the oracle is
    /// dropped.
    pub fn new(inner: Arc<dyn GeocodeOracle>, timeout: Duration) -> std::io::Result<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name("geocode-oracle".to_string())
            .spawn(move || {
                for job in queue {
                    job(inner.as_ref());
                }
            })?;
        Ok(Self { jobs, timeout })
    }

    fn bounded<T, F>(&self, call: F) -> OracleResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn GeocodeOracle) -> OracleResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.jobs
            .send(Box::new(move |oracle| {
                // The caller may have given up already.
                let _ = tx.send(call(oracle));
            }))
            .map_err(|_| OracleError::Unavailable("oracle worker has stopped".to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                trace!(timeout = ?self.timeout, "Oracle call timed out");
                Err(OracleError::Timeout(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(OracleError::Unavailable(
                "oracle worker exited without answering".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for TimeoutOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutOracle")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GeocodeOracle for TimeoutOracle {
    fn cities_and_zips_for_state(
        &self,
        state_abbreviation: &str,
    ) -> OracleResult<HashMap<String, Vec<ZipRecord>>> {
        let state = state_abbreviation.to_string();
        self.bounded(move |oracle| oracle.cities_and_zips_for_state(&state))
    }

    fn zipcodes_for_city(&self, state_abbreviation: &str, city: &str) -> OracleResult<Vec<String>> {
        let (state, city) = (state_abbreviation.to_string(), city.to_string());
        self.bounded(move |oracle| oracle.zipcodes_for_city(&state, &city))
    }
}
