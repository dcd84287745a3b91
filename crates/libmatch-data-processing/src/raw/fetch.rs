use std::time::Duration;

use tracing::{info, instrument, warn};

use super::Result;
use crate::{CityZipIndex, DataError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Download a city/ZIP index published as JSON.
///
/// The whole request, body included, must complete within `timeout`.
#[instrument(name = "Download ZIP index", skip_all, level = "info", fields(url = %url))]
pub fn download_zip_index(url: &str, timeout: Duration) -> Result<CityZipIndex> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let client = reqwest::Client::new();
        match tokio::time::timeout(timeout, fetch_json(&client, url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url, seconds = timeout.as_secs(), "ZIP index download timed out");
                Err(DataError::Timeout {
                    url: url.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        }
    })
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<CityZipIndex> {
    info!(url, "Starting download");
    let index = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<CityZipIndex>()
        .await?;
    info!(states = index.state_count(), "Download complete");
    Ok(index)
}
