//! Content-addressed memoisation of forecasts.
//!
//! The cache is an ordinary value owned by the caller. Nothing in the crate
//! holds forecast results in shared or global state.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::forecast::{run_forecast, Forecast, ForecastInput};
use crate::types::ComputationOutput;
use crate::InvexisResult;

/// SHA-256 hex digest of the canonical JSON form of `input`.
///
/// Object keys are serialised in sorted order, so two inputs that differ only
/// in map insertion order share a key.
pub fn cache_key(input: &ForecastInput) -> InvexisResult<String> {
    let canonical = serde_json::to_value(input)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Forecasts keyed by [`cache_key`].
#[derive(Debug, Default)]
pub struct ForecastCache {
    entries: HashMap<String, Arc<ComputationOutput<Forecast>>>,
}

impl ForecastCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<ComputationOutput<Forecast>>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(
        &mut self,
        key: String,
        output: ComputationOutput<Forecast>,
    ) -> Arc<ComputationOutput<Forecast>> {
        let shared = Arc::new(output);
        self.entries.insert(key, Arc::clone(&shared));
        shared
    }

    /// Return the cached forecast for `input`, running it on a miss.
    pub fn get_or_run(
        &mut self,
        input: &ForecastInput,
    ) -> InvexisResult<Arc<ComputationOutput<Forecast>>> {
        let key = cache_key(input)?;
        if let Some(hit) = self.get(&key) {
            debug!(%key, "forecast cache hit");
            return Ok(hit);
        }
        debug!(%key, "forecast cache miss");
        let output = run_forecast(input)?;
        Ok(self.insert(key, output))
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<ComputationOutput<Forecast>>> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
