//! Source factory: `StreamDescriptor.address` scheme → `StreamSource`

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{SharedClock, StreamDescriptor, StreamSource};
use tracing::{debug, instrument};

use crate::synthetic::{SyntheticConfig, SyntheticSource};
use crate::{IngestionError, Result};

/// Constructor registered for one address scheme
pub type SourceConstructor = Arc<
    dyn Fn(&StreamDescriptor, &HashMap<String, String>, SharedClock) -> Result<Arc<dyn StreamSource>>
        + Send
        + Sync,
>;

/// Per-stream default colors for synthetic sources
const PALETTE: [[u8; 3]; 6] = [
    [64, 96, 160],
    [160, 96, 64],
    [72, 140, 88],
    [140, 72, 140],
    [150, 150, 60],
    [60, 140, 150],
];

/// Builds stream sources from descriptors
pub struct SourceFactory {
    clock: SharedClock,
    constructors: HashMap<String, SourceConstructor>,
}

impl SourceFactory {
    /// Factory with the built-in `synthetic` scheme
    pub fn new(clock: SharedClock) -> Self {
        let mut factory = Self {
            clock,
            constructors: HashMap::new(),
        };
        factory.register("synthetic", Arc::new(build_synthetic));
        factory
    }

    /// Register (or replace) the constructor for a scheme
    pub fn register(&mut self, scheme: &str, constructor: SourceConstructor) {
        self.constructors
            .insert(scheme.to_ascii_lowercase(), constructor);
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Create the source for one descriptor
    #[instrument(name = "source_factory_create", skip(self, descriptor), fields(stream_id = descriptor.id))]
    pub fn create(&self, descriptor: &StreamDescriptor) -> Result<Arc<dyn StreamSource>> {
        let (scheme, params) = parse_address(&descriptor.address)?;
        let constructor =
            self.constructors
                .get(&scheme)
                .ok_or_else(|| IngestionError::UnsupportedScheme {
                    scheme: scheme.clone(),
                    address: descriptor.address.clone(),
                })?;

        debug!(scheme = %scheme, address = %descriptor.address, "creating stream source");
        constructor(descriptor, &params, self.clock.clone())
    }

    /// Create sources for every enabled descriptor
    pub fn create_all<'a>(
        &self,
        descriptors: impl IntoIterator<Item = &'a StreamDescriptor>,
    ) -> Result<Vec<Arc<dyn StreamSource>>> {
        descriptors
            .into_iter()
            .filter(|d| d.enabled)
            .map(|d| self.create(d))
            .collect()
    }
}

fn build_synthetic(
    descriptor: &StreamDescriptor,
    params: &HashMap<String, String>,
    clock: SharedClock,
) -> Result<Arc<dyn StreamSource>> {
    let mut config = SyntheticConfig::from_params(&descriptor.address, params)?;
    if !params.contains_key("color") {
        config.color = PALETTE[descriptor.id as usize % PALETTE.len()];
    }
    Ok(Arc::new(SyntheticSource::new(
        descriptor.clone(),
        config,
        clock,
    )))
}

/// Split `scheme://host/path?k=v&k2=v2` into scheme and query params
fn parse_address(address: &str) -> Result<(String, HashMap<String, String>)> {
    let (scheme, rest) = address
        .split_once("://")
        .ok_or_else(|| IngestionError::InvalidAddress {
            address: address.to_string(),
            message: "missing '://' scheme separator".into(),
        })?;
    if scheme.is_empty() {
        return Err(IngestionError::InvalidAddress {
            address: address.to_string(),
            message: "empty scheme".into(),
        });
    }

    let mut params = HashMap::new();
    if let Some((_, query)) = rest.split_once('?') {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(key.to_string(), value.to_string());
        }
    }

    Ok((scheme.to_ascii_lowercase(), params))
}
