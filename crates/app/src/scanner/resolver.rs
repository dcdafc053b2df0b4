//! Product lookups for detected codes.
//!
//! Camera detections dispatch lookups onto their own short-lived threads so a
//! slow or hung lookup service never stalls frame publishing. Overlapping
//! lookups may finish out of order; whichever completes last wins.

use std::{sync::Arc, time::Duration, time::Instant};

use anyhow::{Context, Result};
use reqwest::{StatusCode, blocking::Client};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::scanner::{
    data::{DetectionState, ProductRecord},
    telemetry,
};

#[derive(Debug, Error)]
pub(crate) enum LookupError {
    #[error("lookup timed out")]
    Timeout,
    #[error("could not reach lookup service: {0}")]
    Connection(String),
    #[error("lookup service answered with status {0}")]
    BadStatus(u16),
    #[error("lookup response was not valid JSON: {0}")]
    Malformed(String),
    #[error("lookup request failed: {0}")]
    Request(String),
}

impl LookupError {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            LookupError::Timeout => "timeout",
            LookupError::Connection(_) => "connection",
            LookupError::BadStatus(_) => "bad_status",
            LookupError::Malformed(_) => "malformed",
            LookupError::Request(_) => "request",
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LookupError::Timeout
        } else if err.is_connect() {
            LookupError::Connection(err.to_string())
        } else if err.is_decode() {
            LookupError::Malformed(err.to_string())
        } else {
            LookupError::Request(err.to_string())
        }
    }
}

/// External product lookup service.
pub(crate) trait ProductLookup: Send + Sync {
    fn lookup(&self, code: &str) -> Result<ProductRecord, LookupError>;
}

/// `GET <base_url>?barcode=<code>` against the product service.
pub(crate) struct HttpProductLookup {
    client: Client,
    base_url: String,
}

impl HttpProductLookup {
    pub(crate) fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build product lookup client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl ProductLookup for HttpProductLookup {
    fn lookup(&self, code: &str) -> Result<ProductRecord, LookupError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("barcode", code)])
            .send()
            .map_err(LookupError::from_reqwest)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(LookupError::BadStatus(status.as_u16()));
        }

        let body = response.bytes().map_err(LookupError::from_reqwest)?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|err| LookupError::Malformed(err.to_string()))?;
        Ok(ProductRecord(value))
    }
}

/// Resolves codes into products and records the outcome in [`DetectionState`].
#[derive(Clone)]
pub(crate) struct ProductResolver {
    lookup: Arc<dyn ProductLookup>,
    detection: Arc<DetectionState>,
}

impl ProductResolver {
    pub(crate) fn new(lookup: Arc<dyn ProductLookup>, detection: Arc<DetectionState>) -> Self {
        Self { lookup, detection }
    }

    /// Look `code` up and store the result; failures store an absent product.
    pub(crate) fn resolve(&self, code: &str) -> Option<ProductRecord> {
        let started = Instant::now();
        let outcome = self.lookup.lookup(code);
        metrics::histogram!("scanner_lookup_seconds").record(started.elapsed().as_secs_f64());

        let product = match outcome {
            Ok(product) => {
                metrics::counter!("scanner_lookups_total", "outcome" => "ok").increment(1);
                info!(barcode = code, "product resolved");
                debug!(barcode = code, product = %product.0, "product payload");
                Some(product)
            }
            Err(err) => {
                metrics::counter!("scanner_lookups_total", "outcome" => err.label()).increment(1);
                warn!(barcode = code, "product lookup failed: {err}");
                None
            }
        };
        self.detection.store_product(product.clone());
        product
    }

    /// Resolve on a background thread without waiting for the result.
    pub(crate) fn dispatch(&self, code: &str) {
        let resolver = self.clone();
        let code = code.to_string();
        let spawned = telemetry::spawn_thread("product-lookup", move || {
            let span = tracing::info_span!("resolver.lookup", barcode = %code);
            let _guard = span.enter();
            resolver.resolve(&code);
        });
        if let Err(err) = spawned {
            warn!("failed to spawn product lookup thread: {err}");
        }
    }
}
