//! Price sampling and target selection.
//!
//! Every cycle records one percent-change quote per provider, then averages
//! the trailing window of samples and picks the provider whose parent
//! company's share price fell the most (or rose the least).

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::core::http::{build_client, fetch_json};
use crate::core::models::{Forecast, HostIdentity, PriceSample};
use crate::error::{Result, SurfError};
use crate::storage::LedgerStore;
use crate::storage::config::DecisionConfig;

/// Credential name of the price API key.
pub const API_KEY_CREDENTIAL: &str = "key";

/// Source of instantaneous percent price changes.
pub trait PriceSource {
    /// Percent change of `symbol` for the current trading day.
    fn change_percent(&self, symbol: &str) -> impl Future<Output = Result<f64>> + Send;
}

// =============================================================================
// AlphaVantage
// =============================================================================

/// `GLOBAL_QUOTE` client for the AlphaVantage API.
#[derive(Debug, Clone)]
pub struct AlphaVantageSource {
    client: Client,
    base: Url,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

impl AlphaVantageSource {
    /// # Errors
    /// Returns `Config` if `base_url` is not a valid URL, or a network error
    /// if the client cannot be built.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| SurfError::Config(format!("invalid price_api_base {base_url}: {e}")))?;
        Ok(Self {
            client: build_client(timeout)?,
            base,
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build the source with the API key stored for the configured API host.
    ///
    /// # Errors
    /// Returns `NotInitialized` if the API host is not in the catalog, or
    /// `CredentialMissing` if its key is absent or empty.
    pub fn from_store(store: &LedgerStore, config: &DecisionConfig) -> Result<Self> {
        let host = store
            .host_by_name(&config.price_api_host)?
            .ok_or_else(|| {
                SurfError::NotInitialized(format!(
                    "price API host \"{}\" is not in the catalog",
                    config.price_api_host
                ))
            })?;

        let key = store
            .credential(host.id, API_KEY_CREDENTIAL)?
            .filter(crate::core::models::Credential::is_set)
            .ok_or_else(|| SurfError::CredentialMissing {
                host: host.name.clone(),
                name: API_KEY_CREDENTIAL.to_string(),
            })?;

        Self::new(&config.price_api_base, key.value, config.request_timeout())
    }

    fn quote_url(&self, symbol: &str) -> Result<Url> {
        let endpoint = self
            .base
            .join("query")
            .map_err(|e| SurfError::Config(format!("invalid price_api_base: {e}")))?;
        Url::parse_with_params(
            endpoint.as_str(),
            &[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| SurfError::Config(format!("invalid quote URL: {e}")))
    }

    async fn fetch(&self, symbol: &str) -> Result<f64> {
        let url = self.quote_url(symbol)?;
        tracing::debug!(symbol, "Fetching quote");

        let response: QuoteResponse = fetch_json(&self.client, url, self.timeout)
            .await
            .map_err(|e| SurfError::UpstreamError(e.to_string()))?;

        if let Some(message) = response.error_message {
            return Err(SurfError::UpstreamError(message));
        }

        let Some(quote) = response.global_quote else {
            let reason = response
                .note
                .unwrap_or_else(|| "unable to retrieve stock price".to_string());
            return Err(SurfError::UpstreamError(reason));
        };

        let raw = quote.change_percent.ok_or_else(|| {
            SurfError::UpstreamError(format!("no change percent quoted for {symbol}"))
        })?;

        parse_change_percent(&raw)
    }
}

impl PriceSource for AlphaVantageSource {
    fn change_percent(&self, symbol: &str) -> impl Future<Output = Result<f64>> + Send {
        self.fetch(symbol)
    }
}

/// Parse a quoted percentage such as `"-1.2345%"`.
///
/// # Errors
/// Returns `UpstreamError` if the value is not a finite number.
pub fn parse_change_percent(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let value = number
        .parse::<f64>()
        .map_err(|e| SurfError::UpstreamError(format!("invalid change percent {raw:?}: {e}")))?;
    // A single infinite sample would pin the trailing mean for a whole window.
    if !value.is_finite() {
        return Err(SurfError::UpstreamError(format!(
            "non-finite change percent {raw:?}"
        )));
    }
    Ok(value)
}

// =============================================================================
// Decision Engine
// =============================================================================

/// Result of one decision cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub target: HostIdentity,
    pub forecast: Forecast,
    /// Sample recorded by this cycle.
    pub sample: PriceSample,
    /// Trailing mean percent change per provider name.
    pub means: BTreeMap<String, f64>,
    /// Number of samples the means were computed over.
    pub samples_used: usize,
}

/// Samples prices and selects the cheapest provider.
pub struct DecisionEngine<'a, P> {
    store: &'a LedgerStore,
    source: &'a P,
    config: &'a DecisionConfig,
}

impl<'a, P: PriceSource> DecisionEngine<'a, P> {
    #[must_use]
    pub const fn new(store: &'a LedgerStore, source: &'a P, config: &'a DecisionConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Run one decision cycle.
    ///
    /// # Errors
    /// Returns `InsufficientTickerData` if a provider has no ticker,
    /// `UpstreamError` if any quote cannot be fetched, or a storage error.
    pub async fn next_target(&self) -> Result<Decision> {
        self.next_target_at(Utc::now()).await
    }

    /// Run one decision cycle with the sample stamped at `now`.
    ///
    /// # Errors
    /// See [`Self::next_target`].
    pub async fn next_target_at(&self, now: DateTime<Utc>) -> Result<Decision> {
        let providers = self.store.providers()?;
        if providers.is_empty() {
            return Err(SurfError::NotInitialized(
                "host catalog has no providers".to_string(),
            ));
        }

        let mut tickers = Vec::with_capacity(providers.len());
        for provider in &providers {
            let ticker = provider
                .ticker_symbol
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| SurfError::InsufficientTickerData {
                    provider: provider.long_name.clone(),
                })?;
            tickers.push(ticker);
        }

        let mut changes = BTreeMap::new();
        for (provider, ticker) in providers.iter().zip(tickers) {
            let change = self.source.change_percent(ticker).await?;
            if !change.is_finite() {
                return Err(SurfError::UpstreamError(format!(
                    "non-finite change {change} quoted for {ticker}"
                )));
            }
            tracing::debug!(provider = %provider.name, ticker, change, "Sampled price change");
            changes.insert(provider.name.clone(), change);
        }

        let sample = self.store.record_price_sample(now, &changes)?;
        let window = self.store.recent_price_samples(self.config.window)?;
        let means = trailing_means(&window, &providers);

        let target = select_lowest(&means, &providers, &self.config.priority)
            .cloned()
            .ok_or_else(|| SurfError::NotInitialized("no provider has price history".to_string()))?;

        let forecast_time = window.first().map_or(sample.time, |s| s.time);
        let forecast = self.store.record_forecast(forecast_time, target.id)?;

        tracing::info!(
            target = %target.name,
            samples = window.len(),
            "Selected lowest-cost provider"
        );

        Ok(Decision {
            target,
            forecast,
            sample,
            means,
            samples_used: window.len(),
        })
    }
}

/// Arithmetic mean of each provider's change over `samples`.
///
/// Each mean divides by the number of samples that quoted that provider.
/// Providers never quoted are absent from the result.
#[must_use]
pub fn trailing_means(samples: &[PriceSample], providers: &[HostIdentity]) -> BTreeMap<String, f64> {
    let mut means = BTreeMap::new();
    for provider in providers {
        let values: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.changes.get(&provider.name).copied())
            .collect();
        if values.is_empty() {
            continue;
        }
        #[allow(clippy::cast_precision_loss)] // sample counts are tiny
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        means.insert(provider.name.clone(), mean);
    }
    means
}

/// Provider with the strictly lowest mean.
///
/// Exact ties go to the provider listed first in `priority`; providers not
/// listed rank after listed ones, in catalog order.
#[must_use]
pub fn select_lowest<'p>(
    means: &BTreeMap<String, f64>,
    providers: &'p [HostIdentity],
    priority: &[String],
) -> Option<&'p HostIdentity> {
    let rank = |host: &HostIdentity, catalog_index: usize| {
        priority
            .iter()
            .position(|name| name == &host.name)
            .unwrap_or(priority.len() + catalog_index)
    };

    let mut ranked: Vec<(usize, &HostIdentity)> = providers
        .iter()
        .enumerate()
        .map(|(i, host)| (rank(host, i), host))
        .collect();
    ranked.sort_by_key(|(r, _)| *r);

    let mut best: Option<(&HostIdentity, f64)> = None;
    for (_, host) in ranked {
        let Some(&mean) = means.get(&host.name) else {
            continue;
        };
        match best {
            Some((_, best_mean)) if mean >= best_mean => {}
            _ => best = Some((host, mean)),
        }
    }
    best.map(|(host, _)| host)
}
