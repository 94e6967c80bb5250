use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::cnes::establishments;
use crate::cnpj::clean;
use crate::config::Config;
use crate::errors::EnrichmentError;
use crate::models::{CnesSearchContext, FacilityRecord, RegistryRecord};

pub const USER_AGENT: &str = "HealthSalesAI/1.0";

/// Default client-side bound for a registry lookup.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-attempt bound for a CNES lookup.
pub const CNES_TIMEOUT: Duration = Duration::from_secs(10);

// ============ BrasilAPI (company registry) ============

#[derive(Clone)]
pub struct BrasilApiService {
    client: Client,
    base_url: String,
}

impl BrasilApiService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.brasil_api_base_url.clone(),
        }
    }

    /// Fetches the registry record for a CNPJ.
    ///
    /// Any transport failure, non-2xx status or unparseable body is an
    /// `UpstreamUnavailable` carrying the upstream status when there was one.
    pub async fn fetch_company(&self, cnpj: &str) -> Result<RegistryRecord, EnrichmentError> {
        let cleaned = clean(cnpj);
        let url = format!("{}/{}", self.base_url, cleaned);

        tracing::info!("BrasilAPI: fetching CNPJ {}", cleaned);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .timeout(REGISTRY_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("BrasilAPI request failed for CNPJ {}: {}", cleaned, e);
                EnrichmentError::UpstreamUnavailable {
                    status: None,
                    message: format!("Erro ao consultar BrasilAPI: {}", e),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("BrasilAPI returned error {}: {}", status, error_text);
            return Err(EnrichmentError::UpstreamUnavailable {
                status: Some(status.as_u16()),
                message: format!(
                    "BrasilAPI retornou status {} para CNPJ {}",
                    status.as_u16(),
                    cleaned
                ),
            });
        }

        let status = response.status().as_u16();
        let record: RegistryRecord = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse BrasilAPI response: {}", e);
            EnrichmentError::UpstreamUnavailable {
                status: Some(status),
                message: format!("Resposta inválida da BrasilAPI para CNPJ {}", cleaned),
            }
        })?;

        if !record.is_object() {
            return Err(EnrichmentError::UpstreamUnavailable {
                status: Some(status),
                message: format!("Resposta inválida da BrasilAPI para CNPJ {}", cleaned),
            });
        }

        tracing::info!("BrasilAPI: fetched CNPJ {}", cleaned);
        Ok(record)
    }
}

// ============ DataSUS CNES (health facilities) ============

#[derive(Clone)]
pub struct CnesService {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl CnesService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.cnes_api_base_url.clone(),
            timeout: CNES_TIMEOUT,
        }
    }

    /// Overrides the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Locates a CNES establishment for a prospect.
    ///
    /// Tries the CNPJ first, then the trade name (narrowed by UF when known).
    /// The second lookup only runs if the first found nothing. Failures are
    /// logged and count as "nothing found"; `None` is a normal outcome.
    pub async fn locate(
        &self,
        cnpj: &str,
        context: Option<&CnesSearchContext>,
    ) -> Option<FacilityRecord> {
        let cleaned = clean(cnpj);

        if let Some(found) = self
            .search("cnpj", &[("cnpj", cleaned.as_str())])
            .await
        {
            return Some(found);
        }

        let nome_fantasia = context
            .and_then(|c| c.nome_fantasia.as_deref())
            .filter(|n| !n.trim().is_empty())?;

        let mut params = vec![("nome_fantasia", nome_fantasia)];
        if let Some(uf) = context
            .and_then(|c| c.uf.as_deref())
            .filter(|uf| !uf.trim().is_empty())
        {
            params.push(("uf", uf));
        }

        self.search("nome_fantasia", &params).await
    }

    /// One lookup attempt. Returns the first establishment, if any.
    async fn search(&self, strategy: &str, params: &[(&str, &str)]) -> Option<FacilityRecord> {
        tracing::info!("CNES: searching by {} ({:?})", strategy, params);

        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .header("User-Agent", USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await;

        let response = match response {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                let status = resp.status();
                let error_text = resp.text().await.unwrap_or_default();
                tracing::warn!(
                    "CNES search by {} failed {}: {}",
                    strategy,
                    status,
                    error_text
                );
                return None;
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    "CNES search by {} timed out after {:?}",
                    strategy,
                    self.timeout
                );
                return None;
            }
            Err(e) => {
                tracing::warn!("CNES search by {} request failed: {}", strategy, e);
                return None;
            }
        };

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to parse CNES response (search by {}): {}", strategy, e);
                return None;
            }
        };

        let found = establishments(&body).first().cloned();
        match &found {
            Some(_) => tracing::info!("CNES: establishment found by {}", strategy),
            None => tracing::info!("CNES: no establishment found by {}", strategy),
        }
        found
    }
}
