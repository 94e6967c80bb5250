//! Prospect enrichment pipeline.
//!
//! `enrich` runs, in order and short-circuiting on failure:
//! 1. CNPJ validation (no network on failure)
//! 2. BrasilAPI registry lookup
//! 3. Registration-status gate
//! 4. Registry normalization
//! 5. Best-effort CNES lookup + normalization
//!
//! Steps 1-3 are the identity stage: their failures abort the run and reach
//! the caller. Step 5 is supplementary: its failures are logged and leave the
//! facility fields absent.
use crate::cache_validator::ResponseCache;
use crate::cnes::normalize_facility;
use crate::cnpj::{self, clean, is_valid, normalize_registry};
use crate::config::Config;
use crate::errors::EnrichmentError;
use crate::models::{
    CnesSearchContext, EnrichmentResult, FacilityProfile, ProspectIdentity, ProspectProfile,
    RegistryRecord,
};
use crate::segmentation::{classify, SegmentInputs};
use crate::services::{BrasilApiService, CnesService};

/// Successful enrichment.
#[derive(Debug, Clone)]
pub struct EnrichedProspect {
    pub profile: ProspectProfile,
    /// Registry payload, verbatim.
    pub registry_raw: RegistryRecord,
}

/// Failed enrichment. `registry_raw` is only present when the registry
/// answered but the record was rejected by the status gate.
#[derive(Debug, Clone)]
pub struct EnrichmentFailure {
    pub error: EnrichmentError,
    pub registry_raw: Option<RegistryRecord>,
}

impl From<EnrichmentError> for EnrichmentFailure {
    fn from(error: EnrichmentError) -> Self {
        Self {
            error,
            registry_raw: None,
        }
    }
}

impl From<Result<EnrichedProspect, EnrichmentFailure>> for EnrichmentResult {
    fn from(outcome: Result<EnrichedProspect, EnrichmentFailure>) -> Self {
        match outcome {
            Ok(enriched) => EnrichmentResult {
                success: true,
                prospect: Some(enriched.profile),
                brasil_api_raw: Some(enriched.registry_raw),
                error: None,
                error_code: None,
            },
            Err(failure) => EnrichmentResult::failure(&failure.error, failure.registry_raw),
        }
    }
}

#[derive(Clone)]
pub struct EnrichmentPipeline {
    brasil_api: BrasilApiService,
    cnes: CnesService,
    cache: Option<ResponseCache>,
}

impl EnrichmentPipeline {
    pub fn new(config: &Config) -> Self {
        Self::from_services(BrasilApiService::new(config), CnesService::new(config))
    }

    pub fn from_services(brasil_api: BrasilApiService, cnes: CnesService) -> Self {
        Self {
            brasil_api,
            cnes,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Full onboarding enrichment for a CNPJ.
    pub async fn enrich(&self, raw_cnpj: &str) -> Result<EnrichedProspect, EnrichmentFailure> {
        // Step 1: validation
        if !is_valid(raw_cnpj) {
            tracing::warn!("Rejecting invalid CNPJ: {}", raw_cnpj);
            return Err(EnrichmentError::InvalidInput(raw_cnpj.to_string()).into());
        }
        let cleaned = clean(raw_cnpj);
        tracing::info!("Starting enrichment for CNPJ {}", cleaned);

        // Step 2: registry lookup
        let registry_raw = self.fetch_registry(&cleaned).await?;

        // Step 3: status gate
        if !cnpj::is_active(&registry_raw) {
            let situacao = cnpj::situacao(&registry_raw).unwrap_or_else(|| "desconhecida".into());
            tracing::warn!(
                "CNPJ {} rejected: registration status \"{}\"",
                cleaned,
                situacao
            );
            return Err(EnrichmentFailure {
                error: EnrichmentError::IneligibleRecord { situacao },
                registry_raw: Some(registry_raw),
            });
        }

        // Step 4: registry normalization
        let mut registry = normalize_registry(&registry_raw);
        if !is_valid(&registry.cnpj) {
            registry.cnpj = cleaned.clone();
        }

        // Step 5: best-effort CNES
        let context = CnesSearchContext {
            nome_fantasia: registry.nome_fantasia.clone(),
            municipio: registry.endereco.as_ref().and_then(|e| e.municipio.clone()),
            uf: registry.endereco.as_ref().and_then(|e| e.uf.clone()),
        };
        let facility = match self.locate_facility(&cleaned, &context, true).await {
            Some(facility) => facility,
            None => {
                tracing::warn!(
                    "CNES enrichment unavailable for CNPJ {}, continuing with registry data only",
                    cleaned
                );
                FacilityProfile::default()
            }
        };

        let mut profile = ProspectProfile {
            registry,
            facility,
            segmento: String::new(),
        };
        profile.segmento = classify(&SegmentInputs::from_profile(&profile))
            .as_str()
            .to_string();

        tracing::info!(
            "✓ Enrichment complete for CNPJ {} (segment: {}, CNES: {})",
            cleaned,
            profile.segmento,
            profile.facility.cnes_codigo.as_deref().unwrap_or("-")
        );

        Ok(EnrichedProspect {
            profile,
            registry_raw,
        })
    }

    /// Re-runs only the CNES stage for a known prospect.
    ///
    /// Unlike a full enrichment, finding nothing is reported as `NotFound`.
    /// The facility cache is not read, so a retry always reaches DataSUS.
    pub async fn refresh_facility(
        &self,
        identity: &ProspectIdentity,
    ) -> Result<FacilityProfile, EnrichmentError> {
        if !is_valid(&identity.cnpj) {
            return Err(EnrichmentError::InvalidInput(identity.cnpj.clone()));
        }
        let cleaned = clean(&identity.cnpj);
        tracing::info!("Refreshing CNES data for CNPJ {}", cleaned);

        self.locate_facility(&cleaned, &identity.context, false)
            .await
            .ok_or_else(|| {
                tracing::warn!("CNES refresh found nothing for CNPJ {}", cleaned);
                EnrichmentError::NotFound(
                    "Não foi possível encontrar dados CNES para este estabelecimento. \
                     A API do DataSUS pode estar indisponível, tente novamente mais tarde."
                        .to_string(),
                )
            })
    }

    async fn fetch_registry(&self, cleaned: &str) -> Result<RegistryRecord, EnrichmentError> {
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.registry(cleaned).await {
                return Ok(record);
            }
        }

        let record = self.brasil_api.fetch_company(cleaned).await?;

        if let Some(cache) = &self.cache {
            cache.put_registry(cleaned, &record).await;
        }
        Ok(record)
    }

    async fn locate_facility(
        &self,
        cleaned: &str,
        context: &CnesSearchContext,
        use_cached: bool,
    ) -> Option<FacilityProfile> {
        if let (true, Some(cache)) = (use_cached, &self.cache) {
            if let Some(record) = cache.facility(cleaned).await {
                return Some(normalize_facility(&record));
            }
        }

        let record = self.cnes.locate(cleaned, Some(context)).await?;

        if let Some(cache) = &self.cache {
            cache.put_facility(cleaned, &record).await;
        }
        Some(normalize_facility(&record))
    }
}
