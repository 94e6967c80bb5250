use moka::future::Cache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::models::{FacilityRecord, RegistryRecord};

/// Registry responses are reused for a day.
pub const REGISTRY_TTL: Duration = Duration::from_secs(86_400);
/// CNES responses change rarely; reuse them for a week.
pub const FACILITY_TTL: Duration = Duration::from_secs(604_800);

const REGISTRY_CAPACITY: u64 = 10_000;
const FACILITY_CAPACITY: u64 = 10_000;

/// JSON payload stored next to its SHA-256 checksum.
///
/// Entries whose checksum no longer matches are treated as a cache miss and
/// the payload is fetched again.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedCacheEntry {
    /// Serialized JSON payload.
    pub data: String,
    /// SHA-256 of `data`, hex encoded.
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(payload: &Value) -> Self {
        let data = payload.to_string();
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns the payload if the entry parses and its checksum matches.
    pub fn decode(serialized: &str) -> Option<Value> {
        let entry: ValidatedCacheEntry = serde_json::from_str(serialized).ok()?;

        if !entry.is_valid() {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            return None;
        }

        serde_json::from_str(&entry.data).ok()
    }
}

/// In-memory cache for upstream responses, keyed by cleaned CNPJ.
///
/// Only located CNES records are cached; a miss is always retried upstream.
#[derive(Clone)]
pub struct ResponseCache {
    registry: Cache<String, String>,
    facility: Cache<String, String>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_ttl(REGISTRY_TTL, FACILITY_TTL)
    }

    pub fn with_ttl(registry_ttl: Duration, facility_ttl: Duration) -> Self {
        Self {
            registry: Cache::builder()
                .time_to_live(registry_ttl)
                .max_capacity(REGISTRY_CAPACITY)
                .build(),
            facility: Cache::builder()
                .time_to_live(facility_ttl)
                .max_capacity(FACILITY_CAPACITY)
                .build(),
        }
    }

    pub async fn registry(&self, cnpj: &str) -> Option<RegistryRecord> {
        let cached = self.registry.get(cnpj).await?;
        let record = ValidatedCacheEntry::decode(&cached);
        if record.is_some() {
            tracing::debug!("Registry cache HIT (validated) for CNPJ {}", cnpj);
        } else {
            self.registry.invalidate(cnpj).await;
        }
        record
    }

    pub async fn put_registry(&self, cnpj: &str, record: &RegistryRecord) {
        self.registry
            .insert(cnpj.to_string(), ValidatedCacheEntry::new(record).serialize())
            .await;
    }

    pub async fn facility(&self, cnpj: &str) -> Option<FacilityRecord> {
        let cached = self.facility.get(cnpj).await?;
        let record = ValidatedCacheEntry::decode(&cached);
        if record.is_some() {
            tracing::debug!("CNES cache HIT (validated) for CNPJ {}", cnpj);
        } else {
            self.facility.invalidate(cnpj).await;
        }
        record
    }

    pub async fn put_facility(&self, cnpj: &str, record: &FacilityRecord) {
        self.facility
            .insert(cnpj.to_string(), ValidatedCacheEntry::new(record).serialize())
            .await;
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
