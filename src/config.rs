use serde::Deserialize;

pub const DEFAULT_BRASIL_API_BASE_URL: &str = "https://brasilapi.com.br/api/cnpj/v1";
pub const DEFAULT_CNES_API_BASE_URL: &str =
    "https://apidadosabertos.saude.gov.br/cnes/estabelecimentos";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_AI_MODEL: &str = "openai/gpt-oss-120b";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub brasil_api_base_url: String,
    pub cnes_api_base_url: String,
    pub openrouter_base_url: String,
    pub openrouter_api_key: Option<String>, // AI endpoints answer 503 without it
    pub ai_model: String,
    pub api_token: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            brasil_api_base_url: url_var("BRASIL_API_BASE_URL", DEFAULT_BRASIL_API_BASE_URL)?,
            cnes_api_base_url: url_var("CNES_API_BASE_URL", DEFAULT_CNES_API_BASE_URL)?,
            openrouter_base_url: url_var("OPENROUTER_BASE_URL", DEFAULT_OPENROUTER_BASE_URL)?,
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            ai_model: std::env::var("AI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            api_token: std::env::var("API_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("BrasilAPI Base URL: {}", config.brasil_api_base_url);
        tracing::debug!("CNES Base URL: {}", config.cnes_api_base_url);
        tracing::debug!("AI model: {}", config.ai_model);
        if config.openrouter_api_key.is_none() {
            tracing::warn!("OPENROUTER_API_KEY not set - AI endpoints are disabled");
        }
        if config.api_token.is_none() {
            tracing::warn!("API_TOKEN not set - X-Api-Token validation is disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reads an optional base URL, falling back to `default` and rejecting
/// anything that is not an absolute http(s) URL.
fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let raw = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());

    let parsed = url::Url::parse(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", name, raw, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }

    Ok(raw.trim_end_matches('/').to_string())
}
