use crate::ai::{self, BriefingContext, InteractionContext, HISTORY_LIMIT};
use crate::cnpj::{clean, is_valid};
use crate::config::Config;
use crate::db_storage::ProspectStorage;
use crate::enrichment::EnrichmentPipeline;
use crate::errors::{AppError, EnrichmentError};
use crate::llm_client::LlmClient;
use crate::models::*;
use crate::segmentation::{classify, SegmentInputs};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the authenticated user, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Shared-secret header, checked when `API_TOKEN` is configured.
pub const API_TOKEN_HEADER: &str = "X-Api-Token";

/// How many interactions the prospect detail returns.
const DETAIL_INTERACTIONS: i64 = 50;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Prospect persistence.
    pub storage: ProspectStorage,
    /// Application configuration.
    pub config: Config,
    /// BrasilAPI + CNES enrichment.
    pub pipeline: EnrichmentPipeline,
    /// LLM client; AI endpoints answer 503 without one.
    pub llm: Option<LlmClient>,
}

impl AppState {
    fn llm(&self) -> Result<&LlmClient, AppError> {
        self.llm.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable("OPENROUTER_API_KEY não configurada".to_string())
        })
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "health-sales-ai",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/enrich
///
/// Enriches a CNPJ without storing anything. The status code follows the
/// failure kind: 400 invalid CNPJ, 502 registry unavailable, 422 inactive.
pub async fn enrich(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<EnrichRequest>,
) -> Result<(StatusCode, Json<EnrichmentResult>), AppError> {
    authenticate(&state, &headers)?;
    let cnpj = required_cnpj(body.cnpj)?;
    tracing::info!("POST /enrich - cnpj: {}", cnpj);

    let outcome = state.pipeline.enrich(&cnpj).await;
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(failure) => failure.error.status_code(),
    };

    Ok((status, Json(outcome.into())))
}

/// POST /api/v1/prospects
///
/// Enriches and stores a new prospect. A CNPJ the user already has answers
/// 409 with the existing id and triggers no lookup.
pub async fn create_prospect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<EnrichRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user_id = authenticate(&state, &headers)?;
    let cnpj = required_cnpj(body.cnpj)?;
    if !is_valid(&cnpj) {
        return Err(EnrichmentError::InvalidInput(cnpj).into());
    }
    let cleaned = clean(&cnpj);

    if let Some(existing_id) = state.storage.find_id_by_cnpj(user_id, &cleaned).await? {
        tracing::info!("CNPJ {} already registered as {}", cleaned, existing_id);
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "CNPJ já cadastrado",
                "existing_id": existing_id,
            })),
        ));
    }

    let enriched = state
        .pipeline
        .enrich(&cleaned)
        .await
        .map_err(|failure| AppError::from(failure.error))?;

    let prospect = state
        .storage
        .insert_prospect(user_id, &enriched.profile)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "prospect": prospect })),
    ))
}

/// GET /api/v1/prospects
pub async fn list_prospects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProspectWithStats>>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let prospects = state.storage.list_prospects(user_id).await?;
    tracing::debug!("Listing {} prospects for user {}", prospects.len(), user_id);
    Ok(Json(prospects))
}

/// GET /api/v1/prospects/:id
pub async fn get_prospect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let prospect = state.storage.require_prospect(user_id, id).await?;
    let interactions = state
        .storage
        .recent_interactions(id, DETAIL_INTERACTIONS, None)
        .await?;

    Ok(Json(json!({
        "prospect": prospect,
        "interactions": interactions,
    })))
}

/// POST /api/v1/prospects/:id/cnes
///
/// Retries the CNES lookup for a stored prospect and replaces its facility
/// data. Finding nothing answers 404 and leaves the prospect untouched.
pub async fn refresh_cnes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let mut prospect = state.storage.require_prospect(user_id, id).await?;

    let facility = state.pipeline.refresh_facility(&prospect.identity()).await?;

    prospect.tipo_estabelecimento = facility.tipo_estabelecimento.clone();
    prospect.leitos_total = facility.leitos_total;
    let segmento = classify(&SegmentInputs::from_prospect(&prospect));

    let updated = state
        .storage
        .update_facility(user_id, id, &facility, segmento.as_str())
        .await?;

    Ok(Json(json!({ "success": true, "prospect": updated })))
}

/// POST /api/v1/prospects/:id/briefing
pub async fn generate_briefing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let llm = state.llm()?;
    let prospect = state.storage.require_prospect(user_id, id).await?;
    let recent = state
        .storage
        .recent_interactions(id, HISTORY_LIMIT, None)
        .await?;

    let context = BriefingContext::from_prospect(&prospect, &recent);
    let briefing = ai::generate_briefing(llm, &context).await?;

    let contexto_usado = json!({
        "nome_fantasia": prospect.nome_fantasia,
        "tipo_estabelecimento": prospect.tipo_estabelecimento,
        "leitos_total": prospect.leitos_total,
        "sistema_gestao": prospect.sistema_gestao,
        "segmento": context.segmento.as_str(),
        "total_interacoes": recent.len(),
    });
    let generated_at = state
        .storage
        .save_briefing(user_id, id, &briefing, &contexto_usado, llm.model())
        .await?;

    Ok(Json(json!({
        "success": true,
        "briefing": briefing,
        "briefing_generated_at": generated_at,
    })))
}

/// POST /api/v1/prospects/:id/messages
pub async fn generate_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let llm = state.llm()?;
    let prospect = state.storage.require_prospect(user_id, id).await?;
    let recent = state
        .storage
        .recent_interactions(id, HISTORY_LIMIT, None)
        .await?;

    let context = BriefingContext::from_prospect(&prospect, &recent);
    let messages = ai::generate_outreach_messages(llm, &context).await?;

    state
        .storage
        .save_outreach_messages(user_id, id, &messages)
        .await?;

    Ok(Json(json!({ "success": true, "messages": messages })))
}

/// POST /api/v1/interactions
///
/// Records an interaction, then asks the LLM for next steps and sentiment.
/// The interaction is kept even when the analysis fails (`analise: null`).
pub async fn create_interaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateInteractionRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = authenticate(&state, &headers)?;

    let resumo = body.resumo.as_deref().map(str::trim).unwrap_or("");
    let (Some(prospect_id), Some(tipo), false) = (body.prospect_id, body.tipo, resumo.is_empty())
    else {
        return Err(AppError::BadRequest(
            "prospect_id, tipo e resumo são obrigatórios".to_string(),
        ));
    };
    let detalhes = body.detalhes.as_deref().filter(|d| !d.trim().is_empty());

    let prospect = state.storage.require_prospect(user_id, prospect_id).await?;
    let interaction = state
        .storage
        .insert_interaction(user_id, prospect_id, tipo, resumo, detalhes)
        .await?;

    let Some(llm) = state.llm.as_ref() else {
        return Ok(Json(json!({
            "success": true,
            "interaction": interaction,
            "analise": null,
        })));
    };

    let historico = state
        .storage
        .recent_interactions(prospect_id, HISTORY_LIMIT, Some(interaction.id))
        .await?
        .iter()
        .map(Interaction::summary_line)
        .collect();

    let context = InteractionContext {
        prospect_nome: prospect.display_name().to_string(),
        prospect_porte: prospect.porte.clone(),
        prospect_tipo: prospect.tipo_estabelecimento.clone(),
        prospect_status: Some(prospect.status.clone()),
        tipo_interacao: tipo,
        resumo: resumo.to_string(),
        detalhes: detalhes.map(str::to_string),
        historico,
    };

    let analysis = match ai::analyze_interaction(llm, &context).await {
        Ok(analysis) => analysis,
        Err(e) => {
            tracing::warn!("Interaction {} saved without analysis: {}", interaction.id, e);
            return Ok(Json(json!({
                "success": true,
                "interaction": interaction,
                "analise": null,
            })));
        }
    };

    let updated = state
        .storage
        .update_interaction_analysis(interaction.id, &analysis)
        .await?;

    Ok(Json(json!({
        "success": true,
        "interaction": updated,
        "analise": analysis,
    })))
}

// ============ Request helpers ============

fn required_cnpj(cnpj: Option<String>) -> Result<String, AppError> {
    cnpj.filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("cnpj é obrigatório".to_string()))
}

/// Resolves the calling user. Session handling lives upstream; this only
/// checks the shared token (when configured) and reads the user id.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Uuid, AppError> {
    if let Some(expected) = state.config.api_token.as_deref() {
        let token = headers
            .get(API_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", API_TOKEN_HEADER)))?;

        if !constant_time_compare(token, expected) {
            tracing::warn!("Invalid API token received");
            return Err(AppError::Unauthorized("Invalid API token".to_string()));
        }
    }

    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing or invalid {} header", USER_ID_HEADER)))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
