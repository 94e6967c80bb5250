use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::EnrichmentError;

// ============ External payloads ============

/// BrasilAPI `/cnpj/v1/{cnpj}` response, kept verbatim.
///
/// The payload is read through accessors in [`crate::cnpj`] rather than a
/// typed struct so that a malformed optional field never rejects the record
/// and the raw archive stays byte-for-byte what the registry sent.
pub type RegistryRecord = Value;

/// One DataSUS CNES establishment, kept verbatim. Field names drift across
/// API versions; see [`crate::cnes`] for the alias tables.
pub type FacilityRecord = Value;

// ============ Canonical profile ============

/// Economic activity (CNAE) code and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtividadeEconomica {
    pub codigo: String,
    pub descricao: Option<String>,
}

/// Postal address copied from the registry record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endereco {
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub municipio: Option<String>,
    pub uf: Option<String>,
    pub cep: Option<String>,
}

impl Endereco {
    pub fn is_empty(&self) -> bool {
        self.logradouro.is_none()
            && self.numero.is_none()
            && self.complemento.is_none()
            && self.bairro.is_none()
            && self.municipio.is_none()
            && self.uf.is_none()
            && self.cep.is_none()
    }
}

/// Partner listed in the registry ownership table (QSA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Socio {
    pub nome: String,
    pub qualificacao: Option<String>,
    pub faixa_etaria: Option<String>,
    pub data_entrada_sociedade: Option<String>,
}

/// Registry-derived subset of a prospect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryProfile {
    /// Always the 14-digit cleaned form.
    pub cnpj: String,
    pub razao_social: Option<String>,
    pub nome_fantasia: Option<String>,
    pub porte: Option<String>,
    pub capital_social: Option<f64>,
    pub natureza_juridica: Option<String>,
    pub situacao_cadastral: Option<String>,
    pub data_abertura: Option<String>,
    pub atividade_principal: Option<AtividadeEconomica>,
    pub atividades_secundarias: Vec<AtividadeEconomica>,
    pub endereco: Option<Endereco>,
    pub telefone: Option<String>,
    /// `telefone` in E.164 when it parses as a valid Brazilian number.
    pub telefone_e164: Option<String>,
    pub email: Option<String>,
    pub socios: Vec<Socio>,
    /// Registry payload, untouched.
    pub enrichment_raw: RegistryRecord,
}

/// Facility-derived (CNES) subset of a prospect. Every field is absent when
/// no establishment was located.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityProfile {
    pub cnes_codigo: Option<String>,
    pub tipo_estabelecimento: Option<String>,
    pub subtipo: Option<String>,
    pub leitos_total: Option<i64>,
    pub leitos_sus: Option<i64>,
    pub leitos_nao_sus: Option<i64>,
    pub equipamentos: Vec<Value>,
    pub habilitacoes: Vec<Value>,
    /// CNES payload, untouched. Distinct from `enrichment_raw`.
    pub dados_cnes_raw: Option<FacilityRecord>,
}

/// Canonical prospect record produced by one enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectProfile {
    #[serde(flatten)]
    pub registry: RegistryProfile,
    #[serde(flatten)]
    pub facility: FacilityProfile,
    /// Sales segment computed from both subsets.
    pub segmento: String,
}

/// What the CNES locator needs to know about an already-known prospect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CnesSearchContext {
    pub nome_fantasia: Option<String>,
    pub municipio: Option<String>,
    pub uf: Option<String>,
}

/// Identity of a stored prospect, used to refresh its facility data.
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectIdentity {
    pub cnpj: String,
    pub context: CnesSearchContext,
}

/// Serializable outcome of an enrichment, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentResult {
    pub success: bool,
    pub prospect: Option<ProspectProfile>,
    pub brasil_api_raw: Option<RegistryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl EnrichmentResult {
    pub fn failure(error: &EnrichmentError, brasil_api_raw: Option<RegistryRecord>) -> Self {
        Self {
            success: false,
            prospect: None,
            brasil_api_raw,
            error: Some(error.to_string()),
            error_code: Some(error.code()),
        }
    }
}

// ============ Database Models ============

/// Channel of a sales interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Ligacao,
    Email,
    Reuniao,
    Linkedin,
    Whatsapp,
    Visita,
    Evento,
    Outro,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Ligacao => "ligacao",
            InteractionType::Email => "email",
            InteractionType::Reuniao => "reuniao",
            InteractionType::Linkedin => "linkedin",
            InteractionType::Whatsapp => "whatsapp",
            InteractionType::Visita => "visita",
            InteractionType::Evento => "evento",
            InteractionType::Outro => "outro",
        }
    }
}

/// Row of `prospects`. JSON-shaped columns are stored as `jsonb`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Prospect {
    pub id: Uuid,
    pub user_id: Uuid,

    // Registry data
    pub cnpj: String,
    pub razao_social: Option<String>,
    pub nome_fantasia: Option<String>,
    pub porte: Option<String>,
    pub capital_social: Option<f64>,
    pub natureza_juridica: Option<String>,
    pub situacao_cadastral: Option<String>,
    pub data_abertura: Option<String>,
    pub atividade_principal: Option<Value>,
    pub atividades_secundarias: Option<Value>,
    pub endereco: Option<Value>,
    pub telefone: Option<String>,
    pub telefone_e164: Option<String>,
    pub email: Option<String>,
    pub socios: Option<Value>,

    // CNES data
    pub cnes_codigo: Option<String>,
    pub tipo_estabelecimento: Option<String>,
    pub subtipo: Option<String>,
    pub leitos_total: Option<i64>,
    pub leitos_sus: Option<i64>,
    pub leitos_nao_sus: Option<i64>,
    pub equipamentos: Option<Value>,
    pub habilitacoes: Option<Value>,
    pub dados_cnes_raw: Option<Value>,
    pub segmento: Option<String>,

    // Commercial data
    pub sistema_gestao: Option<String>,
    pub decisor_nome: Option<String>,
    pub decisor_cargo: Option<String>,
    pub stakeholders: Option<Value>,

    // AI output
    pub briefing_ai: Option<String>,
    pub briefing_generated_at: Option<DateTime<Utc>>,
    pub score: i32,
    pub priority: String,

    pub status: String,
    pub notas: Option<String>,
    pub enrichment_raw: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    /// Display name used in prompts: trade name, then legal name.
    pub fn display_name(&self) -> &str {
        self.nome_fantasia
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.razao_social.as_deref())
            .unwrap_or("Prospect")
    }

    pub fn endereco(&self) -> Option<Endereco> {
        self.endereco
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn atividade_principal(&self) -> Option<AtividadeEconomica> {
        self.atividade_principal
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn socios(&self) -> Vec<Socio> {
        self.socios
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn stakeholders(&self) -> Vec<Stakeholder> {
        self.stakeholders
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Identity used by the CNES locator when refreshing facility data.
    pub fn identity(&self) -> ProspectIdentity {
        let endereco = self.endereco();
        ProspectIdentity {
            cnpj: self.cnpj.clone(),
            context: CnesSearchContext {
                nome_fantasia: self.nome_fantasia.clone(),
                municipio: endereco.as_ref().and_then(|e| e.municipio.clone()),
                uf: endereco.and_then(|e| e.uf),
            },
        }
    }
}

/// Prospect row plus interaction statistics, used by the listing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProspectWithStats {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub prospect: Prospect,
    pub total_interacoes: i64,
    pub ultima_interacao: Option<DateTime<Utc>>,
}

/// Stakeholder mapped with the Miller Heiman buyer roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stakeholder {
    pub nome: String,
    pub cargo: String,
    pub papel_miller_heiman: String,
    pub linkedin: Option<String>,
}

/// Row of `interactions`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prospect_id: Uuid,
    pub tipo: String,
    pub resumo: String,
    pub detalhes: Option<String>,
    pub resultado: Option<String>,
    pub proximos_passos_ai: Option<String>,
    pub sentimento: Option<String>,
    pub data_interacao: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    /// One-line `[tipo] resumo` summary fed to the LLM as history.
    pub fn summary_line(&self) -> String {
        format!("[{}] {}", self.tipo, self.resumo)
    }
}

// ============ API Request/Response Models ============

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub cnpj: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInteractionRequest {
    pub prospect_id: Option<Uuid>,
    pub tipo: Option<InteractionType>,
    pub resumo: Option<String>,
    pub detalhes: Option<String>,
}

/// LLM analysis of one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionAnalysis {
    pub proximos_passos: String,
    pub sentimento: String,
}

/// Outreach drafts, one per step of the multichannel cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachMessages {
    /// Day 1: LinkedIn connection note.
    pub linkedin_conexao: String,
    /// Day 3: introduction email.
    pub email_introducao: String,
    /// Day 5: call script for the decision maker.
    pub roteiro_ligacao: String,
    /// Day 8: WhatsApp message.
    pub whatsapp: String,
    /// Day 12: follow-up email.
    pub email_followup: String,
}
