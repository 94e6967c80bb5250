use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{
    FacilityProfile, Interaction, InteractionAnalysis, InteractionType, OutreachMessages,
    Prospect, ProspectProfile, ProspectWithStats,
};

/// Postgres storage for prospects, their interactions and briefing history.
///
/// Every prospect query is scoped by `user_id`; a prospect owned by someone
/// else behaves exactly like a missing one.
#[derive(Clone)]
pub struct ProspectStorage {
    pool: PgPool,
}

impl ProspectStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_id_by_cnpj(&self, user_id: Uuid, cnpj: &str) -> Result<Option<Uuid>, AppError> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM prospects WHERE user_id = $1 AND cnpj = $2 LIMIT 1",
        )
        .bind(user_id)
        .bind(cnpj)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(|(id,)| id))
    }

    /// Stores a freshly enriched profile as a new prospect.
    pub async fn insert_prospect(
        &self,
        user_id: Uuid,
        profile: &ProspectProfile,
    ) -> Result<Prospect, AppError> {
        let registry = &profile.registry;
        let facility = &profile.facility;

        let prospect = sqlx::query_as::<_, Prospect>(
            r#"
            INSERT INTO prospects (
                user_id, cnpj, razao_social, nome_fantasia, porte, capital_social,
                natureza_juridica, situacao_cadastral, data_abertura,
                atividade_principal, atividades_secundarias, endereco,
                telefone, telefone_e164, email, socios,
                cnes_codigo, tipo_estabelecimento, subtipo,
                leitos_total, leitos_sus, leitos_nao_sus,
                equipamentos, habilitacoes, dados_cnes_raw, segmento,
                enrichment_raw
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9,
                $10, $11, $12,
                $13, $14, $15, $16,
                $17, $18, $19,
                $20, $21, $22,
                $23, $24, $25, $26,
                $27
            )
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&registry.cnpj)
        .bind(&registry.razao_social)
        .bind(&registry.nome_fantasia)
        .bind(&registry.porte)
        .bind(registry.capital_social)
        .bind(&registry.natureza_juridica)
        .bind(&registry.situacao_cadastral)
        .bind(&registry.data_abertura)
        .bind(registry.atividade_principal.as_ref().map(to_json).transpose()?)
        .bind(to_json(&registry.atividades_secundarias)?)
        .bind(registry.endereco.as_ref().map(to_json).transpose()?)
        .bind(&registry.telefone)
        .bind(&registry.telefone_e164)
        .bind(&registry.email)
        .bind(to_json(&registry.socios)?)
        .bind(&facility.cnes_codigo)
        .bind(&facility.tipo_estabelecimento)
        .bind(&facility.subtipo)
        .bind(facility.leitos_total)
        .bind(facility.leitos_sus)
        .bind(facility.leitos_nao_sus)
        .bind(to_json(&facility.equipamentos)?)
        .bind(to_json(&facility.habilitacoes)?)
        .bind(&facility.dados_cnes_raw)
        .bind(&profile.segmento)
        .bind(&registry.enrichment_raw)
        .fetch_one(&self.pool)
        .await
        .context("inserting prospect")?;

        tracing::info!("Prospect {} stored for CNPJ {}", prospect.id, prospect.cnpj);
        Ok(prospect)
    }

    pub async fn get_prospect(&self, user_id: Uuid, id: Uuid) -> Result<Option<Prospect>, AppError> {
        sqlx::query_as::<_, Prospect>("SELECT * FROM prospects WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Like [`get_prospect`](Self::get_prospect), but a missing prospect is an error.
    pub async fn require_prospect(&self, user_id: Uuid, id: Uuid) -> Result<Prospect, AppError> {
        self.get_prospect(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Prospect não encontrado".to_string()))
    }

    /// All prospects of a user, most recently updated first, with interaction stats.
    pub async fn list_prospects(&self, user_id: Uuid) -> Result<Vec<ProspectWithStats>, AppError> {
        sqlx::query_as::<_, ProspectWithStats>(
            r#"
            SELECT p.*,
                   COUNT(i.id) AS total_interacoes,
                   MAX(i.data_interacao) AS ultima_interacao
            FROM prospects p
            LEFT JOIN interactions i ON i.prospect_id = p.id
            WHERE p.user_id = $1
            GROUP BY p.id
            ORDER BY p.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("listing prospects")
    }

    /// Replaces the CNES subset (and the segment derived from it).
    pub async fn update_facility(
        &self,
        user_id: Uuid,
        id: Uuid,
        facility: &FacilityProfile,
        segmento: &str,
    ) -> Result<Prospect, AppError> {
        sqlx::query_as::<_, Prospect>(
            r#"
            UPDATE prospects
            SET cnes_codigo = $3,
                tipo_estabelecimento = $4,
                subtipo = $5,
                leitos_total = $6,
                leitos_sus = $7,
                leitos_nao_sus = $8,
                equipamentos = $9,
                habilitacoes = $10,
                dados_cnes_raw = $11,
                segmento = $12,
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&facility.cnes_codigo)
        .bind(&facility.tipo_estabelecimento)
        .bind(&facility.subtipo)
        .bind(facility.leitos_total)
        .bind(facility.leitos_sus)
        .bind(facility.leitos_nao_sus)
        .bind(to_json(&facility.equipamentos)?)
        .bind(to_json(&facility.habilitacoes)?)
        .bind(&facility.dados_cnes_raw)
        .bind(segmento)
        .fetch_optional(&self.pool)
        .await
        .context("updating CNES data")?
        .ok_or_else(|| AppError::NotFound("Prospect não encontrado".to_string()))
    }

    /// Stores the briefing on the prospect and appends it to the history.
    pub async fn save_briefing(
        &self,
        user_id: Uuid,
        prospect_id: Uuid,
        conteudo: &str,
        contexto_usado: &Value,
        modelo_ai: &str,
    ) -> Result<DateTime<Utc>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;

        let (generated_at,) = sqlx::query_as::<_, (DateTime<Utc>,)>(
            r#"
            UPDATE prospects
            SET briefing_ai = $3, briefing_generated_at = now(), updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING briefing_generated_at
            "#,
        )
        .bind(prospect_id)
        .bind(user_id)
        .bind(conteudo)
        .fetch_optional(&mut *tx)
        .await
        .context("storing briefing on prospect")?
        .ok_or_else(|| AppError::NotFound("Prospect não encontrado".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO briefings (user_id, prospect_id, conteudo, contexto_usado, modelo_ai)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(prospect_id)
        .bind(conteudo)
        .bind(contexto_usado)
        .bind(modelo_ai)
        .execute(&mut *tx)
        .await
        .context("appending briefing history")?;

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(generated_at)
    }

    /// Latest interactions of a prospect, newest first, optionally skipping one.
    pub async fn recent_interactions(
        &self,
        prospect_id: Uuid,
        limit: i64,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Interaction>, AppError> {
        sqlx::query_as::<_, Interaction>(
            r#"
            SELECT * FROM interactions
            WHERE prospect_id = $1 AND ($2::uuid IS NULL OR id <> $2)
            ORDER BY data_interacao DESC
            LIMIT $3
            "#,
        )
        .bind(prospect_id)
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)
    }

    pub async fn insert_interaction(
        &self,
        user_id: Uuid,
        prospect_id: Uuid,
        tipo: InteractionType,
        resumo: &str,
        detalhes: Option<&str>,
    ) -> Result<Interaction, AppError> {
        sqlx::query_as::<_, Interaction>(
            r#"
            INSERT INTO interactions (user_id, prospect_id, tipo, resumo, detalhes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(prospect_id)
        .bind(tipo.as_str())
        .bind(resumo)
        .bind(detalhes)
        .fetch_one(&self.pool)
        .await
        .context("inserting interaction")
    }

    pub async fn update_interaction_analysis(
        &self,
        id: Uuid,
        analysis: &InteractionAnalysis,
    ) -> Result<Interaction, AppError> {
        sqlx::query_as::<_, Interaction>(
            r#"
            UPDATE interactions
            SET proximos_passos_ai = $2, sentimento = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&analysis.proximos_passos)
        .bind(&analysis.sentimento)
        .fetch_one(&self.pool)
        .await
        .context("storing interaction analysis")
    }

    /// Merges the drafts into `enrichment_raw`, keeping every existing key.
    pub async fn save_outreach_messages(
        &self,
        user_id: Uuid,
        prospect_id: Uuid,
        messages: &OutreachMessages,
    ) -> Result<(), AppError> {
        let patch = json!({
            "outreach_messages": to_json(messages)?,
            "outreach_messages_generated_at": Utc::now().to_rfc3339(),
        });

        let result = sqlx::query(
            r#"
            UPDATE prospects
            SET enrichment_raw = COALESCE(enrichment_raw, '{}'::jsonb) || $3,
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(prospect_id)
        .bind(user_id)
        .bind(patch)
        .execute(&self.pool)
        .await
        .context("storing outreach messages")?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Prospect não encontrado".to_string()));
        }
        Ok(())
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::InternalError(e.to_string()))
}
