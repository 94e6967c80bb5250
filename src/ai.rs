//! Sales-assistant generation on top of [`LlmClient`]: pre-meeting briefings,
//! interaction analysis and outreach drafts.

use std::fmt::Write as _;

use crate::llm_client::{strip_json_fences, LlmClient, LlmError, Sampling};
use crate::models::{
    AtividadeEconomica, Interaction, InteractionAnalysis, InteractionType, OutreachMessages,
    Prospect, Socio, Stakeholder,
};
use crate::segmentation::{classify, Segment, SegmentInputs};

pub const BRIEFING_SAMPLING: Sampling = Sampling {
    temperature: 0.7,
    max_tokens: 2000,
};

pub const ANALYSIS_SAMPLING: Sampling = Sampling {
    temperature: 0.3,
    max_tokens: 500,
};

pub const OUTREACH_SAMPLING: Sampling = Sampling {
    temperature: 0.7,
    max_tokens: 2000,
};

pub const BRIEFING_FALLBACK: &str = "Não foi possível gerar o briefing.";
const ANALYSIS_FALLBACK: &str = "Não foi possível analisar a interação.";
const DEFAULT_SENTIMENT: &str = "neutro";
const SENTIMENTS: [&str; 3] = ["positivo", "neutro", "negativo"];

/// How many past interactions are fed back as history.
pub const HISTORY_LIMIT: i64 = 5;

pub const SYSTEM_PROMPT: &str = "Você é um assistente de vendas especializado em healthtech no Brasil. \
    Seu usuário é o Regional Partner da WeKnow HealthTech no Paraná. \
    A WeKnow é uma plataforma de Business Intelligence para saúde que se conecta a sistemas \
    hospitalares (Tasy, MV, Philips) e planilhas Excel, integra dados em painéis com indicadores \
    de fácil entendimento. Foco: gestão estratégica, ocupação de leitos, centro cirúrgico, glosas, custos.";

pub const INTERACTION_SYSTEM_PROMPT: &str = r#"Você é um assistente de vendas especializado em healthtech no Brasil, focado em análise de interações comerciais. Seu usuário é o Regional Partner da WeKnow HealthTech no Paraná.

**Sobre a WeKnow:** Plataforma de Business Intelligence para saúde que se conecta a sistemas hospitalares (Tasy, MV, Philips) e planilhas Excel, integra dados em painéis com indicadores de fácil entendimento. Foco: gestão estratégica, ocupação de leitos, centro cirúrgico, glosas, custos.

**Metodologia de vendas (Miller Heiman, Strategic Selling):**
- Identifique o papel de cada contato: Economic Buyer (decisor financeiro), Technical Buyer (avaliador técnico/TI), User Buyer (usuário final/gestores clínicos), Coach (aliado interno)
- Avalie a posição de cada buyer: Growth (quer crescer), Trouble (tem problema urgente), Even Keel (satisfeito), Overconfident (não vê necessidade)
- Sempre sugira próximos passos que avancem o deal com múltiplos stakeholders

**Cadência multicanal recomendada:**
- Dia 1: LinkedIn (conexão + mensagem personalizada)
- Dia 3: Email de introdução com case relevante
- Dia 5: Ligação para o decisor
- Dia 8: WhatsApp com conteúdo de valor
- Dia 12: Email de follow-up
- Dia 15: Ligação final ou convite para evento/webinar

**Segmentação por tipo de instituição:**
- Hospitais grandes (>150 leitos): foco em ROI, integração com sistemas existentes, gestão de centro cirúrgico
- Hospitais médios (50-150 leitos): foco em eficiência operacional, ocupação de leitos, redução de glosas
- Hospitais pequenos (<50 leitos): foco em simplicidade, custo-benefício, substituição de planilhas
- Clínicas e ambulatórios: foco em agendamento, produtividade médica, indicadores básicos
- Operadoras de saúde: foco em gestão de rede, auditoria, indicadores de qualidade

Ao analisar interações, considere o contexto completo: tipo de instituição, porte, estágio no funil, histórico de contatos e sentimento geral da negociação."#;

const BRIEFING_SECTIONS: &str = "Estruture o briefing com:
1. **Contexto da Instituição**: resumo do perfil e relevância
2. **Possíveis Dores Operacionais**: problemas que a WeKnow resolve baseado no perfil
3. **Mapa de Stakeholders (Miller Heiman)**: análise dos decisores e influenciadores
4. **Perguntas de Discovery**: perguntas estratégicas para a primeira reunião
5. **Cases e Argumentos Relevantes**: argumentos de venda personalizados para este perfil";

/// Replace `{details}` and `{history}` before sending.
const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analise esta interação comercial e responda APENAS com JSON puro (sem markdown, sem ```):

{details}{history}
Responda neste formato JSON:
{
  "proximos_passos": "descrição concreta e acionável dos próximos passos recomendados (máximo 2-3 frases)",
  "sentimento": "positivo | neutro | negativo"
}"#;

/// Replace `{profile}` before sending.
const OUTREACH_PROMPT_TEMPLATE: &str = r#"Escreva as mensagens da cadência multicanal de prospecção para a instituição abaixo. Personalize cada mensagem com os dados do perfil e o foco do segmento. Responda APENAS com JSON puro (sem markdown, sem ```).

{profile}
Responda neste formato JSON:
{
  "linkedin_conexao": "Dia 1: nota de conexão no LinkedIn (máximo 300 caracteres)",
  "email_introducao": "Dia 3: email de introdução com assunto e case relevante",
  "roteiro_ligacao": "Dia 5: roteiro de ligação para o decisor, com abertura e perguntas",
  "whatsapp": "Dia 8: mensagem curta de WhatsApp com conteúdo de valor",
  "email_followup": "Dia 12: email de follow-up retomando os contatos anteriores"
}"#;

// ============ Briefing ============

/// Everything the briefing and outreach prompts know about a prospect.
#[derive(Debug, Clone)]
pub struct BriefingContext {
    pub nome_instituicao: String,
    pub razao_social: Option<String>,
    pub porte: Option<String>,
    pub capital_social: Option<f64>,
    pub natureza_juridica: Option<String>,
    pub atividade_principal: Option<AtividadeEconomica>,
    pub municipio: Option<String>,
    pub uf: Option<String>,
    pub socios: Vec<Socio>,

    pub tipo_estabelecimento: Option<String>,
    pub leitos_total: Option<i64>,
    pub leitos_sus: Option<i64>,
    pub leitos_nao_sus: Option<i64>,
    pub sistema_gestao: Option<String>,
    pub segmento: Segment,

    pub decisor_nome: Option<String>,
    pub decisor_cargo: Option<String>,
    pub stakeholders: Vec<Stakeholder>,
    pub interacoes_anteriores: Vec<String>,
}

impl BriefingContext {
    /// `recent` is expected newest first.
    pub fn from_prospect(prospect: &Prospect, recent: &[Interaction]) -> Self {
        let endereco = prospect.endereco();
        Self {
            nome_instituicao: prospect.display_name().to_string(),
            razao_social: prospect.razao_social.clone(),
            porte: prospect.porte.clone(),
            capital_social: prospect.capital_social,
            natureza_juridica: prospect.natureza_juridica.clone(),
            atividade_principal: prospect.atividade_principal(),
            municipio: endereco.as_ref().and_then(|e| e.municipio.clone()),
            uf: endereco.and_then(|e| e.uf),
            socios: prospect.socios(),
            tipo_estabelecimento: prospect.tipo_estabelecimento.clone(),
            leitos_total: prospect.leitos_total,
            leitos_sus: prospect.leitos_sus,
            leitos_nao_sus: prospect.leitos_nao_sus,
            sistema_gestao: prospect.sistema_gestao.clone(),
            segmento: classify(&SegmentInputs::from_prospect(prospect)),
            decisor_nome: prospect.decisor_nome.clone(),
            decisor_cargo: prospect.decisor_cargo.clone(),
            stakeholders: prospect.stakeholders(),
            interacoes_anteriores: recent.iter().map(Interaction::summary_line).collect(),
        }
    }

    fn profile_block(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "**Instituição:** {}", self.nome_instituicao);
        let _ = writeln!(out, "**Razão Social:** {}", or_na(&self.razao_social));
        let _ = writeln!(out, "**Porte:** {}", or_na(&self.porte));
        let _ = writeln!(
            out,
            "**Capital Social:** {}",
            self.capital_social
                .filter(|c| *c > 0.0)
                .map(format_brl)
                .unwrap_or_else(|| "N/A".to_string())
        );
        if let Some(natureza) = &self.natureza_juridica {
            let _ = writeln!(out, "**Natureza Jurídica:** {}", natureza);
        }
        let _ = writeln!(
            out,
            "**Atividade Principal:** {}",
            self.atividade_principal
                .as_ref()
                .map(|a| format!("{} - {}", a.codigo, a.descricao.as_deref().unwrap_or("")))
                .unwrap_or_else(|| "N/A".to_string())
        );
        let _ = writeln!(out, "**Localização:** {}", self.location());
        let _ = writeln!(out, "**Sócios:** {}", self.socios_line());
        out.push('\n');
        let _ = writeln!(
            out,
            "**Tipo de Estabelecimento:** {}",
            or_na(&self.tipo_estabelecimento)
        );
        let _ = writeln!(out, "**Leitos Total:** {}", count_or_na(self.leitos_total));
        let _ = writeln!(out, "**Leitos SUS:** {}", count_or_na(self.leitos_sus));
        let _ = writeln!(out, "**Leitos Não-SUS:** {}", count_or_na(self.leitos_nao_sus));
        let _ = writeln!(
            out,
            "**Sistema de Gestão Atual:** {}",
            self.sistema_gestao.as_deref().unwrap_or("Não identificado")
        );
        let _ = writeln!(
            out,
            "**Segmento:** {} (foco: {})",
            self.segmento.label(),
            self.segmento.focus()
        );
        out.push('\n');
        let _ = writeln!(out, "**Decisor:** {}", self.decisor_line());
        let _ = writeln!(out, "**Stakeholders:** {}", self.stakeholders_line());
        if !self.interacoes_anteriores.is_empty() {
            out.push_str("**Interações anteriores:**\n");
            for line in &self.interacoes_anteriores {
                let _ = writeln!(out, "- {}", line);
            }
        }
        out
    }

    fn location(&self) -> String {
        match (&self.municipio, &self.uf) {
            (None, None) => "N/A".to_string(),
            (municipio, uf) => format!(
                "{} - {}",
                municipio.as_deref().unwrap_or(""),
                uf.as_deref().unwrap_or("")
            ),
        }
    }

    fn socios_line(&self) -> String {
        if self.socios.is_empty() {
            return "N/A".to_string();
        }
        self.socios
            .iter()
            .map(|s| format!("{} ({})", s.nome, s.qualificacao.as_deref().unwrap_or("N/I")))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn decisor_line(&self) -> String {
        match &self.decisor_nome {
            Some(nome) => format!(
                "{} ({})",
                nome,
                self.decisor_cargo.as_deref().unwrap_or("cargo N/I")
            ),
            None => "Não identificado".to_string(),
        }
    }

    fn stakeholders_line(&self) -> String {
        if self.stakeholders.is_empty() {
            return "Não mapeados".to_string();
        }
        self.stakeholders
            .iter()
            .map(|s| format!("{} - {} ({})", s.nome, s.cargo, s.papel_miller_heiman))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn build_briefing_prompt(context: &BriefingContext) -> String {
    format!(
        "Gere um briefing de vendas para a seguinte instituição de saúde:\n\n{}\n{}",
        context.profile_block(),
        BRIEFING_SECTIONS
    )
}

/// Generates a Markdown pre-meeting briefing. An empty answer yields
/// [`BRIEFING_FALLBACK`]; transport and API failures are returned.
pub async fn generate_briefing(
    llm: &LlmClient,
    context: &BriefingContext,
) -> Result<String, LlmError> {
    tracing::info!("Generating briefing for {}", context.nome_instituicao);
    let response = llm
        .chat(SYSTEM_PROMPT, &build_briefing_prompt(context), BRIEFING_SAMPLING)
        .await?;

    Ok(response
        .text()
        .map(str::to_string)
        .unwrap_or_else(|| BRIEFING_FALLBACK.to_string()))
}

// ============ Interaction analysis ============

#[derive(Debug, Clone)]
pub struct InteractionContext {
    pub prospect_nome: String,
    pub prospect_porte: Option<String>,
    pub prospect_tipo: Option<String>,
    pub prospect_status: Option<String>,
    pub tipo_interacao: InteractionType,
    pub resumo: String,
    pub detalhes: Option<String>,
    pub historico: Vec<String>,
}

pub fn build_interaction_prompt(context: &InteractionContext) -> String {
    let mut details = String::new();
    let _ = writeln!(details, "**Prospect:** {}", context.prospect_nome);
    if let Some(tipo) = &context.prospect_tipo {
        let _ = writeln!(details, "**Tipo de estabelecimento:** {}", tipo);
    }
    if let Some(porte) = &context.prospect_porte {
        let _ = writeln!(details, "**Porte:** {}", porte);
    }
    if let Some(status) = &context.prospect_status {
        let _ = writeln!(details, "**Status no funil:** {}", status);
    }
    let _ = writeln!(
        details,
        "**Tipo de interação:** {}",
        context.tipo_interacao.as_str()
    );
    let _ = writeln!(details, "**Resumo:** {}", context.resumo);
    if let Some(detalhes) = context.detalhes.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(details, "**Detalhes:** {}", detalhes);
    }

    let mut history = String::new();
    if !context.historico.is_empty() {
        history.push_str("**Histórico recente:**\n");
        for line in &context.historico {
            let _ = writeln!(history, "- {}", line);
        }
    }

    ANALYSIS_PROMPT_TEMPLATE
        .replace("{details}", &details)
        .replace("{history}", &history)
}

/// Parses the model's answer. Anything that isn't the expected JSON keeps the
/// raw text as next steps with a neutral sentiment.
pub fn parse_interaction_analysis(raw: &str) -> InteractionAnalysis {
    match serde_json::from_str::<InteractionAnalysis>(strip_json_fences(raw)) {
        Ok(mut analysis) => {
            let sentimento = analysis.sentimento.trim().to_lowercase();
            analysis.sentimento = if SENTIMENTS.contains(&sentimento.as_str()) {
                sentimento
            } else {
                DEFAULT_SENTIMENT.to_string()
            };
            analysis
        }
        Err(e) => {
            tracing::warn!("Interaction analysis was not valid JSON: {}", e);
            let raw = raw.trim();
            InteractionAnalysis {
                proximos_passos: if raw.is_empty() {
                    ANALYSIS_FALLBACK.to_string()
                } else {
                    raw.to_string()
                },
                sentimento: DEFAULT_SENTIMENT.to_string(),
            }
        }
    }
}

pub async fn analyze_interaction(
    llm: &LlmClient,
    context: &InteractionContext,
) -> Result<InteractionAnalysis, LlmError> {
    let response = llm
        .chat(
            INTERACTION_SYSTEM_PROMPT,
            &build_interaction_prompt(context),
            ANALYSIS_SAMPLING,
        )
        .await?;

    Ok(parse_interaction_analysis(response.text().unwrap_or("")))
}

// ============ Outreach ============

pub fn build_outreach_prompt(context: &BriefingContext) -> String {
    OUTREACH_PROMPT_TEMPLATE.replace("{profile}", &context.profile_block())
}

/// Unlike the analysis, outreach drafts have no sensible fallback: an answer
/// that isn't the expected JSON is an error.
pub fn parse_outreach_messages(raw: &str) -> Result<OutreachMessages, LlmError> {
    Ok(serde_json::from_str(strip_json_fences(raw))?)
}

pub async fn generate_outreach_messages(
    llm: &LlmClient,
    context: &BriefingContext,
) -> Result<OutreachMessages, LlmError> {
    tracing::info!("Generating outreach messages for {}", context.nome_instituicao);
    let raw = llm
        .complete(
            INTERACTION_SYSTEM_PROMPT,
            &build_outreach_prompt(context),
            OUTREACH_SAMPLING,
        )
        .await?;

    parse_outreach_messages(&raw)
}

// ============ Formatting helpers ============

fn or_na(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("N/A")
}

fn count_or_na(value: Option<i64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Formats an amount the Brazilian way: `R$ 1.234.567,89`.
pub fn format_brl(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("R$ {}{},{:02}", sign, grouped, cents % 100)
}
