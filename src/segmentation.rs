//! Rule-based sales segmentation of health prospects.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::models::{Prospect, ProspectProfile};

const LARGE_HOSPITAL_MIN_BEDS: i64 = 151;
const MEDIUM_HOSPITAL_MIN_BEDS: i64 = 50;

static HOSPITAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)hospital").expect("valid hospital regex"));

static CLINICA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cl[ií]nica|policl[ií]nica|ambulat[oó]ri|consult[oó]rio|centro de especialidade")
        .expect("valid clinic regex")
});

static OPERADORA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)planos? de sa[uú]de|operadora|medicina de grupo|seguro[s]? sa[uú]de")
        .expect("valid operator regex")
});

/// Sales segment of a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    HospitalGrande,
    HospitalMedio,
    HospitalPequeno,
    ClinicaAmbulatorio,
    OperadoraSaude,
    Outro,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::HospitalGrande => "hospital_grande",
            Segment::HospitalMedio => "hospital_medio",
            Segment::HospitalPequeno => "hospital_pequeno",
            Segment::ClinicaAmbulatorio => "clinica_ambulatorio",
            Segment::OperadoraSaude => "operadora_saude",
            Segment::Outro => "outro",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Segment::HospitalGrande => "Hospital grande (>150 leitos)",
            Segment::HospitalMedio => "Hospital médio (50-150 leitos)",
            Segment::HospitalPequeno => "Hospital pequeno (<50 leitos)",
            Segment::ClinicaAmbulatorio => "Clínica / ambulatório",
            Segment::OperadoraSaude => "Operadora de saúde",
            Segment::Outro => "Outro",
        }
    }

    /// Sales focus for the segment, used in prompts.
    pub fn focus(&self) -> &'static str {
        match self {
            Segment::HospitalGrande => {
                "ROI, integração com sistemas existentes, gestão de centro cirúrgico"
            }
            Segment::HospitalMedio => {
                "eficiência operacional, ocupação de leitos, redução de glosas"
            }
            Segment::HospitalPequeno => {
                "simplicidade, custo-benefício, substituição de planilhas"
            }
            Segment::ClinicaAmbulatorio => {
                "agendamento, produtividade médica, indicadores básicos"
            }
            Segment::OperadoraSaude => "gestão de rede, auditoria, indicadores de qualidade",
            Segment::Outro => "entender o perfil da instituição antes de propor a solução",
        }
    }
}

/// Signals the classifier looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentInputs<'a> {
    pub tipo_estabelecimento: Option<&'a str>,
    pub leitos_total: Option<i64>,
    pub cnae_codigo: Option<&'a str>,
    pub cnae_descricao: Option<&'a str>,
    pub natureza_juridica: Option<&'a str>,
    pub porte: Option<&'a str>,
}

impl<'a> SegmentInputs<'a> {
    pub fn from_profile(profile: &'a ProspectProfile) -> Self {
        let atividade = profile.registry.atividade_principal.as_ref();
        Self {
            tipo_estabelecimento: profile.facility.tipo_estabelecimento.as_deref(),
            leitos_total: profile.facility.leitos_total,
            cnae_codigo: atividade.map(|a| a.codigo.as_str()),
            cnae_descricao: atividade.and_then(|a| a.descricao.as_deref()),
            natureza_juridica: profile.registry.natureza_juridica.as_deref(),
            porte: profile.registry.porte.as_deref(),
        }
    }

    pub fn from_prospect(prospect: &'a Prospect) -> Self {
        let atividade = prospect.atividade_principal.as_ref();
        Self {
            tipo_estabelecimento: prospect.tipo_estabelecimento.as_deref(),
            leitos_total: prospect.leitos_total,
            cnae_codigo: atividade
                .and_then(|a| a.get("codigo"))
                .and_then(|v| v.as_str()),
            cnae_descricao: atividade
                .and_then(|a| a.get("descricao"))
                .and_then(|v| v.as_str()),
            natureza_juridica: prospect.natureza_juridica.as_deref(),
            porte: prospect.porte.as_deref(),
        }
    }
}

/// Buckets a prospect into a sales segment.
///
/// Rules, first match wins:
/// 1. health-plan operators (CNAE 6550 or operator wording);
/// 2. hospitals (CNES type or CNAE 8610), sized by beds, falling back on the
///    registry size class when beds are unknown;
/// 3. clinics and ambulatory care (CNES type wording or CNAE 8630);
/// 4. everything else.
pub fn classify(inputs: &SegmentInputs<'_>) -> Segment {
    let cnae = inputs
        .cnae_codigo
        .map(|c| c.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
        .unwrap_or_default();
    let tipo = inputs.tipo_estabelecimento.unwrap_or("");
    let descricao = inputs.cnae_descricao.unwrap_or("");

    if cnae.starts_with("6550")
        || OPERADORA.is_match(descricao)
        || inputs.natureza_juridica.is_some_and(|n| OPERADORA.is_match(n))
    {
        return Segment::OperadoraSaude;
    }

    if HOSPITAL.is_match(tipo) || cnae.starts_with("8610") {
        return match inputs.leitos_total {
            Some(beds) if beds >= LARGE_HOSPITAL_MIN_BEDS => Segment::HospitalGrande,
            Some(beds) if beds >= MEDIUM_HOSPITAL_MIN_BEDS => Segment::HospitalMedio,
            Some(_) => Segment::HospitalPequeno,
            None if is_large_company(inputs.porte) => Segment::HospitalMedio,
            None => Segment::HospitalPequeno,
        };
    }

    if CLINICA.is_match(tipo) || cnae.starts_with("8630") || CLINICA.is_match(descricao) {
        return Segment::ClinicaAmbulatorio;
    }

    Segment::Outro
}

/// Registry size classes ME/EPP are small; "DEMAIS" is everything above.
fn is_large_company(porte: Option<&str>) -> bool {
    porte.is_some_and(|p| p.trim().eq_ignore_ascii_case("DEMAIS"))
}
