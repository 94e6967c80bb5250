//! CNPJ cleaning/validation and BrasilAPI record normalization.
//!
//! Nothing here performs I/O. `normalize_registry` never fails: optional
//! fields that are missing or of an unexpected type simply come out absent.

use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use serde_json::Value;

use crate::models::{AtividadeEconomica, Endereco, RegistryProfile, RegistryRecord, Socio};

/// Number of digits in a CNPJ.
pub const CNPJ_LEN: usize = 14;

/// BrasilAPI numeric code for an active registration.
const SITUACAO_ATIVA_CODE: i64 = 2;

/// Strips every non-digit character.
pub fn clean(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True iff the cleaned CNPJ has exactly 14 digits. No check-digit validation.
pub fn is_valid(raw: &str) -> bool {
    clean(raw).len() == CNPJ_LEN
}

/// Registration-status gate.
///
/// Accepts the Portuguese `ATIVA` and the English `ACTIVE` in any case. When
/// the description is missing, the numeric `situacao_cadastral` code decides.
pub fn is_active(record: &RegistryRecord) -> bool {
    match situacao(record) {
        Some(descricao) => {
            let descricao = descricao.trim().to_uppercase();
            descricao == "ATIVA" || descricao == "ACTIVE"
        }
        None => record
            .get("situacao_cadastral")
            .and_then(as_integer)
            .map(|code| code == SITUACAO_ATIVA_CODE)
            .unwrap_or(false),
    }
}

/// Human-readable registration status, as the registry reports it.
pub fn situacao(record: &RegistryRecord) -> Option<String> {
    record
        .get("descricao_situacao_cadastral")
        .and_then(scalar_text)
}

/// Maps a BrasilAPI record onto the registry subset of a prospect.
pub fn normalize_registry(record: &RegistryRecord) -> RegistryProfile {
    let atividade_principal = record
        .get("cnae_fiscal")
        .and_then(scalar_text)
        .map(|codigo| AtividadeEconomica {
            codigo,
            descricao: text(record, "cnae_fiscal_descricao"),
        });

    let atividades_secundarias = record
        .get("cnaes_secundarios")
        .and_then(Value::as_array)
        .map(|cnaes| {
            cnaes
                .iter()
                .filter_map(|cnae| {
                    Some(AtividadeEconomica {
                        codigo: cnae.get("codigo").and_then(scalar_text)?,
                        descricao: text(cnae, "descricao"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let endereco = Endereco {
        logradouro: text(record, "logradouro"),
        numero: text(record, "numero"),
        complemento: text(record, "complemento"),
        bairro: text(record, "bairro"),
        municipio: text(record, "municipio"),
        uf: text(record, "uf"),
        cep: text(record, "cep"),
    };

    let socios = record
        .get("qsa")
        .and_then(Value::as_array)
        .map(|qsa| {
            qsa.iter()
                .filter_map(|socio| {
                    Some(Socio {
                        nome: non_empty_text(socio, "nome_socio")?,
                        qualificacao: text(socio, "qualificacao_socio"),
                        faixa_etaria: text(socio, "faixa_etaria"),
                        data_entrada_sociedade: text(socio, "data_entrada_sociedade"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let telefone = non_empty_text(record, "ddd_telefone_1");
    let telefone_e164 = telefone.as_deref().and_then(normalize_br_phone);

    RegistryProfile {
        cnpj: text(record, "cnpj").map(|c| clean(&c)).unwrap_or_default(),
        razao_social: text(record, "razao_social"),
        nome_fantasia: non_empty_text(record, "nome_fantasia"),
        porte: text(record, "porte"),
        capital_social: record.get("capital_social").and_then(as_number),
        natureza_juridica: text(record, "natureza_juridica"),
        situacao_cadastral: situacao(record),
        data_abertura: text(record, "data_inicio_atividade"),
        atividade_principal,
        atividades_secundarias,
        endereco: (!endereco.is_empty()).then_some(endereco),
        telefone,
        telefone_e164,
        email: non_empty_text(record, "email"),
        socios,
        enrichment_raw: record.clone(),
    }
}

/// Parses a Brazilian phone number and returns it in E.164 (+5541...).
pub fn normalize_br_phone(raw: &str) -> Option<String> {
    if raw.trim().is_empty() || raw.len() < 8 {
        return None;
    }

    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            Some(number.format().mode(Mode::E164).to_string())
        }
        Ok(_) => {
            tracing::debug!("Registry phone is not a valid BR number: {}", raw);
            None
        }
        Err(e) => {
            tracing::debug!("Failed to parse registry phone '{}': {:?}", raw, e);
            None
        }
    }
}

/// String or number rendered as text; anything else is absent.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer from a JSON number or a numeric string.
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

fn text(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(scalar_text)
}

fn non_empty_text(record: &Value, key: &str) -> Option<String> {
    text(record, key).filter(|s| !s.trim().is_empty())
}
