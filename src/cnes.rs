//! DataSUS CNES establishment normalization.
//!
//! The CNES open-data API renamed its fields between versions, so each
//! logical field is read through an ordered list of candidate keys and the
//! first non-null one wins.

use serde_json::Value;

use crate::cnpj::{as_integer, scalar_text};
use crate::models::{FacilityProfile, FacilityRecord};

/// Ordered candidate keys for one logical field.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub field: &'static str,
    pub keys: &'static [&'static str],
}

pub const CNES_CODIGO: FieldAliases = FieldAliases {
    field: "cnes_codigo",
    keys: &["codigo_cnes", "codCnes", "cod_cnes"],
};

pub const TIPO_ESTABELECIMENTO: FieldAliases = FieldAliases {
    field: "tipo_estabelecimento",
    keys: &[
        "descricao_tipo_unidade",
        "tipoUnidadeCnes",
        "tipoUnidade",
        "tipo_unidade",
    ],
};

pub const SUBTIPO: FieldAliases = FieldAliases {
    field: "subtipo",
    keys: &[
        "categoria_unidade",
        "categoriaUnidade",
        "descricao_subtipo_unidade",
    ],
};

pub const LEITOS_SUS: FieldAliases = FieldAliases {
    field: "leitos_sus",
    keys: &["qt_leitos_sus", "leitos_sus", "quantidade_leitos_sus"],
};

pub const LEITOS_NAO_SUS: FieldAliases = FieldAliases {
    field: "leitos_nao_sus",
    keys: &[
        "qt_leitos_nao_sus",
        "leitos_nao_sus",
        "numero_leitos_particular",
    ],
};

pub const LEITOS_TOTAL: FieldAliases = FieldAliases {
    field: "leitos_total",
    keys: &["numero_leitos_total", "qt_leitos_total", "numero_leitos"],
};

/// Every aliased field, in profile order.
pub const ALL_FIELDS: [FieldAliases; 6] = [
    CNES_CODIGO,
    TIPO_ESTABELECIMENTO,
    SUBTIPO,
    LEITOS_SUS,
    LEITOS_NAO_SUS,
    LEITOS_TOTAL,
];

impl FieldAliases {
    /// First candidate present with a non-null value.
    pub fn resolve<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.keys
            .iter()
            .filter_map(|key| record.get(*key))
            .find(|value| !value.is_null())
    }

    fn text(&self, record: &Value) -> Option<String> {
        self.resolve(record)
            .and_then(scalar_text)
            .filter(|s| !s.is_empty())
    }

    /// Bed counts are never negative; a negative value is treated as absent.
    fn count(&self, record: &Value) -> Option<i64> {
        self.resolve(record)
            .and_then(as_integer)
            .filter(|count| *count >= 0)
    }
}

/// Bed counts after coercion and derivation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BedCounts {
    pub total: Option<i64>,
    pub sus: Option<i64>,
    pub nao_sus: Option<i64>,
}

impl BedCounts {
    /// Derives the total from its parts only when no total was supplied and
    /// both parts are known. An explicit total is never recomputed, and a sum
    /// that does not fit in an `i64` leaves the total absent.
    pub fn resolve(sus: Option<i64>, nao_sus: Option<i64>, total: Option<i64>) -> Self {
        let total = match (total, sus, nao_sus) {
            (Some(total), _, _) => Some(total),
            (None, Some(sus), Some(nao_sus)) => sus.checked_add(nao_sus),
            _ => None,
        };
        Self {
            total,
            sus,
            nao_sus,
        }
    }
}

/// Maps a located CNES establishment onto the facility subset of a prospect.
pub fn normalize_facility(record: &FacilityRecord) -> FacilityProfile {
    let beds = BedCounts::resolve(
        LEITOS_SUS.count(record),
        LEITOS_NAO_SUS.count(record),
        LEITOS_TOTAL.count(record),
    );

    FacilityProfile {
        cnes_codigo: CNES_CODIGO.text(record),
        tipo_estabelecimento: TIPO_ESTABELECIMENTO.text(record),
        subtipo: SUBTIPO.text(record),
        leitos_total: beds.total,
        leitos_sus: beds.sus,
        leitos_nao_sus: beds.nao_sus,
        equipamentos: sequence(record, "equipamentos"),
        habilitacoes: sequence(record, "habilitacoes"),
        dados_cnes_raw: Some(record.clone()),
    }
}

/// Extracts the establishment list from a CNES response, which is either a
/// bare array or an object with an `estabelecimentos` (or `establishments`)
/// array.
pub fn establishments(body: &Value) -> &[Value] {
    match body {
        Value::Array(items) => items,
        other => ["estabelecimentos", "establishments"]
            .iter()
            .find_map(|key| other.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
    }
}

fn sequence(record: &Value, key: &str) -> Vec<Value> {
    record
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_order_first_present_wins() {
        let record = json!({"cod_cnes": "111", "codCnes": "222"});
        assert_eq!(CNES_CODIGO.text(&record).as_deref(), Some("222"));

        let record = json!({"codigo_cnes": null, "cod_cnes": 333});
        assert_eq!(CNES_CODIGO.text(&record).as_deref(), Some("333"));
    }

    #[test]
    fn test_every_field_has_at_least_three_aliases() {
        for aliases in ALL_FIELDS {
            assert!(aliases.keys.len() >= 3, "{} has too few aliases", aliases.field);
        }
    }

    #[test]
    fn test_empty_code_is_absent() {
        let record = json!({"codigo_cnes": ""});
        assert_eq!(CNES_CODIGO.text(&record), None);
    }

    #[test]
    fn test_tipo_unidade_numeric_is_stringified() {
        let record = json!({"tipo_unidade": 5});
        assert_eq!(TIPO_ESTABELECIMENTO.text(&record).as_deref(), Some("5"));
    }

    #[test]
    fn test_bed_resolution_rules() {
        assert_eq!(BedCounts::resolve(Some(40), None, None).total, None);
        assert_eq!(BedCounts::resolve(Some(40), Some(10), None).total, Some(50));
        assert_eq!(
            BedCounts::resolve(Some(40), Some(10), Some(60)).total,
            Some(60)
        );
        assert_eq!(BedCounts::resolve(None, None, Some(12)).total, Some(12));
    }

    #[test]
    fn test_overflowing_bed_sum_leaves_total_absent() {
        assert_eq!(BedCounts::resolve(Some(i64::MAX), Some(1), None).total, None);

        let profile = normalize_facility(&json!({
            "qt_leitos_sus": "9223372036854775807",
            "qt_leitos_nao_sus": 1
        }));
        assert_eq!(profile.leitos_sus, Some(i64::MAX));
        assert_eq!(profile.leitos_nao_sus, Some(1));
        assert_eq!(profile.leitos_total, None);
    }

    #[test]
    fn test_negative_bed_counts_are_absent() {
        let profile = normalize_facility(&json!({
            "qt_leitos_sus": "-5",
            "qt_leitos_nao_sus": 10,
            "numero_leitos_total": -1
        }));
        assert_eq!(profile.leitos_sus, None);
        assert_eq!(profile.leitos_nao_sus, Some(10));
        assert_eq!(profile.leitos_total, None);
    }

    #[test]
    fn test_establishments_shapes() {
        assert_eq!(establishments(&json!([{"a": 1}])).len(), 1);
        assert_eq!(
            establishments(&json!({"estabelecimentos": [{"a": 1}, {"b": 2}]})).len(),
            2
        );
        assert_eq!(
            establishments(&json!({"establishments": [{"a": 1}]})).len(),
            1
        );
        assert!(establishments(&json!({"estabelecimentos": "x"})).is_empty());
        assert!(establishments(&json!({})).is_empty());
        assert!(establishments(&json!(null)).is_empty());
    }

    #[test]
    fn test_non_sequence_lists_default_to_empty() {
        let profile = normalize_facility(&json!({
            "equipamentos": {"tomografo": 1},
            "habilitacoes": "UTI"
        }));
        assert!(profile.equipamentos.is_empty());
        assert!(profile.habilitacoes.is_empty());
    }
}
