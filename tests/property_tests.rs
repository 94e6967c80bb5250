/// Property-based tests using proptest
/// Invariants of the CNPJ and CNES normalizers that should hold for all inputs
use health_sales_ai::cnes::{normalize_facility, BedCounts};
use health_sales_ai::cnpj::{clean, is_valid, normalize_br_phone, normalize_registry};
use proptest::prelude::*;
use serde_json::json;

// Property: CNPJ validity depends only on the digit count
proptest! {
    #[test]
    fn cnpj_validation_never_panics(raw in "\\PC*") {
        let _ = is_valid(&raw);
        let _ = clean(&raw);
    }

    #[test]
    fn valid_iff_fourteen_digits(raw in "[0-9./\\- a-z]{0,30}") {
        let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
        prop_assert_eq!(is_valid(&raw), digits == 14);
    }

    #[test]
    fn cleaned_output_is_digits_only(raw in "\\PC*") {
        prop_assert!(clean(&raw).chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn formatting_preserves_digits(digits in "[0-9]{14}") {
        let formatted = format!(
            "{}.{}.{}/{}-{}",
            &digits[0..2],
            &digits[2..5],
            &digits[5..8],
            &digits[8..12],
            &digits[12..14]
        );
        prop_assert!(is_valid(&formatted));
        prop_assert_eq!(clean(&formatted), digits);
    }
}

// Property: bed totals are derived only from two known parts
proptest! {
    #[test]
    fn explicit_total_is_never_recomputed(
        sus in proptest::option::of(0i64..10_000),
        nao_sus in proptest::option::of(0i64..10_000),
        total in 0i64..20_000
    ) {
        prop_assert_eq!(BedCounts::resolve(sus, nao_sus, Some(total)).total, Some(total));
    }

    #[test]
    fn derived_total_is_the_sum(sus in 0i64..10_000, nao_sus in 0i64..10_000) {
        let record = json!({"qt_leitos_sus": sus, "qt_leitos_nao_sus": nao_sus});
        let facility = normalize_facility(&record);
        prop_assert_eq!(facility.leitos_total, Some(sus + nao_sus));
    }

    #[test]
    fn string_bed_counts_are_summed_as_numbers(sus in 0i64..10_000, nao_sus in 0i64..10_000) {
        let record = json!({
            "leitos_sus": sus.to_string(),
            "leitos_nao_sus": nao_sus.to_string()
        });
        let facility = normalize_facility(&record);
        prop_assert_eq!(facility.leitos_total, Some(sus + nao_sus));
    }

    #[test]
    fn bed_counts_never_panic_or_go_negative(sus in any::<i64>(), nao_sus in any::<i64>()) {
        let facility = normalize_facility(&json!({
            "qt_leitos_sus": sus.to_string(),
            "qt_leitos_nao_sus": nao_sus
        }));
        if let Some(total) = facility.leitos_total {
            prop_assert!(total >= 0);
            prop_assert_eq!(Some(total), sus.checked_add(nao_sus));
        }
    }

    #[test]
    fn single_part_gives_no_total(sus in 0i64..10_000) {
        let facility = normalize_facility(&json!({"qt_leitos_sus": sus}));
        prop_assert_eq!(facility.leitos_total, None);
    }
}

// Property: normalizers never panic and always keep the raw payload
proptest! {
    #[test]
    fn registry_normalization_never_panics(
        razao in "\\PC*",
        fantasia in "\\PC*",
        telefone in "\\PC*",
        capital in proptest::num::f64::ANY
    ) {
        let record = json!({
            "razao_social": razao,
            "nome_fantasia": fantasia,
            "ddd_telefone_1": telefone,
            "capital_social": capital,
            "qsa": [{"nome_socio": razao}]
        });
        let profile = normalize_registry(&record);
        prop_assert_eq!(profile.enrichment_raw, record);
    }

    #[test]
    fn phone_normalization_never_panics(phone in "\\PC*") {
        let _ = normalize_br_phone(&phone);
    }

    #[test]
    fn normalized_phones_are_e164(ddd in 11u8..=99u8, number in 900000000u32..=999999999u32) {
        if let Some(e164) = normalize_br_phone(&format!("{}{}", ddd, number)) {
            prop_assert!(e164.starts_with("+55"));
            prop_assert!(e164[1..].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
