use crate::{
    routes::lookups::{lookup_router, LookupTable},
    schemas::PaymentTypeInput,
    state::AppState,
};

pub const PAYMENT_TYPES: LookupTable = LookupTable {
    table: "payment_types",
    collection_path: "/payment-types",
    item_path: "/payment-types/{payment_type_id}",
    label: "Payment type",
    identity: &["payment_type"],
    referenced_by: &[
        ("lease_payments", "payment_type_id"),
        ("expenses", "payment_type_id"),
        ("fines", "payment_type_id"),
        ("inspections", "payment_type_id"),
        ("utilities", "payment_type_id"),
    ],
};

pub fn router() -> axum::Router<AppState> {
    lookup_router::<PaymentTypeInput>(&PAYMENT_TYPES)
}

#[cfg(test)]
mod tests {
    use super::PAYMENT_TYPES;
    use crate::error::AppError;
    use crate::schemas::PaymentTypeInput;

    fn named(name: &str) -> PaymentTypeInput {
        PaymentTypeInput {
            payment_type: Some(name.to_string()),
        }
    }

    #[test]
    fn trims_and_rejects_blank_names() {
        let record = PAYMENT_TYPES
            .record(&named("  Money Order "), true)
            .expect("valid name");
        assert_eq!(
            record.get("payment_type").and_then(|value| value.as_str()),
            Some("Money Order")
        );

        assert!(matches!(
            PAYMENT_TYPES.record(&named("   "), true),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            PAYMENT_TYPES.record(&named(""), true),
            Err(AppError::UnprocessableEntity(_))
        ));
        assert!(matches!(
            PAYMENT_TYPES.record(&PaymentTypeInput { payment_type: None }, true),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn every_payment_record_blocks_deletion() {
        let tables: Vec<&str> = PAYMENT_TYPES
            .referenced_by
            .iter()
            .map(|(table, _)| *table)
            .collect();
        assert_eq!(
            tables,
            vec!["lease_payments", "expenses", "fines", "inspections", "utilities"]
        );
    }
}
