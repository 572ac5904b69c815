use crate::{
    routes::lookups::{lookup_router, LookupTable},
    schemas::UtilityTypeInput,
    state::AppState,
};

/// A utility is identified by its name together with its provider.
pub const UTILITY_TYPES: LookupTable = LookupTable {
    table: "utility_types",
    collection_path: "/utility-types",
    item_path: "/utility-types/{utility_type_id}",
    label: "Utility type",
    identity: &["utility_name", "utility_provider"],
    referenced_by: &[("utilities", "utility_type_id")],
};

pub fn router() -> axum::Router<AppState> {
    lookup_router::<UtilityTypeInput>(&UTILITY_TYPES)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::UTILITY_TYPES;
    use crate::error::AppError;
    use crate::schemas::UtilityTypeInput;

    #[test]
    fn provider_is_part_of_the_identity() {
        let water = UtilityTypeInput {
            utility_name: Some("Water".to_string()),
            utility_provider: Some("City Water Co".to_string()),
            active: Some(false),
        };
        let record = UTILITY_TYPES.record(&water, true).expect("valid record");
        assert_eq!(record.get("active"), Some(&json!(false)));
        assert_eq!(
            UTILITY_TYPES.duplicate_message(&record),
            "Utility type 'Water / City Water Co' already exists."
        );

        let no_provider = UtilityTypeInput {
            utility_provider: None,
            ..water
        };
        assert!(matches!(
            UTILITY_TYPES.record(&no_provider, true),
            Err(AppError::BadRequest(_))
        ));
        assert!(UTILITY_TYPES.record(&no_provider, false).is_ok());
    }
}
