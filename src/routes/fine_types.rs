use crate::{
    routes::lookups::{lookup_router, LookupTable},
    schemas::FineTypeInput,
    state::AppState,
};

pub const FINE_TYPES: LookupTable = LookupTable {
    table: "fine_types",
    collection_path: "/fine-types",
    item_path: "/fine-types/{fine_type_id}",
    label: "Fine type",
    identity: &["fine_type"],
    referenced_by: &[("fines", "fine_type_id")],
};

pub fn router() -> axum::Router<AppState> {
    lookup_router::<FineTypeInput>(&FINE_TYPES)
}

#[cfg(test)]
mod tests {
    use super::FINE_TYPES;
    use crate::schemas::FineTypeInput;

    #[test]
    fn duplicate_message_quotes_the_name() {
        let record = FINE_TYPES
            .record(
                &FineTypeInput {
                    fine_type: Some(" Late Rent".to_string()),
                },
                true,
            )
            .expect("valid record");
        assert_eq!(
            FINE_TYPES.duplicate_message(&record),
            "Fine type 'Late Rent' already exists."
        );
    }
}
