use crate::{
    routes::lookups::{lookup_router, LookupTable},
    schemas::InspectionTypeInput,
    state::AppState,
};

pub const INSPECTION_TYPES: LookupTable = LookupTable {
    table: "inspection_types",
    collection_path: "/inspection-types",
    item_path: "/inspection-types/{inspection_type_id}",
    label: "Inspection type",
    identity: &["inspection_type"],
    referenced_by: &[("inspections", "inspection_type_id")],
};

pub fn router() -> axum::Router<AppState> {
    lookup_router::<InspectionTypeInput>(&INSPECTION_TYPES)
}

#[cfg(test)]
mod tests {
    use super::INSPECTION_TYPES;
    use crate::error::AppError;
    use crate::schemas::InspectionTypeInput;

    #[test]
    fn name_is_bounded() {
        let long = InspectionTypeInput {
            inspection_type: Some("x".repeat(101)),
        };
        assert!(matches!(
            INSPECTION_TYPES.record(&long, true),
            Err(AppError::UnprocessableEntity(_))
        ));
        let fire = InspectionTypeInput {
            inspection_type: Some("Fire safety".to_string()),
        };
        assert!(INSPECTION_TYPES.record(&fire, true).is_ok());
    }
}
