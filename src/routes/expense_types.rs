use crate::{
    routes::lookups::{lookup_router, LookupTable},
    schemas::ExpenseTypeInput,
    state::AppState,
};

pub const EXPENSE_TYPES: LookupTable = LookupTable {
    table: "expense_types",
    collection_path: "/expense-types",
    item_path: "/expense-types/{expense_type_id}",
    label: "Expense type",
    identity: &["expense_type"],
    referenced_by: &[("expenses", "expense_type_id")],
};

pub fn router() -> axum::Router<AppState> {
    lookup_router::<ExpenseTypeInput>(&EXPENSE_TYPES)
}

#[cfg(test)]
mod tests {
    use super::EXPENSE_TYPES;
    use crate::error::AppError;
    use crate::schemas::ExpenseTypeInput;

    #[test]
    fn expense_type_needs_two_chars() {
        let short = ExpenseTypeInput {
            expense_type: Some("R".to_string()),
            description: None,
        };
        assert!(matches!(
            EXPENSE_TYPES.record(&short, true),
            Err(AppError::UnprocessableEntity(_))
        ));

        let repairs = ExpenseTypeInput {
            expense_type: Some("Repairs".to_string()),
            description: Some("Plumbing and roofing".to_string()),
        };
        assert_eq!(EXPENSE_TYPES.record(&repairs, true).expect("valid").len(), 2);
    }
}
