use crate::{
    routes::lookups::{lookup_router, LookupTable},
    schemas::PaymentCategoryInput,
    state::AppState,
};

pub const PAYMENT_CATEGORIES: LookupTable = LookupTable {
    table: "payment_categories",
    collection_path: "/payment-categories",
    item_path: "/payment-categories/{payment_category_id}",
    label: "Payment category",
    identity: &["payment_category"],
    referenced_by: &[
        ("lease_payments", "payment_category_id"),
        ("expenses", "payment_category_id"),
        ("fines", "payment_category_id"),
        ("utilities", "payment_category_id"),
    ],
};

pub fn router() -> axum::Router<AppState> {
    lookup_router::<PaymentCategoryInput>(&PAYMENT_CATEGORIES)
}
