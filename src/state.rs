use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::create_pool;
use crate::ledger::postgres::PgLedgerStore;
use crate::ledger::LedgerRecalculator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub ledger: Arc<LedgerRecalculator>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, sqlx::Error> {
        let db_pool = create_pool(&config)?;
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set; data endpoints will return 503");
        }

        let store = Arc::new(PgLedgerStore::new(db_pool.clone()));
        let ledger = LedgerRecalculator::new(store.clone(), store);

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            ledger: Arc::new(ledger),
        })
    }
}
