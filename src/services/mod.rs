//! Business logic services

pub mod access;
pub mod accounts;
pub mod ledger;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Store};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub access: access::AccessControl,
    pub accounts: accounts::AccountsService,
    pub ledger: ledger::LedgerService,
    pub store: Arc<dyn Store>,
}

impl Services {
    /// Create all services on top of the given store
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        let access = access::AccessControl::new(store.clone());
        Self {
            accounts: accounts::AccountsService::new(store.clone(), access.clone(), config.auth.clone()),
            ledger: ledger::LedgerService::new(
                store.clone(),
                access.clone(),
                config.lending.loan_period_days,
            ),
            access,
            store,
        }
    }
}
