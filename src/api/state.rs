use crate::ledger::{LedgerUpdater, PaymentStore};
use crate::payments::callback::CallbackAuthenticator;
use crate::payments::traits::PaymentProvider;
use std::sync::Arc;

/// Shared handler state, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub environment: String,
    pub authenticator: Arc<CallbackAuthenticator>,
    pub ledger: Arc<LedgerUpdater>,
    pub provider: Arc<dyn PaymentProvider>,
}

impl AppState {
    pub fn new(
        environment: impl Into<String>,
        authenticator: CallbackAuthenticator,
        ledger: LedgerUpdater,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            environment: environment.into(),
            authenticator: Arc::new(authenticator),
            ledger: Arc::new(ledger),
            provider,
        }
    }

    /// Store behind the ledger; also used for order records and health
    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        self.ledger.store()
    }
}
