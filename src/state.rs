use std::sync::Arc;

use crate::identity::IdentityProvider;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn Store>) -> Self {
        Self { identity, store }
    }
}
