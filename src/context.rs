//! Shared application state handed to every axum handler: explicit
//! dependency injection in place of a global settings object.

use crate::config::Settings;
use crate::rpc_client::ValidatorClient;
use crate::store::Store;

#[derive(Clone)]
pub struct AppContext {
    pub store: Store,
    pub validator: ValidatorClient,
    pub settings: Settings,
}
