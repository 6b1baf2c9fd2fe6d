// Shared application state handed to handlers and job tasks.

use std::sync::Arc;

use crate::broker::TesterRpc;
use crate::clients::{AuthClient, GamesClient, NotifyClient};
use crate::config::Config;
use crate::hub::Hub;
use crate::store::Store;

/// Every collaborator behind an interface, plumbed explicitly instead of
/// living in globals, so tests can swap any of them out.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tester: Arc<dyn TesterRpc>,
    pub auth: Arc<dyn AuthClient>,
    pub games: Arc<dyn GamesClient>,
    pub notify: Arc<dyn NotifyClient>,
    pub hub: Hub,
    pub config: Arc<Config>,
}
