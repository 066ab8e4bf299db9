//! Extension trait for Depot to reach the admin session

use salvo_core::Depot;

use crate::handler::SESSION_KEY;
use crate::session::AdminSession;

/// Extension trait for Salvo's Depot to provide easy session access
pub trait AdminDepotExt {
    /// Get the admin session placed by the middleware
    fn admin_session(&self) -> Option<&AdminSession>;
}

impl AdminDepotExt for Depot {
    fn admin_session(&self) -> Option<&AdminSession> {
        self.get::<AdminSession>(SESSION_KEY).ok()
    }
}
