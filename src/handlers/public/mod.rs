// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition and service status. Mounted without the auth gate.

pub mod service;
pub mod session;

pub use service::ServiceState;
pub use session::SessionState;
