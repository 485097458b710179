//! HTTP middleware components.

pub mod menu_gate;
pub mod metrics;

pub use menu_gate::enforce_menu_access;
pub use metrics::track_requests;
