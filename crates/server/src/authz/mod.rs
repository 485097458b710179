//! Authorization over the menu catalog.

mod gate;

pub use gate::{ACCESS_DENIED_MESSAGE, Decision, MenuGate, Role, Subject};
