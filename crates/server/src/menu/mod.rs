//! Menu definitions and the static catalog they live in.

mod catalog;
mod error;

pub use catalog::{MenuCatalog, MenuGroup, MenuItem, SidebarGroup};
pub use error::CatalogError;
