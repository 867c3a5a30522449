pub mod epic;
pub mod gog;
pub mod loader;
pub mod notify;
pub mod pagination;
pub mod report;
pub mod steam;
pub mod storefront;

pub use crate::util::db;
