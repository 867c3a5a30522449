pub mod platform;
pub mod price;
pub mod rating;
pub mod record;
pub mod tag;

pub use record::{normalize, DropReason};
