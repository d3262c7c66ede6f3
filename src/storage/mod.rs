pub mod export;
pub mod store;

pub use store::{Keyed, RecordStore};
