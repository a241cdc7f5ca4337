pub mod error;
pub mod utils;
pub mod warehouse;
