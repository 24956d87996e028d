pub mod capture;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod store;
pub mod sync;
