pub mod modules;

pub use modules::{capture, error, protocol, schema, store, sync};
