pub mod entities;
pub mod enums;
pub mod hooks;
pub mod schema;
pub mod services;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use store::EntityStore;
