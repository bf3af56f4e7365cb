pub mod commerce;

// Collaborators outside this crate
pub mod gateway;

// Service factory for dependency injection
pub mod factory;
