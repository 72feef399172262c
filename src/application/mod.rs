//! Application services: the write coordinator and its collaborators.

pub mod auth;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod import;
pub mod render;
pub mod repos;
