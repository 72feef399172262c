//! Lectern: a blog server that answers reads from pre-rendered pages held in
//! memory and applies every write through a single update coordinator.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
