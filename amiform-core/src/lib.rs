//! amiform Core
//!
//! Core library for a small infrastructure tool that manages machine images.
//! Side effects are planned as values first and applied through a Provider.

pub mod differ;
pub mod effect;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
