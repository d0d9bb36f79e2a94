//! Render Graph System
//!
//! Passes declare which targets they read and write; the graph orders them
//! into a strict sequence once, and the executor replays that sequence every
//! frame against the views bound to each resource.

pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
