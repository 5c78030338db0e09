//! Authored chapter content: nodes, containers and their linkage.

pub mod container;
pub mod linkage;
pub mod node;
