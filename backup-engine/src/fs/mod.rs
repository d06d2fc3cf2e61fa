//! File system helpers: project root discovery, tree walking and artifact naming.

pub mod naming;
pub mod root;
pub mod walker;

pub use root::ProjectRootLocator;
