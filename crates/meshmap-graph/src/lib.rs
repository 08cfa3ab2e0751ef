//! Routing topology engine for meshmap
//!
//! Turns a [`meshmap_common::ResourceSnapshot`] into an annotated graph of the
//! traffic its VirtualServices route: indexes, host resolution, the
//! VirtualService walk, diagnostics and assembly.

#![deny(missing_docs)]

pub mod accumulator;
pub mod assembler;
pub mod builder;
pub mod containers;
pub mod diagnostics;
pub mod egress;
pub mod error;
pub mod index;
pub mod model;
pub mod resolver;
pub mod route;
pub mod route_view;

pub use builder::{BuildOptions, GraphBuilder};
pub use error::GraphError;
pub use model::{
    Diagnostic, EdgeKind, GraphEdge, GraphNode, GraphResponse, NodeType, Severity, Summary,
};
pub use route_view::RoutesResponse;

/// Result type alias for graph builds
pub type Result<T> = std::result::Result<T, GraphError>;
