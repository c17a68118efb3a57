//! morph - a double-buffered GPU simulation engine for graph-structured node
//! meshes.
//!
//! Nodes live in a [`NodeStore`](nodes::NodeStore), are mirrored onto two
//! device-resident sides, advanced by a compute kernel over a chosen number
//! of iterations, and turned into point and line index buffers for an
//! external renderer. [`Engine`](engine::Engine) ties the pieces together.

pub mod config;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod nodes;
pub mod uniforms;
