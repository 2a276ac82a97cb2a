// Main library entry point for tracegen.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;
pub mod rewrite;
