//! Embedded static HTML served by the viewer endpoint.
//!
//! The assets are kept as `&'static str` so they can be bundled directly inside
//! the binary without filesystem lookups.

pub mod viewer;
