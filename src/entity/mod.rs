//! Database entities.

pub mod post;
pub mod session;
