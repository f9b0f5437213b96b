//! HTTP route handlers.

pub mod loans;
pub mod resources;
pub mod system;
