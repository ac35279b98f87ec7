//! HTTP surface (§6): `/health`, `/ready`, `/status`, `/metrics` per service.

pub mod surface;

pub use surface::{build_router, DependencyStatus, HttpSurfaceState};
