//! Core library for coursebook.
//!
//! Provides the session manager that owns the JWT access/refresh pair, the
//! REST client for the course-learning backend, domain models and the
//! configuration shared by front ends.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiError, CourseClient};
pub use auth::{SessionManager, SessionState};
pub use config::Config;
