//! REST API client module for the course-learning backend.
//!
//! This module provides the `CourseClient` for browsing the catalogue,
//! enrolling, tracking progress and managing the user profile.
//!
//! Authenticated calls go through the `SessionManager`, which attaches the
//! bearer token and renews it on a 401.

pub mod client;
pub mod error;

pub use client::CourseClient;
pub use error::ApiError;
