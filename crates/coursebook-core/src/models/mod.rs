//! Data models for the course-learning backend.
//!
//! - `Course`, `Category`, `Module`, `Content`: the catalogue
//! - `EnrollmentResult`, `ProgressUpdate`: learning progress
//! - `UserProfile`, `ProfileUpdate` and the request bodies for login,
//!   registration and password change

pub mod course;
pub mod user;

pub use course::{
    Category, CategoryRef, Content, ContentType, Course, CourseLevel, EnrollmentResult, Instructor,
    Module, ProgressUpdate,
};
pub use user::{LoginRequest, PasswordChange, ProfileUpdate, Registration, UserProfile};
