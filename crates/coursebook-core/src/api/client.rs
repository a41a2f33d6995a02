//! API client for the course-learning REST API.
//!
//! Catalogue browsing (featured, categories, search) is public; everything
//! tied to the user goes through the session manager so the bearer token is
//! attached and renewed as needed.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info};

use super::ApiError;
use crate::auth::{SessionManager, TokenPair};
use crate::models::{
    Category, Content, Course, EnrollmentResult, LoginRequest, Module, PasswordChange,
    ProfileUpdate, ProgressUpdate, Registration, UserProfile,
};

/// Client for the course backend.
/// Clone is cheap - the session manager is shared, not copied.
#[derive(Clone)]
pub struct CourseClient {
    session: SessionManager,
}

impl CourseClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        self.session.config().endpoint(path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    /// Send a request that needs no token and parse the JSON body.
    async fn public<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> Result<T, ApiError> {
        debug!(url, "Public request");
        let result: Result<T, ApiError> = async {
            let response = request.send().await?;
            let response = Self::check_response(response).await?;
            Self::parse_json(response, url).await
        }
        .await;
        if let Err(ref e) = result {
            error!(url, error = %e, "Request failed");
        }
        result
    }

    /// Send a request with the session token and return the checked response.
    async fn authenticated(&self, request: RequestBuilder, url: &str) -> Result<Response, ApiError> {
        debug!(url, "Authenticated request");
        let result: Result<Response, ApiError> = async {
            let response = self.session.authenticated_request(request).await?;
            Self::check_response(response).await
        }
        .await;
        if let Err(ref e) = result {
            error!(url, error = %e, "Request failed");
        }
        result
    }

    async fn authenticated_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .authenticated(self.session.client().get(&url), &url)
            .await?;
        Self::parse_json(response, &url).await
    }

    async fn authenticated_send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut request = self.session.client().request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.authenticated(request, &url).await?;
        Self::parse_json(response, &url).await
    }

    // ===== Account =====

    /// Exchange email and password for a token pair and start the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let url = self.url("/token/");
        let response = self
            .session
            .client()
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        if matches!(response.status(), StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            info!("Login rejected");
            return Err(ApiError::Validation("Invalid credentials".to_string()));
        }
        let response = Self::check_response(response).await?;
        let tokens: TokenPair = Self::parse_json(response, &url).await?;

        self.session.set_credentials(tokens.access, tokens.refresh);
        info!("Login successful");
        Ok(())
    }

    /// Create an account. The password confirmation is checked locally
    /// before anything is sent.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError> {
        if password != confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }

        let url = self.url("/users/register/");
        let response = self
            .session
            .client()
            .post(&url)
            .json(&Registration { name, email, password })
            .send()
            .await?;

        if response.status().is_success() {
            info!("Registration successful");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(%status, "Registration failed");
        Err(match ApiError::from_status(status, &body) {
            ApiError::Validation(message) if !message.is_empty() => ApiError::Validation(message),
            ApiError::Validation(_) => ApiError::Validation("Registration failed".to_string()),
            other => other,
        })
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    // ===== Catalogue (public) =====

    pub async fn featured_courses(&self) -> Result<Vec<Course>, ApiError> {
        let url = self.url("/courses/featured/");
        self.public(self.session.client().get(&url), &url).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        let url = self.url("/courses/categories/");
        self.public(self.session.client().get(&url), &url).await
    }

    /// Search by free text plus optional filters such as `level` or
    /// `category`, sent as extra query parameters.
    pub async fn search_courses(
        &self,
        query: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<Course>, ApiError> {
        let url = self.url("/courses/search/");
        let mut params: Vec<(&str, &str)> = vec![("q", query)];
        params.extend(filters.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let request = self.session.client().get(&url).query(&params);
        self.public(request, &url).await
    }

    // ===== Courses =====

    pub async fn course(&self, course_id: i64) -> Result<Course, ApiError> {
        self.authenticated_get(&format!("/courses/{}/", course_id)).await
    }

    pub async fn course_modules(&self, course_id: i64) -> Result<Vec<Module>, ApiError> {
        let mut modules: Vec<Module> = self
            .authenticated_get(&format!("/courses/{}/modules/", course_id))
            .await?;
        modules.sort_by_key(|m| m.order);
        Ok(modules)
    }

    pub async fn module_content(&self, module_id: i64) -> Result<Vec<Content>, ApiError> {
        let mut content: Vec<Content> = self
            .authenticated_get(&format!("/modules/{}/content/", module_id))
            .await?;
        content.sort_by_key(|c| c.order);
        Ok(content)
    }

    pub async fn enroll(&self, course_id: i64) -> Result<EnrollmentResult, ApiError> {
        let url = self.url(&format!("/courses/{}/enroll/", course_id));
        let response = self
            .authenticated(self.session.client().post(&url), &url)
            .await?;

        // Some backends answer 201 with an empty body
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(EnrollmentResult {
                success: true,
                message: None,
            });
        }
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    pub async fn enrolled_courses(&self) -> Result<Vec<Course>, ApiError> {
        self.authenticated_get("/courses/enrolled/").await
    }

    /// Record progress (0-100) on a content item. The backend's response
    /// body is returned as is.
    pub async fn update_progress(
        &self,
        content_id: i64,
        progress: u8,
    ) -> Result<serde_json::Value, ApiError> {
        let body = ProgressUpdate::new(content_id, progress);
        self.authenticated_send(reqwest::Method::POST, "/progress/update/", Some(&body))
            .await
    }

    // ===== Profile =====

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.authenticated_get("/users/profile/").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        if update.is_empty() {
            return Err(ApiError::Validation("Nothing to update".to_string()));
        }
        self.authenticated_send(reqwest::Method::PUT, "/users/profile/", Some(update))
            .await
    }

    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), ApiError> {
        let url = self.url("/users/change-password/");
        let request = self.session.client().post(&url).json(&PasswordChange {
            current_password,
            new_password,
        });
        self.authenticated(request, &url).await?;
        info!("Password changed");
        Ok(())
    }
}
