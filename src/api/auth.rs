//! Session establishment

use super::{ApiClient, ApiError};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, Role};

impl ApiClient {
    /// Log in and install the returned token on this client
    #[tracing::instrument(name = "api.login", skip(self, password), err)]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self.post_json("/auth/login", &body).await?;
        self.set_token(Some(response.token.clone()));

        tracing::info!(role = ?response.user.role, "Logged in");
        Ok(response)
    }

    /// Create an account and install the returned token on this client
    #[tracing::instrument(name = "api.register", skip(self, password), err)]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<AuthResponse, ApiError> {
        let body = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role,
        };
        let response: AuthResponse = self.post_json("/auth/register", &body).await?;
        self.set_token(Some(response.token.clone()));
        Ok(response)
    }
}
