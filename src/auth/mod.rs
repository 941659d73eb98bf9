//! Authentication actions — sign-up, sign-in, sign-out.
//!
//! Credential and session logic belongs to an external library behind the
//! [`CredentialBackend`] seam; this module orchestrates it: acquire the store
//! connection, delegate, translate the result. Callers only ever see an
//! [`ActionOutcome`] with a generic message — underlying causes are logged
//! for operators, never shown to end users.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, warn};

use crate::jobs::{Event, JobQueue, UserProfile};
use crate::store::{ConnectionCache, StoreHandle};

/// Password length bounds enforced before the store is touched.
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Sign-up form payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub country: String,
    pub investment_goals: String,
    pub risk_tolerance: String,
    pub preferred_industry: String,
}

/// Sign-in form payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Sign-out payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SignOutRequest {
    pub email: String,
}

/// What the client sees from every auth action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

impl ActionOutcome {
    fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_owned(),
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_owned(),
        }
    }
}

/// Errors surfaced by the credential backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("an account already exists for {0}")]
    DuplicateEmail(String),

    #[error("credential backend unavailable: {0}")]
    Unavailable(String),
}

/// The signed-in identity the backend reports.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub email: String,
    pub name: String,
}

/// Seam over the external credential/session library. Every operation is
/// parameterized by the store connection the cache handed out.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    async fn sign_up(
        &self,
        store: &StoreHandle,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<SessionUser, BackendError>;

    /// Returns `None` for wrong credentials; `Err` only for backend faults.
    async fn sign_in(
        &self,
        store: &StoreHandle,
        email: &str,
        password: &str,
    ) -> Result<Option<SessionUser>, BackendError>;

    async fn sign_out(&self, store: &StoreHandle, email: &str) -> Result<(), BackendError>;
}

/// Orchestrates auth actions over the connection cache and the backend seam.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<ConnectionCache>,
    backend: Arc<dyn CredentialBackend>,
    jobs: JobQueue,
}

impl AuthService {
    pub fn new(
        store: Arc<ConnectionCache>,
        backend: Arc<dyn CredentialBackend>,
        jobs: JobQueue,
    ) -> Self {
        Self {
            store,
            backend,
            jobs,
        }
    }

    /// Registers a new account and queues the welcome email.
    pub async fn sign_up_with_email(&self, request: SignUpRequest) -> ActionOutcome {
        let password_len = request.password.chars().count();
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password_len) {
            return ActionOutcome::failure(
                "Password must be between 8 and 128 characters.",
            );
        }

        let store = match self.store.acquire().await {
            Ok(store) => store,
            Err(err) => {
                error!(error = %err, "error signing up with email");
                return ActionOutcome::failure("Sign up failed. Please try again.");
            }
        };

        match self
            .backend
            .sign_up(&store, &request.email, &request.password, &request.full_name)
            .await
        {
            Ok(user) => {
                let profile = UserProfile {
                    email: user.email,
                    name: user.name,
                    country: request.country,
                    investment_goals: request.investment_goals,
                    risk_tolerance: request.risk_tolerance,
                    preferred_industry: request.preferred_industry,
                };
                if let Err(err) = self.jobs.publish(Event::UserCreated(profile)) {
                    warn!(error = %err, "welcome email not queued");
                }
                ActionOutcome::ok(
                    "Sign up successful! Please check your email to verify your account.",
                )
            }
            Err(err) => {
                error!(error = %err, "error signing up with email");
                ActionOutcome::failure("Sign up failed. Please try again.")
            }
        }
    }

    /// Verifies credentials against the backend.
    pub async fn sign_in_with_email(&self, request: SignInRequest) -> ActionOutcome {
        let store = match self.store.acquire().await {
            Ok(store) => store,
            Err(err) => {
                error!(error = %err, "error signing in with email");
                return ActionOutcome::failure("Sign in failed. Please try again.");
            }
        };

        match self
            .backend
            .sign_in(&store, &request.email, &request.password)
            .await
        {
            Ok(Some(_user)) => ActionOutcome::ok("Sign in successful!"),
            Ok(None) => ActionOutcome::failure("Invalid email or password."),
            Err(err) => {
                error!(error = %err, "error signing in with email");
                ActionOutcome::failure("Sign in failed. Please try again.")
            }
        }
    }

    /// Ends the user's session.
    pub async fn sign_out(&self, request: SignOutRequest) -> ActionOutcome {
        let store = match self.store.acquire().await {
            Ok(store) => store,
            Err(err) => {
                error!(error = %err, "error signing out");
                return ActionOutcome::failure("Sign out failed. Please try again.");
            }
        };

        match self.backend.sign_out(&store, &request.email).await {
            Ok(()) => ActionOutcome::ok("Signed out."),
            Err(err) => {
                error!(error = %err, "error signing out");
                ActionOutcome::failure("Sign out failed. Please try again.")
            }
        }
    }
}

/// Credential backend holding accounts in process memory. Stands in for the
/// external library in local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    users: Mutex<HashMap<String, StoredUser>>,
}

#[derive(Debug, Clone)]
struct StoredUser {
    name: String,
    password_digest: String,
}

fn digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[async_trait]
impl CredentialBackend for InMemoryBackend {
    async fn sign_up(
        &self,
        _store: &StoreHandle,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<SessionUser, BackendError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(email) {
            return Err(BackendError::DuplicateEmail(email.to_owned()));
        }
        users.insert(
            email.to_owned(),
            StoredUser {
                name: name.to_owned(),
                password_digest: digest(password),
            },
        );
        Ok(SessionUser {
            email: email.to_owned(),
            name: name.to_owned(),
        })
    }

    async fn sign_in(
        &self,
        _store: &StoreHandle,
        email: &str,
        password: &str,
    ) -> Result<Option<SessionUser>, BackendError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .get(email)
            .filter(|user| user.password_digest == digest(password))
            .map(|user| SessionUser {
                email: email.to_owned(),
                name: user.name.clone(),
            }))
    }

    async fn sign_out(&self, _store: &StoreHandle, _email: &str) -> Result<(), BackendError> {
        Ok(())
    }
}
