//! Authorization of API callers.
//!
//! The monitoring façade never decides authorization itself; it asks a
//! [`Verifier`] whether a caller satisfies a [`Tier`].
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ResultOkLogExt;
use crate::workload::WorkloadSpecRegistry;

/// Privilege level an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Node administrators and the platform team.
    AdminOrTeam,
    /// The owner of the addressed workload, or anyone above.
    OwnerOrAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Team,
    Admin,
}

/// A configured API credential.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiToken {
    pub token: String,
    pub principal: String,
    pub role: Role,
}

/// Credentials presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    token: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Extracts the caller from an `Authorization: Bearer <token>` header
    /// value. Anything else yields an anonymous caller.
    pub fn from_authorization(header: Option<&str>) -> Self {
        header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map_or_else(Self::anonymous, Self::with_token)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Whether `caller` satisfies `tier`, for `workload` where the tier
    /// depends on one.
    async fn verify(&self, tier: Tier, caller: &Caller, workload: Option<&str>) -> bool;
}

/// Verifies callers against a static table of bearer tokens.
///
/// Ownership is taken from the `owner` recorded in the workload's spec.
pub struct TokenVerifier {
    tokens: HashMap<String, ApiToken>,
    specs: Arc<dyn WorkloadSpecRegistry>,
}

impl TokenVerifier {
    pub fn new(tokens: impl IntoIterator<Item = ApiToken>, specs: Arc<dyn WorkloadSpecRegistry>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|token| (token.token.clone(), token))
                .collect(),
            specs,
        }
    }

    async fn owns(&self, principal: &str, workload: &str) -> bool {
        self.specs
            .get_spec(workload)
            .await
            .ok_log(format_args!("ownership of `{workload}` unknown"))
            .flatten()
            .and_then(|spec| spec.owner)
            .is_some_and(|owner| owner == principal)
    }
}

#[async_trait]
impl Verifier for TokenVerifier {
    async fn verify(&self, tier: Tier, caller: &Caller, workload: Option<&str>) -> bool {
        let Some(token) = caller.token().and_then(|token| self.tokens.get(token)) else {
            return false;
        };
        if token.role >= Role::Team {
            return true;
        }
        match (tier, workload) {
            (Tier::OwnerOrAbove, Some(workload)) => self.owns(&token.principal, workload).await,
            _ => false,
        }
    }
}
