//! Authentication built on an extension point.
//!
//! Authenticators are extensions of the `authenticators` point. The strategy
//! to use for a request is bound as [`AUTHENTICATION_METADATA`]; the first
//! authenticator that supports it and returns a user wins.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::binding::Binding;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::extension_point::ExtensionPoint;
use crate::value::BoundValue;
use crate::Injectable;

/// Name of the authenticator extension point.
pub const AUTHENTICATORS: &str = "authenticators";

/// Key of the [`AuthenticationMetadata`] for the current request.
pub const AUTHENTICATION_METADATA: &str = "authentication.metadata";

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Which strategy to authenticate with, and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationMetadata {
    pub strategy: String,
    #[serde(default)]
    pub options: JsonValue,
}

/// An authentication strategy.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn is_supported(&self, strategy: &str) -> bool;

    /// Returns the user, or `None` if the request carries no valid identity.
    async fn authenticate(
        &self,
        request: &JsonValue,
        metadata: &AuthenticationMetadata,
    ) -> anyhow::Result<Option<UserProfile>>;
}

/// Registers an authenticator class as an extension.
pub fn register_authenticator<A>(ctx: &Context, name: &str) -> Result<Binding>
where
    A: crate::di::Injectable + Authenticator,
{
    ExtensionPoint::<dyn Authenticator>::new(AUTHENTICATORS, ctx)
        .bind_extension(name)?
        .to_class_as::<A, Arc<dyn Authenticator>>(|a| Arc::new(a) as Arc<dyn Authenticator>)
}

/// Runs the authenticators registered in the injected context.
#[derive(Injectable)]
pub struct AuthenticationExtensionPoint {
    #[inject("application.instance")]
    context: Context,
}

impl AuthenticationExtensionPoint {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn extension_point(&self) -> ExtensionPoint<dyn Authenticator> {
        ExtensionPoint::new(AUTHENTICATORS, &self.context)
    }

    /// Authenticates with the strategy bound at [`AUTHENTICATION_METADATA`].
    ///
    /// Returns `None` when no strategy is bound, no authenticator supports
    /// it, or none of them recognizes the request.
    pub async fn authenticate(&self, request: &JsonValue) -> Result<Option<UserProfile>> {
        let metadata: Option<Arc<AuthenticationMetadata>> = self
            .context
            .get_value_or_default(AUTHENTICATION_METADATA, BoundValue::undefined(), None)
            .into_future()
            .await?
            .extract(AUTHENTICATION_METADATA)?;
        let Some(metadata) = metadata else {
            tracing::debug!("no authentication metadata bound");
            return Ok(None);
        };

        for authenticator in self.extension_point().get_all_extensions().await? {
            if !authenticator.is_supported(&metadata.strategy) {
                continue;
            }
            let user = authenticator
                .authenticate(request, &metadata)
                .await
                .map_err(|e| {
                    Error::from_anyhow(format!("authenticating with '{}'", metadata.strategy), e)
                })?;
            if let Some(user) = user {
                tracing::debug!(strategy = %metadata.strategy, user = %user.id, "authenticated");
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}
