//! Integration tests for the application: servers, components, configuration
//! and authentication.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bindery::application::keys;
use bindery::authentication::{
    register_authenticator, AuthenticationExtensionPoint, AuthenticationMetadata, Authenticator,
    UserProfile, AUTHENTICATION_METADATA,
};
use bindery::config::{ApplicationConfig, Config};
use bindery::{
    Application, BindingScope, BoundValue, Component, Context, Injectable, Provider,
    Registration, Server, ValueOrFuture,
};
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};

type Events = Arc<Mutex<Vec<String>>>;

fn config(name: &str) -> Config {
    Config {
        application: ApplicationConfig {
            name: Some(name.to_string()),
        },
        ..Config::default()
    }
}

// ============================================================================
// Servers
// ============================================================================

#[derive(Injectable)]
struct RecordingServer {
    #[inject("events")]
    events: Events,
    #[inject("config.port")]
    port: u16,
}

#[async_trait]
impl Server for RecordingServer {
    async fn start(&self) -> anyhow::Result<()> {
        self.events.lock().push(format!("start:{}", self.port));
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.events.lock().push(format!("stop:{}", self.port));
        Ok(())
    }
}

#[derive(Injectable)]
struct FailingServer;

#[async_trait]
impl Server for FailingServer {
    async fn start(&self) -> anyhow::Result<()> {
        anyhow::bail!("port already in use")
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_start_and_stop_servers() {
    let app = Application::new(config("shop")).unwrap();
    let events: Events = Arc::default();
    app.context()
        .bind("events")
        .unwrap()
        .to_bound_value(BoundValue::from_arc(events.clone()))
        .unwrap();
    app.context().bind("config.port").unwrap().to(8080u16).unwrap();

    let binding = app.server::<RecordingServer>(Some("rest")).unwrap();
    assert_eq!(binding.key(), "servers.rest");
    assert_eq!(binding.scope(), BindingScope::Singleton);
    assert!(binding.has_tag(keys::SERVER_TAG));

    app.start().await.unwrap();
    app.stop().await.unwrap();
    assert_eq!(*events.lock(), vec!["start:8080", "stop:8080"]);

    // Singleton: the same instance every time
    let a = app.get_server("rest").await.unwrap();
    let b = app.get_server("rest").await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn test_server_failure_is_reported() {
    let app = Application::new(Config::default()).unwrap();
    app.server::<FailingServer>(None).unwrap();
    let err = app.start().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("servers.FailingServer"), "{message}");
}

// ============================================================================
// Components
// ============================================================================

#[derive(Injectable)]
struct ClockProvider;

impl Provider for ClockProvider {
    type Value = u64;

    fn value(&self) -> ValueOrFuture<u64> {
        ValueOrFuture::ready(42)
    }
}

#[derive(Injectable)]
struct TimeController {
    #[inject("clock.now")]
    now: u64,
}

#[derive(Injectable)]
struct ClockComponent;

impl Component for ClockComponent {
    fn controllers(&self) -> Vec<Registration> {
        vec![Registration::class::<TimeController>()]
    }

    fn providers(&self) -> Vec<(String, Registration)> {
        vec![("clock.now".to_string(), Registration::provider::<ClockProvider>())]
    }
}

#[test]
fn test_component_mounts_controllers_and_providers() {
    let app = Application::new(Config::default()).unwrap();
    let binding = app.component::<ClockComponent>(None).unwrap();
    assert_eq!(binding.key(), "components.ClockComponent");

    let ctx = app.context();
    assert!(ctx.contains("controllers.TimeController"));
    assert_eq!(
        ctx.find_by_tag(keys::CONTROLLER_TAG)
            .iter()
            .map(|b| b.key().to_string())
            .collect::<Vec<_>>(),
        vec!["controllers.TimeController"]
    );
    let controller: Arc<TimeController> = ctx.get_sync_as("controllers.TimeController").unwrap();
    assert_eq!(controller.now, 42);
}

#[test]
fn test_controller_default_name() {
    let app = Application::new(Config::default()).unwrap();
    app.context().bind("clock.now").unwrap().to(7u64).unwrap();
    let binding = app.controller::<TimeController>(None).unwrap();
    assert_eq!(binding.key(), "controllers.TimeController");
    let named = app.controller::<TimeController>(Some("time")).unwrap();
    assert_eq!(named.key(), "controllers.time");
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_configuration_is_bound() {
    let mut config = config("inventory");
    config.extensions.insert(
        "greeters".to_string(),
        BTreeMap::from([
            ("en".to_string(), json!({"word": "Hi"})),
            ("config".to_string(), json!({"default": "en"})),
        ]),
    );
    let app = Application::new(config).unwrap();
    let ctx = app.context();

    assert_eq!(ctx.name(), "inventory");
    let name: String = ctx.get_as("application.config#application.name").await.unwrap();
    assert_eq!(name, "inventory");
    let word: String = ctx.get_as("greeters.en.config#word").await.unwrap();
    assert_eq!(word, "Hi");
    let default: String = ctx.get_as("greeters.config#default").await.unwrap();
    assert_eq!(default, "en");
}

#[test]
fn test_application_instance_is_the_root_context() {
    let app = Application::new(Config::default()).unwrap();
    let instance: Context = app.context().get_sync_as(keys::APPLICATION_INSTANCE).unwrap();
    assert!(instance.same_as(app.context()));
    assert!(app.context().get_binding(keys::APPLICATION_INSTANCE).unwrap().is_locked());
}

// ============================================================================
// Authentication
// ============================================================================

#[derive(Injectable)]
struct HeaderAuthenticator {
    #[inject("config#header")]
    header: Option<String>,
}

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    fn is_supported(&self, strategy: &str) -> bool {
        strategy == "header"
    }

    async fn authenticate(
        &self,
        request: &JsonValue,
        _metadata: &AuthenticationMetadata,
    ) -> anyhow::Result<Option<UserProfile>> {
        let header = self.header.as_deref().unwrap_or("x-user");
        Ok(request[header].as_str().map(|id| UserProfile {
            id: id.to_string(),
            name: None,
            email: None,
        }))
    }
}

#[derive(Injectable)]
struct FallbackAuthenticator;

#[async_trait]
impl Authenticator for FallbackAuthenticator {
    fn is_supported(&self, strategy: &str) -> bool {
        strategy == "header"
    }

    async fn authenticate(
        &self,
        _request: &JsonValue,
        _metadata: &AuthenticationMetadata,
    ) -> anyhow::Result<Option<UserProfile>> {
        Ok(Some(UserProfile {
            id: "anonymous".into(),
            name: None,
            email: None,
        }))
    }
}

#[tokio::test]
async fn test_authentication_through_application() {
    let mut config = Config::default();
    config.extensions.insert(
        "authenticators".to_string(),
        BTreeMap::from([("header".to_string(), json!({"header": "x-api-user"}))]),
    );
    let app = Application::new(config).unwrap();
    let ctx = app.context();
    register_authenticator::<HeaderAuthenticator>(ctx, "header").unwrap();
    register_authenticator::<FallbackAuthenticator>(ctx, "fallback").unwrap();
    ctx.bind(AUTHENTICATION_METADATA)
        .unwrap()
        .to(AuthenticationMetadata {
            strategy: "header".into(),
            options: JsonValue::Null,
        })
        .unwrap();
    ctx.bind("auth").unwrap().to_class::<AuthenticationExtensionPoint>().unwrap();

    let auth: Arc<AuthenticationExtensionPoint> = ctx.get_as("auth").await.unwrap();
    let user = auth
        .authenticate(&json!({"x-api-user": "carol"}))
        .await
        .unwrap();
    assert_eq!(user.map(|u| u.id).as_deref(), Some("carol"));

    // The first authenticator declines, so the next supporting one answers
    let user = auth.authenticate(&json!({})).await.unwrap();
    assert_eq!(user.map(|u| u.id).as_deref(), Some("anonymous"));
}
