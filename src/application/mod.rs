//! Application: a root context with conventions for controllers, servers
//! and components.
//!
//! # Example
//!
//! ```ignore
//! let app = Application::new(Config::load()?)?;
//! app.controller::<PingController>(None)?;
//! app.server::<RestServer>(Some("rest"))?;
//! app.component::<AuthComponent>(None)?;
//!
//! app.start().await?;
//! ```

pub mod keys;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::binding::{Binding, BindingScope};
use crate::config::Config;
use crate::context::Context;
use crate::di::{Injectable, Provider};
use crate::error::{Error, Result};
use crate::inject::short_type_name;
use crate::resolution::ValueOrFuture;

use keys::namespaced;

/// A long-running server managed by the application.
#[async_trait]
pub trait Server: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
}

/// A bundle of classes registered together.
pub trait Component: Send + Sync {
    /// Controllers bound as `controllers.<name>`.
    fn controllers(&self) -> Vec<Registration> {
        Vec::new()
    }

    /// Providers bound under their own keys.
    fn providers(&self) -> Vec<(String, Registration)> {
        Vec::new()
    }
}

/// A class or provider a component contributes.
#[derive(Clone, Copy)]
pub struct Registration {
    name: &'static str,
    apply: fn(&Binding) -> Result<Binding>,
}

impl Registration {
    /// Registers `T` as a class.
    pub fn class<T: Injectable>() -> Self {
        Self {
            name: short_type_name(std::any::type_name::<T>()),
            apply: |binding| binding.to_class::<T>(),
        }
    }

    /// Registers `P` as a provider.
    pub fn provider<P: Provider>() -> Self {
        Self {
            name: short_type_name(std::any::type_name::<P>()),
            apply: |binding| binding.to_provider::<P>(),
        }
    }

    /// Short type name, used as the default binding name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Configures `binding` with the registered class or provider.
    pub fn apply(&self, binding: &Binding) -> Result<Binding> {
        (self.apply)(binding)
    }
}

/// The root of an application's binding hierarchy.
#[derive(Clone)]
pub struct Application {
    context: Context,
}

impl Application {
    /// Creates the root context and binds the configuration into it.
    pub fn new(config: Config) -> Result<Self> {
        let context = match &config.application.name {
            Some(name) => Context::named(name.clone()),
            None => Context::new(),
        };

        // The instance resolves to the root context without keeping it alive.
        let root = context.downgrade();
        context
            .bind(keys::APPLICATION_INSTANCE)?
            .to_dynamic_value(move || match root.upgrade() {
                Some(ctx) => ValueOrFuture::ready(ctx),
                None => ValueOrFuture::err(Error::message(
                    keys::APPLICATION_INSTANCE,
                    "application context was dropped",
                )),
            })?
            .lock();

        let config_json = serde_json::to_value(&config)
            .map_err(|e| Error::external("serializing application config", e))?;
        context.bind(keys::APPLICATION_CONFIG)?.to(config_json)?;

        for (extension_point, extensions) in &config.extensions {
            for (extension, value) in extensions {
                let key = keys::extension_config(extension_point, extension);
                context.bind(key)?.to(value.clone())?;
            }
        }

        tracing::info!(context = %context.name(), "application created");
        Ok(Self { context })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Binds a controller class as `controllers.<name>`.
    ///
    /// `name` defaults to the type's short name.
    pub fn controller<T: Injectable>(&self, name: Option<&str>) -> Result<Binding> {
        let name = name.unwrap_or_else(|| short_type_name(std::any::type_name::<T>()));
        self.context
            .bind(namespaced(keys::CONTROLLERS, name))?
            .to_class::<T>()?
            .tag(keys::CONTROLLER_TAG)
    }

    /// Binds a server class as the singleton `servers.<name>`.
    pub fn server<S: Injectable + Server>(&self, name: Option<&str>) -> Result<Binding> {
        let name = name.unwrap_or_else(|| short_type_name(std::any::type_name::<S>()));
        self.context
            .bind(namespaced(keys::SERVERS, name))?
            .to_class_as::<S, Arc<dyn Server>>(|server| Arc::new(server) as Arc<dyn Server>)?
            .in_scope(BindingScope::Singleton)?
            .tag(keys::SERVER_TAG)
    }

    /// Resolves the server bound as `servers.<name>`.
    pub async fn get_server(&self, name: &str) -> Result<Arc<dyn Server>> {
        let key = namespaced(keys::SERVERS, name);
        let value = self.context.get(&key).await?;
        value
            .downcast_ref::<Arc<dyn Server>>()
            .cloned()
            .ok_or_else(|| Error::TypeMismatch {
                key,
                expected: std::any::type_name::<Arc<dyn Server>>(),
                found: value.type_name(),
            })
    }

    /// Binds a component as the singleton `components.<name>` and mounts
    /// the classes it contributes.
    pub fn component<C: Injectable + Component>(&self, name: Option<&str>) -> Result<Binding> {
        let name = name.unwrap_or_else(|| short_type_name(std::any::type_name::<C>()));
        let key = namespaced(keys::COMPONENTS, name);
        let binding = self
            .context
            .bind(key.clone())?
            .to_class::<C>()?
            .in_scope(BindingScope::Singleton)?
            .tag(keys::COMPONENT_TAG)?;

        let component: Arc<C> = self.context.get_sync_as(&key)?;
        self.mount(component.as_ref())?;
        Ok(binding)
    }

    /// Registers a component's controllers and providers.
    pub fn mount(&self, component: &dyn Component) -> Result<()> {
        for registration in component.controllers() {
            let binding = self
                .context
                .bind(namespaced(keys::CONTROLLERS, registration.name()))?;
            registration.apply(&binding)?.tag(keys::CONTROLLER_TAG)?;
        }
        for (key, registration) in component.providers() {
            let binding = self.context.bind(key)?;
            registration.apply(&binding)?;
        }
        Ok(())
    }

    /// Starts every bound server concurrently.
    pub async fn start(&self) -> Result<()> {
        let servers = self.servers().await?;
        try_join_all(servers.into_iter().map(|(key, server)| async move {
            tracing::info!(server = %key, "starting server");
            server
                .start()
                .await
                .map_err(|e| Error::from_anyhow(format!("starting server '{key}'"), e))
        }))
        .await?;
        Ok(())
    }

    /// Stops every bound server concurrently.
    pub async fn stop(&self) -> Result<()> {
        let servers = self.servers().await?;
        try_join_all(servers.into_iter().map(|(key, server)| async move {
            tracing::info!(server = %key, "stopping server");
            server
                .stop()
                .await
                .map_err(|e| Error::from_anyhow(format!("stopping server '{key}'"), e))
        }))
        .await?;
        Ok(())
    }

    async fn servers(&self) -> Result<Vec<(String, Arc<dyn Server>)>> {
        let bindings = self.context.find(format!("{}.*", keys::SERVERS));
        let mut servers = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let name = binding
                .key()
                .strip_prefix(&format!("{}.", keys::SERVERS))
                .unwrap_or(binding.key())
                .to_string();
            servers.push((binding.key().to_string(), self.get_server(&name).await?));
        }
        Ok(servers)
    }
}
