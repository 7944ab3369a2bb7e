//! Extensions command handler.

use std::any::Any;

use color_eyre::Result;
use serde_json::{Map, Value as JsonValue};

use crate::extension_point::{configuration_json, ExtensionPoint};

use super::App;

impl App {
    /// Print the configuration of an extension point and of each configured
    /// extension.
    pub async fn run_extensions(&self, point: &str) -> Result<()> {
        let app = self.application()?;
        let ctx = app.context();
        let extension_point = ExtensionPoint::<dyn Any + Send + Sync>::new(point, ctx);

        let mut extensions = Map::new();
        let prefix = format!("{point}.");
        for binding in ctx.find(format!("{point}.*.config")) {
            let Some(name) = binding
                .key()
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".config"))
            else {
                continue;
            };
            let config = extension_point.extension_configuration(name).await?;
            extensions.insert(name.to_string(), configuration_json(&config));
        }
        for (key, binding) in extension_point.extension_binding_map() {
            let Some(name) = ExtensionPoint::<dyn Any + Send + Sync>::extension_name(&binding)
            else {
                continue;
            };
            extensions
                .entry(name)
                .or_insert_with(|| JsonValue::Object(Map::new()));
            tracing::debug!("Registered extension: {}", key);
        }

        let output = serde_json::json!({
            "extensionPoint": point,
            "config": configuration_json(&extension_point.configuration().await?),
            "extensions": extensions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
