//! Bindings command handler.

use color_eyre::Result;
use serde_json::Value as JsonValue;

use super::App;

impl App {
    /// List the application's bindings as a JSON array.
    pub fn run_bindings(&self, pattern: Option<&str>, tag: Option<&str>) -> Result<()> {
        let app = self.application()?;
        let ctx = app.context();

        let bindings = match (pattern, tag) {
            (Some(pattern), _) => ctx.find(pattern),
            (None, Some(tag)) => ctx.find_by_tag(tag),
            (None, None) => ctx.bindings(),
        };
        // Both filters: key pattern first, then tag
        let bindings: Vec<JsonValue> = bindings
            .into_iter()
            .filter(|b| match (pattern, tag) {
                (Some(_), Some(tag)) => b.has_tag_matching(&tag.into()),
                _ => true,
            })
            .map(|b| b.to_json())
            .collect();

        tracing::debug!("Found {} bindings", bindings.len());
        println!("{}", serde_json::to_string_pretty(&bindings)?);
        Ok(())
    }
}
