//! CLI module for bindery.
//!
//! Subcommands:
//! - `bindings`: List the bindings of the configured application
//! - `extensions`: Show the configuration of an extension point
//! - `config`: Print the resolved configuration

mod bindings;
mod extensions;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use crate::application::Application;
use crate::config::Config;

/// bindery - binding/context dependency injection runtime
#[derive(Parser)]
#[command(name = "bindery")]
#[command(about = "Inspect the bindings of a configured bindery application")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this file instead of the layered defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List bindings, optionally filtered by key pattern or tag
    Bindings {
        /// Key pattern (`*` matches within one segment)
        #[arg(long)]
        pattern: Option<String>,

        /// Tag pattern
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show the configuration of an extension point and its extensions
    Extensions {
        /// Extension point name
        point: String,
    },

    /// Print the resolved configuration as JSON
    Config,
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Bindings {
                ref pattern,
                ref tag,
            } => self.run_bindings(pattern.as_deref(), tag.as_deref()),
            Command::Extensions { ref point } => self.run_extensions(point).await,
            Command::Config => self.run_config(),
        }
    }

    fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        Ok(config)
    }

    fn application(&self) -> Result<Application> {
        let config = self.load_config()?;
        tracing::info!(
            "Loaded configuration for application: {:?}",
            config.application.name
        );
        Ok(Application::new(config)?)
    }

    fn run_config(&self) -> Result<()> {
        let config = self.load_config()?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        Ok(())
    }
}
