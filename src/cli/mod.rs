pub mod commands;

use clap::{Args, Parser, Subcommand};

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(name = "wpsync")]
#[command(about = "Fetch WordPress posts page by page", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the `[server]` section of the config file
#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Endpoint returning one page of posts as XML
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    /// Category filter
    #[arg(short, long, global = true)]
    pub category: Option<String>,

    /// Basic auth username
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(short, long, global = true)]
    pub password: Option<String>,
}

impl ServerArgs {
    pub fn apply(&self, server: &mut ServerConfig) {
        if let Some(path) = &self.server {
            server.path = path.clone();
        }
        if let Some(category) = &self.category {
            server.category_id = category.clone();
        }
        if let Some(username) = &self.username {
            server.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            server.password = Some(password.clone());
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every page until the server runs out of posts
    Sync {
        /// Print posts as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Fetch a single page and print its decoded XML as JSON
    Page {
        /// 1-based page number
        #[arg(default_value_t = crate::sync::FIRST_PAGE)]
        number: u32,
    },
    /// Print the config file location
    Config,
}
