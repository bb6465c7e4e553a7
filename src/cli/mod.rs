// CLI module for dashgate
// Author: kelexine (https://github.com/kelexine)

use crate::config::AppConfig;
use clap::Parser;

/// dashgate - Session-gated, offline-capable gateway for the case dashboard
#[derive(Parser, Debug, Default)]
#[command(name = "dashgate", version, about, long_about = None)]
pub struct Args {
    /// Config file (default: ~/.dashgate/config.toml)
    #[arg(long, env = "DASHGATE_CONFIG")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Cache generation to install on start
    #[arg(long)]
    pub cache_name: Option<String>,

    /// Start without pre-caching static assets
    #[arg(long)]
    pub no_precache: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Args {
    /// Apply command line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(cache_name) = &self.cache_name {
            config.offline.cache_name = cache_name.clone();
        }
        if self.no_precache {
            config.offline.precache_on_start = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let args = Args::parse_from(["dashgate", "--port", "9000", "--cache-name", "v7", "--no-precache"]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.offline.cache_name, "v7");
        assert!(!config.offline.precache_on_start);
    }
}
