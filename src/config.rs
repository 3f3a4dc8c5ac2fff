//! Runtime configuration.
//!
//! Every knob is an environment variable with a CLI flag override; the
//! required ones abort startup when absent.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Network monitor reconciler for application containers.
#[derive(Parser, Debug, Clone)]
#[command(name = "network-capture", version, about)]
pub struct Config {
    /// Image reference for the monitor companion container
    #[arg(long, env = "MONITOR_IMAGE")]
    pub monitor_image: String,

    /// Registry graph partition used in every query
    #[arg(long, env = "APPLICATION_GRAPH")]
    pub application_graph: String,

    /// Query fragment constraining which containers are logged.
    /// Spliced verbatim into registry queries; operator-trusted, never
    /// derived from user input. Must constrain ?uri.
    #[arg(long, env = "CAPTURE_CONTAINER_FILTER")]
    pub container_filter: String,

    /// Engine network through which the log shipper is reachable
    #[arg(long, env = "LOGSTASH_NETWORK")]
    pub logstash_network: String,

    /// Milliseconds between reconciler passes
    #[arg(long, env = "CAPTURE_SYNC_INTERVAL", default_value = "10000")]
    pub sync_interval_ms: u64,

    /// Container engine socket
    #[arg(long, env = "CAPTURE_DOCKER_SOCKET", default_value = "/var/run/docker.sock")]
    pub docker_socket: String,

    /// SPARQL endpoint of the registry
    #[arg(
        long,
        env = "MU_SPARQL_ENDPOINT",
        default_value = "http://database:8890/sparql"
    )]
    pub sparql_endpoint: String,

    /// Log shipper address handed to each companion
    #[arg(long, env = "LOGSTASH_URL", default_value = "logstash:5044")]
    pub logstash_url: String,

    /// Bind address for the delta endpoint
    #[arg(long, env = "CAPTURE_LISTEN_ADDR", default_value = "0.0.0.0:80")]
    pub listen_addr: SocketAddr,

    /// Forwarded verbatim to the companion when set
    #[arg(long, env = "PACKETBEAT_MAX_MESSAGE_SIZE")]
    pub packetbeat_max_message_size: Option<String>,

    /// Forwarded verbatim to the companion when set
    #[arg(long, env = "PACKETBEAT_LISTEN_PORTS")]
    pub packetbeat_listen_ports: Option<String>,
}

impl Config {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "network-capture",
            "--monitor-image",
            "capture/monitor:latest",
            "--application-graph",
            "http://mu.semte.ch/application",
            "--container-filter",
            "?uri docker:label/docker:key \"capture\".",
            "--logstash-network",
            "logstash",
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(base_args()).unwrap();
        assert_eq!(config.sync_interval(), Duration::from_millis(10_000));
        assert_eq!(config.docker_socket, "/var/run/docker.sock");
        assert_eq!(config.logstash_url, "logstash:5044");
        assert!(config.packetbeat_listen_ports.is_none());
    }

    #[test]
    fn test_missing_required_is_fatal() {
        let result = Config::try_parse_from(["network-capture"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_interval_override() {
        let mut args = base_args();
        args.extend(["--sync-interval-ms", "250"]);
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(config.sync_interval(), Duration::from_millis(250));
    }
}
