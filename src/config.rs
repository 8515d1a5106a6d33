//! Node configuration: a typed mirror of `default_node_config.py`, loadable
//! from TOML and overridable from the command line.

use serde::Deserialize;
use structopt::StructOpt;
use structopt_toml::StructOptToml;

use crate::wire::Addr;

pub const CONFIG_FILE: &str = "kma_coin_config.toml";
pub const CONFIG_FILE_CONTENTS: &str = include_str!("../kma_coin_config.toml");

fn default_tx_id_pool_size() -> usize {
    20
}
fn default_block_id_pool_size() -> usize {
    5
}
fn default_address_pool_size() -> usize {
    10
}
fn default_token_pool_size() -> usize {
    10
}
fn default_miner_module() -> String {
    "lazy".to_string()
}
fn default_hash_rate() -> u64 {
    10
}
fn default_min_peers() -> usize {
    2
}
fn default_max_peers() -> usize {
    10
}
fn default_connection_timeout() -> u64 {
    10
}
fn default_peer_timeout() -> u64 {
    300
}
fn default_verbose() -> bool {
    true
}
fn default_hex_string_length() -> usize {
    15
}

/// CLI + TOML configuration for a node, mirroring `default_node_config.py`
/// field-for-field.
#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(name = "kma-coin-node")]
pub struct Args {
    /// Sets a custom config file
    #[structopt(long)]
    pub config: Option<String>,

    /// Directory where this node keeps its block store and private key
    #[structopt(long)]
    pub data_dir: Option<String>,

    /// Address this node listens for incoming peer connections on
    #[structopt(long)]
    pub listening_address: Option<String>,

    /// This node's address as seen from the outside, advertised to peers
    #[structopt(long)]
    pub public_address: Option<String>,

    /// Peer addresses to try connecting to on startup ("host:port")
    #[structopt(long)]
    pub initial_peer_addresses: Vec<String>,

    #[structopt(long, default_value = "20")]
    pub transaction_id_pool_size: usize,

    #[structopt(long, default_value = "5")]
    pub block_id_pool_size: usize,

    #[structopt(long, default_value = "10")]
    pub address_pool_size: usize,

    #[structopt(long, default_value = "10")]
    pub token_pool_size: usize,

    /// Which registered miner implementation to run
    #[structopt(long, default_value = "lazy")]
    pub miner_module: String,

    /// Expected hashes performed per second, used by the miner to self-pace
    #[structopt(long, default_value = "10")]
    pub hash_rate: u64,

    #[structopt(long, default_value = "2")]
    pub min_peers: usize,

    #[structopt(long, default_value = "10")]
    pub max_peers: usize,

    /// Timeout for connection establishment, in seconds
    #[structopt(long, default_value = "10")]
    pub connection_timeout: u64,

    /// Timeout for peer link inactivity, in seconds
    #[structopt(long, default_value = "300")]
    pub peer_timeout: u64,

    /// Hex-encoded private key owning this node's mining rewards; generated
    /// and persisted to `data_dir` on first run if absent
    #[structopt(long)]
    pub owner_account: Option<String>,

    /// Maximum hex string length used in human-readable log output
    #[structopt(long, default_value = "15")]
    pub hex_string_length: usize,

    /// Increase verbosity
    #[structopt(short, parse(from_occurrences))]
    pub verbose: u8,
}

/// The resolved, runtime-ready configuration for a [`crate::node::Node`].
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub initial_peer_addresses: Vec<Addr>,
    pub listening_address: Option<Addr>,
    pub public_address: Option<Addr>,

    pub transaction_id_pool_size: usize,
    pub block_id_pool_size: usize,
    pub address_pool_size: usize,
    pub token_pool_size: usize,

    pub miner_module: String,
    pub hash_rate: u64,

    pub min_peers: usize,
    pub max_peers: usize,

    pub connection_timeout: std::time::Duration,
    pub peer_timeout: std::time::Duration,

    pub verbose: bool,
    pub hex_string_length: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            initial_peer_addresses: Vec::new(),
            listening_address: None,
            public_address: None,
            transaction_id_pool_size: default_tx_id_pool_size(),
            block_id_pool_size: default_block_id_pool_size(),
            address_pool_size: default_address_pool_size(),
            token_pool_size: default_token_pool_size(),
            miner_module: default_miner_module(),
            hash_rate: default_hash_rate(),
            min_peers: default_min_peers(),
            max_peers: default_max_peers(),
            connection_timeout: std::time::Duration::from_secs(default_connection_timeout()),
            peer_timeout: std::time::Duration::from_secs(default_peer_timeout()),
            verbose: default_verbose(),
            hex_string_length: default_hex_string_length(),
        }
    }
}

fn parse_addr(s: &str) -> Result<Addr, crate::Error> {
    let (host, port) = s.rsplit_once(':').ok_or_else(|| crate::Error::Config(format!("invalid address: {s}")))?;
    let port: u16 = port.parse().map_err(|_| crate::Error::Config(format!("invalid port in address: {s}")))?;
    Ok((host.to_string(), port))
}

impl NodeConfig {
    pub fn from_args(args: &Args) -> crate::Result<Self> {
        let mut cfg = NodeConfig::default();

        cfg.initial_peer_addresses =
            args.initial_peer_addresses.iter().map(|s| parse_addr(s)).collect::<crate::Result<_>>()?;
        if let Some(addr) = &args.listening_address {
            cfg.listening_address = Some(parse_addr(addr)?);
        }
        if let Some(addr) = &args.public_address {
            cfg.public_address = Some(parse_addr(addr)?);
        }

        cfg.transaction_id_pool_size = args.transaction_id_pool_size;
        cfg.block_id_pool_size = args.block_id_pool_size;
        cfg.address_pool_size = args.address_pool_size;
        cfg.token_pool_size = args.token_pool_size;
        cfg.miner_module = args.miner_module.clone();
        cfg.hash_rate = args.hash_rate;
        cfg.min_peers = args.min_peers;
        cfg.max_peers = args.max_peers;
        cfg.connection_timeout = std::time::Duration::from_secs(args.connection_timeout);
        cfg.peer_timeout = std::time::Duration::from_secs(args.peer_timeout);
        cfg.verbose = args.verbose > 0 || default_verbose();
        cfg.hex_string_length = args.hex_string_length;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port() {
        assert_eq!(parse_addr("127.0.0.1:4242").unwrap(), ("127.0.0.1".to_string(), 4242));
    }

    #[test]
    fn rejects_missing_port() {
        assert!(parse_addr("127.0.0.1").is_err());
    }

    #[test]
    fn default_config_has_sane_peer_bounds() {
        let cfg = NodeConfig::default();
        assert!(cfg.min_peers <= cfg.max_peers);
    }
}
