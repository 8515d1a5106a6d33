//! Node binary entry point: parses configuration, sets up logging, loads or
//! generates the owner key, and launches the node's worker pipeline.

use std::path::PathBuf;

use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};
use structopt::StructOpt;
use structopt_toml::StructOptToml;

use kma_coin::config::{Args, NodeConfig, CONFIG_FILE, CONFIG_FILE_CONTENTS};
use kma_coin::crypto::{PrivateKey, PRIVATE_KEY_SIZE};
use kma_coin::node::Node;

fn log_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Resolve the config file path, writing the bundled default alongside it if
/// nothing exists there yet.
fn load_config(args: &Args) -> kma_coin::Result<Args> {
    let path = match &args.config {
        Some(p) => PathBuf::from(p),
        None => PathBuf::from(CONFIG_FILE),
    };

    if !path.exists() {
        std::fs::write(&path, CONFIG_FILE_CONTENTS)?;
    }

    let toml_str = std::fs::read_to_string(&path)?;
    Ok(Args::from_args_with_toml(&toml_str))
}

fn load_or_generate_key(data_dir: &std::path::Path) -> kma_coin::Result<PrivateKey> {
    if let Some(key) = Node::load_key(data_dir)? {
        return Ok(key);
    }

    let key = PrivateKey::generate();
    Node::save_key(data_dir, &key)?;
    Ok(key)
}

fn main() -> kma_coin::Result<()> {
    let cli_args = Args::from_args();
    let args = load_config(&cli_args)?;

    TermLogger::init(log_level(args.verbose), LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .expect("failed to install logger");

    let config = NodeConfig::from_args(&args)?;

    let data_dir = match &args.data_dir {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from("."),
    };
    std::fs::create_dir_all(&data_dir)?;

    let owner = match &args.owner_account {
        Some(hex_key) => {
            let bytes = hex::decode(hex_key).map_err(|e| kma_coin::Error::Config(e.to_string()))?;
            let bytes: [u8; PRIVATE_KEY_SIZE] =
                bytes.try_into().map_err(|_| kma_coin::Error::Config("owner_account has the wrong length".to_string()))?;
            PrivateKey::from_bytes(&bytes).ok_or_else(|| kma_coin::Error::Config("invalid owner_account key".to_string()))?
        }
        None => load_or_generate_key(&data_dir)?,
    };

    info!(target: "kma_coin_node", "owner public key: {}", hex::encode(owner.public_key().to_bytes()));

    let node = std::sync::Arc::new(Node::new(&config, data_dir, owner));

    if node.listening_addr.is_none() {
        warn!(target: "kma_coin_node", "no listening address configured, this node will not accept inbound peers");
    }

    kma_coin::launcher::run(node);
    Ok(())
}
