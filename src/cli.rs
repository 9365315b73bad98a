// CLI commands

use crate::config::NodeConfig;
use crate::node::Node;
use crate::wallet::{KeyPair, Secp256k1Verifier, SignedTransfer};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flood-ledger")]
#[command(about = "Proof-of-work ledger node with flood gossip", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a node until Ctrl-C
    Run(RunArgs),

    /// Generate a new key pair
    Keygen,

    /// Sign a transfer and print it as JSON
    Sign {
        /// Hex-encoded secret key
        #[arg(long)]
        secret: String,
        /// Sender (defaults to the key's address)
        #[arg(long)]
        from: Option<String>,
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Amount to transfer
        #[arg(long)]
        amount: f64,
    },
}

/// Options for `run`; each flag overrides the config file
#[derive(Args, Default)]
pub struct RunArgs {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on, host:port
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Bootstrap peer, host:port (repeatable)
    #[arg(short, long = "peer")]
    pub peers: Vec<String>,

    /// Leading zero hex digits required of a block hash
    #[arg(long)]
    pub difficulty: Option<u32>,

    /// Reward paid to the miner of each block
    #[arg(long)]
    pub reward: Option<f64>,

    /// Reward address for auto-mining
    #[arg(long)]
    pub mine_address: Option<String>,

    /// Seconds between auto-mined blocks
    #[arg(long)]
    pub mine_interval: Option<u64>,

    /// Signed transfer JSON (as printed by `sign`) to submit once started (repeatable)
    #[arg(long = "transfer")]
    pub transfers: Vec<PathBuf>,

    /// Mine one block to this address after submitting transfers
    #[arg(long)]
    pub mine_once: Option<String>,

    /// Address whose balance is printed on shutdown (repeatable)
    #[arg(long = "balance")]
    pub balances: Vec<String>,
}

impl RunArgs {
    /// Load the config file (or defaults) and layer the flags on top
    pub fn to_config(&self) -> Result<NodeConfig, String> {
        let mut config = match &self.config {
            Some(path) => {
                NodeConfig::load(path).map_err(|e| format!("{}: {}", path.display(), e))?
            }
            None => NodeConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        config.peers.extend(self.peers.iter().cloned());
        if let Some(difficulty) = self.difficulty {
            config.consensus.difficulty = difficulty;
        }
        if let Some(reward) = self.reward {
            config.consensus.mining_reward = reward;
        }
        if let Some(address) = &self.mine_address {
            config.miner.address = Some(address.clone());
        }
        if let Some(interval) = self.mine_interval {
            config.miner.interval_secs = Some(interval);
        }

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

/// Read a transfer produced by `sign`
pub fn load_transfer(path: &Path) -> Result<SignedTransfer, String> {
    let json = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&json).map_err(|e| format!("{}: {}", path.display(), e))
}

/// CLI handler
#[derive(Default)]
pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    /// Handle CLI command
    pub async fn handle(&self, cli: Cli) -> Result<(), String> {
        match cli.command {
            Commands::Run(args) => self.run(args).await,
            Commands::Keygen => self.keygen(),
            Commands::Sign {
                secret,
                from,
                to,
                amount,
            } => self.sign(&secret, from, &to, amount),
        }
    }

    async fn run(&self, args: RunArgs) -> Result<(), String> {
        let config = args.to_config()?;
        let transfers = args
            .transfers
            .iter()
            .map(|path| load_transfer(path))
            .collect::<Result<Vec<_>, _>>()?;

        let verifier = Arc::new(Secp256k1Verifier::new());
        let node = Node::new(config, verifier).map_err(|e| e.to_string())?;

        let addr = node.start().await.map_err(|e| e.to_string())?;
        println!("Node listening on {}", addr);

        for transfer in &transfers {
            node.submit_transaction(
                &transfer.from,
                &transfer.to,
                transfer.amount,
                Some(&transfer.signature),
                Some(&transfer.public_key),
            )
            .await
            .map_err(|e| format!("Transfer {} -> {}: {}", transfer.from, transfer.to, e))?;
            println!("Submitted {} -> {} ({})", transfer.from, transfer.to, transfer.amount);
        }

        if let Some(address) = &args.mine_once {
            let block = node.mine(address).await.map_err(|e| e.to_string())?;
            println!(
                "Mined block {} ({}) with {} transactions",
                block.index,
                block.hash,
                block.transactions.len()
            );
        }

        println!("Press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to wait for Ctrl-C: {}", e))?;

        node.shutdown().await;

        let latest = node.latest().await.map_err(|e| e.to_string())?;
        println!("Stopped at height {} ({})", latest.index, latest.hash);
        for address in &args.balances {
            println!("Balance of {}: {}", address, node.balance_of(address).await);
        }
        Ok(())
    }

    fn keygen(&self) -> Result<(), String> {
        let keypair = KeyPair::generate();

        println!("Address:     {}", keypair.address);
        println!("Public key:  {}", keypair.public_key_hex());
        println!("Secret key:  {}", keypair.secret_hex());
        Ok(())
    }

    fn sign(
        &self,
        secret: &str,
        from: Option<String>,
        to: &str,
        amount: f64,
    ) -> Result<(), String> {
        let keypair = KeyPair::from_secret_hex(secret)?;
        let from = from.unwrap_or_else(|| keypair.address.to_string());

        let transfer = keypair.sign_transfer(&from, to, amount);
        let json = serde_json::to_string_pretty(&transfer).map_err(|e| e.to_string())?;
        println!("{}", json);
        Ok(())
    }
}
