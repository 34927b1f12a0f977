//! Definitions of CLI arguments and commands for the deploy scripts

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use tracing::Level;

use crate::{
    chain::rpc::ConfirmationPolicy,
    commands::{deploy, show_plan},
    constants::{DEFAULT_ARTIFACTS_DIR, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL},
    errors::ExecutionFailure,
    network::{Network, NetworkSettings},
    plan::{ContractFamily, PlanOverrides},
};

/// Deploy and initialize the upgradeable MIRA contracts
#[derive(Parser)]
pub struct Cli {
    /// The network to deploy to
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Chain interaction settings
    #[command(flatten)]
    pub chain: ChainArgs,

    /// The maximum level at which to log
    #[arg(long, default_value_t = Level::INFO, global = true)]
    pub log_level: Level,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The target network and the credentials used on it
#[derive(Args, Clone)]
pub struct NetworkArgs {
    /// The network to deploy to
    #[arg(short, long, value_enum, default_value_t = Network::Localhost, global = true)]
    pub network: Network,

    /// Private key of the deployer
    #[arg(short, long, env = "PRIVATE_KEY", hide_env_values = true, global = true)]
    pub priv_key: Option<String>,

    /// Network RPC URL, overriding the network's default
    #[arg(short, long, env = "RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Ropsten RPC URL, used for `ropsten` when no RPC URL is given
    #[arg(long, env = "ROPSTEN_URL", global = true)]
    pub ropsten_url: Option<String>,

    /// Upstream RPC URL forked by the `hardhat` network
    #[arg(long, env = "MAINNET_FORK_URL", global = true)]
    pub fork_url: Option<String>,

    /// The block at which the `hardhat` network forks
    #[arg(long, global = true)]
    pub fork_block: Option<u64>,
}

impl NetworkArgs {
    /// The settings a network profile is selected from
    pub fn settings(&self) -> NetworkSettings {
        let rpc_url = match self.network {
            Network::Ropsten => self.rpc_url.clone().or_else(|| self.ropsten_url.clone()),
            _ => self.rpc_url.clone(),
        };

        NetworkSettings {
            rpc_url,
            private_key: self.priv_key.clone(),
            fork_url: self.fork_url.clone(),
            fork_block: self.fork_block,
        }
    }
}

/// How contracts are loaded and transactions are confirmed
#[derive(Args, Clone)]
pub struct ChainArgs {
    /// The Hardhat artifacts directory to load contract bytecode from
    #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR, global = true)]
    pub artifacts_dir: PathBuf,

    /// Seconds to wait for each transaction to be mined
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT.as_secs(), global = true)]
    pub confirmation_timeout: u64,

    /// Milliseconds between polls of the node while waiting for a receipt
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64, global = true)]
    pub poll_interval: u64,
}

impl ChainArgs {
    /// How long, and how often, to wait for receipts
    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            timeout: Duration::from_secs(self.confirmation_timeout),
            poll_interval: Duration::from_millis(self.poll_interval),
        }
    }
}

/// The available commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy an implementation behind a new proxy and initialize it
    Deploy(DeployArgs),
    /// Resolve a deployment plan and print it, without touching any network
    ShowPlan(PlanArgs),
}

impl Command {
    /// Run the command
    pub async fn run(self, network: NetworkArgs, chain: ChainArgs) -> Result<(), ExecutionFailure> {
        match self {
            Command::Deploy(args) => deploy(args, network, chain).await.map(|_| ()),
            Command::ShowPlan(args) => show_plan(args).map_err(ExecutionFailure::from),
        }
    }
}

/// Selects the contract, version, and argument values of a deployment plan
#[derive(Args, Clone)]
pub struct PlanArgs {
    /// The contract family to deploy
    #[arg(short, long, value_enum)]
    pub family: ContractFamily,

    /// The version tag of the family's initializer, e.g. `v2`
    #[arg(short, long)]
    pub version: String,

    /// A JSON file of plan values; flags given on the command line take precedence
    #[arg(short, long)]
    pub overrides: Option<PathBuf>,

    /// Plan values given on the command line
    #[command(flatten)]
    pub values: OverrideArgs,
}

/// Plan values given as flags
#[derive(Args, Clone, Default)]
pub struct OverrideArgs {
    /// The proxy admin, authorized to upgrade the proxy
    #[arg(long)]
    pub proxy_admin: Option<String>,

    /// The contract's business-logic admin
    #[arg(long)]
    pub admin: Option<String>,

    /// The wrapped CSB token address
    #[arg(long)]
    pub wcsb: Option<String>,

    /// The MIRA token address
    #[arg(long)]
    pub mira: Option<String>,

    /// The minimum CSB threshold in whole tokens, e.g. `0.1`
    #[arg(long)]
    pub min_csb: Option<String>,

    /// The minimum MIRA threshold in whole tokens, e.g. `100`
    #[arg(long)]
    pub min_mira: Option<String>,

    /// An already-deployed implementation to put behind the proxy
    #[arg(long)]
    pub implementation: Option<String>,
}

impl From<OverrideArgs> for PlanOverrides {
    fn from(args: OverrideArgs) -> Self {
        PlanOverrides {
            proxy_admin: args.proxy_admin,
            admin: args.admin,
            wcsb: args.wcsb,
            mira: args.mira,
            min_csb: args.min_csb,
            min_mira: args.min_mira,
            implementation: args.implementation,
        }
    }
}

/// Deploy a contract family behind a `TransparentUpgradeableProxy`.
///
/// The implementation is deployed first, then the proxy is deployed pointing
/// at it with the given proxy admin, and finally the versioned initializer is
/// called through the proxy. The proxy admin cannot call through the proxy, so
/// it must differ from the deployer.
#[derive(Args, Clone)]
pub struct DeployArgs {
    /// The plan to deploy
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Execute against an in-memory chain and print the transactions that
    /// would be submitted
    #[arg(long)]
    pub dry_run: bool,

    /// A JSON file in which to record the deployed addresses
    #[arg(short, long)]
    pub deployments_path: Option<PathBuf>,
}
