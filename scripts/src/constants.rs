//! Constants used in the deploy scripts

use std::time::Duration;

use alloy_primitives::{b256, B256};

/// The artifact name of the TransparentUpgradeableProxy contract
///
/// Compiled from https://github.com/OpenZeppelin/openzeppelin-contracts/blob/v4.8.0/contracts/proxy/transparent/TransparentUpgradeableProxy.sol
pub const PROXY_CONTRACT_NAME: &str = "TransparentUpgradeableProxy";

/// The artifact name of the marketplace implementation contract
pub const MARKETPLACE_CONTRACT_NAME: &str = "MarketPlace";

/// The artifact name of the swap implementation contract
pub const SWAP_CONTRACT_NAME: &str = "Swap";

/// The storage slot containing the implementation address in the upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const PROXY_IMPLEMENTATION_STORAGE_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// The storage slot containing the proxy admin address in the upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#admin-address
pub const PROXY_ADMIN_STORAGE_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// The number of decimals in the on-chain representation of a threshold
pub const THRESHOLD_DECIMALS: u8 = 18;

/// The revert reason emitted by OpenZeppelin v4 `Initializable` on re-initialization
pub const ALREADY_INITIALIZED_REASON: &str = "Initializable: contract is already initialized";

/// The default amount of time to wait for a transaction to be confirmed
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// The default interval at which the node is polled while awaiting a receipt
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The default devnet RPC URL
pub const DEFAULT_DEVNET_HOSTPORT: &str = "http://127.0.0.1:8545";

/// The Crossbell RPC URL
pub const CROSSBELL_RPC_URL: &str = "https://rpc.crossbell.io";

/// The Crossbell chain ID
pub const CROSSBELL_CHAIN_ID: u64 = 3737;

/// The Ropsten chain ID
pub const ROPSTEN_CHAIN_ID: u64 = 3;

/// The chain ID of a local hardhat / anvil node
pub const DEVNET_CHAIN_ID: u64 = 31337;

/// The mainnet block at which the `hardhat` network forks
pub const DEFAULT_FORK_BLOCK: u64 = 14_390_000;

/// The name of the directory in which Hardhat places compilation artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// The file extension of a Hardhat artifact
pub const ARTIFACT_EXTENSION: &str = "json";

/// The deployments key in the deployments file
pub const DEPLOYMENTS_KEY: &str = "deployments";

/// The suffix of the implementation contract key in the deployments file
pub const CONTRACT_KEY_SUFFIX: &str = "contract";

/// The suffix of the proxy contract key in the deployments file
pub const PROXY_CONTRACT_KEY_SUFFIX: &str = "proxy_contract";
