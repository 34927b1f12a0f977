//! Network profiles: the fixed set of networks a deployment can target, and the
//! immutable profile selected for a run

use std::{
    fmt::{self, Debug, Display},
    str::FromStr,
};

use alloy::{signers::local::PrivateKeySigner, transports::http::reqwest::Url};
use clap::ValueEnum;

use crate::{
    constants::{
        CROSSBELL_CHAIN_ID, CROSSBELL_RPC_URL, DEFAULT_DEVNET_HOSTPORT, DEFAULT_FORK_BLOCK,
        DEVNET_CHAIN_ID, ROPSTEN_CHAIN_ID,
    },
    errors::DeployError,
};

/// The networks a deployment can target
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    /// A local anvil node forked from mainnet at a pinned block
    Hardhat,
    /// An already-running local devnet node
    Localhost,
    /// The Ropsten testnet
    Ropsten,
    /// The Crossbell production chain
    Crossbell,
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Hardhat => write!(f, "hardhat"),
            Network::Localhost => write!(f, "localhost"),
            Network::Ropsten => write!(f, "ropsten"),
            Network::Crossbell => write!(f, "crossbell"),
        }
    }
}

/// A historical fork of another chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkSpec {
    /// The RPC URL of the chain being forked
    pub upstream_url: Url,
    /// The block at which the fork is taken
    pub block_number: u64,
}

/// The account that signs the run's transactions
#[derive(Clone)]
pub enum SignerCredential {
    /// An explicitly provided private key
    PrivateKey(PrivateKeySigner),
    /// The dev account at the given index of a locally spawned node
    DevAccount(usize),
}

impl Debug for SignerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerCredential::PrivateKey(signer) => {
                write!(f, "PrivateKey({:#x})", signer.address())
            }
            SignerCredential::DevAccount(index) => write!(f, "DevAccount({index})"),
        }
    }
}

/// The raw settings, typically gathered from the CLI and environment, from
/// which a profile is selected
#[derive(Debug, Clone, Default)]
pub struct NetworkSettings {
    /// Overrides the network's RPC URL
    pub rpc_url: Option<String>,
    /// Private key of the deployer
    pub private_key: Option<String>,
    /// Upstream RPC URL for forked networks
    pub fork_url: Option<String>,
    /// Overrides the fork height of forked networks
    pub fork_block: Option<u64>,
}

/// The network configuration for a single run.
///
/// Built once before any deployment and never mutated afterwards
#[derive(Debug, Clone)]
pub struct NetworkProfile {
    /// Which network this profile targets
    network: Network,
    /// The RPC endpoint. `None` for forked networks, whose endpoint is
    /// only known once the fork node is running
    rpc_url: Option<Url>,
    /// The chain ID the endpoint must report, if pinned
    chain_id: Option<u64>,
    /// The fork to replay, if any
    fork: Option<ForkSpec>,
    /// The signer for the run
    signer: SignerCredential,
}

impl NetworkProfile {
    /// Select the profile for the given network
    pub fn select(network: Network, settings: NetworkSettings) -> Result<Self, DeployError> {
        let private_key = settings
            .private_key
            .as_deref()
            .map(parse_private_key)
            .transpose()?;

        let require_key = |key: Option<PrivateKeySigner>| {
            key.map(SignerCredential::PrivateKey).ok_or_else(|| {
                DeployError::config(format!("a private key is required for `{network}`"))
            })
        };

        let profile = match network {
            Network::Hardhat => {
                let upstream = settings.fork_url.as_deref().ok_or_else(|| {
                    DeployError::config("`hardhat` requires an upstream URL to fork from")
                })?;
                NetworkProfile {
                    network,
                    rpc_url: None,
                    chain_id: Some(DEVNET_CHAIN_ID),
                    fork: Some(ForkSpec {
                        upstream_url: parse_url(upstream)?,
                        block_number: settings.fork_block.unwrap_or(DEFAULT_FORK_BLOCK),
                    }),
                    signer: private_key
                        .map(SignerCredential::PrivateKey)
                        .unwrap_or(SignerCredential::DevAccount(0)),
                }
            }
            Network::Localhost => NetworkProfile {
                network,
                rpc_url: Some(parse_url(
                    settings.rpc_url.as_deref().unwrap_or(DEFAULT_DEVNET_HOSTPORT),
                )?),
                chain_id: None,
                fork: None,
                signer: require_key(private_key)?,
            },
            Network::Ropsten => {
                let url = settings.rpc_url.as_deref().ok_or_else(|| {
                    DeployError::config("`ropsten` requires an RPC URL")
                })?;
                NetworkProfile {
                    network,
                    rpc_url: Some(parse_url(url)?),
                    chain_id: Some(ROPSTEN_CHAIN_ID),
                    fork: None,
                    signer: require_key(private_key)?,
                }
            }
            Network::Crossbell => NetworkProfile {
                network,
                rpc_url: Some(parse_url(
                    settings.rpc_url.as_deref().unwrap_or(CROSSBELL_RPC_URL),
                )?),
                chain_id: Some(CROSSBELL_CHAIN_ID),
                fork: None,
                signer: require_key(private_key)?,
            },
        };

        Ok(profile)
    }

    /// Which network this profile targets
    pub fn network(&self) -> Network {
        self.network
    }

    /// The RPC endpoint, if not forked
    pub fn rpc_url(&self) -> Option<&Url> {
        self.rpc_url.as_ref()
    }

    /// The chain ID the endpoint must report, if pinned
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    /// The fork to replay, if any
    pub fn fork(&self) -> Option<&ForkSpec> {
        self.fork.as_ref()
    }

    /// The signer for the run
    pub fn signer(&self) -> &SignerCredential {
        &self.signer
    }
}

impl Display for NetworkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)?;
        match (&self.rpc_url, &self.fork) {
            (_, Some(fork)) => write!(f, " (fork @ {})", fork.block_number)?,
            (Some(url), None) => write!(f, " ({url})")?,
            (None, None) => {}
        }
        if let Some(chain_id) = self.chain_id {
            write!(f, " [chain {chain_id}]")?;
        }
        Ok(())
    }
}

/// Parse an RPC URL
fn parse_url(url: &str) -> Result<Url, DeployError> {
    Url::parse(url).map_err(|e| DeployError::config(format!("invalid RPC URL `{url}`: {e}")))
}

/// Parse a hex-encoded secp256k1 private key
fn parse_private_key(key: &str) -> Result<PrivateKeySigner, DeployError> {
    // Never echo the key itself
    PrivateKeySigner::from_str(key.trim())
        .map_err(|_| DeployError::config("private key is not a valid secp256k1 key"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The first default anvil / hardhat dev key
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn settings_with_key() -> NetworkSettings {
        NetworkSettings {
            private_key: Some(DEV_KEY.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_crossbell_defaults() {
        let profile = NetworkProfile::select(Network::Crossbell, settings_with_key()).unwrap();
        assert_eq!(profile.chain_id(), Some(CROSSBELL_CHAIN_ID));
        assert_eq!(profile.rpc_url().unwrap().as_str(), "https://rpc.crossbell.io/");
        assert!(profile.fork().is_none());
    }

    #[test]
    fn test_hardhat_fork_defaults() {
        let settings = NetworkSettings {
            fork_url: Some("https://eth-mainnet.example.com/v2/key".to_string()),
            ..Default::default()
        };
        let profile = NetworkProfile::select(Network::Hardhat, settings).unwrap();

        let fork = profile.fork().unwrap();
        assert_eq!(fork.block_number, DEFAULT_FORK_BLOCK);
        assert!(profile.rpc_url().is_none());
        assert!(matches!(profile.signer(), SignerCredential::DevAccount(0)));
    }

    #[test]
    fn test_hardhat_requires_upstream() {
        let err = NetworkProfile::select(Network::Hardhat, NetworkSettings::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_live_networks_require_key() {
        let settings = NetworkSettings {
            rpc_url: Some("https://ropsten.example.com".to_string()),
            ..Default::default()
        };
        assert!(NetworkProfile::select(Network::Ropsten, settings).is_err());
        assert!(NetworkProfile::select(Network::Crossbell, NetworkSettings::default()).is_err());
    }

    #[test]
    fn test_invalid_key_is_not_echoed() {
        let settings = NetworkSettings {
            private_key: Some("0xdeadbeef".to_string()),
            ..Default::default()
        };
        let err = NetworkProfile::select(Network::Crossbell, settings).unwrap_err();
        assert!(!err.to_string().contains("deadbeef"));
    }
}
