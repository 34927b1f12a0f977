//! The boundary between the deployment core and the chain.
//!
//! Every method either submits exactly one transaction or performs a
//! read-only request; implementations never retry a submission.

use std::fmt::{self, Display};

use alloy_primitives::{hex, Address, Bytes, TxHash, B256};

use crate::errors::DeployError;

pub mod memory;
pub mod rpc;

/// The outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// The hash of the mined transaction
    pub tx_hash: TxHash,
    /// Whether the transaction executed successfully
    pub success: bool,
    /// The address of the created contract, for contract creations
    pub contract_address: Option<Address>,
    /// The block the transaction was mined in
    pub block_number: Option<u64>,
}

/// A state-mutating transaction submitted through a [`ChainClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A contract creation
    Deploy {
        /// The artifact name of the contract
        contract: String,
        /// The ABI-encoded constructor arguments
        constructor_args: Bytes,
    },
    /// A call to a deployed contract
    Call {
        /// The contract called
        to: Address,
        /// The calldata sent
        calldata: Bytes,
    },
}

impl Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Submission::Deploy {
                contract,
                constructor_args,
            } => write!(f, "deploy {contract} ({} bytes of constructor args)", constructor_args.len()),
            Submission::Call { to, calldata } => {
                let selector = calldata.get(..4).map(hex::encode).unwrap_or_default();
                write!(f, "call {to:#x} (selector 0x{selector}, {} bytes)", calldata.len())
            }
        }
    }
}

/// The chain operations the deployment core depends on
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// The account that signs submitted transactions
    fn sender(&self) -> Address;

    /// Submit the creation of the named contract with the given ABI-encoded
    /// constructor arguments, returning the transaction hash
    async fn deploy_contract(
        &self,
        contract: &str,
        constructor_args: Bytes,
    ) -> Result<TxHash, DeployError>;

    /// Submit a call to a deployed contract, returning the transaction hash
    async fn call_method(&self, to: Address, calldata: Bytes) -> Result<TxHash, DeployError>;

    /// Wait for a transaction to be mined.
    ///
    /// Only the receipt lookup may be repeated, bounded by the client's
    /// confirmation timeout
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Receipt, DeployError>;

    /// Execute a call without submitting it, returning its output
    async fn simulate_call(&self, to: Address, calldata: Bytes) -> Result<Bytes, DeployError>;

    /// Read a storage slot of a contract
    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, DeployError>;

    /// Read the runtime code at an address
    async fn code_at(&self, address: Address) -> Result<Bytes, DeployError>;
}
