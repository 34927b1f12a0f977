//! A [`ChainClient`] backed by a JSON-RPC node

use std::time::Duration;

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    node_bindings::{Anvil, AnvilInstance},
    providers::{
        DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider,
        ProviderBuilder, WatchTxError,
    },
    rpc::{client::ClientBuilder, types::TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use alloy_sol_types::decode_revert_reason;
use tracing::{debug, info};

use crate::{
    artifacts::ArtifactStore,
    chain::{ChainClient, Receipt},
    constants::{DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEVNET_CHAIN_ID},
    errors::{ChainSubmissionError, DeployError, SubmissionFailure},
    network::{NetworkProfile, SignerCredential},
};

/// How long to wait for transaction receipts, and how often the node is polled
/// while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// The longest to wait for a receipt before giving up
    pub timeout: Duration,
    /// The interval at which the provider polls for new blocks and receipts
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A chain client that signs locally and submits over HTTP
pub struct RpcChainClient {
    /// The signing provider
    provider: DynProvider,
    /// The address of the signer
    sender: Address,
    /// Where contract creation code is loaded from
    artifacts: ArtifactStore,
    /// Receipt waiting parameters
    confirmation: ConfirmationPolicy,
    /// A locally spawned fork node, kept alive for the duration of the run
    _fork_node: Option<AnvilInstance>,
}

impl RpcChainClient {
    /// Connect to the network described by the profile.
    ///
    /// Forked profiles spawn a local anvil node pinned to the fork height.
    /// If the profile pins a chain ID, the endpoint must report it
    pub async fn connect(
        profile: &NetworkProfile,
        artifacts: ArtifactStore,
        confirmation: ConfirmationPolicy,
    ) -> Result<Self, DeployError> {
        let fork_node = match profile.fork() {
            Some(fork) => {
                info!(
                    "spawning fork of {} at block {}",
                    fork.upstream_url.host_str().unwrap_or("upstream"),
                    fork.block_number
                );
                let node = Anvil::new()
                    .fork(fork.upstream_url.as_str())
                    .fork_block_number(fork.block_number)
                    .chain_id(profile.chain_id().unwrap_or(DEVNET_CHAIN_ID))
                    .try_spawn()
                    .map_err(|e| ChainSubmissionError::transport(format!("spawning fork: {e}")))?;
                Some(node)
            }
            None => None,
        };

        let rpc_url = match (&fork_node, profile.rpc_url()) {
            (Some(node), _) => node.endpoint_url(),
            (None, Some(url)) => url.clone(),
            (None, None) => return Err(DeployError::config("profile has no RPC URL")),
        };

        let signer: PrivateKeySigner = match profile.signer() {
            SignerCredential::PrivateKey(signer) => signer.clone(),
            SignerCredential::DevAccount(index) => fork_node
                .as_ref()
                .and_then(|node| node.keys().get(*index))
                .cloned()
                .ok_or_else(|| DeployError::config(format!("no dev account at index {index}")))?
                .into(),
        };
        let sender = signer.address();

        let client = ClientBuilder::default()
            .http(rpc_url)
            .with_poll_interval(confirmation.poll_interval);
        let provider = DynProvider::new(
            ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .on_client(client),
        );

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(ChainSubmissionError::transport)?;
        if let Some(expected) = profile.chain_id() {
            if chain_id != expected {
                return Err(DeployError::config(format!(
                    "endpoint for `{}` reports chain {chain_id}, expected {expected}",
                    profile.network()
                )));
            }
        }

        info!("connected to {} as {:#x}", profile, sender);
        Ok(Self {
            provider,
            sender,
            artifacts,
            confirmation,
            _fork_node: fork_node,
        })
    }

    /// Broadcast a transaction, returning its hash without waiting for it
    async fn send(&self, tx: TransactionRequest) -> Result<TxHash, DeployError> {
        let pending = self
            .provider
            .send_transaction(tx.with_from(self.sender))
            .await
            .map_err(classify_rpc_error)?;

        Ok(*pending.tx_hash())
    }
}

impl ChainClient for RpcChainClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn deploy_contract(
        &self,
        contract: &str,
        constructor_args: Bytes,
    ) -> Result<TxHash, DeployError> {
        let artifact = self.artifacts.load(contract)?;
        let mut code = artifact.bytecode.to_vec();
        code.extend_from_slice(&constructor_args);

        let tx_hash = self
            .send(TransactionRequest::default().with_deploy_code(code))
            .await?;
        debug!("submitted deployment of {} in {:#x}", contract, tx_hash);
        Ok(tx_hash)
    }

    async fn call_method(&self, to: Address, calldata: Bytes) -> Result<TxHash, DeployError> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata);
        let tx_hash = self.send(tx).await?;
        debug!("submitted call to {:#x} in {:#x}", to, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Receipt, DeployError> {
        let timeout = self.confirmation.timeout;
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await
            .map_err(|e| classify_pending_error(e, timeout).with_tx_hash(tx_hash))?;

        Ok(Receipt {
            tx_hash,
            success: receipt.status(),
            contract_address: receipt.contract_address,
            block_number: receipt.block_number,
        })
    }

    async fn simulate_call(&self, to: Address, calldata: Bytes) -> Result<Bytes, DeployError> {
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(to)
            .with_input(calldata);

        let output = self.provider.call(&tx).await.map_err(classify_rpc_error)?;
        Ok(output)
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, DeployError> {
        let value = self
            .provider
            .get_storage_at(address, U256::from_be_bytes(slot.0))
            .await
            .map_err(ChainSubmissionError::transport)?;

        Ok(B256::from(value.to_be_bytes::<32>()))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, DeployError> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(ChainSubmissionError::transport)?;

        Ok(code)
    }
}

/// Map an RPC error onto the submission error taxonomy.
///
/// Error responses carrying revert data are reverts (typically raised during
/// gas estimation); other error responses are rejections by the node, e.g.
/// insufficient funds or a nonce conflict
fn classify_rpc_error(err: TransportError) -> DeployError {
    let kind = match err.as_error_resp() {
        Some(payload) => match payload.as_revert_data() {
            Some(data) => SubmissionFailure::Reverted {
                reason: decode_revert_reason(&data).or_else(|| Some(payload.message.to_string())),
                data: Some(data),
            },
            None if payload.message.contains("revert") => SubmissionFailure::Reverted {
                reason: Some(payload.message.to_string()),
                data: None,
            },
            None => SubmissionFailure::Rejected(payload.message.to_string()),
        },
        None => SubmissionFailure::Transport(err.to_string()),
    };

    ChainSubmissionError::new(kind).into()
}

/// Map a failure to observe a receipt onto the submission error taxonomy
fn classify_pending_error(err: PendingTransactionError, timeout: Duration) -> ChainSubmissionError {
    match err {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
            ChainSubmissionError::new(SubmissionFailure::Timeout(timeout))
        }
        other => ChainSubmissionError::transport(other),
    }
}
