//! Binding an implementation behind a `TransparentUpgradeableProxy`, and the
//! one-shot initialization of the proxy's storage.

use std::{collections::HashSet, sync::Mutex};

use alloy_primitives::{Address, Bytes, TxHash};
use alloy_sol_types::{SolError, SolType};
use tracing::{info, warn};

use crate::{
    chain::{ChainClient, Receipt},
    constants::{PROXY_ADMIN_STORAGE_SLOT, PROXY_CONTRACT_NAME, PROXY_IMPLEMENTATION_STORAGE_SLOT},
    errors::{ChainSubmissionError, DeployError, SubmissionFailure},
    plan::{InitArg, Initializer},
    solidity::{InvalidInitialization, ProxyConstructorArgs},
};

/// Binds implementations behind proxies and drives their initializers.
///
/// Tracks every proxy whose initializer has been consumed or submitted
/// through it, so a second attempt fails before reaching the chain
pub struct ProxyBinder<'a, C: ChainClient> {
    /// The chain client
    client: &'a C,
    /// Proxies whose initializer has been consumed or submitted
    initialized: Mutex<HashSet<Address>>,
}

impl<'a, C: ChainClient> ProxyBinder<'a, C> {
    /// A binder submitting through the given client
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            initialized: Mutex::new(HashSet::new()),
        }
    }

    /// Deploy a proxy delegating to `implementation`, upgradeable by `admin`.
    ///
    /// A non-empty `constructor_data` is executed against the proxy's storage
    /// during construction, consuming its initializer. The proxy's EIP-1967
    /// slots are read back and checked once the deployment is confirmed
    pub async fn bind(
        &self,
        implementation: Address,
        admin: Address,
        constructor_data: Bytes,
    ) -> Result<Address, DeployError> {
        if admin.is_zero() {
            return Err(DeployError::config("proxy admin must not be the zero address"));
        }
        if admin == implementation {
            return Err(DeployError::config(
                "proxy admin must differ from the implementation address",
            ));
        }
        if admin == self.client.sender() && constructor_data.is_empty() {
            // The transparent proxy never forwards calls from its admin
            warn!(
                "deployer {:#x} is the proxy admin and will not be able to initialize the proxy",
                admin
            );
        }

        let consumes_initializer = !constructor_data.is_empty();
        let constructor_args: Bytes =
            ProxyConstructorArgs::abi_encode_params(&(implementation, admin, constructor_data))
                .into();

        let tx_hash = self
            .client
            .deploy_contract(PROXY_CONTRACT_NAME, constructor_args)
            .await?;
        let receipt = self.confirm(tx_hash).await?;
        let proxy = receipt.contract_address.ok_or_else(|| {
            unexpected_state(tx_hash, "proxy deployment receipt has no contract address")
        })?;

        let stored_implementation = self
            .client
            .storage_at(proxy, PROXY_IMPLEMENTATION_STORAGE_SLOT)
            .await?;
        if Address::from_word(stored_implementation) != implementation {
            return Err(unexpected_state(
                tx_hash,
                format!(
                    "proxy {proxy:#x} delegates to {:#x}, expected {implementation:#x}",
                    Address::from_word(stored_implementation)
                ),
            ));
        }

        let stored_admin = self.client.storage_at(proxy, PROXY_ADMIN_STORAGE_SLOT).await?;
        if Address::from_word(stored_admin) != admin {
            return Err(unexpected_state(
                tx_hash,
                format!(
                    "proxy {proxy:#x} is administered by {:#x}, expected {admin:#x}",
                    Address::from_word(stored_admin)
                ),
            ));
        }

        if consumes_initializer {
            self.mark_initialized(proxy);
        }

        info!("proxy deployed at {:#x} (implementation {:#x})", proxy, implementation);
        info!("proxy admin is {:#x}", admin);
        Ok(proxy)
    }

    /// Call the initializer on the proxy's storage.
    ///
    /// The argument tuple is checked against the initializer before anything
    /// is submitted, and the call is simulated before it is broadcast. The
    /// transaction is submitted at most once; its hash is returned once it is
    /// confirmed successful
    pub async fn initialize(
        &self,
        proxy: Address,
        initializer: Initializer,
        args: &[InitArg],
    ) -> Result<TxHash, DeployError> {
        let calldata = initializer.encode(args)?;
        if self.is_initialized(proxy) {
            return Err(DeployError::AlreadyInitialized { proxy });
        }

        if let Err(e) = self.client.simulate_call(proxy, calldata.clone()).await {
            return Err(classify_initialize_error(proxy, e));
        }

        let tx_hash = self
            .client
            .call_method(proxy, calldata.clone())
            .await
            .map_err(|e| classify_initialize_error(proxy, e))?;
        // The initializer may be consumed as soon as the transaction is
        // broadcast, whatever is observed afterwards
        self.mark_initialized(proxy);

        if let Err(e) = self.confirm(tx_hash).await {
            return Err(self.explain_reverted_initialize(proxy, calldata, e).await);
        }
        info!("initialized proxy {:#x} via `{}` in {:#x}", proxy, initializer.signature(), tx_hash);
        Ok(tx_hash)
    }

    /// Whether this binder has consumed or submitted the proxy's initializer
    pub fn is_initialized(&self, proxy: Address) -> bool {
        self.initialized
            .lock()
            .map(|set| set.contains(&proxy))
            .unwrap_or(true)
    }

    /// Record that the proxy's initializer has been consumed or submitted
    fn mark_initialized(&self, proxy: Address) {
        if let Ok(mut set) = self.initialized.lock() {
            set.insert(proxy);
        }
    }

    /// Replay a mined-but-reverted initializer as a read-only call to recover
    /// its cause. Never resubmits
    async fn explain_reverted_initialize(
        &self,
        proxy: Address,
        calldata: Bytes,
        err: DeployError,
    ) -> DeployError {
        let reverted = matches!(
            &err,
            DeployError::ChainSubmission(ChainSubmissionError {
                kind: SubmissionFailure::Reverted { .. },
                ..
            })
        );
        if !reverted {
            return err;
        }

        match self.client.simulate_call(proxy, calldata).await {
            Err(replayed) => match classify_initialize_error(proxy, replayed) {
                already @ DeployError::AlreadyInitialized { .. } => {
                    warn!("proxy {:#x} was initialized by another transaction first", proxy);
                    already
                }
                _ => err,
            },
            Ok(_) => err,
        }
    }

    /// Wait for a transaction, failing if it was mined but reverted
    async fn confirm(&self, tx_hash: TxHash) -> Result<Receipt, DeployError> {
        let receipt = self.client.wait_for_confirmation(tx_hash).await?;
        if !receipt.success {
            let kind = SubmissionFailure::Reverted {
                reason: None,
                data: None,
            };
            return Err(ChainSubmissionError::new(kind).with_tx_hash(tx_hash).into());
        }

        Ok(receipt)
    }
}

/// Build an unexpected-state error for the given transaction
fn unexpected_state(tx_hash: TxHash, msg: impl Into<String>) -> DeployError {
    ChainSubmissionError::new(SubmissionFailure::UnexpectedState(msg.into()))
        .with_tx_hash(tx_hash)
        .into()
}

/// Recognize a revert caused by an already-consumed initializer, under
/// either the OpenZeppelin v4 reason string or the v5 custom error
pub(crate) fn classify_initialize_error(proxy: Address, err: DeployError) -> DeployError {
    let DeployError::ChainSubmission(ChainSubmissionError {
        kind: SubmissionFailure::Reverted { reason, data },
        ..
    }) = &err
    else {
        return err;
    };

    let custom_error = data
        .as_ref()
        .is_some_and(|data| data.starts_with(&InvalidInitialization::SELECTOR));
    let reason_string = reason
        .as_deref()
        .is_some_and(|reason| reason.contains("already initialized"));

    if custom_error || reason_string {
        DeployError::AlreadyInitialized { proxy }
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, Bytes, U256};
    use alloy_sol_types::{SolCall, SolError};

    use super::*;
    use crate::{
        chain::{
            memory::{Fault, InMemoryChain, DEV_ACCOUNT_0},
            Submission,
        },
        errors::ErrorClass,
        solidity::ISwapV2,
    };

    const PROXY_ADMIN: Address = address!("c72ce0090718502f08506c4592f18f13094d4ce3");
    const ADMIN: Address = address!("4bce096f44b90b812420637068dc215c1c3c8b54");
    const MIRA: Address = address!("b402548b1f3fe59211b19832c5b659bb4d4abd42");

    fn swap_v2_args() -> Vec<InitArg> {
        vec![
            InitArg::Address(MIRA),
            InitArg::Amount(U256::from(100_000_000_000_000_000u64)),
            InitArg::Amount(U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64))),
            InitArg::Address(ADMIN),
        ]
    }

    async fn deploy_implementation(chain: &InMemoryChain) -> Address {
        let tx = chain.deploy_contract("Swap", Bytes::new()).await.unwrap();
        chain.wait_for_confirmation(tx).await.unwrap().contract_address.unwrap()
    }

    #[tokio::test]
    async fn test_bind_then_initialize() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);

        let proxy = binder.bind(implementation, PROXY_ADMIN, Bytes::new()).await.unwrap();
        assert!(!binder.is_initialized(proxy));

        binder.initialize(proxy, Initializer::SwapV2, &swap_v2_args()).await.unwrap();
        assert!(binder.is_initialized(proxy));

        let calldata = chain.initialize_calldata(proxy).unwrap();
        let call = ISwapV2::initializeCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(call.mira, MIRA);
        assert_eq!(call.admin, ADMIN);
    }

    #[tokio::test]
    async fn test_admin_validation_happens_before_submission() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);

        let err = binder.bind(implementation, implementation, Bytes::new()).await.unwrap_err();
        assert!(err.is_configuration());
        let err = binder.bind(implementation, Address::ZERO, Bytes::new()).await.unwrap_err();
        assert!(err.is_configuration());

        assert_eq!(chain.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_second_initialize_never_reaches_chain() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);
        let proxy = binder.bind(implementation, PROXY_ADMIN, Bytes::new()).await.unwrap();

        binder.initialize(proxy, Initializer::SwapV2, &swap_v2_args()).await.unwrap();
        let submitted = chain.submissions().len();

        let err = binder.initialize(proxy, Initializer::SwapV2, &swap_v2_args()).await.unwrap_err();
        assert_eq!(err, DeployError::AlreadyInitialized { proxy });
        assert_eq!(chain.submissions().len(), submitted);
    }

    #[tokio::test]
    async fn test_initialized_by_another_party_is_detected_by_simulation() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let proxy = ProxyBinder::new(&chain)
            .bind(implementation, PROXY_ADMIN, Bytes::new())
            .await
            .unwrap();

        // Someone else consumes the initializer
        let calldata = Initializer::SwapV2.encode(&swap_v2_args()).unwrap();
        let tx = chain.call_method(proxy, calldata).await.unwrap();
        chain.wait_for_confirmation(tx).await.unwrap();
        let submitted = chain.submissions().len();

        // A fresh binder has no local record of it
        let err = ProxyBinder::new(&chain)
            .initialize(proxy, Initializer::SwapV2, &swap_v2_args())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::AlreadyInitialized);
        assert_eq!(chain.submissions().len(), submitted);
    }

    #[tokio::test]
    async fn test_constructor_data_consumes_initializer() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);

        let data = Initializer::SwapV2.encode(&swap_v2_args()).unwrap();
        let proxy = binder.bind(implementation, PROXY_ADMIN, data).await.unwrap();
        assert!(binder.is_initialized(proxy));

        let err = binder.initialize(proxy, Initializer::SwapV2, &swap_v2_args()).await.unwrap_err();
        assert!(matches!(err, DeployError::AlreadyInitialized { .. }));
    }

    #[tokio::test]
    async fn test_wrong_arity_is_rejected_locally() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);
        let proxy = binder.bind(implementation, PROXY_ADMIN, Bytes::new()).await.unwrap();
        let submitted = chain.submissions().len();

        let args = &swap_v2_args()[..3];
        let err = binder.initialize(proxy, Initializer::SwapV2, args).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::ArgumentArity);
        assert_eq!(chain.submissions().len(), submitted);
        assert!(!chain.is_initialized(proxy));
    }

    #[tokio::test]
    async fn test_reverted_initialize_carries_tx_hash() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);
        let proxy = binder.bind(implementation, PROXY_ADMIN, Bytes::new()).await.unwrap();

        chain.inject(Fault::RevertCall);
        let err = binder.initialize(proxy, Initializer::SwapV2, &swap_v2_args()).await.unwrap_err();
        match err {
            DeployError::ChainSubmission(e) => assert!(e.tx_hash.is_some()),
            other => panic!("unexpected error: {other}"),
        }

        // The attempt counts; it is never resubmitted
        assert!(binder.is_initialized(proxy));
    }

    #[tokio::test]
    async fn test_initialized_first_by_another_party_after_simulation() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);
        let proxy = binder.bind(implementation, PROXY_ADMIN, Bytes::new()).await.unwrap();

        chain.inject(Fault::InitializedFirst);
        let err = binder.initialize(proxy, Initializer::SwapV2, &swap_v2_args()).await.unwrap_err();
        assert_eq!(err, DeployError::AlreadyInitialized { proxy });

        // Submitted exactly once, and our arguments were never applied
        let calls = chain
            .submissions()
            .into_iter()
            .filter(|s| matches!(s, Submission::Call { .. }))
            .count();
        assert_eq!(calls, 1);
        assert_eq!(chain.initialize_calldata(proxy), None);
        assert!(binder.is_initialized(proxy));
    }

    #[tokio::test]
    async fn test_deployer_as_admin_cannot_initialize() {
        let chain = InMemoryChain::default();
        let implementation = deploy_implementation(&chain).await;
        let binder = ProxyBinder::new(&chain);
        let proxy = binder.bind(implementation, DEV_ACCOUNT_0, Bytes::new()).await.unwrap();

        let err = binder.initialize(proxy, Initializer::SwapV2, &swap_v2_args()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::ChainSubmission);
    }

    #[test]
    fn test_classify_custom_error() {
        let proxy = PROXY_ADMIN;
        let err: DeployError = ChainSubmissionError::new(SubmissionFailure::Reverted {
            reason: None,
            data: Some(InvalidInitialization {}.abi_encode().into()),
        })
        .into();
        assert_eq!(
            classify_initialize_error(proxy, err),
            DeployError::AlreadyInitialized { proxy }
        );

        let other: DeployError = ChainSubmissionError::new(SubmissionFailure::Reverted {
            reason: Some("revert: Ownable: caller is not the owner".to_string()),
            data: None,
        })
        .into();
        assert_eq!(classify_initialize_error(proxy, other.clone()), other);
    }
}
