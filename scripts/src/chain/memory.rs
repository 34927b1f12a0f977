//! An in-process chain that models exactly the contract behavior the
//! deployment flow relies on: CREATE addressing, EIP-1967 proxy slots, the
//! one-shot `Initializable` guard and the transparent proxy's admin rule.
//!
//! Used for `--dry-run` and in tests; contract code is never executed.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{address, keccak256, Address, Bytes, TxHash, B256};
use alloy_sol_types::{Revert, SolError, SolType};
use tracing::debug;

use crate::{
    chain::{ChainClient, Receipt, Submission},
    constants::{
        ALREADY_INITIALIZED_REASON, DEFAULT_CONFIRMATION_TIMEOUT, PROXY_ADMIN_STORAGE_SLOT,
        PROXY_CONTRACT_NAME, PROXY_IMPLEMENTATION_STORAGE_SLOT,
    },
    errors::{ChainSubmissionError, DeployError, SubmissionFailure},
    solidity::ProxyConstructorArgs,
};

/// The first prefunded dev account of a hardhat / anvil node
pub const DEV_ACCOUNT_0: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// The revert reason of a transparent proxy called by its own admin
pub const ADMIN_FALLBACK_REASON: &str =
    "TransparentUpgradeableProxy: admin cannot fallback to proxy target";

/// The revert reason of a proxy constructed over an address with no code
pub const NOT_A_CONTRACT_REASON: &str = "ERC1967: new implementation is not a contract";

/// A failure to inject into the next matching submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The node refuses the next deployment of the named contract
    RejectDeploy(String),
    /// The next deployment of the named contract is mined but reverts
    RevertDeploy(String),
    /// The node refuses the next contract call
    RejectCall,
    /// The next contract call is mined but reverts
    RevertCall,
    /// Another account consumes the called proxy's initializer just before
    /// the next contract call is mined
    InitializedFirst,
    /// The next transaction is accepted but never mined
    DropTransaction,
}

/// A contract account
#[derive(Debug, Clone, Default)]
struct Account {
    /// The runtime code
    code: Bytes,
    /// Non-zero storage slots
    storage: HashMap<B256, B256>,
    /// Whether the `Initializable` guard has been consumed
    initialized: bool,
    /// The calldata that consumed the guard, if it was consumed by a call
    init_calldata: Option<Bytes>,
}

impl Account {
    /// The proxy admin, if this account is a proxy
    fn proxy_admin(&self) -> Option<Address> {
        self.storage
            .get(&PROXY_ADMIN_STORAGE_SLOT)
            .map(|word| Address::from_word(*word))
    }
}

/// The mutable chain state
#[derive(Debug, Default)]
struct State {
    /// The sender's next nonce
    nonce: u64,
    /// The current block height
    block_number: u64,
    /// Contract accounts by address
    accounts: HashMap<Address, Account>,
    /// Receipts of mined transactions
    receipts: HashMap<TxHash, Receipt>,
    /// Every submission attempted, in order, including refused ones
    submissions: Vec<Submission>,
    /// Faults waiting to fire
    faults: VecDeque<Fault>,
}

impl State {
    /// Take the first pending fault matching the predicate
    fn take_fault(&mut self, matches: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let idx = self.faults.iter().position(matches)?;
        self.faults.remove(idx)
    }

    /// Consume a nonce, returning the hash of the transaction that used it
    fn next_tx(&mut self, sender: Address) -> (TxHash, u64) {
        let nonce = self.nonce;
        self.nonce += 1;

        let mut preimage = sender.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        (keccak256(preimage), nonce)
    }

    /// Mine a transaction into a new block
    fn mine(&mut self, tx_hash: TxHash, success: bool, contract_address: Option<Address>) {
        self.block_number += 1;
        let receipt = Receipt {
            tx_hash,
            success,
            contract_address,
            block_number: Some(self.block_number),
        };
        self.receipts.insert(tx_hash, receipt);
    }
}

/// An in-memory [`ChainClient`]
#[derive(Debug)]
pub struct InMemoryChain {
    /// The account signing every submission
    sender: Address,
    /// The chain state
    state: Mutex<State>,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new(DEV_ACCOUNT_0)
    }
}

impl InMemoryChain {
    /// An empty chain on which `sender` signs every submission
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            state: Mutex::new(State::default()),
        }
    }

    /// Queue a fault for the next matching submission
    pub fn inject(&self, fault: Fault) {
        self.state().faults.push_back(fault);
    }

    /// Every submission attempted so far, in order
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Whether the `Initializable` guard of the contract at `address` has been consumed
    pub fn is_initialized(&self, address: Address) -> bool {
        self.state()
            .accounts
            .get(&address)
            .is_some_and(|acct| acct.initialized)
    }

    /// The calldata that consumed the guard of the contract at `address`
    pub fn initialize_calldata(&self, address: Address) -> Option<Bytes> {
        self.state()
            .accounts
            .get(&address)
            .and_then(|acct| acct.init_calldata.clone())
    }

    /// Lock the chain state
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Why a call from the sender to `to` would revert, if it would
    fn call_revert_reason(&self, state: &State, to: Address) -> Option<&'static str> {
        let acct = state.accounts.get(&to)?;
        let admin = acct.proxy_admin()?;
        if admin == self.sender {
            Some(ADMIN_FALLBACK_REASON)
        } else if acct.initialized {
            Some(ALREADY_INITIALIZED_REASON)
        } else {
            None
        }
    }
}

/// Build a revert error carrying an `Error(string)` payload
fn revert(reason: &str) -> DeployError {
    let data = Revert {
        reason: reason.to_string(),
    }
    .abi_encode();
    ChainSubmissionError::new(SubmissionFailure::Reverted {
        reason: Some(reason.to_string()),
        data: Some(data.into()),
    })
    .into()
}

impl ChainClient for InMemoryChain {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn deploy_contract(
        &self,
        contract: &str,
        constructor_args: Bytes,
    ) -> Result<TxHash, DeployError> {
        let mut state = self.state();
        state.submissions.push(Submission::Deploy {
            contract: contract.to_string(),
            constructor_args: constructor_args.clone(),
        });

        if state
            .take_fault(|f| matches!(f, Fault::RejectDeploy(name) if name == contract))
            .is_some()
        {
            let reason = format!("deployment of {contract} refused");
            return Err(ChainSubmissionError::new(SubmissionFailure::Rejected(reason)).into());
        }

        let (tx_hash, nonce) = state.next_tx(self.sender);
        debug!("dry-run deployment of {} in {:#x}", contract, tx_hash);

        if state.take_fault(|f| matches!(f, Fault::DropTransaction)).is_some() {
            return Ok(tx_hash);
        }
        if state
            .take_fault(|f| matches!(f, Fault::RevertDeploy(name) if name == contract))
            .is_some()
        {
            state.mine(tx_hash, false /* success */, None);
            return Ok(tx_hash);
        }

        let mut account = Account {
            code: Bytes::from(keccak256(contract.as_bytes()).to_vec()),
            ..Default::default()
        };

        if contract == PROXY_CONTRACT_NAME {
            let decoded = ProxyConstructorArgs::abi_decode_params(&constructor_args, true);
            let (implementation, admin, data) = match decoded {
                Ok(args) => args,
                Err(_) => {
                    state.mine(tx_hash, false /* success */, None);
                    return Ok(tx_hash);
                }
            };

            let has_code = state
                .accounts
                .get(&implementation)
                .is_some_and(|acct| !acct.code.is_empty());
            if !has_code {
                debug!("{}", NOT_A_CONTRACT_REASON);
                state.mine(tx_hash, false /* success */, None);
                return Ok(tx_hash);
            }

            account
                .storage
                .insert(PROXY_IMPLEMENTATION_STORAGE_SLOT, implementation.into_word());
            account.storage.insert(PROXY_ADMIN_STORAGE_SLOT, admin.into_word());
            if !data.is_empty() {
                account.initialized = true;
            }
        }

        let address = self.sender.create(nonce);
        state.accounts.insert(address, account);
        state.mine(tx_hash, true /* success */, Some(address));
        Ok(tx_hash)
    }

    async fn call_method(&self, to: Address, calldata: Bytes) -> Result<TxHash, DeployError> {
        let mut state = self.state();
        state.submissions.push(Submission::Call {
            to,
            calldata: calldata.clone(),
        });

        if state.take_fault(|f| matches!(f, Fault::RejectCall)).is_some() {
            let reason = format!("call to {to:#x} refused");
            return Err(ChainSubmissionError::new(SubmissionFailure::Rejected(reason)).into());
        }

        let (tx_hash, _) = state.next_tx(self.sender);
        debug!("dry-run call to {:#x} in {:#x}", to, tx_hash);

        if state.take_fault(|f| matches!(f, Fault::DropTransaction)).is_some() {
            return Ok(tx_hash);
        }
        if state.take_fault(|f| matches!(f, Fault::InitializedFirst)).is_some() {
            if let Some(acct) = state.accounts.get_mut(&to) {
                acct.initialized = true;
            }
        }
        if state.take_fault(|f| matches!(f, Fault::RevertCall)).is_some()
            || self.call_revert_reason(&state, to).is_some()
        {
            state.mine(tx_hash, false /* success */, None);
            return Ok(tx_hash);
        }

        if let Some(acct) = state.accounts.get_mut(&to) {
            if acct.proxy_admin().is_some() {
                acct.initialized = true;
                acct.init_calldata = Some(calldata);
            }
        }
        state.mine(tx_hash, true /* success */, None);
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<Receipt, DeployError> {
        match self.state().receipts.get(&tx_hash) {
            Some(receipt) => Ok(receipt.clone()),
            None => {
                let kind = SubmissionFailure::Timeout(DEFAULT_CONFIRMATION_TIMEOUT);
                Err(ChainSubmissionError::new(kind).with_tx_hash(tx_hash).into())
            }
        }
    }

    async fn simulate_call(&self, to: Address, _calldata: Bytes) -> Result<Bytes, DeployError> {
        let state = self.state();
        match self.call_revert_reason(&state, to) {
            Some(reason) => Err(revert(reason)),
            None => Ok(Bytes::new()),
        }
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, DeployError> {
        let value = self
            .state()
            .accounts
            .get(&address)
            .and_then(|acct| acct.storage.get(&slot).copied())
            .unwrap_or_default();

        Ok(value)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, DeployError> {
        let code = self
            .state()
            .accounts
            .get(&address)
            .map(|acct| acct.code.clone())
            .unwrap_or_default();

        Ok(code)
    }
}
