//! Definitions of errors that can occur during deployment and initialization of the contracts

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    time::Duration,
};

use alloy_primitives::{Address, Bytes, TxHash};

use crate::executor::DeployedModule;

/// Errors that can occur while resolving and executing a deployment plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// A plan, profile, or binding argument is malformed.
    /// Detected before any chain submission
    Configuration(String),
    /// An initializer argument tuple does not match the arity of the initializer
    ArgumentArity {
        /// The signature of the initializer being called
        initializer: &'static str,
        /// The number of arguments the initializer takes
        expected: usize,
        /// The number of arguments supplied
        actual: usize,
    },
    /// The network rejected a transaction, or a transaction reverted
    ChainSubmission(ChainSubmissionError),
    /// The proxy's initializer has already been consumed
    AlreadyInitialized {
        /// The proxy whose initializer was consumed
        proxy: Address,
    },
    /// A deployed module was moved through its lifecycle out of order
    InvalidTransition {
        /// The state the module was in
        from: &'static str,
        /// The state the module was moved to
        to: &'static str,
    },
}

impl DeployError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        DeployError::Configuration(msg.into())
    }

    /// Whether this error is a configuration error, i.e. one that is detected
    /// before anything is submitted to the chain
    pub fn is_configuration(&self) -> bool {
        matches!(self, DeployError::Configuration(_) | DeployError::ArgumentArity { .. })
    }

    /// The class of this error, as recorded on a failed module
    pub fn class(&self) -> ErrorClass {
        match self {
            DeployError::Configuration(_) | DeployError::InvalidTransition { .. } => {
                ErrorClass::Configuration
            }
            DeployError::ArgumentArity { .. } => ErrorClass::ArgumentArity,
            DeployError::ChainSubmission(_) => ErrorClass::ChainSubmission,
            DeployError::AlreadyInitialized { .. } => ErrorClass::AlreadyInitialized,
        }
    }
}

impl Display for DeployError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeployError::Configuration(s) => write!(f, "configuration error: {}", s),
            DeployError::ArgumentArity {
                initializer,
                expected,
                actual,
            } => write!(
                f,
                "argument arity error: `{}` takes {} arguments, got {}",
                initializer, expected, actual
            ),
            DeployError::ChainSubmission(e) => write!(f, "chain submission error: {}", e),
            DeployError::AlreadyInitialized { proxy } => {
                write!(f, "proxy {:#x} has already been initialized", proxy)
            }
            DeployError::InvalidTransition { from, to } => {
                write!(f, "invalid module transition: {} -> {}", from, to)
            }
        }
    }
}

impl Error for DeployError {}

impl From<ChainSubmissionError> for DeployError {
    fn from(e: ChainSubmissionError) -> Self {
        DeployError::ChainSubmission(e)
    }
}

/// The class of error that failed a deployment, recorded on the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// See [`DeployError::Configuration`]
    Configuration,
    /// See [`DeployError::ArgumentArity`]
    ArgumentArity,
    /// See [`DeployError::ChainSubmission`]
    ChainSubmission,
    /// See [`DeployError::AlreadyInitialized`]
    AlreadyInitialized,
}

impl Display for ErrorClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Configuration => write!(f, "ConfigurationError"),
            ErrorClass::ArgumentArity => write!(f, "ArgumentArityError"),
            ErrorClass::ChainSubmission => write!(f, "ChainSubmissionError"),
            ErrorClass::AlreadyInitialized => write!(f, "AlreadyInitializedError"),
        }
    }
}

/// An error interacting with the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSubmissionError {
    /// What went wrong
    pub kind: SubmissionFailure,
    /// The hash of the offending transaction, if one was broadcast
    pub tx_hash: Option<TxHash>,
}

impl ChainSubmissionError {
    /// An error for which no transaction hash is known
    pub fn new(kind: SubmissionFailure) -> Self {
        Self {
            kind,
            tx_hash: None,
        }
    }

    /// Attach the hash of the offending transaction
    pub fn with_tx_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    /// Shorthand for a transport error
    pub fn transport(e: impl Display) -> Self {
        Self::new(SubmissionFailure::Transport(e.to_string()))
    }

    /// Whether the error is a confirmation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, SubmissionFailure::Timeout(_))
    }
}

impl Display for ChainSubmissionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(tx_hash) = self.tx_hash {
            write!(f, " (tx {:#x})", tx_hash)?;
        }
        Ok(())
    }
}

impl Error for ChainSubmissionError {}

/// The ways in which a chain interaction can fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionFailure {
    /// The node refused the transaction, e.g. insufficient funds or a nonce conflict
    Rejected(String),
    /// The transaction, or its simulation, reverted
    Reverted {
        /// The decoded revert reason, if any
        reason: Option<String>,
        /// The raw revert data, if any
        data: Option<Bytes>,
    },
    /// No receipt was observed before the confirmation timeout elapsed
    Timeout(Duration),
    /// A request to the node failed
    Transport(String),
    /// The chain state following a confirmed transaction does not match what was requested
    UnexpectedState(String),
}

impl Display for SubmissionFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionFailure::Rejected(s) => write!(f, "transaction rejected: {}", s),
            SubmissionFailure::Reverted { reason, .. } => match reason {
                Some(reason) => write!(f, "transaction reverted: {}", reason),
                None => write!(f, "transaction reverted"),
            },
            SubmissionFailure::Timeout(d) => {
                write!(f, "no receipt after {}s", d.as_secs_f64())
            }
            SubmissionFailure::Transport(s) => write!(f, "transport error: {}", s),
            SubmissionFailure::UnexpectedState(s) => write!(f, "unexpected chain state: {}", s),
        }
    }
}

/// A failed deployment run, carrying whatever was produced before the failure
#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    /// The partially deployed module, in the `Failed` state
    pub module: DeployedModule,
    /// The error that stopped the run
    pub error: DeployError,
}

impl Display for ExecutionFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}; partial deployment: {}", self.error, self.module)
    }
}

impl From<DeployError> for ExecutionFailure {
    /// A failure before anything was deployed
    fn from(error: DeployError) -> Self {
        let mut module = DeployedModule::default();
        // An unstarted module can always fail
        let _ = module.fail(error.class());
        Self { module, error }
    }
}

impl Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}
