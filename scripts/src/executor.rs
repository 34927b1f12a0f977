//! Drives a deployment plan through the chain client and the proxy binder,
//! strictly in order, and reports what was produced.

use std::fmt::{self, Display};

use alloy_primitives::{Address, Bytes, TxHash};
use tracing::{error, info};

use crate::{
    binder::ProxyBinder,
    chain::ChainClient,
    errors::{ChainSubmissionError, DeployError, ErrorClass, ExecutionFailure, SubmissionFailure},
    network::NetworkProfile,
    plan::DeploymentPlan,
};

/// The stage of a module's deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Nothing has been deployed
    Unstarted,
    /// The implementation is deployed and confirmed
    ImplementationDeployed,
    /// The proxy is deployed, bound, and confirmed
    ProxyDeployed,
    /// The initializer has been confirmed on the proxy
    Initialized,
    /// The run failed
    Failed {
        /// The last stage reached before the failure
        stage: FailedStage,
        /// The class of the error that failed the run
        class: ErrorClass,
    },
}

/// The non-terminal stage at which a module failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    /// Failed before the implementation was confirmed
    Unstarted,
    /// Failed before the proxy was confirmed
    ImplementationDeployed,
    /// Failed before the initializer was confirmed
    ProxyDeployed,
}

impl ModuleStatus {
    /// The name of the state, without its payload
    fn name(&self) -> &'static str {
        match self {
            ModuleStatus::Unstarted => "Unstarted",
            ModuleStatus::ImplementationDeployed => "ImplementationDeployed",
            ModuleStatus::ProxyDeployed => "ProxyDeployed",
            ModuleStatus::Initialized => "Initialized",
            ModuleStatus::Failed { .. } => "Failed",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleStatus::Initialized | ModuleStatus::Failed { .. })
    }
}

impl Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Failed { stage, class } => {
                write!(f, "Failed({class}) after {stage:?}")
            }
            other => write!(f, "{}", other.name()),
        }
    }
}

/// The on-chain result of a deployment run, complete or partial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedModule {
    /// The implementation contract, once confirmed
    pub implementation: Option<Address>,
    /// The proxy contract, once confirmed
    pub proxy: Option<Address>,
    /// The initializer transaction, once broadcast.
    /// Pending until the status reaches `Initialized`
    pub initialize_tx: Option<TxHash>,
    /// Where the module is in its lifecycle
    pub status: ModuleStatus,
}

impl Default for DeployedModule {
    fn default() -> Self {
        Self {
            implementation: None,
            proxy: None,
            initialize_tx: None,
            status: ModuleStatus::Unstarted,
        }
    }
}

impl DeployedModule {
    /// Record the confirmed implementation
    pub fn implementation_deployed(&mut self, implementation: Address) -> Result<(), DeployError> {
        self.transition(ModuleStatus::Unstarted, ModuleStatus::ImplementationDeployed)?;
        self.implementation = Some(implementation);
        Ok(())
    }

    /// Record the confirmed proxy
    pub fn proxy_deployed(&mut self, proxy: Address) -> Result<(), DeployError> {
        self.transition(ModuleStatus::ImplementationDeployed, ModuleStatus::ProxyDeployed)?;
        self.proxy = Some(proxy);
        Ok(())
    }

    /// Record the confirmed initializer transaction
    pub fn initialized(&mut self, tx_hash: TxHash) -> Result<(), DeployError> {
        self.transition(ModuleStatus::ProxyDeployed, ModuleStatus::Initialized)?;
        self.initialize_tx = Some(tx_hash);
        Ok(())
    }

    /// Move the module to `Failed`, from any non-terminal state
    pub fn fail(&mut self, class: ErrorClass) -> Result<(), DeployError> {
        let stage = match self.status {
            ModuleStatus::Unstarted => FailedStage::Unstarted,
            ModuleStatus::ImplementationDeployed => FailedStage::ImplementationDeployed,
            ModuleStatus::ProxyDeployed => FailedStage::ProxyDeployed,
            terminal => {
                return Err(DeployError::InvalidTransition {
                    from: terminal.name(),
                    to: "Failed",
                })
            }
        };

        self.status = ModuleStatus::Failed { stage, class };
        Ok(())
    }

    /// Move from `from` to `to`, failing if the module is not in `from`
    fn transition(&mut self, from: ModuleStatus, to: ModuleStatus) -> Result<(), DeployError> {
        if self.status != from {
            return Err(DeployError::InvalidTransition {
                from: self.status.name(),
                to: to.name(),
            });
        }

        self.status = to;
        Ok(())
    }
}

impl Display for DeployedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status: {}", self.status)?;
        match self.implementation {
            Some(addr) => write!(f, ", implementation: {addr:#x}")?,
            None => write!(f, ", implementation: none")?,
        }
        match self.proxy {
            Some(addr) => write!(f, ", proxy: {addr:#x}")?,
            None => write!(f, ", proxy: none")?,
        }
        if let Some(tx) = self.initialize_tx {
            write!(f, ", initialize tx: {tx:#x}")?;
        }
        Ok(())
    }
}

/// Execute a deployment plan.
///
/// Performs, in order: deploy the implementation (or adopt the plan's
/// existing one), deploy and bind the proxy, and call the initializer, each
/// confirmed before the next begins. Any failure aborts the run and returns
/// the partial module alongside the error; nothing is retried
pub async fn execute<C: ChainClient>(
    plan: &DeploymentPlan,
    client: &C,
    profile: &NetworkProfile,
) -> Result<DeployedModule, ExecutionFailure> {
    let mut module = DeployedModule::default();
    info!(
        "deploying {} {} to {} from {:#x}",
        plan.family(),
        plan.version_tag(),
        profile,
        client.sender()
    );

    match run(plan, client, &mut module).await {
        Ok(()) => {
            info!("deployment complete: {}", module);
            Ok(module)
        }
        Err(error) => {
            // A failure while recording a failure means the module was
            // already terminal; its state is reported as-is
            let _ = module.fail(error.class());
            error!("deployment failed: {}", error);
            Err(ExecutionFailure { module, error })
        }
    }
}

/// The ordered steps of a deployment, recording progress on `module`
async fn run<C: ChainClient>(
    plan: &DeploymentPlan,
    client: &C,
    module: &mut DeployedModule,
) -> Result<(), DeployError> {
    let family = plan.family();
    // Encode up front so malformed arguments fail before anything is submitted
    plan.initialize_calldata()?;

    // Step 1: the implementation
    let implementation = match plan.existing_implementation {
        Some(implementation) => {
            let code = client.code_at(implementation).await?;
            if code.is_empty() {
                return Err(DeployError::config(format!(
                    "no contract deployed at existing implementation {implementation:#x}"
                )));
            }
            info!("using existing {} implementation at {:#x}", family, implementation);
            implementation
        }
        None => {
            let tx_hash = client
                .deploy_contract(family.contract_name(), Bytes::new())
                .await?;
            let receipt = client.wait_for_confirmation(tx_hash).await?;
            if !receipt.success {
                let kind = SubmissionFailure::Reverted {
                    reason: None,
                    data: None,
                };
                return Err(ChainSubmissionError::new(kind).with_tx_hash(tx_hash).into());
            }

            let implementation = receipt.contract_address.ok_or_else(|| {
                ChainSubmissionError::new(SubmissionFailure::UnexpectedState(
                    "implementation receipt has no contract address".to_string(),
                ))
                .with_tx_hash(tx_hash)
            })?;
            info!("{} implementation deployed at {:#x}", family, implementation);
            implementation
        }
    };
    module.implementation_deployed(implementation)?;

    // Step 2: the proxy, with empty constructor data so the initializer is
    // left for step 3
    let binder = ProxyBinder::new(client);
    let proxy = binder.bind(implementation, plan.proxy_admin, Bytes::new()).await?;
    module.proxy_deployed(proxy)?;

    // Step 3: the initializer
    let tx_hash = binder
        .initialize(proxy, plan.initializer, &plan.init_args)
        .await?;
    module.initialized(tx_hash)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, b256};

    use super::*;

    const IMPLEMENTATION: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");
    const PROXY: Address = address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512");

    #[test]
    fn test_happy_path_transitions() {
        let mut module = DeployedModule::default();
        module.implementation_deployed(IMPLEMENTATION).unwrap();
        module.proxy_deployed(PROXY).unwrap();
        module.initialized(TxHash::ZERO).unwrap();
        assert_eq!(module.status, ModuleStatus::Initialized);
        assert!(module.status.is_terminal());
    }

    #[test]
    fn test_no_skipped_states() {
        let mut module = DeployedModule::default();
        let err = module.proxy_deployed(PROXY).unwrap_err();
        assert_eq!(
            err,
            DeployError::InvalidTransition {
                from: "Unstarted",
                to: "ProxyDeployed",
            }
        );
        assert_eq!(module.proxy, None);

        module.implementation_deployed(IMPLEMENTATION).unwrap();
        assert!(module.initialized(TxHash::ZERO).is_err());
        assert!(module.implementation_deployed(IMPLEMENTATION).is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut module = DeployedModule::default();
        module.implementation_deployed(IMPLEMENTATION).unwrap();
        module.fail(ErrorClass::ChainSubmission).unwrap();
        assert_eq!(
            module.status,
            ModuleStatus::Failed {
                stage: FailedStage::ImplementationDeployed,
                class: ErrorClass::ChainSubmission,
            }
        );

        assert!(module.fail(ErrorClass::Configuration).is_err());
        assert!(module.proxy_deployed(PROXY).is_err());
        assert_eq!(module.implementation, Some(IMPLEMENTATION));
    }

    #[test]
    fn test_display_partial_module() {
        let mut module = DeployedModule::default();
        module.implementation_deployed(IMPLEMENTATION).unwrap();
        module.fail(ErrorClass::ChainSubmission).unwrap();

        let s = module.to_string();
        assert!(s.contains("Failed(ChainSubmissionError)"));
        assert!(s.contains("0x5fbdb2315678afecb367f032d93f642f64180aa3"));
        assert!(s.contains("proxy: none"));

        module.initialize_tx =
            Some(b256!("0000000000000000000000000000000000000000000000000000000000000001"));
        assert!(module.to_string().contains("initialize tx"));
    }
}
