//! Implementations of the deploy script commands

use std::{fs, path::Path};

use alloy_primitives::Address;
use tracing::{info, warn};

use crate::{
    artifacts::ArtifactStore,
    chain::{
        memory::{InMemoryChain, DEV_ACCOUNT_0},
        rpc::RpcChainClient,
    },
    cli::{ChainArgs, DeployArgs, NetworkArgs, PlanArgs},
    errors::{DeployError, ExecutionFailure},
    executor::{execute, DeployedModule},
    network::{NetworkProfile, SignerCredential},
    plan::{resolve_plan, DeploymentPlan, PlanOverrides},
    utils::write_deployed_module,
};

/// Resolve the plan described by the arguments.
///
/// Values from the overrides file are layered under the command-line flags
pub fn load_plan(args: PlanArgs) -> Result<DeploymentPlan, DeployError> {
    let file_overrides = match &args.overrides {
        Some(path) => read_overrides(path)?,
        None => PlanOverrides::default(),
    };
    let overrides = file_overrides.merge(args.values.into());

    resolve_plan(args.family, &args.version, &overrides)
}

/// Parse a JSON overrides file
fn read_overrides(path: &Path) -> Result<PlanOverrides, DeployError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| DeployError::config(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| DeployError::config(format!("parsing {}: {e}", path.display())))
}

/// Print a resolved plan and its initializer calldata
pub fn show_plan(args: PlanArgs) -> Result<(), DeployError> {
    let plan = load_plan(args)?;
    let calldata = plan.initialize_calldata()?;

    print!("{plan}");
    println!("  calldata: {calldata}");
    Ok(())
}

/// Resolve a plan and execute it against the selected network, or against an
/// in-memory chain for a dry run
pub async fn deploy(
    args: DeployArgs,
    network_args: NetworkArgs,
    chain_args: ChainArgs,
) -> Result<DeployedModule, ExecutionFailure> {
    let plan = load_plan(args.plan)?;
    let profile = NetworkProfile::select(network_args.network, network_args.settings())?;

    let module = if args.dry_run {
        let chain = InMemoryChain::new(dry_run_sender(&profile));
        let module = execute(&plan, &chain, &profile).await?;

        println!("Dry run against {profile}, submitted:");
        for (i, submission) in chain.submissions().iter().enumerate() {
            println!("  {}. {}", i + 1, submission);
        }
        module
    } else {
        let artifacts = ArtifactStore::new(&chain_args.artifacts_dir);
        let client =
            RpcChainClient::connect(&profile, artifacts, chain_args.confirmation_policy()).await?;
        execute(&plan, &client, &profile).await?
    };

    if let Some(implementation) = module.implementation {
        println!("{} implementation deployed at {:#x}", plan.family(), implementation);
    }
    if let Some(proxy) = module.proxy {
        println!("{} proxy deployed at {:#x}", plan.family(), proxy);
    }

    match args.deployments_path {
        Some(_) if args.dry_run => warn!("dry run, not recording deployment"),
        Some(path) => {
            write_deployed_module(&path, profile.network(), plan.family(), &module).map_err(
                |error| ExecutionFailure {
                    module: module.clone(),
                    error,
                },
            )?;
            info!("recorded deployment in {}", path.display());
        }
        None => {}
    }

    Ok(module)
}

/// The account a dry run signs as
fn dry_run_sender(profile: &NetworkProfile) -> Address {
    match profile.signer() {
        SignerCredential::PrivateKey(signer) => signer.address(),
        SignerCredential::DevAccount(_) => DEV_ACCOUNT_0,
    }
}
