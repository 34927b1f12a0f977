//! Deployment plans: the versioned recipe describing which implementation to
//! deploy, who administers its proxy, and the exact argument tuple its
//! initializer takes.
//!
//! Initializer shapes are keyed strictly on the version tag. Two versions may
//! share an arity while ordering their slots differently (`Swap` v1 and v2),
//! so the argument count alone never identifies a version.

use std::fmt::{self, Display};

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use clap::ValueEnum;
use itertools::Itertools;
use serde::Deserialize;
use tracing::warn;

use crate::{
    constants::{MARKETPLACE_CONTRACT_NAME, SWAP_CONTRACT_NAME},
    errors::DeployError,
    solidity::{IMarketPlaceV1, IMarketPlaceV2, IMarketPlaceV3, ISwapV1, ISwapV2},
    units::{format_threshold, parse_threshold},
    utils::parse_address,
};

// ------------
// | Families |
// ------------

/// The upgradeable contract families that can be deployed
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContractFamily {
    /// The marketplace contract
    #[value(name = "marketplace")]
    MarketPlace,
    /// The token swap contract
    Swap,
}

impl ContractFamily {
    /// The name of the implementation contract's artifact
    pub fn contract_name(&self) -> &'static str {
        match self {
            ContractFamily::MarketPlace => MARKETPLACE_CONTRACT_NAME,
            ContractFamily::Swap => SWAP_CONTRACT_NAME,
        }
    }

    /// The prefix of this family's keys in the deployments file
    pub fn deployment_key(&self) -> &'static str {
        match self {
            ContractFamily::MarketPlace => "marketplace",
            ContractFamily::Swap => "swap",
        }
    }

    /// The initializer versions released for this family
    pub fn initializers(&self) -> &'static [Initializer] {
        match self {
            ContractFamily::MarketPlace => &[
                Initializer::MarketPlaceV1,
                Initializer::MarketPlaceV2,
                Initializer::MarketPlaceV3,
            ],
            ContractFamily::Swap => &[Initializer::SwapV1, Initializer::SwapV2],
        }
    }
}

impl Display for ContractFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.contract_name())
    }
}

// -------------------------
// | Initializer Arguments |
// -------------------------

/// The semantic role of an initializer slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamRole {
    /// The wrapped CSB token address
    Wcsb,
    /// The MIRA governance token address
    Mira,
    /// The minimum swap-in threshold, in the smallest denomination of CSB
    MinCsb,
    /// The minimum swap-out threshold, in the smallest denomination of MIRA
    MinMira,
    /// The contract's business-logic admin, distinct from the proxy admin
    Admin,
}

impl ParamRole {
    /// The kind of value that fills this slot
    pub fn kind(&self) -> ArgKind {
        match self {
            ParamRole::Wcsb | ParamRole::Mira | ParamRole::Admin => ArgKind::Address,
            ParamRole::MinCsb | ParamRole::MinMira => ArgKind::Amount,
        }
    }

    /// The name of the override that fills this slot
    pub fn override_key(&self) -> &'static str {
        match self {
            ParamRole::Wcsb => "wcsb",
            ParamRole::Mira => "mira",
            ParamRole::MinCsb => "min_csb",
            ParamRole::MinMira => "min_mira",
            ParamRole::Admin => "admin",
        }
    }
}

/// The kind of value an initializer slot holds
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// An address
    Address,
    /// A fixed-point token amount
    Amount,
}

/// A single initializer argument
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitArg {
    /// An address argument
    Address(Address),
    /// An amount in the token's smallest denomination
    Amount(U256),
}

impl InitArg {
    /// The kind of this argument
    pub fn kind(&self) -> ArgKind {
        match self {
            InitArg::Address(_) => ArgKind::Address,
            InitArg::Amount(_) => ArgKind::Amount,
        }
    }
}

impl Display for InitArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitArg::Address(a) => write!(f, "{a:#x}"),
            InitArg::Amount(v) => write!(f, "{} ({})", v, format_threshold(*v)),
        }
    }
}

// ----------------
// | Initializers |
// ----------------

/// Every released initializer, one per (family, version) pair
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Initializer {
    /// `MarketPlace.initialize(wcsb)`
    MarketPlaceV1,
    /// `MarketPlace.initialize(wcsb, mira)`
    MarketPlaceV2,
    /// `MarketPlace.initialize(wcsb, mira, admin)`
    MarketPlaceV3,
    /// `Swap.initialize(wcsb, mira, minCsb, minMira)`
    SwapV1,
    /// `Swap.initialize(mira, minCsb, minMira, admin)`
    SwapV2,
}

impl Initializer {
    /// Look up the initializer for a family's version tag
    pub fn lookup(family: ContractFamily, version_tag: &str) -> Result<Self, DeployError> {
        family
            .initializers()
            .iter()
            .find(|init| init.version_tag() == version_tag)
            .copied()
            .ok_or_else(|| {
                let known = family.initializers().iter().map(Initializer::version_tag).join(", ");
                DeployError::config(format!(
                    "unknown {family} version `{version_tag}` (known: {known})"
                ))
            })
    }

    /// The family this initializer belongs to
    pub fn family(&self) -> ContractFamily {
        match self {
            Initializer::MarketPlaceV1 | Initializer::MarketPlaceV2 | Initializer::MarketPlaceV3 => {
                ContractFamily::MarketPlace
            }
            Initializer::SwapV1 | Initializer::SwapV2 => ContractFamily::Swap,
        }
    }

    /// The version tag this initializer is released under
    pub fn version_tag(&self) -> &'static str {
        match self {
            Initializer::MarketPlaceV1 | Initializer::SwapV1 => "v1",
            Initializer::MarketPlaceV2 | Initializer::SwapV2 => "v2",
            Initializer::MarketPlaceV3 => "v3",
        }
    }

    /// The ordered slots of the initializer
    pub fn params(&self) -> &'static [ParamRole] {
        use ParamRole::*;
        match self {
            Initializer::MarketPlaceV1 => &[Wcsb],
            Initializer::MarketPlaceV2 => &[Wcsb, Mira],
            Initializer::MarketPlaceV3 => &[Wcsb, Mira, Admin],
            Initializer::SwapV1 => &[Wcsb, Mira, MinCsb, MinMira],
            Initializer::SwapV2 => &[Mira, MinCsb, MinMira, Admin],
        }
    }

    /// The number of arguments the initializer takes
    pub fn arity(&self) -> usize {
        self.params().len()
    }

    /// The Solidity signature of the initializer
    pub fn signature(&self) -> &'static str {
        match self {
            Initializer::MarketPlaceV1 => IMarketPlaceV1::initializeCall::SIGNATURE,
            Initializer::MarketPlaceV2 => IMarketPlaceV2::initializeCall::SIGNATURE,
            Initializer::MarketPlaceV3 => IMarketPlaceV3::initializeCall::SIGNATURE,
            Initializer::SwapV1 => ISwapV1::initializeCall::SIGNATURE,
            Initializer::SwapV2 => ISwapV2::initializeCall::SIGNATURE,
        }
    }

    /// Check an argument tuple against the initializer's slots
    pub fn check_args(&self, args: &[InitArg]) -> Result<(), DeployError> {
        if args.len() != self.arity() {
            return Err(DeployError::ArgumentArity {
                initializer: self.signature(),
                expected: self.arity(),
                actual: args.len(),
            });
        }

        for (i, (role, arg)) in self.params().iter().zip(args).enumerate() {
            if role.kind() != arg.kind() {
                return Err(DeployError::config(format!(
                    "argument {i} of `{}` ({}) expects {:?}, got {:?}",
                    self.signature(),
                    role.override_key(),
                    role.kind(),
                    arg.kind()
                )));
            }
        }

        Ok(())
    }

    /// Prepare calldata for the initializer with the given arguments
    pub fn encode(&self, args: &[InitArg]) -> Result<Bytes, DeployError> {
        self.check_args(args)?;

        let calldata = match self {
            Initializer::MarketPlaceV1 => IMarketPlaceV1::initializeCall {
                wcsb: address_at(args, 0)?,
            }
            .abi_encode(),
            Initializer::MarketPlaceV2 => IMarketPlaceV2::initializeCall {
                wcsb: address_at(args, 0)?,
                mira: address_at(args, 1)?,
            }
            .abi_encode(),
            Initializer::MarketPlaceV3 => IMarketPlaceV3::initializeCall {
                wcsb: address_at(args, 0)?,
                mira: address_at(args, 1)?,
                admin: address_at(args, 2)?,
            }
            .abi_encode(),
            Initializer::SwapV1 => ISwapV1::initializeCall {
                wcsb: address_at(args, 0)?,
                mira: address_at(args, 1)?,
                minCsb: amount_at(args, 2)?,
                minMira: amount_at(args, 3)?,
            }
            .abi_encode(),
            Initializer::SwapV2 => ISwapV2::initializeCall {
                mira: address_at(args, 0)?,
                minCsb: amount_at(args, 1)?,
                minMira: amount_at(args, 2)?,
                admin: address_at(args, 3)?,
            }
            .abi_encode(),
        };

        Ok(calldata.into())
    }
}

impl Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.family(), self.version_tag(), self.signature())
    }
}

/// The address in slot `i`
fn address_at(args: &[InitArg], i: usize) -> Result<Address, DeployError> {
    match args.get(i) {
        Some(InitArg::Address(a)) => Ok(*a),
        _ => Err(DeployError::config(format!("argument {i} is not an address"))),
    }
}

/// The amount in slot `i`
fn amount_at(args: &[InitArg], i: usize) -> Result<U256, DeployError> {
    match args.get(i) {
        Some(InitArg::Amount(v)) => Ok(*v),
        _ => Err(DeployError::config(format!("argument {i} is not an amount"))),
    }
}

// -------------
// | Overrides |
// -------------

/// The per-environment values a plan is resolved from.
///
/// Addresses are hex strings; thresholds are decimal strings in whole tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanOverrides {
    /// The proxy admin, authorized to upgrade the proxy
    pub proxy_admin: Option<String>,
    /// The contract's business-logic admin
    pub admin: Option<String>,
    /// The wrapped CSB token
    pub wcsb: Option<String>,
    /// The MIRA token
    pub mira: Option<String>,
    /// The minimum CSB threshold, e.g. `"0.1"`
    pub min_csb: Option<String>,
    /// The minimum MIRA threshold, e.g. `"100"`
    pub min_mira: Option<String>,
    /// An already-deployed implementation to bind instead of deploying a new one
    pub implementation: Option<String>,
}

impl PlanOverrides {
    /// Layer `other` on top of `self`; values set in `other` win
    pub fn merge(self, other: PlanOverrides) -> PlanOverrides {
        PlanOverrides {
            proxy_admin: other.proxy_admin.or(self.proxy_admin),
            admin: other.admin.or(self.admin),
            wcsb: other.wcsb.or(self.wcsb),
            mira: other.mira.or(self.mira),
            min_csb: other.min_csb.or(self.min_csb),
            min_mira: other.min_mira.or(self.min_mira),
            implementation: other.implementation.or(self.implementation),
        }
    }

    /// The raw value supplied for a slot
    fn get(&self, role: ParamRole) -> Option<&str> {
        match role {
            ParamRole::Wcsb => self.wcsb.as_deref(),
            ParamRole::Mira => self.mira.as_deref(),
            ParamRole::MinCsb => self.min_csb.as_deref(),
            ParamRole::MinMira => self.min_mira.as_deref(),
            ParamRole::Admin => self.admin.as_deref(),
        }
    }

    /// Resolve the argument for a slot
    fn resolve(&self, role: ParamRole) -> Result<InitArg, DeployError> {
        let key = role.override_key();
        let value = self
            .get(role)
            .ok_or_else(|| DeployError::config(format!("missing required override `{key}`")))?;

        match role.kind() {
            ArgKind::Address => parse_address(key, value).map(InitArg::Address),
            ArgKind::Amount => parse_threshold(value).map(InitArg::Amount),
        }
    }
}

// ---------
// | Plans |
// ---------

/// A fully resolved deployment plan.
///
/// One plan produces exactly one (implementation, proxy) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// The initializer, and through it the family and version, to deploy
    pub initializer: Initializer,
    /// The proxy admin
    pub proxy_admin: Address,
    /// The initializer arguments, in slot order
    pub init_args: Vec<InitArg>,
    /// An already-deployed implementation to bind instead of deploying a new one
    pub existing_implementation: Option<Address>,
}

impl DeploymentPlan {
    /// The contract family being deployed
    pub fn family(&self) -> ContractFamily {
        self.initializer.family()
    }

    /// The version tag being deployed
    pub fn version_tag(&self) -> &'static str {
        self.initializer.version_tag()
    }

    /// Calldata for the initializer call
    pub fn initialize_calldata(&self) -> Result<Bytes, DeployError> {
        self.initializer.encode(&self.init_args)
    }
}

impl Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.initializer)?;
        writeln!(f, "  proxy admin: {:#x}", self.proxy_admin)?;
        if let Some(implementation) = self.existing_implementation {
            writeln!(f, "  implementation (existing): {implementation:#x}")?;
        }
        for (role, arg) in self.initializer.params().iter().zip(&self.init_args) {
            writeln!(f, "  {}: {}", role.override_key(), arg)?;
        }
        Ok(())
    }
}

/// Resolve a deployment plan for a family and version from the given overrides.
///
/// Pure: nothing is read from the environment or the chain
pub fn resolve_plan(
    family: ContractFamily,
    version_tag: &str,
    overrides: &PlanOverrides,
) -> Result<DeploymentPlan, DeployError> {
    let initializer = Initializer::lookup(family, version_tag)?;

    let proxy_admin = overrides
        .proxy_admin
        .as_deref()
        .ok_or_else(|| DeployError::config("missing required override `proxy_admin`"))
        .and_then(|value| parse_address("proxy_admin", value))?;

    let init_args = initializer
        .params()
        .iter()
        .map(|role| overrides.resolve(*role))
        .collect::<Result<Vec<_>, _>>()?;

    let existing_implementation = overrides
        .implementation
        .as_deref()
        .map(|value| parse_address("implementation", value))
        .transpose()?;
    if existing_implementation == Some(proxy_admin) {
        return Err(DeployError::config(
            "proxy admin must differ from the implementation address",
        ));
    }

    let used = initializer.params();
    for role in [
        ParamRole::Wcsb,
        ParamRole::Mira,
        ParamRole::MinCsb,
        ParamRole::MinMira,
        ParamRole::Admin,
    ] {
        if overrides.get(role).is_some() && !used.contains(&role) {
            warn!(
                "override `{}` is not used by {} {}",
                role.override_key(),
                family,
                version_tag
            );
        }
    }

    Ok(DeploymentPlan {
        initializer,
        proxy_admin,
        init_args,
        existing_implementation,
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, U256};
    use alloy_sol_types::SolCall;

    use super::*;

    const PROXY_ADMIN: &str = "0xc72ce0090718502f08506c4592f18f13094d4ce3";
    const ADMIN: &str = "0x4bce096f44b90b812420637068dc215c1c3c8b54";
    const WCSB: &str = "0xff823b6138089bea84e8d67fcb68f786e7feb118";
    const MIRA: &str = "0xafb95cc0bd320648b3e8df6223d9cdd05ebedc64";

    /// Overrides covering every slot of every version
    fn full_overrides() -> PlanOverrides {
        PlanOverrides {
            proxy_admin: Some(PROXY_ADMIN.to_string()),
            admin: Some(ADMIN.to_string()),
            wcsb: Some(WCSB.to_string()),
            mira: Some(MIRA.to_string()),
            min_csb: Some("10".to_string()),
            min_mira: Some("100".to_string()),
            implementation: None,
        }
    }

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    #[test]
    fn test_every_version_matches_initializer_arity() {
        let overrides = full_overrides();
        for family in [ContractFamily::MarketPlace, ContractFamily::Swap] {
            for init in family.initializers() {
                let plan = resolve_plan(family, init.version_tag(), &overrides).unwrap();
                assert_eq!(plan.initializer, *init);
                assert_eq!(plan.init_args.len(), init.arity());
                plan.initialize_calldata().unwrap();
            }
        }
    }

    #[test]
    fn test_marketplace_argument_growth() {
        let overrides = full_overrides();
        let arities = ["v1", "v2", "v3"]
            .iter()
            .map(|tag| resolve_plan(ContractFamily::MarketPlace, tag, &overrides).unwrap())
            .map(|plan| plan.init_args.len())
            .collect::<Vec<_>>();
        assert_eq!(arities, vec![1, 2, 3]);
    }

    #[test]
    fn test_swap_versions_differ_in_order_not_arity() {
        let overrides = full_overrides();
        let v1 = resolve_plan(ContractFamily::Swap, "v1", &overrides).unwrap();
        let v2 = resolve_plan(ContractFamily::Swap, "v2", &overrides).unwrap();
        assert_eq!(v1.init_args.len(), v2.init_args.len());

        let v1_call =
            ISwapV1::initializeCall::abi_decode(&v1.initialize_calldata().unwrap(), true).unwrap();
        assert_eq!(v1_call.wcsb, address!("ff823b6138089bea84e8d67fcb68f786e7feb118"));
        assert_eq!(v1_call.mira, address!("afb95cc0bd320648b3e8df6223d9cdd05ebedc64"));
        assert_eq!(v1_call.minCsb, ether(10));
        assert_eq!(v1_call.minMira, ether(100));

        let v2_call =
            ISwapV2::initializeCall::abi_decode(&v2.initialize_calldata().unwrap(), true).unwrap();
        assert_eq!(v2_call.mira, address!("afb95cc0bd320648b3e8df6223d9cdd05ebedc64"));
        assert_eq!(v2_call.minCsb, ether(10));
        assert_eq!(v2_call.minMira, ether(100));
        assert_eq!(v2_call.admin, address!("4bce096f44b90b812420637068dc215c1c3c8b54"));

        // Distinct signatures, so a v1 tuple can never be submitted as v2
        assert_ne!(ISwapV1::initializeCall::SELECTOR, ISwapV2::initializeCall::SELECTOR);
    }

    #[test]
    fn test_unknown_version() {
        let err = resolve_plan(ContractFamily::Swap, "v-unknown", &full_overrides()).unwrap_err();
        assert!(err.is_configuration());

        // `v3` only exists for the marketplace
        assert!(resolve_plan(ContractFamily::Swap, "v3", &full_overrides()).is_err());
    }

    #[test]
    fn test_missing_override() {
        let overrides = PlanOverrides {
            min_mira: None,
            ..full_overrides()
        };
        let err = resolve_plan(ContractFamily::Swap, "v1", &overrides).unwrap_err();
        assert!(err.to_string().contains("min_mira"));

        // Not needed by the marketplace
        resolve_plan(ContractFamily::MarketPlace, "v2", &overrides).unwrap();
    }

    #[test]
    fn test_missing_proxy_admin() {
        let overrides = PlanOverrides {
            proxy_admin: None,
            ..full_overrides()
        };
        let err = resolve_plan(ContractFamily::MarketPlace, "v1", &overrides).unwrap_err();
        assert!(err.to_string().contains("proxy_admin"));
    }

    #[test]
    fn test_malformed_overrides() {
        let bad_address = PlanOverrides {
            wcsb: Some("0xnot-an-address".to_string()),
            ..full_overrides()
        };
        assert!(resolve_plan(ContractFamily::MarketPlace, "v1", &bad_address).is_err());

        let negative = PlanOverrides {
            min_csb: Some("-10".to_string()),
            ..full_overrides()
        };
        assert!(resolve_plan(ContractFamily::Swap, "v2", &negative).is_err());
    }

    #[test]
    fn test_existing_implementation_must_not_be_admin() {
        let overrides = PlanOverrides {
            implementation: Some(PROXY_ADMIN.to_string()),
            ..full_overrides()
        };
        let err = resolve_plan(ContractFamily::Swap, "v1", &overrides).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let args = vec![InitArg::Address(address!("ff823b6138089bea84e8d67fcb68f786e7feb118"))];
        let err = Initializer::SwapV1.encode(&args).unwrap_err();
        assert_eq!(
            err,
            DeployError::ArgumentArity {
                initializer: "initialize(address,address,uint256,uint256)",
                expected: 4,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let a = InitArg::Address(address!("ff823b6138089bea84e8d67fcb68f786e7feb118"));
        let v = InitArg::Amount(ether(1));
        // v1 ordering fed to the v2 initializer
        let err = Initializer::SwapV2.encode(&[a, a, v, v]).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn test_merge_prefers_later_values() {
        let base = full_overrides();
        let cli = PlanOverrides {
            min_csb: Some("0.1".to_string()),
            ..Default::default()
        };
        let merged = base.merge(cli);
        assert_eq!(merged.min_csb.as_deref(), Some("0.1"));
        assert_eq!(merged.wcsb.as_deref(), Some(WCSB));
    }

    #[test]
    fn test_overrides_from_json() {
        let json = r#"{ "proxy_admin": "0xc72ce0090718502f08506c4592f18f13094d4ce3", "min_csb": "0.1" }"#;
        let overrides: PlanOverrides = serde_json::from_str(json).unwrap();
        assert_eq!(overrides.min_csb.as_deref(), Some("0.1"));

        let typo = r#"{ "minCsb": "0.1" }"#;
        assert!(serde_json::from_str::<PlanOverrides>(typo).is_err());
    }
}
