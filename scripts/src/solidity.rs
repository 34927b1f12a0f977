//! Definitions of Solidity functions called during deployment

use alloy_sol_types::{sol, sol_data};

sol! {
    /// `MarketPlace` as first released, taking only the wrapped CSB token
    interface IMarketPlaceV1 {
        function initialize(address wcsb) external;
    }

    /// `MarketPlace` once MIRA payments were added
    interface IMarketPlaceV2 {
        function initialize(address wcsb, address mira) external;
    }

    /// `MarketPlace` with an explicit business-logic admin
    interface IMarketPlaceV3 {
        function initialize(address wcsb, address mira, address admin) external;
    }

    /// `Swap` as deployed directly to the production chain
    interface ISwapV1 {
        function initialize(address wcsb, address mira, uint256 minCsb, uint256 minMira) external;
    }

    /// `Swap` as deployed behind the later proxies: no wcsb, trailing admin
    interface ISwapV2 {
        function initialize(address mira, uint256 minCsb, uint256 minMira, address admin) external;
    }

    /// OpenZeppelin v5 `Initializable` re-initialization error
    error InvalidInitialization();
}

/// The constructor arguments of `TransparentUpgradeableProxy`:
/// `(address _logic, address admin_, bytes _data)`
pub type ProxyConstructorArgs = (sol_data::Address, sol_data::Address, sol_data::Bytes);
