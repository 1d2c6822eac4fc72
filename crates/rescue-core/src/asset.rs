use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IERC721 {
        function transferFrom(address from, address to, uint256 tokenId) external;
    }
}

/// Encodes the call that moves one asset unit out of the compromised account.
pub trait AssetCallEncoder: Send + Sync {
    fn transfer_call(&self, from: Address, to: Address, unit: U256) -> Bytes;
}

/// `transferFrom(address,address,uint256)` of ERC-721 collections.
#[derive(Clone, Copy, Debug, Default)]
pub struct Erc721TransferEncoder;

impl AssetCallEncoder for Erc721TransferEncoder {
    fn transfer_call(&self, from: Address, to: Address, unit: U256) -> Bytes {
        IERC721::transferFromCall { from, to, tokenId: unit }.abi_encode().into()
    }
}
