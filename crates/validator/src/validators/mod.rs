//! Validator families, one module per protocol surface.

mod contract;
mod erc20;
mod liquidity;
mod native;
mod nft;
mod query;
mod staking;
mod swap;
mod wbnb;

pub use contract::{
    ContractCallSimple, ContractCallWithParams, ContractCallWithValue, ContractDelegateCall,
    ContractPayableFallback,
};
pub use erc20::{
    Erc1363ApproveAndCall, Erc1363TransferAndCall, Erc20Approve, Erc20Burn,
    Erc20DecreaseAllowance, Erc20Flashloan, Erc20IncreaseAllowance, Erc20Permit,
    Erc20PermitAndTransferFrom, Erc20RevokeApproval, Erc20Transfer, Erc20TransferFrom,
    Erc20TransferMaxAmount, Erc20TransferPercentage,
};
pub use liquidity::{
    AddLiquidityBnbToken, AddLiquidityTokens, RemoveLiquidityBnbToken, RemoveLiquidityTokens,
};
pub use native::{
    BnbTransfer, BnbTransferMaxAmount, BnbTransferPercentage, BnbTransferToContract,
    BnbTransferWithMessage, TRANSFER_GAS,
};
pub use nft::{
    Erc1155SafeTransferWithData, Erc1155TransferSingle, Erc721Approve, Erc721SafeTransfer,
    Erc721SetApprovalForAll, Erc721Transfer,
};
pub use query::{
    QueryBnbBalance, QueryCurrentBlockNumber, QueryErc20Allowance, QueryErc20Balance,
    QueryGasPrice, QueryNftApprovalStatus, QueryNftBalance, QueryNftOwner, QueryNftTokenUri,
    QueryPairReserves, QueryPendingRewards, QueryStakedAmount, QuerySwapInputAmount,
    QuerySwapOutputAmount, QueryTokenMetadata, QueryTokenTotalSupply, QueryTransactionCountNonce,
};
pub use staking::{
    EmergencyWithdraw, HarvestRewards, StakeLpTokens, StakeSingleToken, UnstakeLpTokens,
};
pub use swap::{
    SwapExactBnbForTokens, SwapExactTokensForBnb, SwapExactTokensForTokens,
    SwapMultihopRouting, SwapTokensForExactTokens,
};
pub use wbnb::{WbnbDeposit, WbnbWithdraw};
