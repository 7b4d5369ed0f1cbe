//! Task identifiers and the factory mapping them to validators.

use alloy_primitives::Address;
use quest_types::{ContractKey, ContractRegistry};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use crate::{
    engine::{Rules, Validator},
    params::Params,
    result::PassRule,
    validators::*,
    ValidatorError,
};

/// Protocol surface a task exercises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Plain BNB transfers.
    Native,
    /// ERC20 and its extensions.
    Erc20,
    /// ERC721 and ERC1155.
    Nft,
    /// Wrapping and unwrapping BNB.
    Wbnb,
    /// Calls into the fixture contracts.
    Contract,
    /// PancakeSwap router swaps.
    Swap,
    /// PancakeSwap liquidity.
    Liquidity,
    /// Staking pools.
    Staking,
    /// Read-only queries.
    Query,
}

/// Every task the engine can judge.
///
/// The string form is the task id used in task definitions and case files.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[allow(missing_docs)]
pub enum TaskId {
    #[strum(to_string = "bnb_transfer_basic", serialize = "bnb_transfer")]
    BnbTransferBasic,
    BnbTransferPercentage,
    BnbTransferWithMessage,
    BnbTransferMaxAmount,
    BnbTransferToContract,
    #[strum(to_string = "erc20_transfer_fixed", serialize = "erc20_transfer")]
    Erc20TransferFixed,
    Erc20TransferPercentage,
    Erc20Approve,
    Erc20IncreaseAllowance,
    Erc20DecreaseAllowance,
    Erc20Burn,
    Erc20RevokeApproval,
    Erc20TransferMaxAmount,
    #[strum(to_string = "erc20_transfer_with_callback_1363")]
    Erc20TransferWithCallback1363,
    #[strum(to_string = "erc20_approve_and_call_1363")]
    Erc20ApproveAndCall1363,
    Erc20PermitAndTransferfrom,
    Erc20Permit,
    Erc20Flashloan,
    Erc20TransferfromBasic,
    Erc721Transfer,
    Erc721SafeTransfer,
    Erc721Approve,
    Erc721SetApprovalForAll,
    Erc1155TransferSingle,
    Erc1155SafeTransferWithData,
    WbnbDeposit,
    WbnbWithdraw,
    ContractCallSimple,
    ContractCallWithValue,
    ContractCallWithParams,
    ContractDelegateCall,
    ContractPayableFallback,
    SwapExactBnbForTokens,
    SwapExactTokensForBnb,
    SwapExactTokensForTokens,
    SwapTokensForExactTokens,
    SwapMultihopRouting,
    AddLiquidityBnbToken,
    AddLiquidityTokens,
    RemoveLiquidityTokens,
    RemoveLiquidityBnbToken,
    StakeSingleToken,
    StakeLpTokens,
    UnstakeLpTokens,
    HarvestRewards,
    EmergencyWithdraw,
    QueryBnbBalance,
    QueryErc20Balance,
    QueryErc20Allowance,
    QueryNftOwner,
    QueryNftBalance,
    QueryTokenTotalSupply,
    QueryStakedAmount,
    QueryPendingRewards,
    QueryTransactionCountNonce,
    QueryNftApprovalStatus,
    QueryPairReserves,
    QuerySwapOutputAmount,
    QuerySwapInputAmount,
    QueryTokenMetadata,
    QueryNftTokenUri,
    QueryCurrentBlockNumber,
    QueryGasPrice,
}

macro_rules! task_table {
    ($($variant:ident => $validator:ty, $category:ident;)*) => {
        impl TaskId {
            /// Protocol surface of this task.
            pub const fn category(self) -> TaskCategory {
                match self {
                    $(Self::$variant => TaskCategory::$category,)*
                }
            }

            /// Pass flag convention of this task's validator.
            pub fn pass_rule(self) -> PassRule {
                match self {
                    $(Self::$variant => <$validator as Rules>::RULES.pass,)*
                }
            }

            /// `(name, weight)` of every check in evaluation order.
            pub fn weights(self) -> Vec<(&'static str, u32)> {
                match self {
                    $(Self::$variant => <$validator as Rules>::RULES.weights(),)*
                }
            }

            /// Builds the validator from generated parameters.
            pub fn build(self, params: &Params) -> Result<Box<dyn Validator>, ValidatorError> {
                debug!(task = %self, "building validator");
                Ok(match self {
                    $(Self::$variant => Box::new(<$validator as Rules>::from_params(params)?),)*
                })
            }

            /// Task id each validator type reports, for consistency checks.
            #[cfg(test)]
            fn declared(self) -> TaskId {
                match self {
                    $(Self::$variant => <$validator as Rules>::TASK,)*
                }
            }
        }
    };
}

task_table! {
    BnbTransferBasic => BnbTransfer, Native;
    BnbTransferPercentage => BnbTransferPercentage, Native;
    BnbTransferWithMessage => BnbTransferWithMessage, Native;
    BnbTransferMaxAmount => BnbTransferMaxAmount, Native;
    BnbTransferToContract => BnbTransferToContract, Native;
    Erc20TransferFixed => Erc20Transfer, Erc20;
    Erc20TransferPercentage => Erc20TransferPercentage, Erc20;
    Erc20Approve => Erc20Approve, Erc20;
    Erc20IncreaseAllowance => Erc20IncreaseAllowance, Erc20;
    Erc20DecreaseAllowance => Erc20DecreaseAllowance, Erc20;
    Erc20Burn => Erc20Burn, Erc20;
    Erc20RevokeApproval => Erc20RevokeApproval, Erc20;
    Erc20TransferMaxAmount => Erc20TransferMaxAmount, Erc20;
    Erc20TransferWithCallback1363 => Erc1363TransferAndCall, Erc20;
    Erc20ApproveAndCall1363 => Erc1363ApproveAndCall, Erc20;
    Erc20PermitAndTransferfrom => Erc20PermitAndTransferFrom, Erc20;
    Erc20Permit => Erc20Permit, Erc20;
    Erc20Flashloan => Erc20Flashloan, Erc20;
    Erc20TransferfromBasic => Erc20TransferFrom, Erc20;
    Erc721Transfer => Erc721Transfer, Nft;
    Erc721SafeTransfer => Erc721SafeTransfer, Nft;
    Erc721Approve => Erc721Approve, Nft;
    Erc721SetApprovalForAll => Erc721SetApprovalForAll, Nft;
    Erc1155TransferSingle => Erc1155TransferSingle, Nft;
    Erc1155SafeTransferWithData => Erc1155SafeTransferWithData, Nft;
    WbnbDeposit => WbnbDeposit, Wbnb;
    WbnbWithdraw => WbnbWithdraw, Wbnb;
    ContractCallSimple => ContractCallSimple, Contract;
    ContractCallWithValue => ContractCallWithValue, Contract;
    ContractCallWithParams => ContractCallWithParams, Contract;
    ContractDelegateCall => ContractDelegateCall, Contract;
    ContractPayableFallback => ContractPayableFallback, Contract;
    SwapExactBnbForTokens => SwapExactBnbForTokens, Swap;
    SwapExactTokensForBnb => SwapExactTokensForBnb, Swap;
    SwapExactTokensForTokens => SwapExactTokensForTokens, Swap;
    SwapTokensForExactTokens => SwapTokensForExactTokens, Swap;
    SwapMultihopRouting => SwapMultihopRouting, Swap;
    AddLiquidityBnbToken => AddLiquidityBnbToken, Liquidity;
    AddLiquidityTokens => AddLiquidityTokens, Liquidity;
    RemoveLiquidityTokens => RemoveLiquidityTokens, Liquidity;
    RemoveLiquidityBnbToken => RemoveLiquidityBnbToken, Liquidity;
    StakeSingleToken => StakeSingleToken, Staking;
    StakeLpTokens => StakeLpTokens, Staking;
    UnstakeLpTokens => UnstakeLpTokens, Staking;
    HarvestRewards => HarvestRewards, Staking;
    EmergencyWithdraw => EmergencyWithdraw, Staking;
    QueryBnbBalance => QueryBnbBalance, Query;
    QueryErc20Balance => QueryErc20Balance, Query;
    QueryErc20Allowance => QueryErc20Allowance, Query;
    QueryNftOwner => QueryNftOwner, Query;
    QueryNftBalance => QueryNftBalance, Query;
    QueryTokenTotalSupply => QueryTokenTotalSupply, Query;
    QueryStakedAmount => QueryStakedAmount, Query;
    QueryPendingRewards => QueryPendingRewards, Query;
    QueryTransactionCountNonce => QueryTransactionCountNonce, Query;
    QueryNftApprovalStatus => QueryNftApprovalStatus, Query;
    QueryPairReserves => QueryPairReserves, Query;
    QuerySwapOutputAmount => QuerySwapOutputAmount, Query;
    QuerySwapInputAmount => QuerySwapInputAmount, Query;
    QueryTokenMetadata => QueryTokenMetadata, Query;
    QueryNftTokenUri => QueryNftTokenUri, Query;
    QueryCurrentBlockNumber => QueryCurrentBlockNumber, Query;
    QueryGasPrice => QueryGasPrice, Query;
}

impl TaskId {
    /// Canonical id string.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Static description of this task's validator.
    pub fn info(self) -> TaskInfo {
        TaskInfo {
            id: self,
            category: self.category(),
            pass_rule: self.pass_rule(),
            checks: self
                .weights()
                .into_iter()
                .map(|(name, weight)| CheckInfo { name, weight })
                .collect(),
        }
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Self::from_str(&id).map_err(|_| de::Error::custom(format!("unknown task: {id:?}")))
    }
}

/// Name and weight of one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CheckInfo {
    /// Check name.
    pub name: &'static str,
    /// Points at stake.
    pub weight: u32,
}

/// What a task's validator checks, without building it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    /// Task id.
    pub id: TaskId,
    /// Protocol surface.
    pub category: TaskCategory,
    /// Pass flag convention.
    pub pass_rule: PassRule,
    /// Checks in evaluation order, gate first.
    pub checks: Vec<CheckInfo>,
}

/// Parses a task id, accepting the legacy aliases.
pub fn parse_task(task: &str) -> Result<TaskId, ValidatorError> {
    TaskId::from_str(task.trim()).map_err(|_| ValidatorError::UnknownTask(task.to_string()))
}

/// Builds the validator for `task` from its generated parameters.
pub fn create_validator(task: &str, params: &Params) -> Result<Box<dyn Validator>, ValidatorError> {
    parse_task(task)?.build(params)
}

/// Every registered task, in catalog order.
pub fn tasks() -> impl Iterator<Item = TaskInfo> {
    TaskId::iter().map(TaskId::info)
}

/// Turns a missing deployment into [`ValidatorError::MissingContract`].
pub trait RequireContract {
    /// Address registered under `key`.
    fn require(&self, key: ContractKey) -> Result<Address, ValidatorError>;
}

impl RequireContract for ContractRegistry {
    fn require(&self, key: ContractKey) -> Result<Address, ValidatorError> {
        self.get(key).ok_or(ValidatorError::MissingContract(key))
    }
}
