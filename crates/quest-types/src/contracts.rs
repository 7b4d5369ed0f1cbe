use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Addresses the environment collaborator may supply.
///
/// String forms match the `env_key` names used in task definitions.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractKey {
    /// Funded account the generated code signs with.
    #[strum(to_string = "test_address", serialize = "agent_address")]
    #[serde(rename = "test_address", alias = "agent_address")]
    TestAddress,
    /// Whale account used to seed balances.
    #[strum(serialize = "rich_address")]
    #[serde(rename = "rich_address")]
    RichAddress,
    /// `SimpleCounter` fixture.
    #[strum(serialize = "simple_counter_address")]
    #[serde(rename = "simple_counter_address")]
    SimpleCounter,
    /// `DonationBox` fixture.
    #[strum(serialize = "donation_box_address")]
    #[serde(rename = "donation_box_address")]
    DonationBox,
    /// `MessageBoard` fixture.
    #[strum(serialize = "message_board_address")]
    #[serde(rename = "message_board_address")]
    MessageBoard,
    /// Proxy half of the delegate call fixture.
    #[strum(serialize = "delegate_call_proxy_address")]
    #[serde(rename = "delegate_call_proxy_address")]
    DelegateCallProxy,
    /// Implementation half of the delegate call fixture.
    #[strum(serialize = "delegate_call_implementation_address")]
    #[serde(rename = "delegate_call_implementation_address")]
    DelegateCallImplementation,
    /// Contract with a payable fallback.
    #[strum(serialize = "fallback_receiver_address")]
    #[serde(rename = "fallback_receiver_address")]
    FallbackReceiver,
    /// Single token staking pool.
    #[strum(serialize = "simple_staking_address")]
    #[serde(rename = "simple_staking_address")]
    SimpleStaking,
    /// LP token staking pool.
    #[strum(serialize = "simple_lp_staking_address")]
    #[serde(rename = "simple_lp_staking_address")]
    SimpleLpStaking,
    /// Reward pool used by harvest and emergency withdraw tasks.
    #[strum(serialize = "simple_reward_pool_address")]
    #[serde(rename = "simple_reward_pool_address")]
    SimpleRewardPool,
    /// Flash loan borrower fixture.
    #[strum(serialize = "flashloan_receiver_address")]
    #[serde(rename = "flashloan_receiver_address")]
    FlashloanReceiver,
    /// ERC1363 token fixture.
    #[strum(serialize = "erc1363_token_address")]
    #[serde(rename = "erc1363_token_address")]
    Erc1363Token,
    /// ERC721 token fixture.
    #[strum(serialize = "erc721_token_address")]
    #[serde(rename = "erc721_token_address")]
    Erc721Token,
    /// ERC1155 token fixture.
    #[strum(serialize = "erc1155_token_address")]
    #[serde(rename = "erc1155_token_address")]
    Erc1155Token,
}

/// Addresses of the accounts and fixture contracts deployed for one run.
///
/// Filled by the deployment collaborator; every slot is optional since each task only
/// deploys what it needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct ContractRegistry {
    #[serde(alias = "agent_address")]
    pub test_address: Option<Address>,
    pub rich_address: Option<Address>,
    pub simple_counter_address: Option<Address>,
    pub donation_box_address: Option<Address>,
    pub message_board_address: Option<Address>,
    pub delegate_call_proxy_address: Option<Address>,
    pub delegate_call_implementation_address: Option<Address>,
    pub fallback_receiver_address: Option<Address>,
    pub simple_staking_address: Option<Address>,
    pub simple_lp_staking_address: Option<Address>,
    pub simple_reward_pool_address: Option<Address>,
    pub flashloan_receiver_address: Option<Address>,
    pub erc1363_token_address: Option<Address>,
    pub erc721_token_address: Option<Address>,
    pub erc1155_token_address: Option<Address>,
}

impl ContractRegistry {
    fn slot(&self, key: ContractKey) -> &Option<Address> {
        match key {
            ContractKey::TestAddress => &self.test_address,
            ContractKey::RichAddress => &self.rich_address,
            ContractKey::SimpleCounter => &self.simple_counter_address,
            ContractKey::DonationBox => &self.donation_box_address,
            ContractKey::MessageBoard => &self.message_board_address,
            ContractKey::DelegateCallProxy => &self.delegate_call_proxy_address,
            ContractKey::DelegateCallImplementation => &self.delegate_call_implementation_address,
            ContractKey::FallbackReceiver => &self.fallback_receiver_address,
            ContractKey::SimpleStaking => &self.simple_staking_address,
            ContractKey::SimpleLpStaking => &self.simple_lp_staking_address,
            ContractKey::SimpleRewardPool => &self.simple_reward_pool_address,
            ContractKey::FlashloanReceiver => &self.flashloan_receiver_address,
            ContractKey::Erc1363Token => &self.erc1363_token_address,
            ContractKey::Erc721Token => &self.erc721_token_address,
            ContractKey::Erc1155Token => &self.erc1155_token_address,
        }
    }

    fn slot_mut(&mut self, key: ContractKey) -> &mut Option<Address> {
        match key {
            ContractKey::TestAddress => &mut self.test_address,
            ContractKey::RichAddress => &mut self.rich_address,
            ContractKey::SimpleCounter => &mut self.simple_counter_address,
            ContractKey::DonationBox => &mut self.donation_box_address,
            ContractKey::MessageBoard => &mut self.message_board_address,
            ContractKey::DelegateCallProxy => &mut self.delegate_call_proxy_address,
            ContractKey::DelegateCallImplementation => {
                &mut self.delegate_call_implementation_address
            }
            ContractKey::FallbackReceiver => &mut self.fallback_receiver_address,
            ContractKey::SimpleStaking => &mut self.simple_staking_address,
            ContractKey::SimpleLpStaking => &mut self.simple_lp_staking_address,
            ContractKey::SimpleRewardPool => &mut self.simple_reward_pool_address,
            ContractKey::FlashloanReceiver => &mut self.flashloan_receiver_address,
            ContractKey::Erc1363Token => &mut self.erc1363_token_address,
            ContractKey::Erc721Token => &mut self.erc721_token_address,
            ContractKey::Erc1155Token => &mut self.erc1155_token_address,
        }
    }

    /// Address registered under `key`.
    pub fn get(&self, key: ContractKey) -> Option<Address> {
        *self.slot(key)
    }

    /// Registers `address` under `key`, returning the previous value.
    pub fn set(&mut self, key: ContractKey, address: Address) -> Option<Address> {
        self.slot_mut(key).replace(address)
    }

    /// Clears `key`, e.g. after a failed deployment.
    pub fn clear(&mut self, key: ContractKey) -> Option<Address> {
        self.slot_mut(key).take()
    }

    /// Builder style [`Self::set`].
    pub fn with(mut self, key: ContractKey, address: Address) -> Self {
        self.set(key, address);
        self
    }
}
