//! ERC721 and ERC1155 transfers and approvals.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use quest_types::{fields, lower_hex};

use crate::{
    abi::{IERC1155, IERC721},
    engine::{addr, uint, Ctx, Details, Gate, Rule, RuleSet, Rules, Verdict},
    palette::{self, Arg},
    params::{ParamReader, Params},
    registry::TaskId,
    result::PassRule,
    ValidatorError,
};

/// Call data must be longer than this to count as carrying the `data` argument.
const WITH_DATA_MIN_LEN: usize = 100;

/// Owner recorded in `after` is `to`.
fn owned_by(ctx: &Ctx<'_>, to: Address, token_id: U256, d: &mut Details) -> Verdict {
    let before = ctx.before.address(fields::NFT_OWNER);
    let after = ctx.after.address(fields::NFT_OWNER);
    d.insert("owner_before".into(), addr(&before));
    d.insert("owner_after".into(), addr(&after));
    Verdict::from_bool(
        after == to,
        format!("NFT #{token_id} ownership transferred to {}", lower_hex(&to)),
        format!("Expected owner: {}, Actual owner: {}", lower_hex(&to), lower_hex(&after)),
    )
}

/// Sender lost and recipient gained exactly `amount` of an ERC1155 id.
fn erc1155_moved(ctx: &Ctx<'_>, token_id: U256, amount: U256, d: &mut Details) -> Verdict {
    ctx.record(d, fields::ERC1155_BALANCE);
    ctx.record(d, fields::TARGET_ERC1155_BALANCE);
    let sent = ctx.decrease(fields::ERC1155_BALANCE);
    let received = ctx.increase(fields::TARGET_ERC1155_BALANCE);
    Verdict::from_bool(
        sent == amount && received == amount,
        format!("Transferred {amount} of token #{token_id}"),
        format!("Expected transfer: {amount}, sender decrease: {sent}, recipient increase: {received}"),
    )
}

/// `erc721_transfer`: plain `transferFrom`.
#[derive(Clone, Debug)]
pub struct Erc721Transfer {
    nft: Address,
    to: Address,
    token_id: U256,
}

impl Erc721Transfer {
    fn from_reader(p: &ParamReader<'_>) -> Result<Self, ValidatorError> {
        Ok(Self {
            nft: p.address("nft_address")?,
            to: p.address("to_address")?,
            token_id: p.uint("token_id")?,
        })
    }

    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.nft, "NFT contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IERC721::transferFromCall::SELECTOR], "ERC721 transferFrom", d);
        if verdict.passed {
            palette::record_args(
                ctx,
                &[("from", Arg::Address), ("to", Arg::Address), ("token_id", Arg::Uint)],
                d,
            );
            let call = ctx.calldata();
            if let Ok(to) = call.address(1) {
                d.insert("recipient_address_correct".into(), (to == self.to).into());
            }
            if let Ok(id) = call.uint(2) {
                d.insert("token_id_correct".into(), (id == self.token_id).into());
            }
        }
        verdict
    }

    fn ownership(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        owned_by(ctx, self.to, self.token_id, d)
    }

    fn record_expected(&self, d: &mut Details) {
        d.insert("expected_nft".into(), addr(&self.nft));
        d.insert("expected_owner".into(), addr(&self.to));
        d.insert("token_id".into(), uint(self.token_id));
    }
}

impl Rules for Erc721Transfer {
    const TASK: TaskId = TaskId::Erc721Transfer;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("NFT Contract", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("NFT Ownership Transferred", 30, Self::ownership),
        ],
        pass: PassRule::THRESHOLD_80,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        Self::from_reader(&ParamReader::new(Self::TASK, params))
    }

    fn expected(&self, d: &mut Details) {
        self.record_expected(d);
    }
}

/// `erc721_safe_transfer`: `safeTransferFrom` without data.
#[derive(Clone, Debug)]
pub struct Erc721SafeTransfer(Erc721Transfer);

impl Erc721SafeTransfer {
    fn ownership(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.0.ownership(ctx, d)
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::selector(ctx, &[IERC721::safeTransferFromCall::SELECTOR], "safeTransferFrom", d)
    }
}

impl Rules for Erc721SafeTransfer {
    const TASK: TaskId = TaskId::Erc721SafeTransfer;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("NFT Ownership Transfer", 40, Self::ownership),
            Rule::new("Function Selector", 30, Self::function),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        Erc721Transfer::from_reader(&ParamReader::new(Self::TASK, params)).map(Self)
    }

    fn expected(&self, d: &mut Details) {
        self.0.record_expected(d);
    }
}

/// `erc721_approve`: single token approval.
#[derive(Clone, Debug)]
pub struct Erc721Approve {
    nft: Address,
    spender: Address,
    token_id: U256,
}

impl Erc721Approve {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let before = ctx.before.address(fields::NFT_APPROVED);
        let after = ctx.after.address(fields::NFT_APPROVED);
        d.insert("approved_before".into(), addr(&before));
        d.insert("approved_after".into(), addr(&after));
        Verdict::from_bool(
            after == self.spender,
            format!("NFT #{} approved for {}", self.token_id, lower_hex(&self.spender)),
            format!(
                "Expected approved address: {}, Actual: {}",
                lower_hex(&self.spender),
                lower_hex(&after)
            ),
        )
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::selector(ctx, &[IERC721::approveCall::SELECTOR], "ERC721 approve", d)
    }
}

impl Rules for Erc721Approve {
    const TASK: TaskId = TaskId::Erc721Approve;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 40,
        rules: &[
            Rule::new("Approval Check", 40, Self::approval),
            Rule::new("Function Selector", 20, Self::function),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            nft: p.address("nft_address")?,
            spender: p.address("spender_address")?,
            token_id: p.uint("token_id")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("nft_address".into(), addr(&self.nft));
        d.insert("expected_approved".into(), addr(&self.spender));
        d.insert("token_id".into(), uint(self.token_id));
    }
}

/// `erc721_set_approval_for_all`: operator approval, granted or revoked.
#[derive(Clone, Debug)]
pub struct Erc721SetApprovalForAll {
    nft: Address,
    operator: Address,
    approved: bool,
}

impl Erc721SetApprovalForAll {
    fn approval(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let before = ctx.before.flag(fields::IS_APPROVED_FOR_ALL);
        let after = ctx.after.flag(fields::IS_APPROVED_FOR_ALL);
        d.insert("approved_before".into(), before.into());
        d.insert("approved_after".into(), after.into());
        Verdict::from_bool(
            after == self.approved,
            format!("Operator approval set to {}", self.approved),
            format!("Expected approval: {}, Actual: {after}", self.approved),
        )
    }

    fn function(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IERC721::setApprovalForAllCall::SELECTOR], "setApprovalForAll", d);
        if verdict.passed {
            palette::record_args(ctx, &[("operator", Arg::Address), ("approved", Arg::Bool)], d);
        }
        verdict
    }
}

impl Rules for Erc721SetApprovalForAll {
    const TASK: TaskId = TaskId::Erc721SetApprovalForAll;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Approval For All Check", 50, Self::approval),
            Rule::new("Function Selector", 20, Self::function),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            nft: p.address("nft_address")?,
            operator: p.address("operator_address")?,
            approved: p.flag("approved")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        d.insert("nft_address".into(), addr(&self.nft));
        d.insert("operator_address".into(), addr(&self.operator));
        d.insert("expected_approved".into(), self.approved.into());
    }
}

/// `erc1155_transfer_single`.
#[derive(Clone, Debug)]
pub struct Erc1155TransferSingle {
    nft: Address,
    to: Address,
    token_id: U256,
    amount: U256,
}

impl Erc1155TransferSingle {
    fn from_reader(p: &ParamReader<'_>) -> Result<Self, ValidatorError> {
        Ok(Self {
            nft: p.address("nft_address")?,
            to: p.address("to_address")?,
            token_id: p.uint("token_id")?,
            amount: p.uint("amount")?,
        })
    }

    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        palette::destination(ctx, self.nft, "ERC1155 contract", d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let verdict = palette::selector(ctx, &[IERC1155::safeTransferFromCall::SELECTOR], "ERC1155 safeTransferFrom", d);
        if verdict.passed {
            palette::record_args(
                ctx,
                &[
                    ("from", Arg::Address),
                    ("to", Arg::Address),
                    ("id", Arg::Uint),
                    ("value", Arg::Uint),
                ],
                d,
            );
        }
        verdict
    }

    fn balances(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        erc1155_moved(ctx, self.token_id, self.amount, d)
    }

    fn record_expected(&self, d: &mut Details) {
        d.insert("nft_address".into(), addr(&self.nft));
        d.insert("to_address".into(), addr(&self.to));
        d.insert("token_id".into(), uint(self.token_id));
        d.insert("expected_amount".into(), uint(self.amount));
    }
}

impl Rules for Erc1155TransferSingle {
    const TASK: TaskId = TaskId::Erc1155TransferSingle;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 30,
        rules: &[
            Rule::new("Contract Address", 20, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Balance Transfer", 30, Self::balances),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        Self::from_reader(&ParamReader::new(Self::TASK, params))
    }

    fn expected(&self, d: &mut Details) {
        self.record_expected(d);
    }
}

/// `erc1155_safe_transfer_with_data`: same transfer, carrying a non-empty payload.
#[derive(Clone, Debug)]
pub struct Erc1155SafeTransferWithData {
    transfer: Erc1155TransferSingle,
    message: String,
}

impl Erc1155SafeTransferWithData {
    fn contract(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.transfer.contract(ctx, d)
    }

    fn signature(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.transfer.signature(ctx, d)
    }

    fn data(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        let len = ctx.tx.data.len();
        d.insert("tx_data_length".into(), len.into());
        if let Ok(call) = IERC1155::safeTransferFromCall::abi_decode(&ctx.tx.data) {
            d.insert("decoded_data_length".into(), call.data.len().into());
        }
        Verdict::from_bool(
            len > WITH_DATA_MIN_LEN,
            format!("Transaction carries a data payload ({len} bytes)"),
            format!("Call data too short to carry the data parameter ({len} bytes)"),
        )
    }

    fn balances(&self, ctx: &Ctx<'_>, d: &mut Details) -> Verdict {
        self.transfer.balances(ctx, d)
    }
}

impl Rules for Erc1155SafeTransferWithData {
    const TASK: TaskId = TaskId::Erc1155SafeTransferWithData;
    const RULES: RuleSet<Self> = RuleSet {
        gate: Gate::Receipt,
        gate_weight: 25,
        rules: &[
            Rule::new("Contract Address", 15, Self::contract),
            Rule::new("Function Signature", 20, Self::signature),
            Rule::new("Data Parameter", 10, Self::data),
            Rule::new("Balance Transfer", 30, Self::balances),
        ],
        pass: PassRule::AllChecks,
    };

    fn from_params(params: &Params) -> Result<Self, ValidatorError> {
        let p = ParamReader::new(Self::TASK, params);
        Ok(Self {
            transfer: Erc1155TransferSingle::from_reader(&p)?,
            message: p.string("data_message")?,
        })
    }

    fn expected(&self, d: &mut Details) {
        self.transfer.record_expected(d);
        d.insert("data_message".into(), self.message.clone().into());
    }
}
