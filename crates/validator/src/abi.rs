//! Contract interfaces the quest tasks call into.
//!
//! Only selectors are read from these in the checks. Tests use them to encode call data.
#![allow(missing_docs)]

use alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function increaseAllowance(address spender, uint256 addedValue) external returns (bool);
        function decreaseAllowance(address spender, uint256 subtractedValue) external returns (bool);
    }

    interface IERC1363 {
        function transferAndCall(address to, uint256 value) external returns (bool);
        function approveAndCall(address spender, uint256 value) external returns (bool);
        function approveAndCall(address spender, uint256 value, bytes data) external returns (bool);
    }

    interface IERC721 {
        function transferFrom(address from, address to, uint256 tokenId) external;
        function safeTransferFrom(address from, address to, uint256 tokenId) external;
        function approve(address to, uint256 tokenId) external;
        function setApprovalForAll(address operator, bool approved) external;
    }

    interface IERC1155 {
        function safeTransferFrom(address from, address to, uint256 id, uint256 value, bytes data) external;
    }

    interface IWBNB {
        function deposit() external payable;
        function withdraw(uint256 wad) external;
    }

    interface ISimpleCounter {
        function increment() external;
    }

    interface IDonationBox {
        function donate() external payable;
    }

    interface IMessageBoard {
        function setMessage(string message) external;
    }

    interface IDelegateProxy {
        function setValue(uint256 value) external;
    }

    interface IFlashLoanReceiver {
        function executeFlashLoan(address token, uint256 amount) external;
    }

    interface IPancakeRouter {
        function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external payable returns (uint256[] amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external returns (uint256[] amounts);
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline)
            external returns (uint256[] amounts);
        function swapTokensForExactTokens(uint256 amountOut, uint256 amountInMax, address[] path, address to, uint256 deadline)
            external returns (uint256[] amounts);
        function addLiquidityETH(address token, uint256 amountTokenDesired, uint256 amountTokenMin, uint256 amountETHMin, address to, uint256 deadline)
            external payable returns (uint256 amountToken, uint256 amountETH, uint256 liquidity);
        function addLiquidity(address tokenA, address tokenB, uint256 amountADesired, uint256 amountBDesired, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline)
            external returns (uint256 amountA, uint256 amountB, uint256 liquidity);
        function removeLiquidity(address tokenA, address tokenB, uint256 liquidity, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline)
            external returns (uint256 amountA, uint256 amountB);
        function removeLiquidityETH(address token, uint256 liquidity, uint256 amountTokenMin, uint256 amountETHMin, address to, uint256 deadline)
            external returns (uint256 amountToken, uint256 amountETH);
    }

    interface IStakingPool {
        function deposit(uint256 amount) external;
        function withdraw(uint256 amount) external;
        function emergencyWithdraw() external;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;
    use alloy_sol_types::SolCall;
    use rstest::rstest;

    #[rstest]
    #[case::transfer(IERC20::transferCall::SELECTOR, hex!("a9059cbb"))]
    #[case::approve(IERC20::approveCall::SELECTOR, hex!("095ea7b3"))]
    #[case::transfer_from(IERC20::transferFromCall::SELECTOR, hex!("23b872dd"))]
    #[case::increase(IERC20::increaseAllowanceCall::SELECTOR, hex!("39509351"))]
    #[case::decrease(IERC20::decreaseAllowanceCall::SELECTOR, hex!("a457c2d7"))]
    #[case::transfer_and_call(IERC1363::transferAndCallCall::SELECTOR, hex!("1296ee62"))]
    #[case::approve_and_call(IERC1363::approveAndCall_0Call::SELECTOR, hex!("3177029f"))]
    #[case::approve_and_call_data(IERC1363::approveAndCall_1Call::SELECTOR, hex!("cae9ca51"))]
    #[case::safe_transfer_721(IERC721::safeTransferFromCall::SELECTOR, hex!("42842e0e"))]
    #[case::approval_for_all(IERC721::setApprovalForAllCall::SELECTOR, hex!("a22cb465"))]
    #[case::safe_transfer_1155(IERC1155::safeTransferFromCall::SELECTOR, hex!("f242432a"))]
    #[case::deposit(IWBNB::depositCall::SELECTOR, hex!("d0e30db0"))]
    #[case::withdraw(IWBNB::withdrawCall::SELECTOR, hex!("2e1a7d4d"))]
    #[case::increment(ISimpleCounter::incrementCall::SELECTOR, hex!("d09de08a"))]
    #[case::donate(IDonationBox::donateCall::SELECTOR, hex!("ed88c68e"))]
    #[case::set_message(IMessageBoard::setMessageCall::SELECTOR, hex!("368b8772"))]
    #[case::set_value(IDelegateProxy::setValueCall::SELECTOR, hex!("55241077"))]
    #[case::flash_loan(IFlashLoanReceiver::executeFlashLoanCall::SELECTOR, hex!("6065c245"))]
    #[case::swap_eth_in(IPancakeRouter::swapExactETHForTokensCall::SELECTOR, hex!("7ff36ab5"))]
    #[case::swap_eth_out(IPancakeRouter::swapExactTokensForETHCall::SELECTOR, hex!("18cbafe5"))]
    #[case::swap_tokens(IPancakeRouter::swapExactTokensForTokensCall::SELECTOR, hex!("38ed1739"))]
    #[case::swap_exact_out(IPancakeRouter::swapTokensForExactTokensCall::SELECTOR, hex!("8803dbee"))]
    #[case::add_eth(IPancakeRouter::addLiquidityETHCall::SELECTOR, hex!("f305d719"))]
    #[case::add(IPancakeRouter::addLiquidityCall::SELECTOR, hex!("e8e33700"))]
    #[case::remove(IPancakeRouter::removeLiquidityCall::SELECTOR, hex!("baa2abde"))]
    #[case::remove_eth(IPancakeRouter::removeLiquidityETHCall::SELECTOR, hex!("02751cec"))]
    #[case::stake(IStakingPool::depositCall::SELECTOR, hex!("b6b55f25"))]
    fn selectors(#[case] selector: [u8; 4], #[case] expected: [u8; 4]) {
        assert_eq!(selector, expected);
    }
}
