//! Error types

use anchor_lang::prelude::*;

#[error_code]
pub enum PerpetualsError {
    // validation
    #[msg("Invalid power exponent, must be in 1..=5")]
    InvalidPower,
    #[msg("Invalid custody or pool configuration")]
    InvalidConfig,
    #[msg("Invalid amount, must be non-zero")]
    InvalidAmount,
    #[msg("Invalid position side")]
    InvalidSide,

    // permission
    #[msg("Instruction is disabled by current permissions")]
    OperationDisabled,
    #[msg("Signer is not a registered admin")]
    NotAdmin,
    #[msg("Admin has already signed this instruction")]
    DuplicateSignature,
    #[msg("Signed instruction does not match the pending accumulator")]
    InstructionMismatch,
    #[msg("Not enough distinct admin signatures to reach quorum")]
    BelowThreshold,
    #[msg("Multisig is already initialized")]
    MultisigAlreadyInit,
    #[msg("min_signatures must be in 1..=admins.len() and admins.len() <= MAX_ADMINS")]
    InvalidThreshold,

    // market
    #[msg("Oracle price is stale")]
    StaleOraclePrice,
    #[msg("Oracle confidence interval is too wide")]
    PriceConfidenceTooWide,
    #[msg("Oracle account variant does not match the configured oracle type")]
    UnsupportedOracle,
    #[msg("Trade price exceeds the caller-supplied slippage limit")]
    MaxPriceSlippage,

    // risk
    #[msg("Leverage exceeds the allowed maximum for this power exponent")]
    LeverageTooHigh,
    #[msg("Pool does not have enough liquidity to honor this operation")]
    InsufficientLiquidity,
    #[msg("Position is not eligible for liquidation")]
    NotLiquidatable,

    // arithmetic
    #[msg("Arithmetic overflow")]
    MathOverflow,
    #[msg("Division by zero")]
    DivisionByZero,

    // settlement
    #[msg("Token settlement transfer failed")]
    SettlementFailed,

    // structural
    #[msg("Pool already exists")]
    PoolExists,
    #[msg("Custody already exists")]
    CustodyExists,
    #[msg("Pool has reached MAX_CUSTODIES")]
    TooManyCustodies,
    #[msg("Multisig has reached MAX_ADMINS")]
    TooManyAdmins,

    // internal
    #[msg("Liquidation price bisection did not converge, result is a bracket endpoint")]
    ApproximateLiquidationPrice,
    #[msg("Internal state is corrupted, halting until admin intervention")]
    StateCorruption,
}
