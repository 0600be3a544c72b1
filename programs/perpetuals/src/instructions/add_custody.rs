use crate::instructions::require_admin_quorum;
use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::state::custody::{Assets, BorrowRateParams, Custody, Fees, PricingParams};
use perpetuals_state::state::multisig::Multisig;
use perpetuals_state::state::oracle::OracleParams;
use perpetuals_state::state::perpetuals::{Perpetuals, Permissions};
use perpetuals_state::state::pool::Pool;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct AddCustodyParams {
    pub is_stable: bool,
    pub oracle: OracleParams,
    pub pricing: PricingParams,
    pub fees: Fees,
    pub borrow_rate: BorrowRateParams,
}

/// spec 6.1 `add_custody`: registers one asset's full pricing/fee/borrow
/// configuration against an already-created pool.
pub fn add_custody(ctx: Context<AddCustody>, params: &AddCustodyParams) -> Result<()> {
    msg!("Check admin signatures");
    require_admin_quorum(&ctx.accounts.multisig, ctx.remaining_accounts)?;

    require!(
        ctx.accounts.pool.custodies.len() < Perpetuals::MAX_CUSTODIES,
        PerpetualsError::TooManyCustodies
    );

    msg!("Initialize custody");
    let custody = &mut ctx.accounts.custody;
    custody.pool = ctx.accounts.pool.key();
    custody.mint = ctx.accounts.mint.key();
    custody.token_account = ctx.accounts.custody_token_account.key();
    custody.decimals = ctx.accounts.mint.decimals;
    custody.is_stable = params.is_stable;
    custody.oracle = params.oracle;
    custody.pricing = params.pricing;
    custody.permissions = Permissions::default();
    custody.fees = params.fees;
    custody.borrow_rate = params.borrow_rate;
    custody.assets = Assets::default();
    custody.bump = *ctx.bumps.get("custody").unwrap();
    custody.token_account_bump = *ctx.bumps.get("custody_token_account").unwrap();
    require!(custody.validate(), PerpetualsError::InvalidConfig);

    ctx.accounts.pool.custodies.push(custody.key());
    Ok(())
}

#[derive(Accounts)]
pub struct AddCustody<'info> {
    #[account(mut)]
    pub admin: Signer<'info>,

    #[account(seeds = [b"multisig"], bump = multisig.bump)]
    pub multisig: Box<Account<'info, Multisig>>,

    #[account(seeds = [b"perpetuals"], bump = perpetuals.perpetuals_bump)]
    pub perpetuals: Box<Account<'info, Perpetuals>>,

    #[account(mut, seeds = [b"pool", pool.name.as_bytes()], bump = pool.bump)]
    pub pool: Box<Account<'info, Pool>>,

    pub mint: Box<Account<'info, Mint>>,

    #[account(
        init,
        payer = admin,
        space = Custody::LEN,
        seeds = [b"custody", pool.key().as_ref(), mint.key().as_ref()],
        bump
    )]
    pub custody: Box<Account<'info, Custody>>,

    #[account(
        init,
        payer = admin,
        token::mint = mint,
        token::authority = transfer_authority,
        seeds = [b"custody_token_account", pool.key().as_ref(), mint.key().as_ref()],
        bump
    )]
    pub custody_token_account: Box<Account<'info, TokenAccount>>,

    /// CHECK: PDA authority over all protocol-owned token accounts.
    #[account(seeds = [b"transfer_authority"], bump = perpetuals.transfer_authority_bump)]
    pub transfer_authority: AccountInfo<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    // remaining accounts: admin signers co-signing this instruction.
}
