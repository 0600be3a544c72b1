use crate::instructions::require_admin_quorum;
use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token};
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::state::multisig::Multisig;
use perpetuals_state::state::perpetuals::Perpetuals;
use perpetuals_state::state::pool::Pool;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct AddPoolParams {
    pub name: String,
}

/// spec 6.1 `add_pool`: registers a new, empty `Pool` and mints its LP
/// token. Requires quorum co-signature since the accounts below are
/// created with Anchor's `init`, see `require_admin_quorum`.
pub fn add_pool(ctx: Context<AddPool>, params: &AddPoolParams) -> Result<()> {
    msg!("Check admin signatures");
    require_admin_quorum(&ctx.accounts.multisig, ctx.remaining_accounts)?;

    require!(
        ctx.accounts.perpetuals.pools.len() < Perpetuals::MAX_CUSTODIES,
        PerpetualsError::TooManyCustodies
    );

    msg!("Initialize pool");
    let pool = &mut ctx.accounts.pool;
    pool.name = params.name.clone();
    pool.creation_time = Clock::get()?.unix_timestamp;
    pool.inception_time = pool.creation_time;
    pool.lp_mint = ctx.accounts.lp_token_mint.key();
    pool.custodies = Vec::new();
    pool.aum_usd = 0;
    pool.bump = *ctx.bumps.get("pool").unwrap();
    pool.lp_mint_bump = *ctx.bumps.get("lp_token_mint").unwrap();
    require!(pool.validate(), PerpetualsError::InvalidConfig);

    ctx.accounts.perpetuals.pools.push(pool.key());
    Ok(())
}

#[derive(Accounts)]
#[instruction(params: AddPoolParams)]
pub struct AddPool<'info> {
    #[account(mut)]
    pub admin: Signer<'info>,

    #[account(seeds = [b"multisig"], bump = multisig.bump)]
    pub multisig: Box<Account<'info, Multisig>>,

    #[account(
        mut,
        seeds = [b"perpetuals"],
        bump = perpetuals.perpetuals_bump
    )]
    pub perpetuals: Box<Account<'info, Perpetuals>>,

    #[account(
        init,
        payer = admin,
        space = Pool::LEN,
        seeds = [b"pool", params.name.as_bytes()],
        bump
    )]
    pub pool: Box<Account<'info, Pool>>,

    #[account(
        init,
        payer = admin,
        mint::decimals = Perpetuals::USD_DECIMALS,
        mint::authority = transfer_authority,
        seeds = [b"lp_token_mint", pool.key().as_ref()],
        bump
    )]
    pub lp_token_mint: Box<Account<'info, Mint>>,

    /// CHECK: PDA authority over all protocol-owned token accounts.
    #[account(seeds = [b"transfer_authority"], bump = perpetuals.transfer_authority_bump)]
    pub transfer_authority: AccountInfo<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    // remaining accounts: admin signers co-signing this instruction.
}
