use crate::oracle::read_oracle_price;
use anchor_lang::prelude::*;
use perpetuals_state::state::custody::Custody;
use perpetuals_state::state::perpetuals::Perpetuals;
use perpetuals_state::state::pool::Pool;
use perpetuals_state::state::position::Position;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct GetPnlParams {}

/// spec 6.1 `get_pnl`: a pure read, never mutates state (spec 4.5.2).
/// `collateral_custody` values the payoff reserve the profit is capped
/// against — the same custody as `custody` for a long, the collateral
/// custody for a short.
pub fn get_pnl(ctx: Context<GetPnl>, _params: &GetPnlParams) -> Result<(u64, u64, u64)> {
    let curtime = Clock::get()?.unix_timestamp;
    let (custody_price, _) = read_oracle_price(
        &ctx.accounts.custody.oracle,
        &ctx.accounts.custody_oracle_account,
        curtime,
        ctx.accounts.custody.pricing.use_ema,
    )?;
    let (collateral_price, _) = read_oracle_price(
        &ctx.accounts.collateral_custody.oracle,
        &ctx.accounts.collateral_custody_oracle_account,
        curtime,
        ctx.accounts.collateral_custody.pricing.use_ema,
    )?;
    let exit_price = ctx
        .accounts
        .pool
        .get_exit_price(&custody_price, ctx.accounts.position.side, &ctx.accounts.custody)?;
    let lock_price = collateral_price.scale_to_exponent(-(Perpetuals::PRICE_DECIMALS as i32))?.price;

    let pnl = ctx.accounts.pool.get_pnl(
        &ctx.accounts.position,
        exit_price,
        &ctx.accounts.custody,
        &ctx.accounts.collateral_custody,
        lock_price,
        ctx.accounts.custody.fees.close_position,
        curtime,
    )?;
    msg!("profit_usd: {}, loss_usd: {}, fee_usd: {}", pnl.0, pnl.1, pnl.2);
    Ok(pnl)
}

#[derive(Accounts)]
pub struct GetPnl<'info> {
    #[account(seeds = [b"perpetuals"], bump = perpetuals.perpetuals_bump)]
    pub perpetuals: Box<Account<'info, Perpetuals>>,

    #[account(seeds = [b"pool", pool.name.as_bytes()], bump = pool.bump)]
    pub pool: Box<Account<'info, Pool>>,

    #[account(seeds = [b"custody", pool.key().as_ref(), custody.mint.as_ref()], bump = custody.bump)]
    pub custody: Box<Account<'info, Custody>>,

    /// CHECK: validated against `custody.oracle.oracle_account` in `read_oracle_price`.
    pub custody_oracle_account: AccountInfo<'info>,

    #[account(
        seeds = [b"custody", pool.key().as_ref(), collateral_custody.mint.as_ref()],
        bump = collateral_custody.bump
    )]
    pub collateral_custody: Box<Account<'info, Custody>>,

    /// CHECK: validated against `collateral_custody.oracle.oracle_account`.
    pub collateral_custody_oracle_account: AccountInfo<'info>,

    #[account(
        seeds = [
            b"position",
            position.owner.as_ref(),
            pool.key().as_ref(),
            custody.key().as_ref(),
            collateral_custody.key().as_ref(),
            &[position.side as u8]
        ],
        bump = position.bump
    )]
    pub position: Box<Account<'info, Position>>,
}
