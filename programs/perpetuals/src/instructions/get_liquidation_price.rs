use crate::oracle::read_oracle_price;
use anchor_lang::prelude::*;
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::state::custody::Custody;
use perpetuals_state::state::perpetuals::Perpetuals;
use perpetuals_state::state::pool::Pool;
use perpetuals_state::state::position::Position;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct GetLiquidationPriceParams {}

/// spec 4.5.4 `get_liquidation_price`. Solves by bisection since the
/// power-k payoff curve has no closed-form inverse for k>1; on
/// non-convergence the bracket endpoint is still returned, flagged with
/// the `ApproximateLiquidationPrice` warning (spec 7, an internal flag
/// rather than a hard failure). `collateral_custody` supplies the live
/// price the payoff reserve is valued at for a short, where the lock
/// doesn't move with the trial price being solved for.
pub fn get_liquidation_price(ctx: Context<GetLiquidationPrice>, _params: &GetLiquidationPriceParams) -> Result<u64> {
    let curtime = Clock::get()?.unix_timestamp;
    let (collateral_price, _) = read_oracle_price(
        &ctx.accounts.collateral_custody.oracle,
        &ctx.accounts.collateral_custody_oracle_account,
        curtime,
        ctx.accounts.collateral_custody.pricing.use_ema,
    )?;
    let lock_price = collateral_price.scale_to_exponent(-(Perpetuals::PRICE_DECIMALS as i32))?.price;
    let (price, converged) = ctx.accounts.position.get_liquidation_price(
        &ctx.accounts.custody,
        &ctx.accounts.collateral_custody,
        lock_price,
        ctx.accounts.custody.fees.close_position,
        curtime,
    )?;
    if !converged {
        msg!("{}", PerpetualsError::ApproximateLiquidationPrice);
    }
    Ok(price)
}

#[derive(Accounts)]
pub struct GetLiquidationPrice<'info> {
    #[account(seeds = [b"perpetuals"], bump = perpetuals.perpetuals_bump)]
    pub perpetuals: Box<Account<'info, Perpetuals>>,

    #[account(seeds = [b"pool", pool.name.as_bytes()], bump = pool.bump)]
    pub pool: Box<Account<'info, Pool>>,

    #[account(seeds = [b"custody", pool.key().as_ref(), custody.mint.as_ref()], bump = custody.bump)]
    pub custody: Box<Account<'info, Custody>>,

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
