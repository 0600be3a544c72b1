use crate::oracle::read_oracle_price;
use anchor_lang::prelude::*;
use anchor_spl::token::{Token, TokenAccount};
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::math;
use perpetuals_state::state::custody::{Custody, Fees};
use perpetuals_state::state::perpetuals::Perpetuals;
use perpetuals_state::state::pool::Pool;
use perpetuals_state::state::position::{LiquidationState, Position};

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct LiquidatePositionParams {}

/// spec 4.5.4 `liquidate_position`. Caller-initiated; always closes the
/// whole position and pays the liquidation fee to whoever calls it as a
/// reward for keeping the pool solvent.
pub fn liquidate_position(ctx: Context<LiquidatePosition>, _params: &LiquidatePositionParams) -> Result<()> {
    msg!("Check permissions");
    require!(
        ctx.accounts.perpetuals.permissions.allow_liquidate_position
            && ctx.accounts.custody.permissions.allow_liquidate_position,
        PerpetualsError::OperationDisabled
    );

    // `custody` and `collateral_custody` alias the same account for a long
    // (spec 4.5.1); every mutation below that would otherwise apply to both
    // is routed through `collateral_custody` alone in that case, since it is
    // declared after `custody` and so wins at account-exit serialization.
    let same_custody = ctx.accounts.custody.key() == ctx.accounts.collateral_custody.key();

    let curtime = Clock::get()?.unix_timestamp;
    msg!("Update borrow rate");
    if same_custody {
        ctx.accounts.collateral_custody.update_borrow_rate(curtime)?;
    } else {
        ctx.accounts.custody.update_borrow_rate(curtime)?;
        ctx.accounts.collateral_custody.update_borrow_rate(curtime)?;
    }

    msg!("Read oracle prices and check liquidation eligibility");
    let position = &ctx.accounts.position;
    let (custody_price, custody_ema_fallback) = read_oracle_price(
        &ctx.accounts.custody.oracle,
        &ctx.accounts.custody_oracle_account,
        curtime,
        ctx.accounts.custody.pricing.use_ema,
    )?;
    if custody_ema_fallback {
        msg!("EMA requested but unavailable, fell back to spot");
    }
    let (collateral_price, _) = read_oracle_price(
        &ctx.accounts.collateral_custody.oracle,
        &ctx.accounts.collateral_custody_oracle_account,
        curtime,
        ctx.accounts.collateral_custody.pricing.use_ema,
    )?;
    let exit_price = ctx.accounts.pool.get_exit_price(&custody_price, position.side, &ctx.accounts.custody)?;
    let lock_price = collateral_price.scale_to_exponent(-(Perpetuals::PRICE_DECIMALS as i32))?.price;
    let liquidation_fee_bps = ctx.accounts.custody.fees.liquidation;

    let state = position.get_liquidation_state(
        exit_price,
        &ctx.accounts.custody,
        &ctx.accounts.collateral_custody,
        lock_price,
        liquidation_fee_bps,
        curtime,
    )?;
    require!(state != LiquidationState::None, PerpetualsError::NotLiquidatable);

    msg!("Settle position");
    let pnl = position.compute_pnl(
        exit_price,
        &ctx.accounts.custody,
        &ctx.accounts.collateral_custody,
        lock_price,
        liquidation_fee_bps,
        curtime,
    )?;
    let profit_token = ctx.accounts.collateral_custody.usd_to_token(pnl.profit_usd, &collateral_price)?;
    let loss_token = ctx.accounts.collateral_custody.usd_to_token(pnl.loss_usd, &collateral_price)?;
    let total_payout = position
        .collateral_amount
        .saturating_add(profit_token)
        .saturating_sub(loss_token);

    let reward_usd = Fees::fee_amount(position.size_usd, liquidation_fee_bps)?;
    let reward = std::cmp::min(
        ctx.accounts.collateral_custody.usd_to_token(reward_usd, &collateral_price)?,
        total_payout,
    );
    let remaining = math::checked_sub(total_payout, reward)?;

    ctx.accounts.perpetuals.transfer_tokens(
        ctx.accounts.collateral_custody_token_account.to_account_info(),
        ctx.accounts.rewards_receiving_account.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        reward,
    )?;
    ctx.accounts.perpetuals.transfer_tokens(
        ctx.accounts.collateral_custody_token_account.to_account_info(),
        ctx.accounts.receiving_account.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        remaining,
    )?;

    msg!("Update custody state");
    ctx.accounts.collateral_custody.unlock(position.locked_amount);
    ctx.accounts.collateral_custody.release_collateral(position.collateral_amount)?;
    ctx.accounts.collateral_custody.assets.owned =
        math::checked_sub(ctx.accounts.collateral_custody.assets.owned, total_payout)?;

    if same_custody {
        ctx.accounts.collateral_custody.record_close(position, pnl.profit_usd, pnl.loss_usd)?;
    } else {
        ctx.accounts.custody.record_close(position, pnl.profit_usd, pnl.loss_usd)?;
    }

    msg!("Destroy position");
    ctx.accounts.position.close(ctx.accounts.signer.to_account_info())?;
    Ok(())
}

#[derive(Accounts)]
pub struct LiquidatePosition<'info> {
    #[account(mut)]
    pub signer: Signer<'info>,

    #[account(mut)]
    pub receiving_account: Box<Account<'info, TokenAccount>>,

    #[account(mut)]
    pub rewards_receiving_account: Box<Account<'info, TokenAccount>>,

    #[account(seeds = [b"perpetuals"], bump = perpetuals.perpetuals_bump)]
    pub perpetuals: Box<Account<'info, Perpetuals>>,

    #[account(mut, seeds = [b"pool", pool.name.as_bytes()], bump = pool.bump)]
    pub pool: Box<Account<'info, Pool>>,

    #[account(
        mut,
        seeds = [b"custody", pool.key().as_ref(), custody.mint.as_ref()],
        bump = custody.bump
    )]
    pub custody: Box<Account<'info, Custody>>,

    /// CHECK: validated against `custody.oracle.oracle_account` in `read_oracle_price`.
    pub custody_oracle_account: AccountInfo<'info>,

    #[account(
        mut,
        seeds = [b"custody", pool.key().as_ref(), collateral_custody.mint.as_ref()],
        bump = collateral_custody.bump
    )]
    pub collateral_custody: Box<Account<'info, Custody>>,

    /// CHECK: validated against `collateral_custody.oracle.oracle_account`.
    pub collateral_custody_oracle_account: AccountInfo<'info>,

    #[account(mut, address = collateral_custody.token_account)]
    pub collateral_custody_token_account: Box<Account<'info, TokenAccount>>,

    /// CHECK: PDA authority over all protocol-owned token accounts.
    #[account(seeds = [b"transfer_authority"], bump = perpetuals.transfer_authority_bump)]
    pub transfer_authority: AccountInfo<'info>,

    #[account(
        mut,
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

    pub token_program: Program<'info, Token>,
}
