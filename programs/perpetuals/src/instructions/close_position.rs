use crate::oracle::read_oracle_price;
use anchor_lang::prelude::*;
use anchor_spl::token::{Token, TokenAccount};
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::math;
use perpetuals_state::state::custody::Custody;
use perpetuals_state::state::perpetuals::Perpetuals;
use perpetuals_state::state::pool::Pool;
use perpetuals_state::state::position::{Position, Side};

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct ClosePositionParams {
    pub price_limit: u64,
    pub size_usd_to_close: u64,
}

/// spec 4.5.3 `close_position`: partial or full. Settles the portion of
/// the position proportional to `size_usd_to_close / size_usd` and, when
/// the remaining size hits zero, destroys the `Position` account.
pub fn close_position(ctx: Context<ClosePosition>, params: &ClosePositionParams) -> Result<()> {
    msg!("Check permissions");
    require!(
        ctx.accounts.perpetuals.permissions.allow_close_position
            && ctx.accounts.custody.permissions.allow_close_position,
        PerpetualsError::OperationDisabled
    );

    msg!("Validate inputs");
    let position = &ctx.accounts.position;
    require!(
        params.size_usd_to_close > 0 && params.size_usd_to_close <= position.size_usd,
        PerpetualsError::InvalidAmount
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

    msg!("Read oracle prices and price exit");
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
    match position.side {
        Side::Long => require!(exit_price >= params.price_limit, PerpetualsError::MaxPriceSlippage),
        Side::Short => require!(exit_price <= params.price_limit, PerpetualsError::MaxPriceSlippage),
        Side::None => unreachable!(),
    }

    msg!("Compute proportional PnL on the portion being closed");
    let close_fee_bps = ctx.accounts.custody.fees.close_position;
    let lock_price = collateral_price.scale_to_exponent(-(Perpetuals::PRICE_DECIMALS as i32))?.price;
    let full_pnl = ctx.accounts.position.compute_pnl(
        exit_price,
        &ctx.accounts.custody,
        &ctx.accounts.collateral_custody,
        lock_price,
        close_fee_bps,
        curtime,
    )?;
    let size_usd = position.size_usd;
    let profit_usd = math::checked_mul_div(full_pnl.profit_usd, params.size_usd_to_close, size_usd)?;
    let loss_usd = math::checked_mul_div(full_pnl.loss_usd, params.size_usd_to_close, size_usd)?;
    let fee_usd = math::checked_mul_div(full_pnl.fee_usd, params.size_usd_to_close, size_usd)?;
    let collateral_release = math::checked_mul_div(position.collateral_amount, params.size_usd_to_close, size_usd)?;
    let collateral_usd_release = math::checked_mul_div(position.collateral_usd, params.size_usd_to_close, size_usd)?;
    let locked_release = math::checked_mul_div(position.locked_amount, params.size_usd_to_close, size_usd)?;

    msg!("Settle position");
    let profit_token = ctx.accounts.collateral_custody.usd_to_token(profit_usd, &collateral_price)?;
    let loss_token = ctx.accounts.collateral_custody.usd_to_token(loss_usd, &collateral_price)?;
    let amount_out = collateral_release
        .saturating_add(profit_token)
        .saturating_sub(loss_token);

    ctx.accounts.perpetuals.transfer_tokens(
        ctx.accounts.collateral_custody_token_account.to_account_info(),
        ctx.accounts.receiving_account.to_account_info(),
        ctx.accounts.transfer_authority.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        amount_out,
    )?;

    msg!("Update custody state");
    ctx.accounts.collateral_custody.unlock(locked_release);
    ctx.accounts.collateral_custody.release_collateral(collateral_release)?;
    ctx.accounts.collateral_custody.assets.owned =
        math::checked_sub(ctx.accounts.collateral_custody.assets.owned, amount_out)?;
    ctx.accounts.collateral_custody.assets.protocol_fees = math::checked_add(
        ctx.accounts.collateral_custody.assets.protocol_fees,
        ctx.accounts.collateral_custody.usd_to_token(fee_usd, &collateral_price)?,
    )?;

    let side = position.side;
    let entry_price = position.price;
    if same_custody {
        ctx.accounts.collateral_custody.record_partial_close(
            side,
            entry_price,
            params.size_usd_to_close,
            collateral_usd_release,
            locked_release,
            profit_usd,
            loss_usd,
        )?;
    } else {
        ctx.accounts.custody.record_partial_close(
            side,
            entry_price,
            params.size_usd_to_close,
            collateral_usd_release,
            locked_release,
            profit_usd,
            loss_usd,
        )?;
    }

    msg!("Update or destroy position");
    let position = &mut ctx.accounts.position;
    position.size_usd = math::checked_sub(position.size_usd, params.size_usd_to_close)?;
    position.collateral_usd = math::checked_sub(position.collateral_usd, collateral_usd_release)?;
    position.collateral_amount = math::checked_sub(position.collateral_amount, collateral_release)?;
    position.locked_amount = math::checked_sub(position.locked_amount, locked_release)?;
    position.update_time = curtime;

    if position.size_usd == 0 {
        if same_custody {
            ctx.accounts.collateral_custody.finish_close(side);
        } else {
            ctx.accounts.custody.finish_close(side);
        }
        ctx.accounts.position.close(ctx.accounts.owner.to_account_info())?;
    }

    Ok(())
}

#[derive(Accounts)]
pub struct ClosePosition<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(mut)]
    pub receiving_account: Box<Account<'info, TokenAccount>>,

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
        has_one = owner,
        seeds = [
            b"position",
            owner.key().as_ref(),
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
