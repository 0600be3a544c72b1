use crate::oracle::read_oracle_price;
use anchor_lang::prelude::*;
use anchor_spl::token::{Token, TokenAccount};
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::math;
use perpetuals_state::state::custody::{Custody, Fees};
use perpetuals_state::state::perpetuals::Perpetuals;
use perpetuals_state::state::pool::Pool;
use perpetuals_state::state::position::{Position, Side};

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct OpenPositionParams {
    pub price_limit: u64,
    pub collateral_amount: u64,
    pub size_amount: u64,
    pub side: Side,
    pub power: u8,
}

/// spec 4.5.1 `open_position`.
pub fn open_position(ctx: Context<OpenPosition>, params: &OpenPositionParams) -> Result<()> {
    msg!("Check permissions");
    require!(
        ctx.accounts.perpetuals.permissions.allow_open_position
            && ctx.accounts.custody.permissions.allow_open_position,
        PerpetualsError::OperationDisabled
    );

    msg!("Validate inputs");
    require!(params.size_amount > 0 && params.collateral_amount > 0, PerpetualsError::InvalidAmount);
    require!((1..=5).contains(&params.power), PerpetualsError::InvalidPower);
    require!(params.side != Side::None, PerpetualsError::InvalidSide);

    // Longs post collateral and get paid in the same asset they trade, so
    // `custody` and `collateral_custody` are required to be the same
    // account. Anchor still deserializes the two account fields into
    // independent copies, so every mutation below is routed through a
    // single handle whenever they alias (`collateral_custody`, which is
    // declared last and so wins at account-exit serialization) rather than
    // writing through both and losing whichever write lands first.
    let same_custody = ctx.accounts.custody.key() == ctx.accounts.collateral_custody.key();
    match params.side {
        Side::Long => require!(same_custody, PerpetualsError::InvalidConfig),
        Side::Short => require!(ctx.accounts.collateral_custody.is_stable, PerpetualsError::InvalidConfig),
        Side::None => unreachable!(),
    }

    let curtime = Clock::get()?.unix_timestamp;
    msg!("Update borrow rate");
    if same_custody {
        ctx.accounts.collateral_custody.update_borrow_rate(curtime)?;
    } else {
        ctx.accounts.custody.update_borrow_rate(curtime)?;
        ctx.accounts.collateral_custody.update_borrow_rate(curtime)?;
    }

    msg!("Read oracle prices");
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

    msg!("Price entry and check slippage");
    let entry_price = ctx.accounts.pool.get_entry_price(&custody_price, params.side, &ctx.accounts.custody)?;
    match params.side {
        Side::Long => require!(entry_price <= params.price_limit, PerpetualsError::MaxPriceSlippage),
        Side::Short => require!(entry_price >= params.price_limit, PerpetualsError::MaxPriceSlippage),
        Side::None => unreachable!(),
    }

    let size_usd = ctx.accounts.custody.token_to_usd_scaled(params.size_amount, entry_price)?;
    let collateral_usd = ctx.accounts.collateral_custody.token_to_usd(params.collateral_amount, &collateral_price)?;

    msg!("Check leverage");
    ctx.accounts
        .pool
        .check_leverage(size_usd, collateral_usd, params.power, &ctx.accounts.custody, true)?;

    // The payoff reserve backs the eventual payout, which is always settled
    // out of `collateral_custody` (spec 4.5.1/4.5.3) — lock it there, not on
    // the traded asset's custody, so `unlock` at close/liquidate always
    // targets the custody that actually reserved it.
    msg!("Lock payoff reserve on the collateral custody");
    let locked_amount = math::checked_as_u64(math::checked_ceil_div(
        math::checked_mul(params.size_amount as u128, ctx.accounts.custody.pricing.max_payoff_mult as u128)?,
        Perpetuals::BPS_POWER,
    )?)?;

    msg!("Settle collateral and open fee");
    let open_fee_usd = Fees::fee_amount(size_usd, ctx.accounts.custody.fees.open_position)?;
    let open_fee_token = ctx.accounts.collateral_custody.usd_to_token(open_fee_usd, &collateral_price)?;
    require!(open_fee_token <= params.collateral_amount, PerpetualsError::InvalidAmount);
    let net_collateral_amount = math::checked_sub(params.collateral_amount, open_fee_token)?;
    let net_collateral_usd = collateral_usd.saturating_sub(open_fee_usd);

    ctx.accounts.perpetuals.transfer_tokens_from_user(
        ctx.accounts.funding_account.to_account_info(),
        ctx.accounts.collateral_custody_token_account.to_account_info(),
        ctx.accounts.owner.to_account_info(),
        ctx.accounts.token_program.to_account_info(),
        params.collateral_amount,
    )?;

    if same_custody {
        let custody = &mut ctx.accounts.collateral_custody;
        custody.lock(locked_amount)?;
        custody.add_collateral(net_collateral_amount)?;
        custody.assets.protocol_fees = math::checked_add(custody.assets.protocol_fees, open_fee_token)?;
        custody.assets.owned = math::checked_add(custody.assets.owned, params.collateral_amount)?;
    } else {
        ctx.accounts.collateral_custody.lock(locked_amount)?;
        ctx.accounts.collateral_custody.add_collateral(net_collateral_amount)?;
        ctx.accounts.collateral_custody.assets.protocol_fees =
            math::checked_add(ctx.accounts.collateral_custody.assets.protocol_fees, open_fee_token)?;
        ctx.accounts.collateral_custody.assets.owned =
            math::checked_add(ctx.accounts.collateral_custody.assets.owned, params.collateral_amount)?;
    }

    msg!("Record new position");
    let cumulative_interest_snapshot = if same_custody {
        ctx.accounts.collateral_custody.borrow_rate_state.cumulative_interest
    } else {
        ctx.accounts.custody.borrow_rate_state.cumulative_interest
    };
    let position = &mut ctx.accounts.position;
    position.owner = ctx.accounts.owner.key();
    position.pool = ctx.accounts.pool.key();
    position.custody = ctx.accounts.custody.key();
    position.lock_custody = ctx.accounts.collateral_custody.key();
    position.open_time = curtime;
    position.update_time = curtime;
    position.side = params.side;
    position.power = params.power;
    position.price = entry_price;
    position.size_usd = size_usd;
    position.collateral_usd = net_collateral_usd;
    position.collateral_amount = net_collateral_amount;
    position.unrealized_profit_usd = 0;
    position.unrealized_loss_usd = 0;
    position.cumulative_interest_snapshot = cumulative_interest_snapshot;
    position.locked_amount = locked_amount;
    position.bump = *ctx.bumps.get("position").unwrap();
    require!(position.validate(), PerpetualsError::InvalidConfig);

    if same_custody {
        ctx.accounts.collateral_custody.record_open(position)?;
    } else {
        ctx.accounts.custody.record_open(position)?;
    }
    Ok(())
}

#[derive(Accounts)]
#[instruction(params: OpenPositionParams)]
pub struct OpenPosition<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(mut)]
    pub funding_account: Box<Account<'info, TokenAccount>>,

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

    // Declared after `custody` so that for longs — where the two seeds
    // resolve to the same account — this copy is the one Anchor serializes
    // last; every mutation that could apply to either role is routed
    // through this handle in that case (see `same_custody` above).
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

    #[account(
        init,
        payer = owner,
        space = Position::LEN,
        seeds = [
            b"position",
            owner.key().as_ref(),
            pool.key().as_ref(),
            custody.key().as_ref(),
            collateral_custody.key().as_ref(),
            &[params.side as u8]
        ],
        bump
    )]
    pub position: Box<Account<'info, Position>>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}
