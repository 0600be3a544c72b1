use crate::error::PerpetualsError;
use crate::math;
use crate::state::oracle::{OracleParams, OraclePrice};
use crate::state::perpetuals::{Perpetuals, Permissions};
use crate::state::position::{Position, Side};
use anchor_lang::prelude::*;

/// Power-dependent leverage caps layered on top of the custody defaults
/// (spec 4.6). `k=1` uses the custody's own configured caps unchanged.
pub struct PowerLeverageCaps {
    pub max_initial_leverage_bps: u64,
    pub max_leverage_bps: u64,
}

pub fn power_leverage_caps(k: u8, custody_default_initial: u64, custody_default_max: u64) -> PowerLeverageCaps {
    let (initial, max) = match k {
        2 => (200_000, 400_000),
        3 => (100_000, 200_000),
        4 => (50_000, 100_000),
        5 => (30_000, 60_000),
        _ => (custody_default_initial, custody_default_max),
    };
    PowerLeverageCaps {
        max_initial_leverage_bps: std::cmp::min(initial, custody_default_initial),
        max_leverage_bps: std::cmp::min(max, custody_default_max),
    }
}

/// Per-custody pricing parameters, spec 3's `PricingParams` table.
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct PricingParams {
    pub use_ema: bool,
    /// bps, `Perpetuals::BPS_DECIMALS` implied.
    pub trade_spread_long: u64,
    pub trade_spread_short: u64,
    pub swap_spread: u64,
    pub min_initial_leverage: u64,
    pub max_initial_leverage: u64,
    pub max_leverage: u64,
    pub max_payoff_mult: u64,
    pub max_confidence_bps: u64,
    pub liquidation_fee_bps: u64,
    pub min_collateral_bps: u64,
}

impl PricingParams {
    pub fn validate(&self) -> bool {
        self.min_initial_leverage > 0
            && self.min_initial_leverage <= self.max_initial_leverage
            && self.max_initial_leverage <= self.max_leverage
            && (self.trade_spread_long as u128) < Perpetuals::BPS_POWER
            && (self.trade_spread_short as u128) < Perpetuals::BPS_POWER
    }
}

/// Flat bps fee per operation. The spec's fee curve as a function of size
/// and utilization is not fully specified (Open Question, see DESIGN.md);
/// the resolution taken here is a flat bps per operation, `BPS_DECIMALS`
/// implied, rounded up in favor of the pool.
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct Fees {
    pub open_position: u64,
    pub close_position: u64,
    pub liquidation: u64,
    pub protocol_share: u64,
}

impl Fees {
    pub fn validate(&self) -> bool {
        (self.open_position as u128) <= Perpetuals::BPS_POWER
            && (self.close_position as u128) <= Perpetuals::BPS_POWER
            && (self.liquidation as u128) <= Perpetuals::BPS_POWER
            && (self.protocol_share as u128) <= Perpetuals::BPS_POWER
    }

    /// Rounds up: fees always favor the pool (spec 4.1).
    pub fn fee_amount(size_usd: u64, fee_bps: u64) -> Result<u64> {
        if fee_bps == 0 || size_usd == 0 {
            return Ok(0);
        }
        math::checked_as_u64(math::checked_ceil_div(
            math::checked_mul(size_usd as u128, fee_bps as u128)?,
            Perpetuals::BPS_POWER,
        )?)
    }
}

#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct BorrowRateParams {
    pub base_rate: u64,
    pub slope1: u64,
    pub slope2: u64,
    pub optimal_utilization: u64,
}

impl BorrowRateParams {
    pub fn validate(&self) -> bool {
        self.optimal_utilization > 0 && (self.optimal_utilization as u128) <= Perpetuals::RATE_POWER
    }
}

#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct BorrowRateState {
    pub current_rate: u64,
    pub cumulative_interest: u128,
    pub last_update: i64,
}

#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct Assets {
    pub collateral: u64,
    pub protocol_fees: u64,
    pub owned: u64,
    pub locked: u64,
}

#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct TradeStats {
    pub profit_usd: u64,
    pub loss_usd: u64,
    pub oi_long_usd: u64,
    pub oi_short_usd: u64,
}

/// Aggregate of a custody's open positions on one side, enough to
/// reconstruct a synthetic "collective position" for AUM purposes (spec
/// 4.6 `get_assets_under_management`) without walking every Position
/// account.
#[derive(Copy, Clone, PartialEq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct PositionStats {
    pub open_positions: u64,
    pub size_usd: u64,
    pub collateral_usd: u64,
    pub locked_amount: u64,
    pub weighted_price: u128,
    pub total_quantity: u128,
}

#[account]
#[derive(Default, Debug)]
pub struct Custody {
    pub pool: Pubkey,
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub decimals: u8,
    pub is_stable: bool,

    pub oracle: OracleParams,
    pub pricing: PricingParams,
    pub permissions: Permissions,
    pub fees: Fees,
    pub borrow_rate: BorrowRateParams,

    pub assets: Assets,
    pub trade_stats: TradeStats,
    pub long_positions: PositionStats,
    pub short_positions: PositionStats,
    pub borrow_rate_state: BorrowRateState,

    pub bump: u8,
    pub token_account_bump: u8,
}

impl Custody {
    pub const LEN: usize = 8 + std::mem::size_of::<Custody>();

    pub fn validate(&self) -> bool {
        self.token_account != Pubkey::default()
            && self.mint != Pubkey::default()
            && self.pricing.validate()
            && self.fees.validate()
            && self.borrow_rate.validate()
    }

    /// Spec 4.4: must be invoked before any open, close, or liquidation on
    /// a position referencing this custody.
    pub fn update_borrow_rate(&mut self, curtime: i64) -> Result<()> {
        if self.assets.owned == 0 {
            self.borrow_rate_state.current_rate = 0;
            self.borrow_rate_state.last_update =
                std::cmp::max(curtime, self.borrow_rate_state.last_update);
            return Ok(());
        }

        if curtime > self.borrow_rate_state.last_update {
            self.borrow_rate_state.cumulative_interest = self.get_cumulative_interest(curtime)?;
            self.borrow_rate_state.last_update = curtime;
        }

        let utilization = math::checked_div(
            math::checked_mul(self.assets.locked as u128, Perpetuals::RATE_POWER)?,
            self.assets.owned as u128,
        )?;

        let hourly_rate = if utilization <= self.borrow_rate.optimal_utilization as u128 {
            math::checked_div(
                math::checked_mul(utilization, self.borrow_rate.slope1 as u128)?,
                self.borrow_rate.optimal_utilization as u128,
            )?
        } else {
            math::checked_add(
                self.borrow_rate.slope1 as u128,
                math::checked_div(
                    math::checked_mul(
                        math::checked_sub(utilization, self.borrow_rate.optimal_utilization as u128)?,
                        self.borrow_rate.slope2 as u128,
                    )?,
                    math::checked_sub(Perpetuals::RATE_POWER, self.borrow_rate.optimal_utilization as u128)?,
                )?,
            )?
        };

        self.borrow_rate_state.current_rate =
            math::checked_add(math::checked_as_u64(hourly_rate)?, self.borrow_rate.base_rate)?;
        Ok(())
    }

    /// `cumulative_interest` as of `curtime`, without mutating state. The
    /// configured rate is hourly (`RATE_DECIMALS` implied); elapsed seconds
    /// are converted to hours at the end, rounding up in favor of the pool.
    pub fn get_cumulative_interest(&self, curtime: i64) -> Result<u128> {
        if curtime > self.borrow_rate_state.last_update {
            let delta = math::checked_sub(curtime, self.borrow_rate_state.last_update)? as u128;
            let accrued = math::checked_ceil_div(
                math::checked_mul(delta, self.borrow_rate_state.current_rate as u128)?,
                3600,
            )?;
            math::checked_add(self.borrow_rate_state.cumulative_interest, accrued)
        } else {
            Ok(self.borrow_rate_state.cumulative_interest)
        }
    }

    /// Interest accrued on `position` since its snapshot, in USD.
    pub fn get_interest_amount_usd(&self, position: &Position, curtime: i64) -> Result<u64> {
        if position.size_usd == 0 {
            return Ok(0);
        }
        let cumulative_interest = self.get_cumulative_interest(curtime)?;
        if cumulative_interest <= position.cumulative_interest_snapshot {
            return Ok(0);
        }
        let delta = math::checked_sub(cumulative_interest, position.cumulative_interest_snapshot)?;
        math::checked_as_u64(math::checked_div(
            math::checked_mul(delta, position.size_usd as u128)?,
            Perpetuals::RATE_POWER,
        )?)
    }

    /// Reserves `amount` tokens to back potential user profit.
    /// Invariant: `locked <= owned - protocol_fees`.
    pub fn lock(&mut self, amount: u64) -> Result<()> {
        self.assets.locked = math::checked_add(self.assets.locked, amount)?;
        let available = self.assets.owned.saturating_sub(self.assets.protocol_fees);
        require!(self.assets.locked <= available, PerpetualsError::InsufficientLiquidity);
        Ok(())
    }

    pub fn unlock(&mut self, amount: u64) {
        self.assets.locked = self.assets.locked.saturating_sub(amount);
    }

    pub fn add_collateral(&mut self, amount: u64) -> Result<()> {
        self.assets.collateral = math::checked_add(self.assets.collateral, amount)?;
        require!(self.assets.collateral <= self.assets.owned, PerpetualsError::StateCorruption);
        Ok(())
    }

    pub fn release_collateral(&mut self, amount: u64) -> Result<()> {
        self.assets.collateral = math::checked_sub(self.assets.collateral, amount)?;
        Ok(())
    }

    fn stats_mut(&mut self, side: Side) -> &mut PositionStats {
        if side == Side::Long {
            &mut self.long_positions
        } else {
            &mut self.short_positions
        }
    }

    fn stats(&self, side: Side) -> &PositionStats {
        if side == Side::Long {
            &self.long_positions
        } else {
            &self.short_positions
        }
    }

    /// Synthesizes a single Position representing the weighted-average of
    /// every open position on `side`, used only to compute AUM (spec 4.6).
    pub fn get_collective_position(&self, side: Side) -> Result<Position> {
        let stats = self.stats(side);
        if stats.open_positions == 0 || stats.total_quantity == 0 {
            return Ok(Position::default());
        }
        Ok(Position {
            side,
            price: math::checked_as_u64(math::checked_div(stats.weighted_price, stats.total_quantity)?)?,
            size_usd: stats.size_usd,
            collateral_usd: stats.collateral_usd,
            locked_amount: stats.locked_amount,
            ..Position::default()
        })
    }

    /// Open-interest and per-side aggregate bookkeeping on position open
    /// (spec 4.4 `record_open`), including the weighted-average collective
    /// position tracked for `get_assets_under_management` (spec 4.6).
    pub fn record_open(&mut self, position: &Position) -> Result<()> {
        if position.side == Side::Long {
            self.trade_stats.oi_long_usd = math::checked_add(self.trade_stats.oi_long_usd, position.size_usd)?;
        } else {
            self.trade_stats.oi_short_usd = math::checked_add(self.trade_stats.oi_short_usd, position.size_usd)?;
        }
        let quantity = math::checked_mul_div(position.size_usd, Perpetuals::BPS_POWER as u64, position.price)? as u128;
        let stats = self.stats_mut(position.side);
        stats.open_positions = math::checked_add(stats.open_positions, 1)?;
        stats.size_usd = math::checked_add(stats.size_usd, position.size_usd)?;
        stats.collateral_usd = math::checked_add(stats.collateral_usd, position.collateral_usd)?;
        stats.locked_amount = math::checked_add(stats.locked_amount, position.locked_amount)?;
        stats.weighted_price = math::checked_add(
            stats.weighted_price,
            math::checked_mul(position.price as u128, quantity)?,
        )?;
        stats.total_quantity = math::checked_add(stats.total_quantity, quantity)?;
        Ok(())
    }

    /// Counter bookkeeping on position close/liquidation (spec 4.4 `record_close`).
    pub fn record_close(
        &mut self,
        position: &Position,
        realized_profit_usd: u64,
        realized_loss_usd: u64,
    ) -> Result<()> {
        if position.side == Side::Long {
            self.trade_stats.oi_long_usd = self.trade_stats.oi_long_usd.saturating_sub(position.size_usd);
        } else {
            self.trade_stats.oi_short_usd = self.trade_stats.oi_short_usd.saturating_sub(position.size_usd);
        }
        self.trade_stats.profit_usd = math::checked_add(self.trade_stats.profit_usd, realized_profit_usd)?;
        self.trade_stats.loss_usd = math::checked_add(self.trade_stats.loss_usd, realized_loss_usd)?;

        let quantity = math::checked_mul_div(position.size_usd, Perpetuals::BPS_POWER as u64, position.price)? as u128;
        let stats = self.stats_mut(position.side);
        if stats.open_positions <= 1 {
            *stats = PositionStats::default();
            return Ok(());
        }
        stats.open_positions = math::checked_sub(stats.open_positions, 1)?;
        stats.size_usd = math::checked_sub(stats.size_usd, position.size_usd)?;
        stats.collateral_usd = math::checked_sub(stats.collateral_usd, position.collateral_usd)?;
        stats.locked_amount = stats.locked_amount.saturating_sub(position.locked_amount);
        stats.weighted_price = stats.weighted_price.saturating_sub(math::checked_mul(position.price as u128, quantity)?);
        stats.total_quantity = stats.total_quantity.saturating_sub(quantity);
        Ok(())
    }

    /// Counter bookkeeping for a partial close (spec 4.5.3): reduces the
    /// per-side aggregates by the portion being closed, but — unlike
    /// `record_close` — never decrements `open_positions`, since the
    /// position itself survives with a smaller size. Callers close a
    /// position fully by following this with `finish_close` once the
    /// remaining `size_usd` reaches zero.
    pub fn record_partial_close(
        &mut self,
        side: Side,
        entry_price: u64,
        size_usd_closed: u64,
        collateral_usd_closed: u64,
        locked_amount_closed: u64,
        realized_profit_usd: u64,
        realized_loss_usd: u64,
    ) -> Result<()> {
        if side == Side::Long {
            self.trade_stats.oi_long_usd = self.trade_stats.oi_long_usd.saturating_sub(size_usd_closed);
        } else {
            self.trade_stats.oi_short_usd = self.trade_stats.oi_short_usd.saturating_sub(size_usd_closed);
        }
        self.trade_stats.profit_usd = math::checked_add(self.trade_stats.profit_usd, realized_profit_usd)?;
        self.trade_stats.loss_usd = math::checked_add(self.trade_stats.loss_usd, realized_loss_usd)?;

        let quantity = math::checked_mul_div(size_usd_closed, Perpetuals::BPS_POWER as u64, entry_price)? as u128;
        let stats = self.stats_mut(side);
        stats.size_usd = stats.size_usd.saturating_sub(size_usd_closed);
        stats.collateral_usd = stats.collateral_usd.saturating_sub(collateral_usd_closed);
        stats.locked_amount = stats.locked_amount.saturating_sub(locked_amount_closed);
        stats.weighted_price = stats.weighted_price.saturating_sub(math::checked_mul(entry_price as u128, quantity)?);
        stats.total_quantity = stats.total_quantity.saturating_sub(quantity);
        Ok(())
    }

    /// Drops `open_positions` by one once a position's remaining size has
    /// hit zero after one or more `record_partial_close` calls.
    pub fn finish_close(&mut self, side: Side) {
        let stats = self.stats_mut(side);
        if stats.open_positions <= 1 {
            *stats = PositionStats::default();
        } else {
            stats.open_positions = stats.open_positions.saturating_sub(1);
        }
    }

    pub fn token_to_usd(&self, token_amount: u64, price: &OraclePrice) -> Result<u64> {
        price.get_asset_amount_usd(token_amount, self.decimals)
    }

    pub fn usd_to_token(&self, amount_usd: u64, price: &OraclePrice) -> Result<u64> {
        price.get_token_amount(amount_usd, self.decimals)
    }

    /// USD value of `token_amount` at a price already normalized to
    /// `Perpetuals::PRICE_DECIMALS` (the form every pure pricing function in
    /// this crate passes around), without needing a full `OraclePrice`.
    pub fn token_to_usd_scaled(&self, token_amount: u64, price_scaled: u64) -> Result<u64> {
        math::checked_decimal_mul(
            token_amount,
            -(self.decimals as i32),
            price_scaled,
            -(Perpetuals::PRICE_DECIMALS as i32),
            -(Perpetuals::USD_DECIMALS as i32),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Custody {
        Custody {
            decimals: 6,
            assets: Assets { owned: 1_000, locked: 500, ..Assets::default() },
            borrow_rate: BorrowRateParams {
                base_rate: 0,
                slope1: 80_000,
                slope2: 120_000,
                optimal_utilization: 800_000_000,
            },
            ..Custody::default()
        }
    }

    #[test]
    fn update_borrow_rate_matches_kinked_curve() {
        let mut c = fixture();
        c.update_borrow_rate(3600).unwrap();
        assert_eq!(c.borrow_rate_state.current_rate, 50_000);
        c.update_borrow_rate(5400).unwrap();
        assert_eq!(c.borrow_rate_state.cumulative_interest, 25_000);
        c.update_borrow_rate(7200).unwrap();
        assert_eq!(c.borrow_rate_state.cumulative_interest, 50_000);
    }

    #[test]
    fn update_borrow_rate_is_idempotent_at_dt_zero() {
        let mut c = fixture();
        c.update_borrow_rate(3600).unwrap();
        let before = c.borrow_rate_state;
        c.update_borrow_rate(3600).unwrap();
        assert_eq!(c.borrow_rate_state, before);
    }

    #[test]
    fn cumulative_interest_is_monotone() {
        let mut c = fixture();
        let mut last = 0u128;
        for t in [3600, 5000, 7200, 7200, 20000] {
            c.update_borrow_rate(t).unwrap();
            assert!(c.borrow_rate_state.cumulative_interest >= last);
            last = c.borrow_rate_state.cumulative_interest;
        }
    }

    #[test]
    fn lock_respects_owned_minus_protocol_fees() {
        let mut c = fixture();
        c.assets.protocol_fees = 100;
        assert!(c.lock(400).is_ok()); // locked now 900, available 900
        assert!(c.lock(1).is_err()); // would exceed available
    }

    #[test]
    fn collateral_cannot_exceed_owned() {
        let mut c = fixture();
        assert!(c.add_collateral(1_000).is_ok());
        assert!(c.add_collateral(1).is_err());
    }

    #[test]
    fn record_open_close_round_trips_open_interest() {
        let mut c = fixture();
        let position = Position {
            side: Side::Long,
            price: 100_000000,
            size_usd: 10_000,
            collateral_usd: 1_000,
            locked_amount: 200,
            ..Position::default()
        };
        c.record_open(&position).unwrap();
        assert_eq!(c.trade_stats.oi_long_usd, 10_000);
        assert_eq!(c.long_positions.open_positions, 1);
        c.record_close(&position, 500, 0).unwrap();
        assert_eq!(c.trade_stats.oi_long_usd, 0);
        assert_eq!(c.long_positions.open_positions, 0);
    }
}
