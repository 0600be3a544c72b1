use crate::error::PerpetualsError;
use crate::math;
use crate::state::custody::Custody;
use anchor_lang::prelude::*;

#[derive(Copy, Clone, PartialEq, Eq, AnchorSerialize, AnchorDeserialize, Debug)]
pub enum Side {
    None,
    Long,
    Short,
}

impl Default for Side {
    fn default() -> Self {
        Side::None
    }
}

#[derive(Copy, Clone, PartialEq, Eq, AnchorSerialize, AnchorDeserialize, Debug)]
pub enum LiquidationState {
    None,
    CanBeLiquidated,
    MustBeLiquidated,
}

/// Per-trade state, spec 3's `Position` entity. The account is destroyed
/// on full close or liquidation; there is no intermediate state between
/// `Open` and `Closed` (spec 4.5).
#[account]
#[derive(Default, Debug)]
pub struct Position {
    pub owner: Pubkey,
    pub pool: Pubkey,
    pub custody: Pubkey,
    pub lock_custody: Pubkey,

    pub open_time: i64,
    pub update_time: i64,

    pub side: Side,
    /// Power exponent, spec-validated to `1..=5`.
    pub power: u8,

    /// Entry price at `Perpetuals::PRICE_DECIMALS`.
    pub price: u64,
    pub size_usd: u64,
    pub collateral_usd: u64,
    pub collateral_amount: u64,

    pub unrealized_profit_usd: u64,
    pub unrealized_loss_usd: u64,

    pub cumulative_interest_snapshot: u128,
    pub locked_amount: u64,

    pub bump: u8,
}

/// Result of a pure PnL evaluation (spec 4.5.2): never mutates state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PositionPnl {
    pub profit_usd: u64,
    pub loss_usd: u64,
    pub fee_usd: u64,
    pub interest_usd: u64,
}

impl Position {
    pub const LEN: usize = 8 + std::mem::size_of::<Position>();

    pub fn validate(&self) -> bool {
        self.side != Side::None && (1..=5).contains(&self.power) && self.size_usd >= self.collateral_usd && self.collateral_usd > 0
    }

    /// Spec 4.5.2: pure PnL evaluation against `exit_price`, net of accrued
    /// interest and the exit fee, with the profit cap against the payoff
    /// reserve (spec 4.5.2 step 6, the solvency guarantee). `custody` is the
    /// traded asset's custody (it accrues the borrow interest); `lock_custody`
    /// is the custody the payoff reserve was actually locked on — the same
    /// account as `custody` for a long, the stable collateral custody for a
    /// short — valued at `lock_price`, that custody's own price.
    pub fn compute_pnl(
        &self,
        exit_price: u64,
        custody: &Custody,
        lock_custody: &Custody,
        lock_price: u64,
        exit_fee_bps: u64,
        curtime: i64,
    ) -> Result<PositionPnl> {
        let (gross_profit, gross_loss) = match self.side {
            Side::Long => math::calc_power_perps_pnl(exit_price, self.price, self.size_usd, self.power)?,
            Side::Short => math::calc_power_perps_pnl(self.price, exit_price, self.size_usd, self.power)?,
            Side::None => (0, 0),
        };

        let interest_usd = custody.get_interest_amount_usd(self, curtime)?;
        let fee_usd = crate::state::custody::Fees::fee_amount(self.size_usd, exit_fee_bps)?;

        // Net profit/loss against interest, fee and any previously recorded
        // unrealized loss/profit carried on the position (spec 4.5.2 step 5).
        let charges = math::checked_add(interest_usd, fee_usd)?;
        let charges = math::checked_add(charges, self.unrealized_loss_usd)?;
        let net_profit = gross_profit
            .saturating_add(self.unrealized_profit_usd)
            .saturating_sub(gross_loss)
            .saturating_sub(charges);
        let net_loss = gross_loss
            .saturating_add(charges)
            .saturating_sub(gross_profit)
            .saturating_sub(self.unrealized_profit_usd);

        let locked_usd = lock_custody.token_to_usd_scaled(self.locked_amount, lock_price)?;

        Ok(PositionPnl {
            profit_usd: std::cmp::min(net_profit, locked_usd),
            loss_usd: net_loss,
            fee_usd,
            interest_usd,
        })
    }

    /// spec 4.5.4 `get_liquidation_state`.
    pub fn get_liquidation_state(
        &self,
        exit_price: u64,
        custody: &Custody,
        lock_custody: &Custody,
        lock_price: u64,
        exit_fee_bps: u64,
        curtime: i64,
    ) -> Result<LiquidationState> {
        let pnl = self.compute_pnl(exit_price, custody, lock_custody, lock_price, exit_fee_bps, curtime)?;
        let remaining = (self.collateral_usd as i128) + (pnl.profit_usd as i128) - (pnl.loss_usd as i128);
        if self.size_usd == 0 {
            return Ok(LiquidationState::None);
        }
        let margin_fraction_bps = if remaining <= 0 {
            0
        } else {
            math::checked_mul_div(remaining as u64, 10_000, self.size_usd)? as i128
        };

        let min_collateral = custody.pricing.min_collateral_bps as i128;
        let liquidation_fee = custody.pricing.liquidation_fee_bps as i128;

        if margin_fraction_bps >= min_collateral + liquidation_fee {
            Ok(LiquidationState::None)
        } else if margin_fraction_bps >= min_collateral {
            Ok(LiquidationState::CanBeLiquidated)
        } else {
            Ok(LiquidationState::MustBeLiquidated)
        }
    }

    /// spec 4.5.4 `get_liquidation_price`: monotonic bisection over a
    /// bracket around entry price since the power-k payoff is non-linear
    /// for k>1 and has no closed-form inverse. Returns the price and
    /// whether bisection converged to within one scaled-price unit.
    ///
    /// A long's margin improves as price rises (threshold increasing in
    /// price, bracket `[1, entry*10]`); a short's margin improves as price
    /// falls, so it is only ever liquidated on a price *increase* above
    /// entry (threshold decreasing in price, bracket `[entry, entry*10]`).
    /// When `custody` and `lock_custody` are the same account (a long), the
    /// trial price doubles as the lock price; otherwise (a short) the
    /// lock is valued at the caller-supplied, fixed `lock_price` since the
    /// collateral custody's own price does not move with the trial price
    /// being solved for.
    pub fn get_liquidation_price(
        &self,
        custody: &Custody,
        lock_custody: &Custody,
        lock_price: u64,
        exit_fee_bps: u64,
        curtime: i64,
    ) -> Result<(u64, bool)> {
        require!(self.size_usd > 0, PerpetualsError::InvalidAmount);
        let same_custody = self.custody == self.lock_custody;

        let (mut lo, mut hi) = match self.side {
            Side::Long => (1u64, math::checked_mul(self.price, 10)?),
            Side::Short => (self.price, math::checked_mul(self.price, 10)?),
            Side::None => return Err(PerpetualsError::InvalidSide.into()),
        };
        if lo == 0 {
            lo = 1;
        }

        // threshold(price) > 0 means "still above the liquidation floor".
        let threshold = |price: u64| -> Result<i128> {
            let trial_lock_price = if same_custody { price } else { lock_price };
            let pnl = self.compute_pnl(price, custody, lock_custody, trial_lock_price, exit_fee_bps, curtime)?;
            let remaining = (self.collateral_usd as i128) + (pnl.profit_usd as i128) - (pnl.loss_usd as i128);
            let margin_bps = if remaining <= 0 || self.size_usd == 0 {
                0i128
            } else {
                math::checked_mul_div(remaining as u64, 10_000, self.size_usd)? as i128
            };
            Ok(margin_bps - (custody.pricing.min_collateral_bps as i128))
        };

        let mut f_lo = threshold(lo)?;

        let mut converged = false;
        for _ in 0..64 {
            if hi <= lo.saturating_add(1) {
                converged = true;
                break;
            }
            let mid = lo + (hi - lo) / 2;
            let f_mid = threshold(mid)?;
            // General bisection invariant: keep the half of the bracket whose
            // endpoints still straddle the zero crossing, regardless of
            // whether the threshold rises or falls with price.
            if (f_mid >= 0) == (f_lo >= 0) {
                lo = mid;
                f_lo = f_mid;
            } else {
                hi = mid;
            }
        }

        Ok((lo, converged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::custody::{BorrowRateParams, Custody, Fees, PricingParams};

    const SIZE_USD: u64 = 10_000_000_000;

    fn custody_fixture() -> Custody {
        Custody {
            decimals: 6,
            pricing: PricingParams {
                min_collateral_bps: 100,
                liquidation_fee_bps: 50,
                ..PricingParams::default()
            },
            fees: Fees::default(),
            borrow_rate: BorrowRateParams { optimal_utilization: 1, ..BorrowRateParams::default() },
            ..Custody::default()
        }
    }

    fn position_fixture(side: Side, power: u8, price: u64, collateral_usd: u64) -> Position {
        Position {
            side,
            power,
            price,
            size_usd: SIZE_USD,
            collateral_usd,
            cumulative_interest_snapshot: 0,
            locked_amount: u64::MAX / 2,
            ..Position::default()
        }
    }

    #[test]
    fn long_power1_pnl_matches_scenario_a() {
        let custody = custody_fixture();
        let position = position_fixture(Side::Long, 1, 100_000000, 2_000_000_000);
        let pnl = position.compute_pnl(150_000000, &custody, &custody, 150_000000, 0, 0).unwrap();
        assert_eq!(pnl.profit_usd, 5_000_000_000);
        assert_eq!(pnl.loss_usd, 0);
    }

    #[test]
    fn profit_is_capped_at_locked_collateral_value() {
        let custody = custody_fixture();
        let mut position = position_fixture(Side::Long, 1, 100_000000, 2_000_000_000);
        position.locked_amount = 1_000_000_000; // $1,000 worth, far less than the $5,000 raw profit
        let pnl = position.compute_pnl(150_000000, &custody, &custody, 150_000000, 0, 0).unwrap();
        assert_eq!(pnl.profit_usd, 1_000_000_000);
    }

    #[test]
    fn liquidation_state_thresholds() {
        let custody = custody_fixture();
        // Deep loss below min_collateral + liquidation_fee -> must liquidate.
        let position = position_fixture(Side::Long, 2, 100_000000, 500_000_000);
        let state = position.get_liquidation_state(10_000000, &custody, &custody, 10_000000, 0, 0).unwrap();
        assert_eq!(state, LiquidationState::MustBeLiquidated);

        // Healthy position far from entry -> none.
        let healthy = position_fixture(Side::Long, 1, 100_000000, 5_000_000_000);
        let state = healthy.get_liquidation_state(100_000000, &custody, &custody, 100_000000, 0, 0).unwrap();
        assert_eq!(state, LiquidationState::None);
    }

    #[test]
    fn liquidation_price_brackets_long_position() {
        let custody = custody_fixture();
        let position = position_fixture(Side::Long, 2, 100_000000, 1_000_000_000);
        let (price, converged) = position.get_liquidation_price(&custody, &custody, 0, 0, 0).unwrap();
        assert!(converged);
        assert!(price < position.price);
        let state = position.get_liquidation_state(price, &custody, &custody, price, 0, 0).unwrap();
        assert_ne!(state, LiquidationState::None);
    }

    #[test]
    fn liquidation_price_brackets_short_position() {
        let custody = custody_fixture();
        let position = position_fixture(Side::Short, 2, 100_000000, 1_000_000_000);
        let (price, converged) = position.get_liquidation_price(&custody, &custody, 100_000000, 0, 0).unwrap();
        assert!(converged);
        assert!(price > position.price);
    }
}
