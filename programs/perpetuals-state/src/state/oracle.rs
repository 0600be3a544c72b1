use crate::error::PerpetualsError;
use crate::math;
use anchor_lang::prelude::*;

#[derive(Copy, Clone, PartialEq, Eq, AnchorSerialize, AnchorDeserialize, Debug)]
pub enum OracleType {
    None,
    Custom,
    Pyth,
}

impl Default for OracleType {
    fn default() -> Self {
        OracleType::None
    }
}

/// Per-custody oracle configuration: which account to read, what kind of
/// feed it is, and the freshness/confidence gates applied to every read.
#[derive(Copy, Clone, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct OracleParams {
    pub oracle_account: Pubkey,
    pub oracle_type: OracleType,
    pub max_price_age_sec: u32,
    pub max_confidence_bps: u64,
}

/// A normalized price reading, independent of the wire format it came from.
#[derive(Copy, Clone, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct OraclePrice {
    pub price: u64,
    pub exponent: i32,
    pub confidence: u64,
    pub publish_time: i64,
}

pub const NIL_PRICE: OraclePrice = OraclePrice {
    price: 0,
    exponent: 0,
    confidence: 0,
    publish_time: 0,
};

impl OraclePrice {
    pub fn new(price: u64, exponent: i32, confidence: u64, publish_time: i64) -> Self {
        Self {
            price,
            exponent,
            confidence,
            publish_time,
        }
    }

    /// Rejects a reading that is stale or whose confidence interval is too
    /// wide relative to `params`, evaluated as of `curtime`.
    pub fn validate(&self, params: &OracleParams, curtime: i64) -> Result<()> {
        require!(self.price > 0, PerpetualsError::UnsupportedOracle);

        let age = curtime
            .checked_sub(self.publish_time)
            .ok_or(PerpetualsError::MathOverflow)?;
        require!(
            age >= 0 && age <= params.max_price_age_sec as i64,
            PerpetualsError::StaleOraclePrice
        );

        // confidence_bps = confidence / price * 10_000
        let confidence_bps = (self.confidence as u128)
            .checked_mul(crate::state::perpetuals::Perpetuals::BPS_POWER)
            .ok_or(PerpetualsError::MathOverflow)?
            .checked_div(self.price as u128)
            .ok_or(PerpetualsError::DivisionByZero)?;
        require!(
            confidence_bps <= params.max_confidence_bps as u128,
            PerpetualsError::PriceConfidenceTooWide
        );
        Ok(())
    }

    pub fn scale_to_exponent(&self, target_exponent: i32) -> Result<OraclePrice> {
        if self.exponent == target_exponent {
            return Ok(*self);
        }
        let price = math::scale_to_exponent(self.price, self.exponent, target_exponent)?;
        let confidence = math::scale_to_exponent(self.confidence, self.exponent, target_exponent)?;
        Ok(OraclePrice {
            price,
            exponent: target_exponent,
            confidence,
            publish_time: self.publish_time,
        })
    }

    pub fn checked_sub(&self, other: &OraclePrice) -> Result<OraclePrice> {
        let other = other.scale_to_exponent(self.exponent)?;
        let price = math::checked_sub(self.price as i64, other.price as i64)?;
        Ok(OraclePrice {
            price: price.max(0) as u64,
            exponent: self.exponent,
            confidence: self.confidence,
            publish_time: self.publish_time.min(other.publish_time),
        })
    }

    /// USD value (at `Perpetuals::USD_DECIMALS`) of `token_amount` native
    /// units of a token with `token_decimals` decimals, at this price.
    pub fn get_asset_amount_usd(&self, token_amount: u64, token_decimals: u8) -> Result<u64> {
        math::checked_decimal_mul(
            token_amount,
            -(token_decimals as i32),
            self.price,
            self.exponent,
            -(crate::state::perpetuals::Perpetuals::USD_DECIMALS as i32),
        )
    }

    /// Inverse of `get_asset_amount_usd`: native token units worth `amount_usd`.
    pub fn get_token_amount(&self, amount_usd: u64, token_decimals: u8) -> Result<u64> {
        math::checked_decimal_div(
            amount_usd,
            -(crate::state::perpetuals::Perpetuals::USD_DECIMALS as i32),
            self.price,
            self.exponent,
            -(token_decimals as i32),
        )
    }
}

impl PartialEq for OraclePrice {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(std::cmp::Ordering::Equal)
    }
}

impl PartialOrd for OraclePrice {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        let other_scaled = other.scale_to_exponent(self.exponent).ok()?;
        self.price.partial_cmp(&other_scaled.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_price_is_rejected() {
        let price = OraclePrice::new(100_000_000, -6, 1_000, 0);
        let params = OracleParams {
            oracle_account: Pubkey::default(),
            oracle_type: OracleType::Pyth,
            max_price_age_sec: 30,
            max_confidence_bps: 100,
        };
        assert!(price.validate(&params, 100).is_err());
        assert!(price.validate(&params, 10).is_ok());
    }

    #[test]
    fn wide_confidence_is_rejected() {
        // confidence is 5% of price -> 500bps, above the 100bps gate.
        let price = OraclePrice::new(100_000_000, -6, 5_000_000, 0);
        let params = OracleParams {
            oracle_account: Pubkey::default(),
            oracle_type: OracleType::Pyth,
            max_price_age_sec: 30,
            max_confidence_bps: 100,
        };
        assert!(price.validate(&params, 0).is_err());
    }

    #[test]
    fn scale_to_exponent_round_trips() {
        let price = OraclePrice::new(100_000_000, -6, 1_000, 42);
        let scaled = price.scale_to_exponent(-8).unwrap();
        assert_eq!(scaled.price, 100_000_00_00);
        let back = scaled.scale_to_exponent(-6).unwrap();
        assert_eq!(back.price, price.price);
    }

    #[test]
    fn ordering_compares_across_exponents() {
        let a = OraclePrice::new(100, -2, 0, 0); // 1.00
        let b = OraclePrice::new(1000, -3, 0, 0); // 1.000
        assert!(a == b);
        let c = OraclePrice::new(1001, -3, 0, 0);
        assert!(c > a);
    }
}
