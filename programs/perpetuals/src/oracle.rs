use anchor_lang::prelude::*;
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::state::oracle::{OracleParams, OraclePrice, OracleType};
use pyth_solana_receiver_sdk::price_update::PriceUpdateV2;

/// Decodes `oracle_account` according to `params.oracle_type` into the
/// crate-wide normalized `OraclePrice`, then runs the staleness/confidence
/// gate (spec 4.2). This is the only place in the program that touches an
/// oracle wire format directly; everything downstream works off the
/// normalized form.
///
/// `use_ema` requests the oracle's cached EMA reading instead of spot
/// (`custody.pricing.use_ema`, spec 4.2). When the oracle variant carries no
/// EMA (the `Custom` test/ops wire layout), this falls back to spot and
/// returns `true` as the second element so the caller can log or otherwise
/// surface that the requested policy wasn't honored; `Pyth` always carries
/// both and the flag is always `false` for it.
pub fn read_oracle_price(
    params: &OracleParams,
    oracle_account: &AccountInfo,
    curtime: i64,
    use_ema: bool,
) -> Result<(OraclePrice, bool)> {
    require_keys_eq!(
        oracle_account.key(),
        params.oracle_account,
        PerpetualsError::UnsupportedOracle
    );

    let (price, ema_fallback) = match params.oracle_type {
        OracleType::Pyth => {
            let price_update = Account::<PriceUpdateV2>::try_from(oracle_account)?;
            let feed = price_update.price_message;
            let price = if use_ema {
                OraclePrice::new(feed.ema_price.max(0) as u64, feed.exponent, feed.ema_conf, feed.publish_time)
            } else {
                OraclePrice::new(feed.price.max(0) as u64, feed.exponent, feed.conf, feed.publish_time)
            };
            (price, false)
        }
        OracleType::Custom => (read_custom_oracle(oracle_account)?, use_ema),
        OracleType::None => return Err(PerpetualsError::UnsupportedOracle.into()),
    };

    price.validate(params, curtime)?;
    Ok((price, ema_fallback))
}

/// Wire layout of a custom test/ops oracle account: an 8-byte Anchor
/// discriminator followed by `price: u64, exponent: i32, confidence: u64,
/// publish_time: i64`, all little-endian.
fn read_custom_oracle(oracle_account: &AccountInfo) -> Result<OraclePrice> {
    let data = oracle_account.try_borrow_data()?;
    require!(data.len() >= 8 + 8 + 4 + 8 + 8, PerpetualsError::UnsupportedOracle);

    let price = u64::from_le_bytes(data[8..16].try_into().unwrap());
    let exponent = i32::from_le_bytes(data[16..20].try_into().unwrap());
    let confidence = u64::from_le_bytes(data[20..28].try_into().unwrap());
    let publish_time = i64::from_le_bytes(data[28..36].try_into().unwrap());

    Ok(OraclePrice::new(price, exponent, confidence, publish_time))
}
