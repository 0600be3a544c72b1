use anchor_lang::prelude::*;
use anchor_spl::token::Mint;

pub mod state;
pub mod math;
pub mod error;
pub use state::*;

declare_id!("FLASH6Lo6h3iasJKWDs2F8TkW2UKf3s15C8PMGuVfgBn");

/// Read-only surface, analogous to the teacher's `flash-read` program: a
/// thin CPI entrypoint that lets other on-chain programs query pool state
/// without depending on `perpetuals`'s full instruction set. All of the
/// actual computation lives in the plain `state::pool::Pool` methods so it
/// is exercised the same way by unit tests and by this CPI call.
#[program]
pub mod perpetuals_state {
    use super::*;

    pub fn get_lp_token_price(ctx: Context<GetLpTokenPrice>) -> Result<u64> {
        let pool = &ctx.accounts.pool;
        let aum_usd = pool.aum_usd;
        let lp_supply = ctx.accounts.lp_token_mint.supply;
        if lp_supply == 0 {
            return Ok(0);
        }
        math::checked_decimal_div(
            aum_usd,
            -(Perpetuals::USD_DECIMALS as i32),
            lp_supply,
            -(ctx.accounts.lp_token_mint.decimals as i32),
            -(Perpetuals::USD_DECIMALS as i32),
        )
    }
}

#[derive(Accounts)]
pub struct GetLpTokenPrice<'info> {
    #[account(
        seeds = [b"perpetuals"],
        bump = perpetuals.perpetuals_bump,
    )]
    pub perpetuals: Box<Account<'info, Perpetuals>>,

    #[account(
        seeds = [b"pool",
                 pool.name.as_bytes()],
        bump = pool.bump
    )]
    pub pool: Box<Account<'info, Pool>>,

    #[account(
        seeds = [b"lp_token_mint",
                 pool.key().as_ref()],
        bump = pool.lp_mint_bump
    )]
    pub lp_token_mint: Box<Account<'info, Mint>>,

    // remaining accounts:
    //   pool.custodies.len() custody accounts (read-only, unsigned)
    //   pool.custodies.len() custody oracles (read-only, unsigned)
}
