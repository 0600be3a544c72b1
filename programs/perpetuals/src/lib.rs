use anchor_lang::prelude::*;

pub mod instructions;
pub mod oracle;

use instructions::*;

declare_id!("Fcmp5ZQ1wR5swZ87aRQyHfUiHYxrfrRVhCWrV2yYA6QG");

/// The `OpGateway` of spec 2.8: pure dispatch plus the validation and
/// state-machine calls delegated to `perpetuals-state`. Every handler
/// below just unwraps `Context` and forwards to the matching function in
/// `instructions`, which owns the actual logic and its `#[derive(Accounts)]`
/// struct.
#[program]
pub mod perpetuals {
    use super::*;

    pub fn init(ctx: Context<Init>, params: InitParams) -> Result<()> {
        instructions::init(ctx, &params)
    }

    pub fn add_pool(ctx: Context<AddPool>, params: AddPoolParams) -> Result<()> {
        instructions::add_pool(ctx, &params)
    }

    pub fn add_custody(ctx: Context<AddCustody>, params: AddCustodyParams) -> Result<()> {
        instructions::add_custody(ctx, &params)
    }

    pub fn set_custody_config(ctx: Context<SetCustodyConfig>, params: SetCustodyConfigParams) -> Result<()> {
        instructions::set_custody_config(ctx, &params)
    }

    pub fn set_permissions(ctx: Context<SetPermissions>, params: SetPermissionsParams) -> Result<()> {
        instructions::set_permissions(ctx, &params)
    }

    pub fn set_admin_signers(ctx: Context<SetAdminSigners>, params: SetAdminSignersParams) -> Result<()> {
        instructions::set_admin_signers(ctx, &params)
    }

    pub fn open_position(ctx: Context<OpenPosition>, params: OpenPositionParams) -> Result<()> {
        instructions::open_position(ctx, &params)
    }

    pub fn close_position(ctx: Context<ClosePosition>, params: ClosePositionParams) -> Result<()> {
        instructions::close_position(ctx, &params)
    }

    pub fn liquidate_position(ctx: Context<LiquidatePosition>, params: LiquidatePositionParams) -> Result<()> {
        instructions::liquidate_position(ctx, &params)
    }

    pub fn get_pnl(ctx: Context<GetPnl>, params: GetPnlParams) -> Result<(u64, u64, u64)> {
        instructions::get_pnl(ctx, &params)
    }

    pub fn get_liquidation_price(ctx: Context<GetLiquidationPrice>, params: GetLiquidationPriceParams) -> Result<u64> {
        instructions::get_liquidation_price(ctx, &params)
    }
}
