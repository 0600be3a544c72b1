use crate::instructions::hash_admin_instruction;
use anchor_lang::prelude::*;
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::state::custody::{BorrowRateParams, Custody, Fees, PricingParams};
use perpetuals_state::state::multisig::Multisig;
use perpetuals_state::state::perpetuals::Permissions;
use perpetuals_state::state::pool::Pool;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct SetCustodyConfigParams {
    pub pricing: PricingParams,
    pub fees: Fees,
    pub borrow_rate: BorrowRateParams,
    pub permissions: Permissions,
}

/// **[ADDED]** Lets the admin quorum correct a misconfigured custody after
/// `add_custody`, which the distilled operation surface never otherwise
/// allows (spec 6.1 note). Accumulates across transactions via
/// `Multisig::sign`; applies only once quorum on this exact instruction is
/// reached.
pub fn set_custody_config(ctx: Context<SetCustodyConfig>, params: &SetCustodyConfigParams) -> Result<()> {
    let hash = hash_admin_instruction("set_custody_config", params)?;
    msg!("Sign multisig proposal");
    if !ctx.accounts.multisig.sign(&ctx.accounts.admin.key(), hash)? {
        return Ok(());
    }

    msg!("Apply custody config");
    let custody = &mut ctx.accounts.custody;
    custody.pricing = params.pricing;
    custody.fees = params.fees;
    custody.borrow_rate = params.borrow_rate;
    custody.permissions = params.permissions;
    require!(custody.validate(), PerpetualsError::InvalidConfig);
    Ok(())
}

#[derive(Accounts)]
pub struct SetCustodyConfig<'info> {
    pub admin: Signer<'info>,

    #[account(mut, seeds = [b"multisig"], bump = multisig.bump)]
    pub multisig: Box<Account<'info, Multisig>>,

    #[account(seeds = [b"pool", pool.name.as_bytes()], bump = pool.bump)]
    pub pool: Box<Account<'info, Pool>>,

    #[account(
        mut,
        seeds = [b"custody", pool.key().as_ref(), custody.mint.as_ref()],
        bump = custody.bump
    )]
    pub custody: Box<Account<'info, Custody>>,
}
