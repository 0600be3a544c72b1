use crate::instructions::hash_admin_instruction;
use anchor_lang::prelude::*;
use perpetuals_state::state::multisig::Multisig;
use perpetuals_state::state::perpetuals::{Perpetuals, Permissions};

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct SetPermissionsParams {
    pub permissions: Permissions,
}

/// **[ADDED]** Flips the protocol-wide trading gates (spec 4.7). The only
/// way `allow_open_position` et al. are ever turned on, since `init` always
/// starts them disabled.
pub fn set_permissions(ctx: Context<SetPermissions>, params: &SetPermissionsParams) -> Result<()> {
    let hash = hash_admin_instruction("set_permissions", params)?;
    msg!("Sign multisig proposal");
    if !ctx.accounts.multisig.sign(&ctx.accounts.admin.key(), hash)? {
        return Ok(());
    }

    msg!("Apply permissions");
    ctx.accounts.perpetuals.permissions = params.permissions;
    Ok(())
}

#[derive(Accounts)]
pub struct SetPermissions<'info> {
    pub admin: Signer<'info>,

    #[account(mut, seeds = [b"multisig"], bump = multisig.bump)]
    pub multisig: Box<Account<'info, Multisig>>,

    #[account(mut, seeds = [b"perpetuals"], bump = perpetuals.perpetuals_bump)]
    pub perpetuals: Box<Account<'info, Perpetuals>>,
}
