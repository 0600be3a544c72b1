use crate::instructions::hash_admin_instruction;
use anchor_lang::prelude::*;
use perpetuals_state::state::multisig::Multisig;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct SetAdminSignersParams {
    pub min_signatures: u8,
}

/// **[ADDED]** Rotates the admin set and/or threshold (spec 3's `Multisig`
/// invariant `1 ≤ min_signatures ≤ |admins| ≤ MAX_ADMINS`). The new admin
/// list is passed as `remaining_accounts`; any pending proposal against the
/// old admin set is abandoned once quorum to change it is reached.
pub fn set_admin_signers(ctx: Context<SetAdminSigners>, params: &SetAdminSignersParams) -> Result<()> {
    let hash = hash_admin_instruction("set_admin_signers", params)?;
    msg!("Sign multisig proposal");
    if !ctx.accounts.multisig.sign(&ctx.accounts.admin.key(), hash)? {
        return Ok(());
    }

    msg!("Rotate admin signers");
    let admins: Vec<Pubkey> = ctx.remaining_accounts.iter().map(|a| a.key()).collect();
    ctx.accounts.multisig.set_signers(&admins, params.min_signatures)
}

#[derive(Accounts)]
pub struct SetAdminSigners<'info> {
    pub admin: Signer<'info>,

    #[account(mut, seeds = [b"multisig"], bump = multisig.bump)]
    pub multisig: Box<Account<'info, Multisig>>,
    // remaining accounts: the new admin identities (unsigned, read-only).
}
