use anchor_lang::prelude::*;
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::state::multisig::Multisig;
use perpetuals_state::state::perpetuals::Perpetuals;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct InitParams {
    pub min_signatures: u8,
}

/// Bootstraps the protocol singleton and its `Multisig` gate (spec 6.1
/// `init`). Runs exactly once: both accounts are `init`, so a second call
/// fails at the account-constraint level before any handler code runs.
pub fn init(ctx: Context<Init>, params: &InitParams) -> Result<()> {
    msg!("Check admin list");
    let admins: Vec<Pubkey> = ctx.remaining_accounts.iter().map(|a| a.key()).collect();
    require!(!admins.is_empty(), PerpetualsError::InvalidThreshold);

    msg!("Set multisig signers");
    ctx.accounts.multisig.set_signers(&admins, params.min_signatures)?;
    ctx.accounts.multisig.bump = *ctx.bumps.get("multisig").unwrap();

    msg!("Initialize perpetuals");
    let perpetuals = &mut ctx.accounts.perpetuals;
    perpetuals.permissions = Default::default();
    perpetuals.pools = Vec::new();
    perpetuals.inception_time = Clock::get()?.unix_timestamp;
    perpetuals.transfer_authority_bump = *ctx.bumps.get("transfer_authority").unwrap();
    perpetuals.perpetuals_bump = *ctx.bumps.get("perpetuals").unwrap();

    Ok(())
}

#[derive(Accounts)]
pub struct Init<'info> {
    #[account(mut)]
    pub admin: Signer<'info>,

    #[account(
        init,
        payer = admin,
        space = Perpetuals::LEN,
        seeds = [b"perpetuals"],
        bump
    )]
    pub perpetuals: Box<Account<'info, Perpetuals>>,

    #[account(
        init,
        payer = admin,
        space = Multisig::LEN,
        seeds = [b"multisig"],
        bump
    )]
    pub multisig: Box<Account<'info, Multisig>>,

    /// CHECK: PDA with no data of its own, used only as the signing
    /// authority over token accounts the protocol custodies.
    #[account(seeds = [b"transfer_authority"], bump)]
    pub transfer_authority: AccountInfo<'info>,

    pub system_program: Program<'info, System>,
    // remaining accounts: the initial admin identities (unsigned, read-only).
}
