use anchor_lang::prelude::*;
use anchor_spl::token::{self, Transfer};

/// Boolean permission gate checked by every trading instruction (spec 4.7).
/// A disabled flag fails the respective operation with `OperationDisabled`.
#[derive(Copy, Clone, PartialEq, Eq, AnchorSerialize, AnchorDeserialize, Default, Debug)]
pub struct Permissions {
    pub allow_open_position: bool,
    pub allow_close_position: bool,
    pub allow_pnl_withdrawal: bool,
    pub allow_collateral_withdrawal: bool,
    pub allow_size_change: bool,
    pub allow_liquidate_position: bool,
}

/// The protocol-wide singleton. Mutated only through the Admin/Multisig gate.
#[account]
#[derive(Default, Debug)]
pub struct Perpetuals {
    pub permissions: Permissions,
    pub pools: Vec<Pubkey>,
    pub inception_time: i64,
    pub transfer_authority_bump: u8,
    pub perpetuals_bump: u8,
}

impl Perpetuals {
    // A generous fixed budget for the pools Vec<Pubkey> (32 bytes each).
    pub const LEN: usize = 8 + 4 + 32 * 32 + 8 + 1 + 1;

    pub const BPS_DECIMALS: u8 = 4;
    pub const BPS_POWER: u128 = 10u64.pow(Self::BPS_DECIMALS as u32) as u128;
    pub const USD_DECIMALS: u8 = 6;
    pub const PRICE_DECIMALS: u8 = 6;
    pub const RATE_DECIMALS: u8 = 9;
    pub const RATE_POWER: u128 = 10u64.pow(Self::RATE_DECIMALS as u32) as u128;

    pub const MAX_CUSTODIES: usize = 8;
    pub const MAX_ADMINS: usize = 6;

    pub fn get_time(&self) -> Result<i64> {
        Ok(Clock::get()?.unix_timestamp)
    }

    /// Pulls `amount` from a user-owned token account into custody, signed by
    /// the user themselves (open_position collateral + fee transfer).
    pub fn transfer_tokens_from_user<'info>(
        &self,
        from: AccountInfo<'info>,
        to: AccountInfo<'info>,
        authority: AccountInfo<'info>,
        token_program: AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        token::transfer(
            CpiContext::new(
                token_program,
                Transfer {
                    from,
                    to,
                    authority,
                },
            ),
            amount,
        )
    }

    /// Pushes `amount` out of custody to a user, signed by the PDA
    /// transfer_authority (close_position / liquidate settlement).
    pub fn transfer_tokens<'info>(
        &self,
        from: AccountInfo<'info>,
        to: AccountInfo<'info>,
        transfer_authority: AccountInfo<'info>,
        token_program: AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let authority_seeds: &[&[&[u8]]] =
            &[&[b"transfer_authority", &[self.transfer_authority_bump]]];
        token::transfer(
            CpiContext::new_with_signer(
                token_program,
                Transfer {
                    from,
                    to,
                    authority: transfer_authority,
                },
                authority_seeds,
            ),
            amount,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_default_to_fully_disabled() {
        let p = Permissions::default();
        assert!(!p.allow_open_position);
        assert!(!p.allow_liquidate_position);
    }
}
