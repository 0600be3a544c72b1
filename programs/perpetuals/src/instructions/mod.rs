pub mod init;
pub mod add_pool;
pub mod add_custody;
pub mod set_custody_config;
pub mod set_permissions;
pub mod set_admin_signers;
pub mod open_position;
pub mod close_position;
pub mod liquidate_position;
pub mod get_pnl;
pub mod get_liquidation_price;

pub use add_custody::*;
pub use add_pool::*;
pub use close_position::*;
pub use get_liquidation_price::*;
pub use get_pnl::*;
pub use init::*;
pub use liquidate_position::*;
pub use open_position::*;
pub use set_admin_signers::*;
pub use set_custody_config::*;
pub use set_permissions::*;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::hash::hashv;
use perpetuals_state::error::PerpetualsError;
use perpetuals_state::state::multisig::Multisig;

/// Hashes an admin instruction's discriminating name plus its serialized
/// parameters into the accumulator `Multisig::sign` gates on (spec 4.7).
/// Two calls with different parameters never collide into the same pending
/// proposal, so a quorum can only ever apply the exact instruction the
/// admins actually signed.
pub fn hash_admin_instruction<T: AnchorSerialize>(name: &str, params: &T) -> Result<[u8; 32]> {
    let mut buf = name.as_bytes().to_vec();
    params.serialize(&mut buf)?;
    Ok(hashv(&[&buf]).to_bytes())
}

/// Instructions that create accounts via Anchor's `init` constraint (e.g.
/// `add_pool`, `add_custody`) cannot partially apply across transactions the
/// way the `Multisig::sign` accumulator is built for: the account is already
/// created by the time handler code runs. For those, quorum is instead
/// required within a single transaction: `min_signatures` distinct
/// registered admins must co-sign as `remaining_accounts`.
pub fn require_admin_quorum(multisig: &Multisig, signers: &[AccountInfo]) -> Result<()> {
    let mut distinct = std::collections::BTreeSet::new();
    for account in signers {
        if account.is_signer && multisig.is_signer(&account.key()) {
            distinct.insert(account.key());
        }
    }
    require!(
        distinct.len() >= multisig.min_signatures as usize,
        PerpetualsError::BelowThreshold
    );
    Ok(())
}
