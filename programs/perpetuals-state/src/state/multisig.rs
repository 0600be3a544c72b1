use crate::error::PerpetualsError;
use crate::state::perpetuals::Perpetuals;
use anchor_lang::prelude::*;

/// M-of-N quorum gate that every admin-mutating instruction must pass
/// through before it is allowed to touch `Perpetuals`, `Pool` or `Custody`
/// state. Distinct admins accumulate signatures against a single pending
/// instruction hash; the instruction only applies once `min_signatures`
/// distinct admins have signed that exact hash.
#[account]
#[derive(Debug)]
pub struct Multisig {
    pub num_signers: u8,
    pub signers: [Pubkey; Perpetuals::MAX_ADMINS],
    pub min_signatures: u8,

    // Pending proposal: the hash of the instruction awaiting quorum, which
    // signer slots have signed it so far, and how many have signed.
    pub instruction_hash: [u8; 32],
    pub signed: [bool; Perpetuals::MAX_ADMINS],
    pub signed_count: u8,

    pub bump: u8,
}

impl Default for Multisig {
    fn default() -> Self {
        Self {
            num_signers: 0,
            signers: [Pubkey::default(); Perpetuals::MAX_ADMINS],
            min_signatures: 0,
            instruction_hash: [0u8; 32],
            signed: [false; Perpetuals::MAX_ADMINS],
            signed_count: 0,
            bump: 0,
        }
    }
}

impl Multisig {
    pub const LEN: usize = 8 + 1 + 32 * Perpetuals::MAX_ADMINS + 1 + 32 + Perpetuals::MAX_ADMINS + 1 + 1;

    pub fn set_signers(&mut self, admins: &[Pubkey], min_signatures: u8) -> Result<()> {
        require!(!admins.is_empty(), PerpetualsError::InvalidThreshold);
        require!(
            admins.len() <= Perpetuals::MAX_ADMINS,
            PerpetualsError::TooManyAdmins
        );
        require!(
            min_signatures >= 1 && min_signatures as usize <= admins.len(),
            PerpetualsError::InvalidThreshold
        );

        self.num_signers = admins.len() as u8;
        self.signers = [Pubkey::default(); Perpetuals::MAX_ADMINS];
        self.signers[..admins.len()].copy_from_slice(admins);
        self.min_signatures = min_signatures;
        self.clear_pending();
        Ok(())
    }

    fn signer_index(&self, signer: &Pubkey) -> Option<usize> {
        self.signers[..self.num_signers as usize]
            .iter()
            .position(|s| s == signer)
    }

    /// Whether `signer` is one of the registered admin identities.
    pub fn is_signer(&self, signer: &Pubkey) -> bool {
        self.signer_index(signer).is_some()
    }

    fn clear_pending(&mut self) {
        self.instruction_hash = [0u8; 32];
        self.signed = [false; Perpetuals::MAX_ADMINS];
        self.signed_count = 0;
    }

    /// Records `signer`'s approval of `instruction_hash`. Returns `Ok(true)`
    /// the moment quorum is reached (and resets the pending proposal so the
    /// next call starts fresh), `Ok(false)` while more signatures are still
    /// needed.
    pub fn sign(&mut self, signer: &Pubkey, instruction_hash: [u8; 32]) -> Result<bool> {
        let idx = self
            .signer_index(signer)
            .ok_or(PerpetualsError::NotAdmin)?;

        if self.signed_count == 0 {
            self.instruction_hash = instruction_hash;
        } else if self.instruction_hash != instruction_hash {
            return Err(PerpetualsError::InstructionMismatch.into());
        }

        require!(!self.signed[idx], PerpetualsError::DuplicateSignature);
        self.signed[idx] = true;
        self.signed_count = self
            .signed_count
            .checked_add(1)
            .ok_or(PerpetualsError::MathOverflow)?;

        if self.signed_count >= self.min_signatures {
            self.clear_pending();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Abandons whatever proposal is pending, e.g. after an admin swap.
    pub fn reset_pending(&mut self) {
        self.clear_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admins(n: usize) -> Vec<Pubkey> {
        (0..n).map(|i| Pubkey::new_from_array([i as u8; 32])).collect()
    }

    #[test]
    fn quorum_requires_distinct_signers() {
        let a = admins(3);
        let mut ms = Multisig::default();
        ms.set_signers(&a, 2).unwrap();

        let hash = [7u8; 32];
        assert_eq!(ms.sign(&a[0], hash).unwrap(), false);
        // Same admin signing again is rejected, not counted twice.
        assert!(ms.sign(&a[0], hash).is_err());
        assert_eq!(ms.sign(&a[1], hash).unwrap(), true);
        // Quorum reached, accumulator reset.
        assert_eq!(ms.signed_count, 0);
    }

    #[test]
    fn mismatched_instruction_is_rejected() {
        let a = admins(3);
        let mut ms = Multisig::default();
        ms.set_signers(&a, 2).unwrap();

        ms.sign(&a[0], [1u8; 32]).unwrap();
        assert!(ms.sign(&a[1], [2u8; 32]).is_err());
    }

    #[test]
    fn unknown_signer_is_rejected() {
        let a = admins(2);
        let mut ms = Multisig::default();
        ms.set_signers(&a, 1).unwrap();
        let stranger = Pubkey::new_from_array([99u8; 32]);
        assert!(ms.sign(&stranger, [0u8; 32]).is_err());
    }

    #[test]
    fn threshold_validation() {
        let a = admins(3);
        let mut ms = Multisig::default();
        assert!(ms.set_signers(&a, 0).is_err());
        assert!(ms.set_signers(&a, 4).is_err());
        assert!(ms.set_signers(&[], 1).is_err());
    }
}
