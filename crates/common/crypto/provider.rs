use ethereum_types::Address;

/// Errors from crypto operations. Opaque — does not leak library-specific types.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid recovery id")]
    InvalidRecoveryId,
    #[error("recovery failed")]
    RecoveryFailed,
}

/// EIP-2: reject high-s signatures (s > secp256k1n/2).
const SECP256K1_N_HALF: [u8; 32] =
    hex_literal::hex!("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0");

/// Recover the signer address from a 65-byte signature (r||s||v) and a 32-byte message hash.
///
/// Used by transaction sender recovery.
pub fn recover_signer(sig: &[u8; 65], msg: &[u8; 32]) -> Result<Address, CryptoError> {
    if sig[32..64] > SECP256K1_N_HALF[..] {
        return Err(CryptoError::InvalidSignature);
    }

    let recovery_id = secp256k1::ecdsa::RecoveryId::try_from(sig[64] as i32)
        .map_err(|_| CryptoError::InvalidRecoveryId)?;

    let recoverable_sig = secp256k1::ecdsa::RecoverableSignature::from_compact(
        &sig[..64],
        recovery_id,
    )
    .map_err(|_| CryptoError::InvalidSignature)?;

    let message = secp256k1::Message::from_digest(*msg);

    let public_key = secp256k1::SECP256K1
        .recover_ecdsa(&message, &recoverable_sig)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    let hash = crate::keccak::keccak_hash(&public_key.serialize_uncompressed()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}
