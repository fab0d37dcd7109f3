//! `SIGN_MODE_DIRECT` signing.
//!
//! A signer signs a `SignDoc` whose `AuthInfo` lists only its own signer
//! info. The signed transaction then gets the full list: every earlier
//! signer info plus the new one, and every earlier signature plus the new
//! one. Signing over the final multi-signer bytes would produce a signature
//! the chain does not accept.

use super::tx::{sign_doc_bytes, signer_info, TendermintTransaction};
use crate::BuilderError;
use anytx_account::AccountInterface;

/// Per-signer values that enter the `SignDoc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerContext {
	pub account_number: u64,
	pub sequence: u64,
}

/// The exact bytes `account` signs for `tx`.
pub fn sign_bytes(
	tx: &TendermintTransaction,
	public_key: &[u8],
	context: &SignerContext,
) -> Result<Vec<u8>, BuilderError> {
	let placeholder = signer_info(Some(public_key), context.sequence)?
		.auth_info(tx.auth_info.fee.clone());
	sign_doc_bytes(&tx.body, &placeholder, &tx.chain_id, context.account_number)
}

/// Adds `account`'s signature to `tx`.
pub fn sign_direct(
	tx: TendermintTransaction,
	account: &dyn AccountInterface,
	context: &SignerContext,
) -> Result<TendermintTransaction, BuilderError> {
	let public_key = account.public_key();
	let payload = sign_bytes(&tx, &public_key, context)?;
	let signature = account.sign(&payload)?;

	let mut signed = tx;
	signed
		.auth_info
		.signer_infos
		.push(signer_info(Some(&public_key), context.sequence)?);
	signed.signatures.push(signature);
	Ok(signed)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::tendermint::tx::{fee, unsigned_auth_info};
	use anytx_account::TendermintAccount;
	use cosmrs::tx::Body;
	use cosmrs::Coin;

	const KEY_A: [u8; 32] = [0x11; 32];
	const KEY_B: [u8; 32] = [0x22; 32];

	fn unsigned() -> TendermintTransaction {
		TendermintTransaction {
			body: Body::new(Vec::new(), "STAKING MEMO", 0u32),
			auth_info: unsigned_auth_info(fee(Coin::new(0, "uatom").unwrap(), 200_000)),
			signatures: vec![],
			sender: String::new(),
			chain_id: "cosmoshub-4".to_string(),
			account_number: 0,
			sequence: 0,
		}
	}

	fn context(account_number: u64, sequence: u64) -> SignerContext {
		SignerContext {
			account_number,
			sequence,
		}
	}

	#[test]
	fn test_single_signer_signs_final_bytes() {
		let account = TendermintAccount::from_private_key(&KEY_A, "cosmos").unwrap();
		let signed = sign_direct(unsigned(), &account, &context(5, 1)).unwrap();

		assert_eq!(signed.signatures.len(), 1);
		assert_eq!(signed.auth_info.signer_infos.len(), 1);

		// with one signer the placeholder equals the final auth info
		let doc = sign_doc_bytes(&signed.body, &signed.auth_info, "cosmoshub-4", 5).unwrap();
		assert!(account.verify(&doc, &signed.signatures[0]));
	}

	#[test]
	fn test_signing_is_deterministic() {
		let account = TendermintAccount::from_private_key(&KEY_A, "cosmos").unwrap();
		let first = sign_direct(unsigned(), &account, &context(5, 1)).unwrap();
		let second = sign_direct(unsigned(), &account, &context(5, 1)).unwrap();
		assert_eq!(first.signatures, second.signatures);
	}

	#[test]
	fn test_tampered_body_invalidates_signature() {
		let account = TendermintAccount::from_private_key(&KEY_A, "cosmos").unwrap();
		let signed = sign_direct(unsigned(), &account, &context(5, 1)).unwrap();

		let mut doc = sign_doc_bytes(&signed.body, &signed.auth_info, "cosmoshub-4", 5).unwrap();
		let last = doc.len() - 1;
		doc[last] ^= 0x01;
		assert!(!account.verify(&doc, &signed.signatures[0]));
	}

	#[test]
	fn test_second_signer_appends() {
		let a = TendermintAccount::from_private_key(&KEY_A, "cosmos").unwrap();
		let b = TendermintAccount::from_private_key(&KEY_B, "cosmos").unwrap();

		let once = sign_direct(unsigned(), &a, &context(5, 1)).unwrap();
		let twice = sign_direct(once.clone(), &b, &context(8, 3)).unwrap();

		assert_eq!(twice.signatures.len(), 2);
		assert_eq!(twice.signatures[0], once.signatures[0]);
		assert_eq!(twice.auth_info.signer_infos[0], once.auth_info.signer_infos[0]);
		assert_eq!(twice.auth_info.signer_infos[1].sequence, 3);

		// b signed the placeholder holding only its own signer info
		let expected = sign_bytes(&once, &b.compressed_public_key(), &context(8, 3)).unwrap();
		assert!(b.verify(&expected, &twice.signatures[1]));

		let final_doc = sign_doc_bytes(&twice.body, &twice.auth_info, "cosmoshub-4", 8).unwrap();
		assert!(!b.verify(&final_doc, &twice.signatures[1]));
	}
}
