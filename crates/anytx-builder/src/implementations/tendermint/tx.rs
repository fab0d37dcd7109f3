//! Cosmos SDK transaction envelope and its protobuf wire forms.

use crate::BuilderError;
use cosmrs::crypto::PublicKey;
use cosmrs::proto::cosmos::tx::v1beta1::{
	AuthInfo as ProtoAuthInfo, TxBody as ProtoTxBody, TxRaw,
};
use cosmrs::proto::traits::Message;
use cosmrs::tendermint::chain;
use cosmrs::tx::{AuthInfo, Body, Fee, SignDoc, SignerInfo};
use cosmrs::{Coin, Tx};
use sha2::{Digest, Sha256};

/// A Cosmos transaction together with the context it is signed under.
///
/// `chain_id`, `account_number` and `sequence` belong to the sender and are
/// read from the node at build time. They are not part of the wire bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TendermintTransaction {
	pub body: Body,
	pub auth_info: AuthInfo,
	pub signatures: Vec<Vec<u8>>,
	pub sender: String,
	pub chain_id: String,
	pub account_number: u64,
	pub sequence: u64,
}

impl TendermintTransaction {
	pub fn body_bytes(&self) -> Vec<u8> {
		ProtoTxBody::from(self.body.clone()).encode_to_vec()
	}

	pub fn auth_info_bytes(&self) -> Vec<u8> {
		ProtoAuthInfo::from(self.auth_info.clone()).encode_to_vec()
	}

	/// Hex of the encoded `TxBody`, for signers that take raw payloads.
	pub fn body_hex(&self) -> String {
		hex::encode(self.body_bytes())
	}

	/// SHA-256 of the encoded `TxBody`, hex.
	pub fn body_sha256(&self) -> String {
		hex::encode(Sha256::digest(self.body_bytes()))
	}

	pub fn auth_info_hex(&self) -> String {
		hex::encode(self.auth_info_bytes())
	}

	pub fn auth_info_sha256(&self) -> String {
		hex::encode(Sha256::digest(self.auth_info_bytes()))
	}

	/// Encoded `TxRaw`, the form nodes accept.
	pub fn to_bytes(&self) -> Vec<u8> {
		TxRaw {
			body_bytes: self.body_bytes(),
			auth_info_bytes: self.auth_info_bytes(),
			signatures: self.signatures.clone(),
		}
		.encode_to_vec()
	}

	/// Network hash: uppercase hex SHA-256 of the `TxRaw` bytes.
	pub fn hash(&self) -> String {
		hex::encode_upper(Sha256::digest(self.to_bytes()))
	}

	/// Decodes `TxRaw` bytes. The signing context is left empty.
	pub fn from_raw_bytes(bytes: &[u8]) -> Result<Self, BuilderError> {
		let tx = Tx::from_bytes(bytes)
			.map_err(|e| BuilderError::InvalidInput(format!("Invalid transaction: {}", e)))?;

		Ok(Self {
			body: tx.body,
			auth_info: tx.auth_info,
			signatures: tx.signatures,
			sender: String::new(),
			chain_id: String::new(),
			account_number: 0,
			sequence: 0,
		})
	}

	pub fn describe(&self) -> serde_json::Value {
		let fee = &self.auth_info.fee;
		serde_json::json!({
			"sender": self.sender,
			"chain_id": self.chain_id,
			"account_number": self.account_number,
			"sequence": self.sequence,
			"memo": self.body.memo,
			"timeout_height": self.body.timeout_height.value(),
			"messages": self
				.body
				.messages
				.iter()
				.map(|m| m.type_url.clone())
				.collect::<Vec<_>>(),
			"gas_limit": fee.gas_limit,
			"fee": fee
				.amount
				.iter()
				.map(|c| format!("{}{}", c.amount, c.denom))
				.collect::<Vec<_>>(),
			"signatures": self.signatures.len(),
			"body_sha256": self.body_sha256(),
			"auth_info_sha256": self.auth_info_sha256(),
		})
	}
}

/// `SIGN_MODE_DIRECT` signer info for a compressed secp256k1 key.
///
/// Without a key the node substitutes a placeholder during simulation.
pub fn signer_info(public_key: Option<&[u8]>, sequence: u64) -> Result<SignerInfo, BuilderError> {
	let public_key = public_key
		.map(|key| {
			cosmrs::tendermint::PublicKey::from_raw_secp256k1(key)
				.map(PublicKey::from)
				.ok_or_else(|| {
				BuilderError::InvalidInput(format!(
					"Invalid secp256k1 public key {}",
					hex::encode(key)
				))
			})
		})
		.transpose()?;
	Ok(SignerInfo::single_direct(public_key, sequence))
}

pub fn fee(amount: Coin, gas_limit: u64) -> Fee {
	Fee::from_amount_and_gas(amount, gas_limit)
}

/// An `AuthInfo` without signers, filled in as keys sign.
pub fn unsigned_auth_info(fee: Fee) -> AuthInfo {
	AuthInfo {
		signer_infos: Vec::new(),
		fee,
	}
}

pub(crate) fn parse_chain_id(chain_id: &str) -> Result<chain::Id, BuilderError> {
	chain_id
		.parse()
		.map_err(|e| BuilderError::InvalidInput(format!("Invalid chain id '{}': {}", chain_id, e)))
}

/// Canonical `SignDoc` bytes over `body` and `auth_info`.
pub fn sign_doc_bytes(
	body: &Body,
	auth_info: &AuthInfo,
	chain_id: &str,
	account_number: u64,
) -> Result<Vec<u8>, BuilderError> {
	SignDoc::new(body, auth_info, &parse_chain_id(chain_id)?, account_number)
		.and_then(SignDoc::into_bytes)
		.map_err(|e| BuilderError::Signing(format!("Cannot encode sign doc: {}", e)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::tendermint::fee::TxOptions;
	use crate::implementations::tendermint::messages::Message;
	use anytx_account::TendermintAccount;
	use cosmrs::proto::cosmos::tx::signing::v1beta1::SignMode;
	use cosmrs::proto::cosmos::tx::v1beta1::{mode_info, SignerInfo as ProtoSignerInfo};

	const DELEGATOR: &str = "cosmos19rl4cm2hmr8afy4kldpxz3fka4jguq0auqdal4";
	const VALIDATOR: &str = "cosmosvaloper1sjllsnramtg3ewxqwwrwjxfgc4n4ef9u2lcnj0";

	fn public_key() -> Vec<u8> {
		TendermintAccount::from_private_key(&[0x11; 32], "cosmos")
			.unwrap()
			.compressed_public_key()
	}

	fn uatom(amount: u128) -> Coin {
		Coin::new(amount, "uatom").unwrap()
	}

	fn sample() -> TendermintTransaction {
		TendermintTransaction {
			body: Body::new(Vec::new(), "STAKING MEMO", 42u32),
			auth_info: signer_info(Some(&public_key()), 5)
				.unwrap()
				.auth_info(fee(uatom(1200), 200_000)),
			signatures: vec![vec![1u8; 64]],
			sender: DELEGATOR.to_string(),
			chain_id: "cosmoshub-4".to_string(),
			account_number: 7,
			sequence: 5,
		}
	}

	#[test]
	fn test_raw_round_trip_keeps_wire_fields() {
		let tx = sample();
		let parsed = TendermintTransaction::from_raw_bytes(&tx.to_bytes()).unwrap();

		assert_eq!(parsed.body, tx.body);
		assert_eq!(parsed.auth_info, tx.auth_info);
		assert_eq!(parsed.signatures, tx.signatures);
		assert_eq!(parsed.body.memo, "STAKING MEMO");
		assert!(parsed.chain_id.is_empty());
	}

	#[test]
	fn test_digest_helpers() {
		let tx = sample();
		assert_eq!(hex::decode(tx.body_hex()).unwrap(), tx.body_bytes());
		assert_eq!(tx.body_bytes(), tx.body.clone().into_bytes().unwrap());
		assert_eq!(tx.auth_info_sha256().len(), 64);
		assert_eq!(tx.hash().len(), 64);
		assert_eq!(tx.hash(), tx.hash().to_uppercase());
		assert_eq!(tx.describe()["fee"][0], "1200uatom");
		assert_eq!(tx.describe()["timeout_height"], 42);
	}

	#[test]
	fn test_signer_info_is_sign_mode_direct() {
		let info = ProtoSignerInfo::from(signer_info(None, 3).unwrap());
		assert!(info.public_key.is_none());
		assert_eq!(info.sequence, 3);
		match info.mode_info.and_then(|m| m.sum) {
			Some(mode_info::Sum::Single(single)) => assert_eq!(single.mode, SignMode::Direct as i32),
			other => panic!("unexpected mode info {:?}", other),
		}

		let keyed = ProtoSignerInfo::from(signer_info(Some(&public_key()), 3).unwrap());
		assert_eq!(
			keyed.public_key.unwrap().type_url,
			"/cosmos.crypto.secp256k1.PubKey"
		);
		assert!(matches!(
			signer_info(Some(&[2u8; 5]), 3),
			Err(BuilderError::InvalidInput(_))
		));
	}

	#[test]
	fn test_sign_doc_depends_on_chain_and_account() {
		let tx = sample();
		let doc = sign_doc_bytes(&tx.body, &tx.auth_info, "cosmoshub-4", 7).unwrap();
		assert_eq!(
			doc,
			sign_doc_bytes(&tx.body, &tx.auth_info, "cosmoshub-4", 7).unwrap()
		);
		assert_ne!(
			doc,
			sign_doc_bytes(&tx.body, &tx.auth_info, "theta-testnet-001", 7).unwrap()
		);
		assert_ne!(
			doc,
			sign_doc_bytes(&tx.body, &tx.auth_info, "cosmoshub-4", 8).unwrap()
		);
		assert!(sign_doc_bytes(&tx.body, &tx.auth_info, "", 7).is_err());
	}

	#[test]
	fn test_sign_doc_ignores_construction_order() {
		let delegate = Message::Delegate {
			delegator: DELEGATOR.to_string(),
			validator: VALIDATOR.to_string(),
			amount: "1000uatom".parse().unwrap(),
		};

		let forward = TxOptions::new(vec![delegate.clone()])
			.with_memo("STAKING MEMO")
			.with_timeout_height(100)
			.with_gas_prices("0.006uatom".parse().unwrap());
		let backward = TxOptions::new(Vec::new())
			.with_gas_prices("0.006uatom".parse().unwrap())
			.with_timeout_height(100)
			.with_memo("STAKING MEMO");
		let backward = TxOptions {
			msgs: vec![delegate],
			..backward
		};
		assert_eq!(forward, backward);

		let body_a = forward.body().unwrap();
		let body_b = backward.body().unwrap();

		// signer info and fee attached in either order
		let auth_a = signer_info(Some(&public_key()), 5)
			.unwrap()
			.auth_info(fee(uatom(720), 120_000));
		let mut auth_b = unsigned_auth_info(fee(uatom(720), 120_000));
		auth_b
			.signer_infos
			.push(signer_info(Some(&public_key()), 5).unwrap());

		assert_eq!(
			sign_doc_bytes(&body_a, &auth_a, "cosmoshub-4", 7).unwrap(),
			sign_doc_bytes(&body_b, &auth_b, "cosmoshub-4", 7).unwrap()
		);
	}

	#[test]
	fn test_garbage_rejected() {
		assert!(TendermintTransaction::from_raw_bytes(&[0xff, 0xff, 0xff]).is_err());
	}
}
