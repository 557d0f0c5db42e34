//! Legacy transaction wire format.
//!
//! Only what a single-instruction, single-signer transaction needs:
//! compact-u16 length prefixes, the message header, the account table and
//! one compiled instruction.

use ed25519_dalek::{Signer, SigningKey};

use super::layout::instruction_discriminator;
use crate::domain::Address;

/// Account reference of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    /// Account address.
    pub address: Address,
    /// Must sign the transaction.
    pub is_signer: bool,
    /// Written by the instruction.
    pub is_writable: bool,
}

/// Program instruction before compilation into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Program to invoke.
    pub program_id: Address,
    /// Accounts in the order the program expects them.
    pub accounts: Vec<AccountMeta>,
    /// Opaque instruction data.
    pub data: Vec<u8>,
}

impl Instruction {
    /// Anchor instruction invoking `operation` on `market` with `authority` signing.
    #[must_use]
    pub fn invoke(program_id: Address, operation: &str, market: Address, authority: Address) -> Self {
        Self {
            program_id,
            accounts: vec![
                AccountMeta {
                    address: market,
                    is_signer: false,
                    is_writable: true,
                },
                AccountMeta {
                    address: authority,
                    is_signer: true,
                    is_writable: true,
                },
            ],
            data: instruction_discriminator(operation).to_vec(),
        }
    }
}

/// Append a compact-u16 length.
pub fn encode_compact_u16(out: &mut Vec<u8>, value: u16) {
    let mut rest = value;
    loop {
        let mut byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

fn encode_len(out: &mut Vec<u8>, len: usize) -> Result<(), TransactionError> {
    let len = u16::try_from(len).map_err(|_| TransactionError::TooLarge(len))?;
    encode_compact_u16(out, len);
    Ok(())
}

fn account_index(index: usize) -> Result<u8, TransactionError> {
    u8::try_from(index).map_err(|_| TransactionError::TooLarge(index))
}

fn key_index(keys: &[(Address, bool, bool)], address: &Address) -> Result<u8, TransactionError> {
    keys.iter()
        .position(|(a, _, _)| a == address)
        .ok_or(TransactionError::MissingAccount(*address))
        .and_then(account_index)
}

/// Transaction building error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// A table or payload exceeded its wire limit.
    #[error("transaction component too large: {0}")]
    TooLarge(usize),

    /// An instruction referenced an account absent from the key table.
    #[error("account {0} missing from message keys")]
    MissingAccount(Address),
}

/// Compile `instruction` into a legacy message with `fee_payer` first.
pub fn compile_message(
    instruction: &Instruction,
    fee_payer: Address,
    recent_blockhash: &Address,
) -> Result<Vec<u8>, TransactionError> {
    // (address, signer, writable), merged per address
    let mut keys: Vec<(Address, bool, bool)> = vec![(fee_payer, true, true)];
    let mut merge = |address: Address, signer: bool, writable: bool| {
        if let Some(entry) = keys.iter_mut().find(|(a, _, _)| *a == address) {
            entry.1 |= signer;
            entry.2 |= writable;
        } else {
            keys.push((address, signer, writable));
        }
    };
    for meta in &instruction.accounts {
        merge(meta.address, meta.is_signer, meta.is_writable);
    }
    merge(instruction.program_id, false, false);

    // Signers first, writable before readonly within each group
    keys.sort_by_key(|(address, signer, writable)| {
        (!signer, !writable, *address != fee_payer)
    });

    let num_signers = keys.iter().filter(|k| k.1).count();
    let readonly_signed = keys.iter().filter(|k| k.1 && !k.2).count();
    let readonly_unsigned = keys.iter().filter(|k| !k.1 && !k.2).count();

    let mut out = Vec::with_capacity(256);
    out.push(account_index(num_signers)?);
    out.push(account_index(readonly_signed)?);
    out.push(account_index(readonly_unsigned)?);

    encode_len(&mut out, keys.len())?;
    for (address, _, _) in &keys {
        out.extend_from_slice(address.as_bytes());
    }
    out.extend_from_slice(recent_blockhash.as_bytes());

    encode_len(&mut out, 1)?;
    out.push(key_index(&keys, &instruction.program_id)?);
    encode_len(&mut out, instruction.accounts.len())?;
    for meta in &instruction.accounts {
        out.push(key_index(&keys, &meta.address)?);
    }
    encode_len(&mut out, instruction.data.len())?;
    out.extend_from_slice(&instruction.data);

    Ok(out)
}

/// A signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Base-58 signature, which is also the transaction id.
    pub signature: String,
    /// Serialized wire bytes.
    pub wire: Vec<u8>,
}

/// Compile and sign `instruction` with `signer` as the only signer and fee payer.
pub fn sign_transaction(
    instruction: &Instruction,
    signer: &SigningKey,
    recent_blockhash: &Address,
) -> Result<SignedTransaction, TransactionError> {
    let fee_payer = Address::new(signer.verifying_key().to_bytes());
    let message = compile_message(instruction, fee_payer, recent_blockhash)?;
    let signature = signer.sign(&message).to_bytes();

    let mut wire = Vec::with_capacity(1 + signature.len() + message.len());
    encode_compact_u16(&mut wire, 1);
    wire.extend_from_slice(&signature);
    wire.extend_from_slice(&message);

    Ok(SignedTransaction {
        signature: bs58::encode(signature).into_string(),
        wire,
    })
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signature, Verifier};
    use test_case::test_case;

    use super::*;

    const PROGRAM: Address = Address::new([7; 32]);
    const MARKET: Address = Address::new([5; 32]);
    const BLOCKHASH: Address = Address::new([1; 32]);

    fn signer() -> SigningKey {
        SigningKey::from_bytes(&[42; 32])
    }

    #[test_case(0, &[0x00] ; "zero")]
    #[test_case(0x7f, &[0x7f] ; "one byte max")]
    #[test_case(0x80, &[0x80, 0x01] ; "two bytes min")]
    #[test_case(0x3fff, &[0xff, 0x7f] ; "two bytes max")]
    #[test_case(0x4000, &[0x80, 0x80, 0x01] ; "three bytes")]
    fn compact_u16(value: u16, expected: &[u8]) {
        let mut out = Vec::new();
        encode_compact_u16(&mut out, value);
        assert_eq!(out, expected);
    }

    #[test]
    fn message_layout() {
        let key = signer();
        let authority = Address::new(key.verifying_key().to_bytes());
        let ix = Instruction::invoke(PROGRAM, "withdraw_swapped_token_a", MARKET, authority);

        let message = compile_message(&ix, authority, &BLOCKHASH).unwrap();

        // header: one signer, no readonly signers, program is readonly unsigned
        assert_eq!(&message[..3], &[1, 0, 1]);
        assert_eq!(message[3], 3);
        assert_eq!(&message[4..36], authority.as_bytes());
        assert_eq!(&message[36..68], MARKET.as_bytes());
        assert_eq!(&message[68..100], PROGRAM.as_bytes());
        assert_eq!(&message[100..132], BLOCKHASH.as_bytes());

        let ix_bytes = &message[132..];
        // one instruction, program index 2, accounts [market=1, authority=0]
        assert_eq!(&ix_bytes[..5], &[1, 2, 2, 1, 0]);
        assert_eq!(ix_bytes[5], 8);
        assert_eq!(
            &ix_bytes[6..],
            instruction_discriminator("withdraw_swapped_token_a").as_slice()
        );
    }

    #[test]
    fn key_index_rejects_unknown_account() {
        let keys = [(PROGRAM, false, false), (MARKET, false, true)];

        assert_eq!(key_index(&keys, &MARKET), Ok(1));
        assert_eq!(
            key_index(&keys, &BLOCKHASH),
            Err(TransactionError::MissingAccount(BLOCKHASH))
        );
    }

    #[test]
    fn signature_verifies_over_message() {
        let key = signer();
        let authority = Address::new(key.verifying_key().to_bytes());
        let ix = Instruction::invoke(PROGRAM, "crank", MARKET, authority);

        let signed = sign_transaction(&ix, &key, &BLOCKHASH).unwrap();

        assert_eq!(signed.wire[0], 1);
        let signature_bytes: [u8; 64] = signed.wire[1..65].try_into().unwrap();
        let message = &signed.wire[65..];
        assert_eq!(message, compile_message(&ix, authority, &BLOCKHASH).unwrap());
        assert!(
            key.verifying_key()
                .verify(message, &Signature::from_bytes(&signature_bytes))
                .is_ok()
        );
        assert_eq!(
            bs58::decode(&signed.signature).into_vec().unwrap(),
            signature_bytes.to_vec()
        );
    }
}
