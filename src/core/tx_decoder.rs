/// Transaction Decoder (C2, spec.md §4.2): versioned-first-then-legacy
/// decode of a single transaction's wire bytes into `DecodedTransaction`.
use crate::core::types::{CompiledInstruction, DecodedTransaction, LookupRef, TxVersion};
use crate::core::wire::Cursor;
use crate::errors::EngineError;
use solana_sdk::pubkey::Pubkey;

const SIGNATURE_LEN: usize = 64;
const PUBKEY_LEN: usize = 32;
const VERSIONED_PREFIX: u8 = 0x80;

/// `tx_bytes -> DecodedTransaction`. Tries the versioned layout first; on
/// any structural failure falls back to legacy. `Decode` only if both fail.
pub fn decode_transaction(tx_bytes: &[u8]) -> Result<DecodedTransaction, EngineError> {
    let mut cursor = Cursor::new(tx_bytes);
    let sig_count = cursor
        .read_compact_u16()
        .map_err(|_| EngineError::Decode("signature count out of bounds".into()))?;
    if sig_count == 0 {
        return Err(EngineError::Decode("zero signatures".into()));
    }
    let first_sig = cursor
        .read_bytes(SIGNATURE_LEN)
        .map_err(|_| EngineError::Decode("truncated first signature".into()))?;
    for _ in 1..sig_count {
        cursor
            .read_bytes(SIGNATURE_LEN)
            .map_err(|_| EngineError::Decode("truncated signature".into()))?;
    }
    let signature = bs58::encode(first_sig).into_string();

    let message_start = cursor.position();
    if let Ok(decoded) = decode_versioned_message(tx_bytes, message_start, signature.clone()) {
        return Ok(decoded);
    }
    decode_legacy_message(tx_bytes, message_start, signature)
        .map_err(|_| EngineError::Decode("neither versioned nor legacy decode succeeded".into()))
}

fn decode_versioned_message(
    buf: &[u8],
    start: usize,
    signature: String,
) -> Result<DecodedTransaction, ()> {
    let mut cursor = Cursor::new(&buf[start..]);
    let prefix = cursor.peek_u8().map_err(|_| ())?;
    if prefix != VERSIONED_PREFIX {
        return Err(());
    }
    cursor.read_u8().map_err(|_| ())?;

    let _header = cursor.read_array::<3>().map_err(|_| ())?;
    let key_count = cursor.read_compact_u16().map_err(|_| ())?;
    let mut account_keys_static = Vec::with_capacity(key_count as usize);
    for _ in 0..key_count {
        let k = cursor.read_array::<PUBKEY_LEN>().map_err(|_| ())?;
        account_keys_static.push(Pubkey::new_from_array(k));
    }
    let _blockhash = cursor.read_array::<PUBKEY_LEN>().map_err(|_| ())?;

    let compiled_instructions = read_instructions(&mut cursor)?;

    let lookup_count = cursor.read_compact_u16().map_err(|_| ())?;
    let mut lookup_refs = Vec::with_capacity(lookup_count as usize);
    for _ in 0..lookup_count {
        let table = Pubkey::new_from_array(cursor.read_array::<PUBKEY_LEN>().map_err(|_| ())?);
        let writable_count = cursor.read_compact_u16().map_err(|_| ())?;
        let writable_ixs = cursor
            .read_bytes(writable_count as usize)
            .map_err(|_| ())?
            .to_vec();
        let readonly_count = cursor.read_compact_u16().map_err(|_| ())?;
        let readonly_ixs = cursor
            .read_bytes(readonly_count as usize)
            .map_err(|_| ())?
            .to_vec();
        lookup_refs.push(LookupRef { table, writable_ixs, readonly_ixs });
    }

    Ok(DecodedTransaction {
        signature,
        account_keys_static,
        version: TxVersion::V0,
        compiled_instructions,
        lookup_refs,
    })
}

fn decode_legacy_message(
    buf: &[u8],
    start: usize,
    signature: String,
) -> Result<DecodedTransaction, ()> {
    let mut cursor = Cursor::new(&buf[start..]);
    let _header = cursor.read_array::<3>().map_err(|_| ())?;
    let key_count = cursor.read_compact_u16().map_err(|_| ())?;
    let mut account_keys_static = Vec::with_capacity(key_count as usize);
    for _ in 0..key_count {
        let k = cursor.read_array::<PUBKEY_LEN>().map_err(|_| ())?;
        account_keys_static.push(Pubkey::new_from_array(k));
    }
    let _blockhash = cursor.read_array::<PUBKEY_LEN>().map_err(|_| ())?;

    let compiled_instructions = read_instructions(&mut cursor)?;

    Ok(DecodedTransaction {
        signature,
        account_keys_static,
        version: TxVersion::Legacy,
        compiled_instructions,
        lookup_refs: Vec::new(),
    })
}

fn read_instructions(cursor: &mut Cursor<'_>) -> Result<Vec<CompiledInstruction>, ()> {
    let ix_count = cursor.read_compact_u16().map_err(|_| ())?;
    let mut out = Vec::with_capacity(ix_count as usize);
    for _ in 0..ix_count {
        let program_ix = cursor.read_u8().map_err(|_| ())?;
        let account_count = cursor.read_compact_u16().map_err(|_| ())?;
        let account_ixs = cursor.read_bytes(account_count as usize).map_err(|_| ())?.to_vec();
        let data_len = cursor.read_compact_u16().map_err(|_| ())?;
        let data = cursor.read_bytes(data_len as usize).map_err(|_| ())?.to_vec();
        out.push(CompiledInstruction { program_ix, account_ixs, data });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wire::write_compact_u16;

    fn build_legacy_tx(num_keys: u8, instructions: &[(u8, Vec<u8>, Vec<u8>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_compact_u16(1, &mut buf);
        buf.extend_from_slice(&[7u8; SIGNATURE_LEN]);
        buf.extend_from_slice(&[1, 0, 0]);
        write_compact_u16(num_keys as u16, &mut buf);
        for i in 0..num_keys {
            buf.extend_from_slice(&[i; PUBKEY_LEN]);
        }
        buf.extend_from_slice(&[9u8; PUBKEY_LEN]);
        write_compact_u16(instructions.len() as u16, &mut buf);
        for (program_ix, accounts, data) in instructions {
            buf.push(*program_ix);
            write_compact_u16(accounts.len() as u16, &mut buf);
            buf.extend_from_slice(accounts);
            write_compact_u16(data.len() as u16, &mut buf);
            buf.extend_from_slice(data);
        }
        buf
    }

    #[test]
    fn decodes_legacy_transaction() {
        let tx = build_legacy_tx(3, &[(1, vec![0, 2], vec![0xde, 0xad])]);
        let decoded = decode_transaction(&tx).unwrap();
        assert_eq!(decoded.version, TxVersion::Legacy);
        assert_eq!(decoded.account_keys_static.len(), 3);
        assert_eq!(decoded.compiled_instructions.len(), 1);
        assert_eq!(decoded.compiled_instructions[0].data, vec![0xde, 0xad]);
        assert!(decoded.lookup_refs.is_empty());
    }

    #[test]
    fn decodes_versioned_transaction_with_lookup_refs() {
        let mut buf = Vec::new();
        write_compact_u16(1, &mut buf);
        buf.extend_from_slice(&[3u8; SIGNATURE_LEN]);
        buf.push(VERSIONED_PREFIX);
        buf.extend_from_slice(&[1, 0, 0]);
        write_compact_u16(2, &mut buf);
        buf.extend_from_slice(&[1u8; PUBKEY_LEN]);
        buf.extend_from_slice(&[2u8; PUBKEY_LEN]);
        buf.extend_from_slice(&[9u8; PUBKEY_LEN]);
        write_compact_u16(1, &mut buf);
        buf.push(0);
        write_compact_u16(1, &mut buf);
        buf.push(0);
        write_compact_u16(2, &mut buf);
        buf.extend_from_slice(&[0xaa, 0xbb]);
        write_compact_u16(1, &mut buf);
        buf.extend_from_slice(&[5u8; PUBKEY_LEN]);
        write_compact_u16(1, &mut buf);
        buf.push(2);
        write_compact_u16(1, &mut buf);
        buf.push(3);

        let decoded = decode_transaction(&buf).unwrap();
        assert_eq!(decoded.version, TxVersion::V0);
        assert_eq!(decoded.lookup_refs.len(), 1);
        assert_eq!(decoded.lookup_refs[0].writable_ixs, vec![2]);
        assert_eq!(decoded.lookup_refs[0].readonly_ixs, vec![3]);
    }

    #[test]
    fn rejects_truncated_transaction() {
        let tx = vec![1u8];
        assert!(decode_transaction(&tx).is_err());
    }
}
