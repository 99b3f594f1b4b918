/// Entry Decoder (C1, spec.md §4.1): splits a shred-stream payload into
/// per-entry lists of raw transaction byte slices, without parsing the
/// transactions themselves. Boundaries are found by walking the wire form.
use crate::core::wire::Cursor;
use crate::errors::EngineError;

const SIGNATURE_LEN: usize = 64;
const PUBKEY_LEN: usize = 32;
const VERSIONED_PREFIX: u8 = 0x80;

pub struct ShredEntry<'a> {
    pub hash_count: u64,
    pub poh_hash: [u8; PUBKEY_LEN],
    pub transactions: Vec<&'a [u8]>,
}

/// `(slot, payload) -> [ [tx_bytes] ]`, one inner list per entry.
pub fn decode_entries(payload: &[u8]) -> Result<Vec<ShredEntry<'_>>, EngineError> {
    let mut cursor = Cursor::new(payload);
    let entry_count = read_u64_le(&mut cursor)?;
    let mut entries = Vec::with_capacity(entry_count as usize);

    for _ in 0..entry_count {
        let hash_count = read_u64_le(&mut cursor)?;
        let poh_hash = cursor
            .read_array::<PUBKEY_LEN>()
            .map_err(|_| EngineError::MalformedEntry("truncated poh hash".into()))?;
        let tx_count = read_u64_le(&mut cursor)?;

        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let tx_start = cursor.position();
            let remaining = payload
                .get(tx_start..)
                .ok_or_else(|| EngineError::MalformedEntry("entry cursor past buffer end".into()))?;
            let tx_len = measure_transaction_len(remaining)?;
            if tx_len == 0 {
                return Err(EngineError::MalformedEntry(
                    "zero-length transaction with tx_count > 0".into(),
                ));
            }
            let tx_bytes = cursor
                .read_bytes(tx_len)
                .map_err(|_| EngineError::MalformedEntry("transaction body out of bounds".into()))?;
            transactions.push(tx_bytes);
        }

        entries.push(ShredEntry { hash_count, poh_hash, transactions });
    }

    Ok(entries)
}

fn read_u64_le(cursor: &mut Cursor<'_>) -> Result<u64, EngineError> {
    let bytes = cursor
        .read_array::<8>()
        .map_err(|_| EngineError::MalformedEntry("truncated length prefix".into()))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Walks one transaction's wire form in place and returns its byte length,
/// without allocating a decoded structure. Never reads past `buf`.
fn measure_transaction_len(buf: &[u8]) -> Result<usize, EngineError> {
    let mut cursor = Cursor::new(buf);
    let sig_count = cursor
        .read_compact_u16()
        .map_err(|_| EngineError::MalformedEntry("signature count out of bounds".into()))?;
    for _ in 0..sig_count {
        cursor
            .read_bytes(SIGNATURE_LEN)
            .map_err(|_| EngineError::MalformedEntry("truncated signature".into()))?;
    }

    let is_versioned = cursor.peek_u8().map(|b| b == VERSIONED_PREFIX).unwrap_or(false);
    if is_versioned {
        cursor.read_u8().ok();
    }
    cursor
        .read_array::<3>()
        .map_err(|_| EngineError::MalformedEntry("truncated message header".into()))?;

    let key_count = cursor
        .read_compact_u16()
        .map_err(|_| EngineError::MalformedEntry("key count out of bounds".into()))?;
    cursor
        .read_bytes(key_count as usize * PUBKEY_LEN)
        .map_err(|_| EngineError::MalformedEntry("truncated static keys".into()))?;
    cursor
        .read_array::<PUBKEY_LEN>()
        .map_err(|_| EngineError::MalformedEntry("truncated blockhash".into()))?;

    let ix_count = cursor
        .read_compact_u16()
        .map_err(|_| EngineError::MalformedEntry("instruction count out of bounds".into()))?;
    for _ in 0..ix_count {
        cursor
            .read_u8()
            .map_err(|_| EngineError::MalformedEntry("truncated instruction program index".into()))?;
        let account_count = cursor
            .read_compact_u16()
            .map_err(|_| EngineError::MalformedEntry("instruction account count out of bounds".into()))?;
        cursor
            .read_bytes(account_count as usize)
            .map_err(|_| EngineError::MalformedEntry("truncated instruction accounts".into()))?;
        let data_len = cursor
            .read_compact_u16()
            .map_err(|_| EngineError::MalformedEntry("instruction data length out of bounds".into()))?;
        cursor
            .read_bytes(data_len as usize)
            .map_err(|_| EngineError::MalformedEntry("truncated instruction data".into()))?;
    }

    if is_versioned {
        let lookup_count = cursor
            .read_compact_u16()
            .map_err(|_| EngineError::MalformedEntry("lookup count out of bounds".into()))?;
        for _ in 0..lookup_count {
            cursor
                .read_array::<PUBKEY_LEN>()
                .map_err(|_| EngineError::MalformedEntry("truncated lookup table address".into()))?;
            let writable_count = cursor
                .read_compact_u16()
                .map_err(|_| EngineError::MalformedEntry("writable lookup count out of bounds".into()))?;
            cursor
                .read_bytes(writable_count as usize)
                .map_err(|_| EngineError::MalformedEntry("truncated writable lookup indexes".into()))?;
            let readonly_count = cursor
                .read_compact_u16()
                .map_err(|_| EngineError::MalformedEntry("readonly lookup count out of bounds".into()))?;
            cursor
                .read_bytes(readonly_count as usize)
                .map_err(|_| EngineError::MalformedEntry("truncated readonly lookup indexes".into()))?;
        }
    }

    Ok(cursor.position())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wire::write_compact_u16;

    fn one_legacy_tx() -> Vec<u8> {
        let mut buf = Vec::new();
        write_compact_u16(1, &mut buf);
        buf.extend_from_slice(&[1u8; SIGNATURE_LEN]);
        buf.extend_from_slice(&[1, 0, 0]);
        write_compact_u16(1, &mut buf);
        buf.extend_from_slice(&[2u8; PUBKEY_LEN]);
        buf.extend_from_slice(&[3u8; PUBKEY_LEN]);
        write_compact_u16(0, &mut buf);
        buf
    }

    fn build_payload(entries: &[Vec<Vec<u8>>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        for txs in entries {
            buf.extend_from_slice(&0u64.to_le_bytes());
            buf.extend_from_slice(&[0u8; PUBKEY_LEN]);
            buf.extend_from_slice(&(txs.len() as u64).to_le_bytes());
            for tx in txs {
                buf.extend_from_slice(tx);
            }
        }
        buf
    }

    #[test]
    fn splits_multiple_entries_and_transactions() {
        let tx = one_legacy_tx();
        let payload = build_payload(&[vec![tx.clone()], vec![tx.clone(), tx.clone()]]);
        let entries = decode_entries(&payload).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].transactions.len(), 1);
        assert_eq!(entries[1].transactions.len(), 2);
        assert_eq!(entries[1].transactions[0], tx.as_slice());
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut payload = build_payload(&[vec![one_legacy_tx()]]);
        payload.truncate(payload.len() - 5);
        assert!(decode_entries(&payload).is_err());
    }

    #[test]
    fn empty_payload_with_zero_entries_is_ok() {
        let payload = 0u64.to_le_bytes().to_vec();
        let entries = decode_entries(&payload).unwrap();
        assert!(entries.is_empty());
    }
}
