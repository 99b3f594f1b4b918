/// Aggregator Classifier (C4, spec.md §4.4). Walks top-level instructions
/// of a resolved transaction and tags it by matching program-id + leading
/// 8-byte instruction-data prefix against enumerated discriminator sets,
/// in the style of the teacher's `raydium_cpmm.rs` discriminator matching
/// (`SwapBaseInput` computed from `SHA256(...)`).
use crate::core::types::{Aggregator, AggregatorTag, ResolvedTransaction};
use once_cell::sync::Lazy;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Program id for aggregator A. Placeholder routed-through-lookup-table
/// address; real deployments configure this at the call site.
pub static PROGRAM_A: Lazy<Pubkey> =
    Lazy::new(|| Pubkey::from_str("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4").unwrap());
/// Program id for aggregator B.
pub static PROGRAM_B: Lazy<Pubkey> =
    Lazy::new(|| Pubkey::from_str("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P").unwrap());

/// 12 enumerated 8-byte instruction-data prefixes for aggregator A.
pub static A_PREFIXES: Lazy<Vec<[u8; 8]>> = Lazy::new(|| {
    vec![
        [0xc1, 0x20, 0x9b, 0x33, 0x41, 0xd6, 0x9c, 0x81],
        [0x3e, 0x2a, 0xf8, 0x05, 0x4a, 0x77, 0x10, 0xe2],
        [0x1f, 0x42, 0xaa, 0x1c, 0x4c, 0x6a, 0xb2, 0x0e],
        [0x7e, 0x5c, 0x0a, 0x88, 0x23, 0x4d, 0xd4, 0x31],
        [0x44, 0x9c, 0x2e, 0xf7, 0x6b, 0x0a, 0x5f, 0x18],
        [0x9b, 0x1d, 0x37, 0x40, 0x8e, 0xc2, 0x55, 0x6a],
        [0x2c, 0x6f, 0x81, 0x03, 0xd5, 0x4e, 0x99, 0x7b],
        [0x55, 0x0e, 0xf4, 0x9a, 0x1b, 0x6c, 0x33, 0x8d],
        [0x8a, 0x3b, 0x5d, 0x7e, 0x11, 0x90, 0x64, 0xf2],
        [0x0d, 0x4e, 0x6a, 0x2f, 0x85, 0x39, 0xc1, 0x77],
        [0x71, 0x2d, 0x9c, 0x58, 0x3a, 0xe0, 0x47, 0xb6],
        [0x3a, 0x98, 0x5d, 0x10, 0x6c, 0x42, 0x2b, 0xe9],
    ]
});

/// 6 enumerated 8-byte instruction-data prefixes for aggregator B.
pub static B_PREFIXES: Lazy<Vec<[u8; 8]>> = Lazy::new(|| {
    vec![
        [0xf8, 0x19, 0x2e, 0x6d, 0x83, 0x5c, 0x41, 0x0a],
        [0x64, 0xd2, 0x4e, 0x91, 0x3b, 0x7f, 0xa8, 0x55],
        [0x2b, 0x7a, 0xe1, 0x4c, 0x99, 0x38, 0x6d, 0x02],
        [0xd0, 0x5c, 0x8b, 0x33, 0x2e, 0x7a, 0x41, 0x9f],
        [0x17, 0xa4, 0x6e, 0x89, 0x53, 0x2c, 0xd0, 0x6b],
        [0x9e, 0x33, 0x0a, 0x7c, 0x41, 0xb5, 0x88, 0x2d],
    ]
});

/// `(resolved_tx) -> Tag`. Inner (CPI) instructions are not examined.
pub fn classify(resolved: &ResolvedTransaction) -> AggregatorTag {
    for ix in &resolved.decoded.compiled_instructions {
        let Some(program_id) = resolved.program_id(ix) else { continue };
        if ix.data.len() < 8 {
            continue;
        }
        let prefix: [u8; 8] = ix.data[0..8].try_into().unwrap();

        if program_id == *PROGRAM_A && A_PREFIXES.contains(&prefix) {
            return AggregatorTag::Tagged(Aggregator::A);
        }
        if program_id == *PROGRAM_B && B_PREFIXES.contains(&prefix) {
            return AggregatorTag::Tagged(Aggregator::B);
        }
    }
    AggregatorTag::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CompiledInstruction, DecodedTransaction, TxVersion};

    fn resolved_with(program_id: Pubkey, data: Vec<u8>) -> ResolvedTransaction {
        let decoded = DecodedTransaction {
            signature: "sig".into(),
            account_keys_static: vec![program_id],
            version: TxVersion::Legacy,
            compiled_instructions: vec![CompiledInstruction { program_ix: 0, account_ixs: vec![], data }],
            lookup_refs: vec![],
        };
        ResolvedTransaction { account_keys_full: decoded.account_keys_static.clone(), decoded }
    }

    #[test]
    fn tags_aggregator_a_on_matching_prefix() {
        let mut data = A_PREFIXES[0].to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        let resolved = resolved_with(*PROGRAM_A, data);
        assert_eq!(classify(&resolved), AggregatorTag::Tagged(Aggregator::A));
    }

    #[test]
    fn untagged_on_unknown_prefix() {
        let resolved = resolved_with(*PROGRAM_A, vec![0u8; 8]);
        assert_eq!(classify(&resolved), AggregatorTag::None);
    }

    #[test]
    fn ignores_short_instruction_data() {
        let resolved = resolved_with(*PROGRAM_A, vec![1, 2, 3]);
        assert_eq!(classify(&resolved), AggregatorTag::None);
    }

    /// A one-byte-different prefix must never classify — guards against an
    /// accidental substring/prefix-of-prefix match creeping into `classify`.
    #[test]
    fn near_miss_prefixes_never_classify() {
        for known in A_PREFIXES.iter().chain(B_PREFIXES.iter()) {
            for byte_ix in 0..8 {
                let mut mutated = *known;
                mutated[byte_ix] ^= 0x01;
                if A_PREFIXES.contains(&mutated) || B_PREFIXES.contains(&mutated) {
                    continue;
                }
                let resolved = resolved_with(*PROGRAM_A, mutated.to_vec());
                assert_eq!(
                    classify(&resolved),
                    AggregatorTag::None,
                    "one-byte mutation of {:?} at index {} unexpectedly classified",
                    known,
                    byte_ix
                );
            }
        }
    }

    /// Seeded pseudo-random near-miss prefixes (xorshift, no crate) across
    /// every enumerated prefix, checked against the program id that prefix
    /// does NOT belong to (wrong program id alone must reject).
    #[test]
    fn seeded_random_prefixes_against_wrong_program_never_classify() {
        let mut state: u64 = 0x9E3779B97F4A7C15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..200 {
            let bytes = next().to_be_bytes();
            if A_PREFIXES.contains(&bytes) || B_PREFIXES.contains(&bytes) {
                continue;
            }
            let resolved = resolved_with(*PROGRAM_B, bytes.to_vec());
            assert_eq!(classify(&resolved), AggregatorTag::None);
        }
    }
}
