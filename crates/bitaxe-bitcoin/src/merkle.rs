//! Coinbase assembly and merkle-branch folding for Stratum V1 job
//! construction (spec §4.4 "V1 work generation").

use bitcoin_hashes::{sha256d, Hash as HashTrait};

/// Assemble the coinbase transaction from its prefix/suffix halves and the
/// miner-chosen extranonce (`extranonce_1 || extranonce_2`), then return its
/// double-SHA256 hash in internal byte order.
pub fn coinbase_hash(coinbase_prefix: &[u8], extranonce: &[u8], coinbase_suffix: &[u8]) -> [u8; 32] {
    let mut coinbase = Vec::with_capacity(coinbase_prefix.len() + extranonce.len() + coinbase_suffix.len());
    coinbase.extend_from_slice(coinbase_prefix);
    coinbase.extend_from_slice(extranonce);
    coinbase.extend_from_slice(coinbase_suffix);
    sha256d::Hash::hash(&coinbase).into_inner()
}

/// Fold the coinbase hash through the pool-supplied merkle branch to produce
/// the block's merkle root, in internal byte order. Each step is
/// `dsha256(acc || branch)`.
pub fn fold_merkle_branch(coinbase_hash: [u8; 32], branch: &[[u8; 32]]) -> [u8; 32] {
    let mut acc = coinbase_hash;
    for step in branch {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&acc);
        buf[32..].copy_from_slice(step);
        acc = sha256d::Hash::hash(&buf).into_inner();
    }
    acc
}
