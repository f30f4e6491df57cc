use blake2::{Blake2b512, Digest};

const CHECKSUM_PREFIX: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;

/// Address prefix registered for xx network.
pub const XX_NETWORK_PREFIX: u16 = 55;
/// Largest prefix representable in the two-byte form.
pub const MAX_PREFIX: u16 = 16_383;

pub fn is_valid_prefix(prefix: u16) -> bool {
    prefix <= MAX_PREFIX
}

/// SS58 text form of a 32-byte account id under the given network prefix.
pub fn encode(account: &[u8; 32], prefix: u16) -> String {
    debug_assert!(is_valid_prefix(prefix), "ss58 prefix {} out of range", prefix);

    let mut data = Vec::with_capacity(2 + account.len() + CHECKSUM_LEN);
    if prefix < 64 {
        data.push(prefix as u8);
    } else {
        data.push((((prefix & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000);
        data.push(((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6));
    }
    data.extend_from_slice(account);

    let checksum = Blake2b512::new()
        .chain_update(CHECKSUM_PREFIX)
        .chain_update(&data)
        .finalize();
    data.extend_from_slice(&checksum[..CHECKSUM_LEN]);

    bs58::encode(data).into_string()
}
