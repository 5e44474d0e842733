use crate::domain::{LedgerError, LedgerResult};

/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// `balanceOf(address)`
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Parse a `0x`-prefixed (or bare) 20-byte hex address
pub fn parse_address(address: &str) -> LedgerResult<[u8; 20]> {
    let trimmed = address.trim();
    let digits = strip_hex_prefix(trimmed);

    let bytes = hex::decode(digits)
        .map_err(|e| LedgerError::InvalidAddress(format!("{}: {}", trimmed, e)))?;

    <[u8; 20]>::try_from(bytes.as_slice()).map_err(|_| {
        LedgerError::InvalidAddress(format!("{}: expected 20 bytes, got {}", trimmed, bytes.len()))
    })
}

/// Lowercase `0x`-prefixed hex form of an address
pub fn format_address(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

pub fn encode_transfer(to: &[u8; 20], amount: u128) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&address_word(to));
    data.extend_from_slice(&uint_word(amount));
    data
}

pub fn encode_balance_of(owner: &[u8; 20]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&address_word(owner));
    data
}

/// Parse a hex quantity or a 32-byte ABI word into a u128
///
/// Leading zeros are ignored, so both `0x5208` and a full `uint256` return
/// word are accepted. Values above `u128::MAX` are rejected.
pub fn parse_quantity(value: &str) -> LedgerResult<u128> {
    let digits = strip_hex_prefix(value.trim()).trim_start_matches('0');

    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        return Err(LedgerError::InvalidResponse(format!(
            "quantity {} does not fit in 128 bits",
            value
        )));
    }

    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::InvalidResponse(format!("bad hex quantity {}: {}", value, e)))
}

pub fn to_hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

fn address_word(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}
