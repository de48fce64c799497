//! TON standard address
//!
//! Only the `addr_std` form without anycast is modelled, together with
//! `addr_none` (represented as `Option::None` by the builder and slice).
//! The textual form is the raw `workchain:hex` notation.

use crate::tvm::error::{CellError, CellResult};
use std::fmt;
use std::str::FromStr;

/// Represents a TON blockchain address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Workchain ID (-1 for masterchain, 0 for basechain)
    pub workchain: i8,
    /// 32-byte hash part of the address
    pub hash_part: [u8; 32],
}

impl Address {
    /// Serialized size of `addr_std$10 anycast:0 workchain_id:int8 address:bits256`
    pub const BIT_LEN: usize = 2 + 1 + 8 + 256;

    /// Creates a new address from workchain and hash part
    pub fn new(workchain: i8, hash_part: [u8; 32]) -> Self {
        Self {
            workchain,
            hash_part,
        }
    }

    /// Parses address from raw format: "workchain:hash"
    pub fn from_hex(address: &str) -> CellResult<Self> {
        let (workchain, hash_hex) = address
            .split_once(':')
            .ok_or_else(|| invalid(address, "expected workchain:hash"))?;

        let workchain = workchain
            .parse::<i8>()
            .map_err(|e| invalid(address, &e.to_string()))?;

        if hash_hex.len() != 64 {
            return Err(invalid(address, "hash part must be 64 hex characters"));
        }
        let hash_bytes = hex::decode(hash_hex).map_err(|e| invalid(address, &e.to_string()))?;
        let mut hash_part = [0u8; 32];
        hash_part.copy_from_slice(&hash_bytes);

        Ok(Self::new(workchain, hash_part))
    }

    /// Converts to raw format
    pub fn to_hex(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash_part))
    }
}

fn invalid(address: &str, reason: &str) -> CellError {
    CellError::InvalidData(format!("invalid address {address:?}: {reason}"))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = CellError;

    fn from_str(s: &str) -> CellResult<Self> {
        Self::from_hex(s.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex() {
        let addr_str = "0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8";
        let addr = Address::from_hex(addr_str).unwrap();
        assert_eq!(addr.workchain, 0);
        assert_eq!(addr.hash_part[0], 0x83);
        assert_eq!(addr.to_hex(), addr_str);
    }

    #[test]
    fn test_masterchain_address() {
        let addr: Address = "-1:3333333333333333333333333333333333333333333333333333333333333333"
            .parse()
            .unwrap();
        assert_eq!(addr.workchain, -1);
        assert_eq!(addr.hash_part, [0x33; 32]);
        assert_eq!(addr.to_string(), format!("-1:{}", "33".repeat(32)));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Address::from_hex("0").is_err());
        assert!(Address::from_hex("0:abcd").is_err());
        assert!(Address::from_hex("300:".to_string().as_str()).is_err());
        assert!(Address::from_hex(&format!("0:{}", "zz".repeat(32))).is_err());
    }

    #[test]
    fn test_zero_address() {
        let zero = Address::new(0, [0u8; 32]);
        assert_eq!(zero.to_hex(), format!("0:{}", "0".repeat(64)));
    }
}
