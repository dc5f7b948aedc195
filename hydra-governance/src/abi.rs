//! Contract call encoding.
//!
//! A call is a 4-byte function selector followed by 32-byte argument words.
//! Integers are big-endian and must fit in 64 bits, addresses are
//! left-padded with twelve zero bytes, and `address[]` arguments use the
//! usual head offset / length / items layout.

use std::fmt;

use hydra_core::{keccak256, Address};

use crate::error::{ContractError, ContractResult};

/// Size of one argument word.
pub const WORD_SIZE: usize = 32;

/// A 32-byte argument or return word.
pub type Word = [u8; WORD_SIZE];

/// The first four bytes of a call, naming the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    /// Selector of a canonical function signature such as `getPrice()`.
    pub fn from_signature(signature: &str) -> Self {
        let digest = keccak256(signature.as_bytes());
        Selector([digest[0], digest[1], digest[2], digest[3]])
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Finds which of `signatures` hashes to `selector`.
pub fn lookup(selector: Selector, signatures: &[&'static str]) -> Option<&'static str> {
    signatures.iter().copied().find(|signature| Selector::from_signature(signature) == selector)
}

/// Splits raw call data into its selector and argument reader.
pub fn split_call(data: &[u8]) -> ContractResult<(Selector, ArgReader<'_>)> {
    if data.len() < 4 {
        return Err(ContractError::MalformedCall(format!("call data is {} bytes, selector needs 4", data.len())));
    }
    let selector = Selector([data[0], data[1], data[2], data[3]]);
    let args = &data[4..];
    if args.len() % WORD_SIZE != 0 {
        return Err(ContractError::MalformedCall(format!(
            "argument block of {} bytes is not a whole number of words",
            args.len()
        )));
    }
    Ok((selector, ArgReader { args, cursor: 0 }))
}

/// Decodes an unsigned integer word.
pub fn word_to_uint(word: &Word) -> ContractResult<u64> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(ContractError::InvalidArgument("integer does not fit in 64 bits".to_string()));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(bytes))
}

/// Decodes an address word, rejecting dirty padding.
pub fn word_to_address(word: &Word) -> ContractResult<Address> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(ContractError::InvalidArgument("address word has non-zero padding".to_string()));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address(bytes))
}

/// Encodes an unsigned integer word.
pub fn uint_word(value: u64) -> Word {
    let mut word = [0u8; WORD_SIZE];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Sequential reader over the argument words of a call.
#[derive(Debug, Clone)]
pub struct ArgReader<'a> {
    args: &'a [u8],
    cursor: usize,
}

impl<'a> ArgReader<'a> {
    /// Number of argument words in the call.
    pub fn word_count(&self) -> usize {
        self.args.len() / WORD_SIZE
    }

    /// Words not yet consumed by head reads.
    pub fn remaining(&self) -> usize {
        self.word_count().saturating_sub(self.cursor)
    }

    fn word_at(&self, index: usize) -> ContractResult<&'a Word> {
        index
            .checked_mul(WORD_SIZE)
            .and_then(|start| Some(start..start.checked_add(WORD_SIZE)?))
            .and_then(|range| self.args.get(range))
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| ContractError::MalformedCall(format!("missing argument word {}", index)))
    }

    /// Reads the next raw word.
    pub fn word(&mut self) -> ContractResult<&'a Word> {
        let word = self.word_at(self.cursor)?;
        self.cursor += 1;
        Ok(word)
    }

    /// Reads the next word as an unsigned integer.
    pub fn uint(&mut self) -> ContractResult<u64> {
        word_to_uint(self.word()?)
    }

    /// Reads the next word as an address.
    pub fn address(&mut self) -> ContractResult<Address> {
        word_to_address(self.word()?)
    }

    /// Reads the next word as a boolean (0 or 1).
    pub fn bool(&mut self) -> ContractResult<bool> {
        match self.uint()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ContractError::InvalidArgument(format!("{} is not a boolean", other))),
        }
    }

    /// Reads a dynamic `address[]` whose head word holds its byte offset.
    pub fn address_array(&mut self) -> ContractResult<Vec<Address>> {
        let offset = usize::try_from(self.uint()?)
            .map_err(|_| ContractError::MalformedCall("array offset overflows".to_string()))?;
        if offset % WORD_SIZE != 0 {
            return Err(ContractError::MalformedCall(format!("array offset {} is not word aligned", offset)));
        }
        let start = offset / WORD_SIZE;
        if start >= self.word_count() {
            return Err(ContractError::MalformedCall(format!("array offset {} is past the call data", offset)));
        }
        let length = usize::try_from(word_to_uint(self.word_at(start)?)?)
            .map_err(|_| ContractError::MalformedCall("array length overflows".to_string()))?;
        // start < word_count, so the first item index cannot overflow
        let first = start + 1;
        if length > self.word_count() - first {
            return Err(ContractError::MalformedCall(format!("array of {} items overruns call data", length)));
        }
        (first..first + length).map(|index| word_to_address(self.word_at(index)?)).collect()
    }

    /// Fails if fixed-size arguments were left unread.
    pub fn finish(&self) -> ContractResult<()> {
        if self.remaining() != 0 {
            return Err(ContractError::MalformedCall(format!("{} unexpected trailing words", self.remaining())));
        }
        Ok(())
    }
}

/// Builds call data for a selector.
#[derive(Debug, Clone)]
pub struct CallBuilder {
    data: Vec<u8>,
}

impl CallBuilder {
    /// Starts a call to `selector`.
    pub fn new(selector: Selector) -> Self {
        Self {
            data: selector.0.to_vec(),
        }
    }

    /// Appends an integer argument.
    pub fn uint(mut self, value: u64) -> Self {
        self.data.extend_from_slice(&uint_word(value));
        self
    }

    /// Appends an address argument.
    pub fn address(mut self, address: &Address) -> Self {
        self.data.extend_from_slice(&address.to_word());
        self
    }

    /// Appends a boolean argument.
    pub fn bool(self, value: bool) -> Self {
        self.uint(u64::from(value))
    }

    /// Appends several `address[]` arguments, heads first then tails.
    pub fn address_arrays(mut self, arrays: &[&[Address]]) -> Self {
        let mut offset = arrays.len() * WORD_SIZE;
        let mut tails = Vec::new();
        for array in arrays {
            self.data.extend_from_slice(&uint_word(offset as u64));
            tails.extend_from_slice(&uint_word(array.len() as u64));
            for address in array.iter() {
                tails.extend_from_slice(&address.to_word());
            }
            offset += (array.len() + 1) * WORD_SIZE;
        }
        self.data.extend_from_slice(&tails);
        self
    }

    /// Returns the encoded call.
    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// Encodes a single integer return value.
pub fn encode_uint(value: u64) -> Vec<u8> {
    uint_word(value).to_vec()
}

/// Encodes a single boolean return value.
pub fn encode_bool(value: bool) -> Vec<u8> {
    encode_uint(u64::from(value))
}

/// Encodes a single address return value.
pub fn encode_address(address: &Address) -> Vec<u8> {
    address.to_word().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_split_call_reads_observed_vote_callstring() {
        let data = hex!("4b9f5c98 0000000000000000000000000000000000000000000000000000000000000001");
        let (selector, mut args) = split_call(&data).unwrap();
        assert_eq!(selector, Selector(hex!("4b9f5c98")));
        assert_eq!(args.word_count(), 1);
        assert!(args.bool().unwrap());
        args.finish().unwrap();
    }

    #[test]
    fn test_split_call_rejects_partial_words() {
        assert!(matches!(split_call(&[0x2f, 0xc7]), Err(ContractError::MalformedCall(_))));
        assert!(matches!(split_call(&[0x2f, 0xc7, 0x8e, 0x4c, 0x00]), Err(ContractError::MalformedCall(_))));
    }

    #[test]
    fn test_address_padding_is_strict() {
        let mut word = Address::from_low_u64_be(0x91).to_word();
        assert_eq!(word_to_address(&word).unwrap(), Address::from_low_u64_be(0x91));
        word[0] = 1;
        assert!(word_to_address(&word).is_err());
    }

    #[test]
    fn test_address_arrays_layout() {
        let contracts = [Address::from_low_u64_be(1), Address::from_low_u64_be(2)];
        let owners = [Address::from_low_u64_be(3), Address::from_low_u64_be(4)];
        let selector = Selector::from_signature("addContract(address[],address[])");
        let data = CallBuilder::new(selector).address_arrays(&[&contracts[..], &owners[..]]).build();

        // two heads, then (length + 2 items) per array
        assert_eq!(data.len(), 4 + WORD_SIZE * (2 + 3 + 3));

        let (decoded_selector, mut args) = split_call(&data).unwrap();
        assert_eq!(decoded_selector, selector);
        assert_eq!(args.address_array().unwrap(), contracts.to_vec());
        assert_eq!(args.address_array().unwrap(), owners.to_vec());
    }

    #[test]
    fn test_array_offset_near_max_is_malformed() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&uint_word(0xFFFF_FFFF_FFFF_FFE0));
        data.extend_from_slice(&uint_word(0));
        let (_, mut args) = split_call(&data).unwrap();
        assert!(matches!(args.address_array(), Err(ContractError::MalformedCall(_))));
        assert!(matches!(args.word_at(usize::MAX), Err(ContractError::MalformedCall(_))));
    }

    #[test]
    fn test_lookup_by_signature() {
        let selector = Selector::from_signature("getPrice()");
        assert_eq!(lookup(selector, &["getBytePrice()", "getPrice()"]), Some("getPrice()"));
        assert_eq!(lookup(selector, &["getBytePrice()"]), None);
    }

    #[test]
    fn test_oversized_integer_is_rejected() {
        let mut word = uint_word(5);
        word[3] = 0xff;
        assert!(word_to_uint(&word).is_err());
    }
}
