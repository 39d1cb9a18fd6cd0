//! Meta-string encoder.
//!
//! Encoding selection is deterministic: one pass collects character-class
//! statistics, then the cheapest applicable packing wins. The packed form
//! prepends one flag bit, so `n` chars at `b` bits per char occupy
//! `ceil((n * b + 1) / 8)` bytes; when that leaves at least `b` spare bits,
//! the flag is set so the decoder drops the phantom trailing char.

use crate::error::{Error, Result};

use super::{Encoding, MetaString, MAX_META_STRING_LEN};

/// Encodes identifiers into [`MetaString`]s.
///
/// The two special chars extend the 6-bit alphabet; a namespace encoder and
/// a type-name encoder differ only in this choice.
#[derive(Debug, Clone, Copy)]
pub struct MetaStringEncoder {
    special_char1: char,
    special_char2: char,
}

struct StringStatistics {
    digit_count: usize,
    upper_count: usize,
    can_lower_special: bool,
    can_lower_upper_digit_special: bool,
}

impl MetaStringEncoder {
    #[must_use]
    pub fn new(special_char1: char, special_char2: char) -> Self {
        Self { special_char1, special_char2 }
    }

    /// Encodes `input`, choosing the cheapest applicable packing.
    pub fn encode(&self, input: &str) -> Result<MetaString> {
        if !input.is_ascii() {
            if input.len() > MAX_META_STRING_LEN {
                return Err(Error::MetaStringTooLong(input.len()));
            }
            return Ok(MetaString::new(
                input.to_owned(),
                Encoding::Utf8,
                self.special_char1,
                self.special_char2,
                input.as_bytes().to_vec(),
            ));
        }
        let encoding = self.compute_encoding(input);
        self.encode_with_encoding(input, encoding)
    }

    /// Encodes `input` with a caller-chosen packing.
    pub fn encode_with_encoding(
        &self,
        input: &str,
        encoding: Encoding,
    ) -> Result<MetaString> {
        if encoding != Encoding::Utf8 && !input.is_ascii() {
            return Err(Error::MetaStringNonAscii);
        }
        if input.len() > MAX_META_STRING_LEN {
            return Err(Error::MetaStringTooLong(input.len()));
        }
        if input.is_empty() {
            return Ok(MetaString::new(
                String::new(),
                encoding,
                self.special_char1,
                self.special_char2,
                Vec::new(),
            ));
        }
        let encoded = match encoding {
            Encoding::Utf8 => input.as_bytes().to_vec(),
            Encoding::LowerSpecial => {
                self.pack(input.as_bytes(), 5)?
            }
            Encoding::LowerUpperDigitSpecial => {
                self.pack(input.as_bytes(), 6)?
            }
            Encoding::FirstToLowerSpecial => {
                let mut chars = input.as_bytes().to_vec();
                if !chars[0].is_ascii_uppercase() {
                    return Err(Error::MetaStringNonAscii);
                }
                chars[0] = chars[0] - b'A' + b'a';
                self.pack(&chars, 5)?
            }
            Encoding::AllToLowerSpecial => {
                let mut chars =
                    Vec::with_capacity(input.len() + count_uppers(input));
                for &c in input.as_bytes() {
                    if c.is_ascii_uppercase() {
                        chars.push(b'|');
                        chars.push(c - b'A' + b'a');
                    } else {
                        chars.push(c);
                    }
                }
                self.pack(&chars, 5)?
            }
        };
        Ok(MetaString::new(
            input.to_owned(),
            encoding,
            self.special_char1,
            self.special_char2,
            encoded,
        ))
    }

    /// Packs `chars` MSB-first at `bits_per_char` bits each, after the
    /// leading strip flag bit.
    fn pack(&self, chars: &[u8], bits_per_char: usize) -> Result<Vec<u8>> {
        if chars.is_empty() {
            return Ok(Vec::new());
        }
        let total_bits = chars.len() * bits_per_char + 1;
        let mut result = vec![0u8; total_bits.div_ceil(8)];
        let mut current_bit = 1;
        for &c in chars {
            let value = match bits_per_char {
                5 => self.char_to_value_lower_special(c)?,
                _ => self.char_to_value_lower_upper_digit_special(c)?,
            };
            for i in (0..bits_per_char).rev() {
                if value & (1 << i) != 0 {
                    result[current_bit / 8] |= 1 << (7 - current_bit % 8);
                }
                current_bit += 1;
            }
        }
        if total_bits + bits_per_char <= result.len() * 8 {
            result[0] |= 0x80;
        }
        Ok(result)
    }

    /// Picks the packing for an ASCII `input`.
    pub fn compute_encoding(&self, input: &str) -> Encoding {
        let statistics = self.compute_statistics(input);
        if statistics.can_lower_special {
            return Encoding::LowerSpecial;
        }
        if statistics.can_lower_upper_digit_special {
            if statistics.digit_count != 0 {
                return Encoding::LowerUpperDigitSpecial;
            }
            let upper_count = statistics.upper_count;
            let chars = input.as_bytes();
            if upper_count == 1 && chars[0].is_ascii_uppercase() {
                return Encoding::FirstToLowerSpecial;
            }
            if (chars.len() + upper_count) * 5 < chars.len() * 6 {
                return Encoding::AllToLowerSpecial;
            }
            return Encoding::LowerUpperDigitSpecial;
        }
        Encoding::Utf8
    }

    fn compute_statistics(&self, input: &str) -> StringStatistics {
        let special1 = self.special_char1 as u8;
        let special2 = self.special_char2 as u8;
        let mut digit_count = 0;
        let mut upper_count = 0;
        let mut can_lower_special = true;
        let mut can_lower_upper_digit_special = true;
        for &c in input.as_bytes() {
            if can_lower_upper_digit_special
                && !(c.is_ascii_alphanumeric()
                    || c == special1
                    || c == special2)
            {
                can_lower_upper_digit_special = false;
            }
            if can_lower_special
                && !(c.is_ascii_lowercase() || matches!(c, b'.' | b'_' | b'$' | b'|'))
            {
                can_lower_special = false;
            }
            if c.is_ascii_digit() {
                digit_count += 1;
            }
            if c.is_ascii_uppercase() {
                upper_count += 1;
            }
        }
        StringStatistics {
            digit_count,
            upper_count,
            can_lower_special,
            can_lower_upper_digit_special,
        }
    }

    fn char_to_value_lower_special(&self, c: u8) -> Result<u8> {
        match c {
            b'a'..=b'z' => Ok(c - b'a'),
            b'.' => Ok(26),
            b'_' => Ok(27),
            b'$' => Ok(28),
            b'|' => Ok(29),
            _ => Err(Error::MetaStringNonAscii),
        }
    }

    fn char_to_value_lower_upper_digit_special(&self, c: u8) -> Result<u8> {
        match c {
            b'a'..=b'z' => Ok(c - b'a'),
            b'A'..=b'Z' => Ok(26 + (c - b'A')),
            b'0'..=b'9' => Ok(52 + (c - b'0')),
            _ if c == self.special_char1 as u8 => Ok(62),
            _ if c == self.special_char2 as u8 => Ok(63),
            _ => Err(Error::MetaStringNonAscii),
        }
    }
}

fn count_uppers(input: &str) -> usize {
    input.bytes().filter(u8::is_ascii_uppercase).count()
}
