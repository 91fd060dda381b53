//! Minimal arbitrary-base byte<->string codec, standing in for the
//! "Base-N encoder" collaborator named in spec.md. Base-36 names cask files
//! (lowercase, filesystem-safe); base-62 is used for display.

const B36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const B62_ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub const B36: BaseX = BaseX {
    alphabet: B36_ALPHABET,
};
pub const B62: BaseX = BaseX {
    alphabet: B62_ALPHABET,
};

pub struct BaseX {
    alphabet: &'static [u8],
}

impl BaseX {
    fn base(&self) -> usize {
        self.alphabet.len()
    }

    fn digit_of(&self, c: u8) -> Option<u8> {
        self.alphabet.iter().position(|&a| a == c).map(|p| p as u8)
    }

    /// Encodes `input` as a string of leading zero-preserving digits.
    pub fn encode(&self, input: &[u8]) -> String {
        let base = self.base();
        let zero_count = input.iter().take_while(|&&b| b == 0).count();

        let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 2);
        for &byte in input {
            let mut carry = byte as usize;
            for d in digits.iter_mut() {
                carry += (*d as usize) << 8;
                *d = (carry % base) as u8;
                carry /= base;
            }
            while carry > 0 {
                digits.push((carry % base) as u8);
                carry /= base;
            }
        }

        let mut out = String::with_capacity(zero_count + digits.len());
        out.extend(std::iter::repeat(self.alphabet[0] as char).take(zero_count));
        out.extend(digits.iter().rev().map(|&d| self.alphabet[d as usize] as char));
        out
    }

    /// Decodes a string produced by [`encode`](Self::encode) back into the
    /// exact original bytes (leading zero bytes are recovered from leading
    /// zero-digit characters, so no expected length is needed).
    pub fn decode_exact(&self, s: &str) -> Option<Vec<u8>> {
        let base = self.base();
        let zero_char = self.alphabet[0] as char;
        let zero_count = s.chars().take_while(|&c| c == zero_char).count();

        let mut bytes: Vec<u8> = Vec::with_capacity(s.len());
        for c in s.chars() {
            let mut val = self.digit_of(c as u8)? as usize;
            for b in bytes.iter_mut() {
                val += (*b as usize) * base;
                *b = (val & 0xff) as u8;
                val >>= 8;
            }
            while val > 0 {
                bytes.push((val & 0xff) as u8);
                val >>= 8;
            }
        }

        let mut out = vec![0u8; zero_count];
        out.extend(bytes.iter().rev());
        Some(out)
    }

    /// Like [`decode_exact`](Self::decode_exact), but requires the result to
    /// be exactly `len` bytes.
    pub fn decode(&self, s: &str, len: usize) -> Option<Vec<u8>> {
        let out = self.decode_exact(s)?;
        if out.len() == len {
            Some(out)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b36_round_trip() {
        let input = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17];
        let s = B36.encode(&input);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        let back = B36.decode(&s, input.len()).unwrap();
        assert_eq!(&back[..], &input[..]);
    }

    #[test]
    fn leading_zero_bytes_round_trip() {
        let input = [0u8, 0, 0, 9, 8, 7];
        let s = B36.encode(&input);
        let back = B36.decode(&s, input.len()).unwrap();
        assert_eq!(&back[..], &input[..]);
    }

    #[test]
    fn all_zero_round_trips() {
        let input = [0u8; 16];
        let s = B36.encode(&input);
        assert_eq!(s, "0".repeat(16));
        let back = B36.decode(&s, 16).unwrap();
        assert_eq!(back, input.to_vec());
    }
}
