//! PalmDOC LZ77 decompression
//!
//! The compression scheme is simple:
//! - Bytes 0x01-0x08: Copy next 'n' bytes literally
//! - Bytes 0x00, 0x09-0x7F: Literal character
//! - Bytes 0x80-0xBF: Back-reference (LZ77)
//!   - Combined with next byte: distance = (val & 0x3FFF) >> 3, length = (val & 7) + 3
//! - Bytes 0xC0-0xFF: Space + (byte ^ 0x80)
//!
//! Decoding stops once `max_size` bytes have been produced; the output is
//! never longer than that. Truncated input and back-references pointing
//! before the start of the output are reported as errors.

use crate::error::{Error, Result};

pub fn decompress(input: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(max_size.min(input.len().saturating_mul(8)));
    let mut i = 0;

    while i < input.len() && output.len() < max_size {
        let c = input[i];
        i += 1;

        match c {
            0x01..=0x08 => {
                let count = c as usize;
                let literal = input
                    .get(i..i + count)
                    .ok_or_else(|| Error::InvalidMobi("truncated literal run".into()))?;
                output.extend_from_slice(literal);
                i += count;
            }
            0x00 | 0x09..=0x7F => output.push(c),
            0x80..=0xBF => {
                let next = *input
                    .get(i)
                    .ok_or_else(|| Error::InvalidMobi("truncated back-reference".into()))?;
                i += 1;

                let combined = ((c as u16) << 8) | (next as u16);
                let distance = ((combined & 0x3FFF) >> 3) as usize;
                let length = ((combined & 7) + 3) as usize;

                if distance == 0 || distance > output.len() {
                    return Err(Error::InvalidMobi(format!(
                        "back-reference distance {} outside {} bytes of output",
                        distance,
                        output.len()
                    )));
                }
                // Byte by byte: the copied range may overlap the bytes being written.
                for _ in 0..length {
                    let byte = output[output.len() - distance];
                    output.push(byte);
                }
            }
            _ => {
                output.push(b' ');
                output.push(c ^ 0x80);
            }
        }
    }

    output.truncate(max_size);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompress_literal() {
        assert_eq!(decompress(b"Hello", 100).unwrap(), b"Hello");
    }

    #[test]
    fn test_decompress_space_ascii() {
        // 0xC1 = ' ' followed by 'A' (0x41 ^ 0x80)
        assert_eq!(decompress(&[0xC1], 100).unwrap(), b" A");
    }

    #[test]
    fn test_decompress_literal_run() {
        assert_eq!(decompress(&[0x03, 0xE9, 0x00, 0x80, b'x'], 100).unwrap(), [0xE9, 0x00, 0x80, b'x']);
    }

    #[test]
    fn test_decompress_back_reference() {
        // "abc" then copy distance 3, length 3 + 3 = 6: (3 << 3) | 3 = 0x001B
        let input = [b'a', b'b', b'c', 0x80, 0x1B];
        assert_eq!(decompress(&input, 100).unwrap(), b"abcabcabc");
    }

    #[test]
    fn test_decompress_respects_max_size() {
        let input = [b'a', b'b', b'c', 0x80, 0x1B, b'd'];
        assert_eq!(decompress(&input, 5).unwrap(), b"abcab");
        assert_eq!(decompress(b"abcdef", 0).unwrap(), b"");
    }

    #[test]
    fn test_decompress_invalid_input() {
        assert!(matches!(decompress(&[0x80, 0x1B], 100), Err(Error::InvalidMobi(_))));
        assert!(matches!(decompress(&[b'a', 0x80], 100), Err(Error::InvalidMobi(_))));
        assert!(matches!(decompress(&[0x04, b'a'], 100), Err(Error::InvalidMobi(_))));
    }
}
