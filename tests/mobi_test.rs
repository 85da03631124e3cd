//! MOBI decoding tests.
//!
//! Files are assembled byte by byte so the record layout is fully controlled.

use std::io::Write;

use folio::Error;
use folio::mobi::{Compression, Encoding, MobiReader, palmdoc, read_mobi};
use proptest::prelude::*;
use tempfile::NamedTempFile;

// ============================================================================
// Helpers
// ============================================================================

const MOBI_HEADER_LEN: u32 = 0xE8;

fn exth_block(records: &[(u32, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, data) in records {
        body.extend_from_slice(&kind.to_be_bytes());
        body.extend_from_slice(&(8 + data.len() as u32).to_be_bytes());
        body.extend_from_slice(data);
    }
    let mut exth = Vec::new();
    exth.extend_from_slice(b"EXTH");
    exth.extend_from_slice(&(12 + body.len() as u32).to_be_bytes());
    exth.extend_from_slice(&(records.len() as u32).to_be_bytes());
    exth.extend_from_slice(&body);
    exth
}

/// Record 0 with a PalmDOC header, a MOBI header, an EXTH block and the full name.
fn record0(text_length: u32, text_records: u16, first_nonbook: u32, title: &str) -> Vec<u8> {
    let mut record = vec![0u8; 16 + MOBI_HEADER_LEN as usize];
    record[0..2].copy_from_slice(&2u16.to_be_bytes());
    record[4..8].copy_from_slice(&text_length.to_be_bytes());
    record[8..10].copy_from_slice(&text_records.to_be_bytes());
    record[10..12].copy_from_slice(&4096u16.to_be_bytes());

    record[16..20].copy_from_slice(b"MOBI");
    record[20..24].copy_from_slice(&MOBI_HEADER_LEN.to_be_bytes());
    record[24..28].copy_from_slice(&2u32.to_be_bytes());
    record[28..32].copy_from_slice(&65001u32.to_be_bytes());
    record[0x50..0x54].copy_from_slice(&first_nonbook.to_be_bytes());
    record[0x80..0x84].copy_from_slice(&0x40u32.to_be_bytes());

    record.extend_from_slice(&exth_block(&[
        (100, &b"Jane Writer"[..]),
        (105, &b"Fiction; Adventure"[..]),
        (524, &b"en"[..]),
    ]));

    let title_offset = record.len() as u32;
    record[0x54..0x58].copy_from_slice(&title_offset.to_be_bytes());
    record[0x58..0x5C].copy_from_slice(&(title.len() as u32).to_be_bytes());
    record.extend_from_slice(title.as_bytes());
    record
}

fn database(records: &[Vec<u8>]) -> Vec<u8> {
    let mut data = vec![0u8; 78];
    data[..9].copy_from_slice(b"Test_Book");
    data[60..68].copy_from_slice(b"BOOKMOBI");
    data[76..78].copy_from_slice(&(records.len() as u16).to_be_bytes());

    let mut offset = 78 + records.len() * 8 + 2;
    for (i, record) in records.iter().enumerate() {
        data.extend_from_slice(&(offset as u32).to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, (i * 2) as u8]);
        offset += record.len();
    }
    // Conventional two-byte gap after the record list.
    data.extend_from_slice(&[0, 0]);
    for record in records {
        data.extend_from_slice(record);
    }
    data
}

fn sample_file() -> Vec<u8> {
    // "Hello Hello" = "Hello" + " H" (0xC8) + back-reference distance 6, length 4.
    let first = vec![b'H', b'e', b'l', b'l', b'o', 0xC8, 0x80, 0x31];
    let second = b"!".to_vec();
    let image = vec![0xFF, 0xD8, 0xFF, 0xE0];
    database(&[record0(12, 2, 3, "Stored Title"), first, second, image])
}

// ============================================================================
// Reader Tests
// ============================================================================

#[test]
fn test_read_headers() {
    let reader = MobiReader::parse(&sample_file()).unwrap();

    assert_eq!(reader.pdb_header.name, "Test_Book");
    assert_eq!(reader.records.len(), 4);
    assert_eq!(reader.records[3].unique_id, 6);
    assert_eq!(reader.palmdoc_header.compression, Compression::PalmDoc);
    assert_eq!(reader.palmdoc_header.text_length, 12);

    let mobi = reader.mobi_header.as_ref().unwrap();
    assert_eq!(mobi.encoding, Encoding::Utf8);
    assert_eq!(mobi.first_nonbook_index, 3);
    assert_eq!(mobi.title, "Stored Title");

    let exth = reader.exth_header.as_ref().unwrap();
    assert_eq!(exth.authors, ["Jane Writer"]);
    assert_eq!(exth.subjects, ["Fiction", "Adventure"]);
    assert_eq!(exth.language.as_deref(), Some("en"));
}

#[test]
fn test_read_text_and_raw_records() {
    let reader = MobiReader::parse(&sample_file()).unwrap();

    assert_eq!(reader.text(), b"Hello Hello!");
    assert_eq!(reader.text_string(), "Hello Hello!");
    assert_eq!(reader.non_book_records(), [(3usize, vec![0xFFu8, 0xD8, 0xFF, 0xE0])]);
    // No EXTH title, so the full name wins over the database name.
    assert_eq!(reader.title(), "Stored Title");
}

#[test]
fn test_read_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&sample_file()).unwrap();
    file.flush().unwrap();

    let reader = read_mobi(file.path()).unwrap();
    assert_eq!(reader.text(), b"Hello Hello!");
}

#[test]
fn test_encrypted_file_rejected() {
    let mut first = record0(1, 1, 2, "T");
    first[12..14].copy_from_slice(&2u16.to_be_bytes());
    let data = database(&[first, b"x".to_vec()]);
    assert!(matches!(MobiReader::parse(&data), Err(Error::InvalidMobi(_))));
}

#[test]
fn test_record_offsets_out_of_bounds() {
    let mut data = sample_file();
    // Point the last record past the end of the file.
    let last = 78 + 3 * 8;
    data[last..last + 4].copy_from_slice(&u32::MAX.to_be_bytes());
    assert!(matches!(MobiReader::parse(&data), Err(Error::InvalidMobi(_))));
}

#[test]
fn test_missing_file() {
    assert!(matches!(read_mobi("/nonexistent/book.mobi"), Err(Error::Io(_))));
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_decompress_never_exceeds_max_size(
        input in prop::collection::vec(any::<u8>(), 0..512),
        max_size in 0usize..2048,
    ) {
        if let Ok(output) = palmdoc::decompress(&input, max_size) {
            prop_assert!(output.len() <= max_size);
        }
    }

    #[test]
    fn prop_plain_ascii_is_literal(text in "[a-zA-Z0-9 .,]{0,200}") {
        // Printable ASCII below 0x80 decodes to itself.
        let output = palmdoc::decompress(text.as_bytes(), text.len()).unwrap();
        prop_assert_eq!(output, text.as_bytes());
    }
}
