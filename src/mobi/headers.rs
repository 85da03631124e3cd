//! Fixed-layout headers of Palm database / Mobipocket files.
//!
//! All integers are big-endian.

use crate::error::{Error, Result};

pub const NULL_INDEX: u32 = 0xFFFFFFFF;

fn u16_at(data: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([data[pos], data[pos + 1]])
}

fn u32_at(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn too_short(what: &str, len: usize, needed: usize) -> Error {
    Error::InvalidMobi(format!("{} too short: {} bytes, need {}", what, len, needed))
}

/// Palm database header at the very start of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalmDatabaseHeader {
    pub name: String,
    pub attributes: u16,
    pub version: u16,
    pub creation_date: u32,
    pub modification_date: u32,
    pub last_backup_date: u32,
    pub modification_number: u32,
    pub app_info_id: u32,
    pub sort_info_id: u32,
    /// Four-character type code, `BOOK` for Mobipocket files.
    pub type_code: [u8; 4],
    /// Four-character creator code, `MOBI` for Mobipocket files.
    pub creator: [u8; 4],
    pub unique_id_seed: u32,
    pub next_record_list_id: u32,
    pub record_count: u16,
}

impl PalmDatabaseHeader {
    pub const SIZE: usize = 78;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(too_short("Palm database header", data.len(), Self::SIZE));
        }

        let name_end = data[..32].iter().position(|&b| b == 0).unwrap_or(32);
        let name = String::from_utf8_lossy(&data[..name_end]).to_string();

        Ok(Self {
            name,
            attributes: u16_at(data, 32),
            version: u16_at(data, 34),
            creation_date: u32_at(data, 36),
            modification_date: u32_at(data, 40),
            last_backup_date: u32_at(data, 44),
            modification_number: u32_at(data, 48),
            app_info_id: u32_at(data, 52),
            sort_info_id: u32_at(data, 56),
            type_code: [data[60], data[61], data[62], data[63]],
            creator: [data[64], data[65], data[66], data[67]],
            unique_id_seed: u32_at(data, 68),
            next_record_list_id: u32_at(data, 72),
            record_count: u16_at(data, 76),
        })
    }

    /// True for `BOOKMOBI` and `TEXtREAd` databases.
    pub fn is_book(&self) -> bool {
        let mut ident = [0u8; 8];
        ident[..4].copy_from_slice(&self.type_code);
        ident[4..].copy_from_slice(&self.creator);
        &ident == b"BOOKMOBI" || ident.eq_ignore_ascii_case(b"TEXTREAD")
    }
}

/// One entry of the record list that follows the database header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// Absolute file offset of the record data.
    pub offset: u32,
    pub attributes: u8,
    /// 24-bit record id.
    pub unique_id: u32,
}

impl RecordInfo {
    pub const SIZE: usize = 8;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(too_short("record info", data.len(), Self::SIZE));
        }
        Ok(Self {
            offset: u32_at(data, 0),
            attributes: data[4],
            unique_id: u32::from_be_bytes([0, data[5], data[6], data[7]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    PalmDoc,
    Huffman,
    Unknown(u16),
}

impl From<u16> for Compression {
    fn from(value: u16) -> Self {
        match value {
            1 => Compression::None,
            2 => Compression::PalmDoc,
            0x4448 => Compression::Huffman, // "DH"
            n => Compression::Unknown(n),
        }
    }
}

/// PalmDOC header: the first 16 bytes of record 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PalmDocHeader {
    pub compression: Compression,
    pub unused: u16,
    /// Uncompressed length of the whole text.
    pub text_length: u32,
    pub record_count: u16,
    /// Maximum uncompressed size of one text record.
    pub record_size: u16,
    pub encryption: u16,
    pub unknown: u16,
}

impl PalmDocHeader {
    pub const SIZE: usize = 16;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(too_short("PalmDOC header", data.len(), Self::SIZE));
        }
        Ok(Self {
            compression: Compression::from(u16_at(data, 0)),
            unused: u16_at(data, 2),
            text_length: u32_at(data, 4),
            record_count: u16_at(data, 8),
            record_size: u16_at(data, 10),
            encryption: u16_at(data, 12),
            unknown: u16_at(data, 14),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cp1252,
    Utf8,
    Unknown(u32),
}

impl Encoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            _ => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        }
    }
}

/// MOBI header, located in record 0 right after the PalmDOC header.
///
/// Offsets below are relative to the start of record 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobiHeader {
    pub header_length: u32,
    pub mobi_type: u32,
    pub encoding: Encoding,
    pub unique_id: u32,
    pub file_version: u32,
    /// First record that is not part of the text.
    pub first_nonbook_index: u32,
    /// Full name stored in record 0.
    pub title: String,
    pub locale: u32,
    pub min_version: u32,
    pub first_image_index: u32,
    pub huff_record_index: u32,
    pub huff_record_count: u32,
    pub exth_flags: u32,
    pub extra_data_flags: u16,
}

impl MobiHeader {
    /// Bytes of record 0 needed up to and including the EXTH flags.
    const MIN_RECORD_LEN: usize = 0x84;

    pub fn parse(record0: &[u8]) -> Result<Self> {
        if record0.len() < Self::MIN_RECORD_LEN {
            return Err(too_short("MOBI header", record0.len(), Self::MIN_RECORD_LEN));
        }
        if &record0[16..20] != b"MOBI" {
            return Err(Error::InvalidMobi("missing MOBI header identifier".into()));
        }

        let header_length = u32_at(record0, 20);
        let encoding = match u32_at(record0, 28) {
            1252 => Encoding::Cp1252,
            65001 => Encoding::Utf8,
            n => Encoding::Unknown(n),
        };

        let title_offset = u32_at(record0, 0x54) as usize;
        let title_length = u32_at(record0, 0x58) as usize;
        let title = record0
            .get(title_offset..title_offset.saturating_add(title_length))
            .map(|bytes| encoding.decode(bytes))
            .unwrap_or_default();

        let extra_data_flags = if record0.len() >= 0xF4 && header_length >= 0xE4 {
            u16_at(record0, 0xF2)
        } else {
            0
        };

        Ok(Self {
            header_length,
            mobi_type: u32_at(record0, 24),
            encoding,
            unique_id: u32_at(record0, 32),
            file_version: u32_at(record0, 36),
            first_nonbook_index: u32_at(record0, 0x50),
            title,
            locale: u32_at(record0, 0x5C),
            min_version: u32_at(record0, 0x68),
            first_image_index: u32_at(record0, 0x6C),
            huff_record_index: u32_at(record0, 0x70),
            huff_record_count: u32_at(record0, 0x74),
            exth_flags: u32_at(record0, 0x80),
            extra_data_flags,
        })
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & 0x40 != 0
    }

    /// Offset of the EXTH block within record 0.
    pub fn exth_offset(&self) -> usize {
        PalmDocHeader::SIZE + self.header_length as usize
    }
}

/// A raw EXTH record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExthRecord {
    pub record_type: u32,
    pub data: Vec<u8>,
}

/// EXTH header (extended metadata).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExthHeader {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub asin: Option<String>,
    pub source: Option<String>,
    pub subjects: Vec<String>,
    pub pub_date: Option<String>,
    pub rights: Option<String>,
    pub cover_offset: Option<u32>,
    pub thumbnail_offset: Option<u32>,
    pub language: Option<String>,
    /// Every record in file order, including the ones decoded above.
    pub records: Vec<ExthRecord>,
}

impl ExthHeader {
    pub fn parse(data: &[u8], encoding: Encoding) -> Result<Self> {
        if data.len() < 12 {
            return Err(too_short("EXTH header", data.len(), 12));
        }
        if &data[0..4] != b"EXTH" {
            return Err(Error::InvalidMobi("invalid EXTH signature".into()));
        }

        let record_count = u32_at(data, 8);
        let mut exth = ExthHeader::default();
        let mut pos = 12;

        let text = |bytes: &[u8]| encoding.decode(bytes).trim().to_string();
        let offset = |bytes: &[u8]| {
            (bytes.len() >= 4)
                .then(|| u32_at(bytes, 0))
                .filter(|&v| v != NULL_INDEX)
        };

        for _ in 0..record_count {
            if pos + 8 > data.len() {
                break;
            }
            let record_type = u32_at(data, pos);
            let record_len = u32_at(data, pos + 4) as usize;
            if record_len < 8 || pos + record_len > data.len() {
                break;
            }
            let content = &data[pos + 8..pos + record_len];

            match record_type {
                100 => exth.authors.push(text(content)),
                101 => exth.publisher = Some(text(content)),
                103 => exth.description = Some(text(content)),
                104 => exth.isbn = Some(text(content)),
                105 => exth.subjects.extend(
                    encoding
                        .decode(content)
                        .split(';')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                ),
                106 => exth.pub_date = Some(text(content)),
                109 => exth.rights = Some(text(content)),
                112 => exth.source = Some(text(content)),
                113 => exth.asin = Some(text(content)),
                201 => exth.cover_offset = offset(content),
                202 => exth.thumbnail_offset = offset(content),
                503 => exth.title = Some(text(content)),
                524 => exth.language = Some(text(content)),
                _ => {}
            }
            exth.records.push(ExthRecord {
                record_type,
                data: content.to_vec(),
            });

            pos += record_len;
        }

        Ok(exth)
    }
}
