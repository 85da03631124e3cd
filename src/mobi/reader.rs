use std::io::Read;
use std::path::Path;

use log::{debug, warn};

use super::headers::{
    Compression, Encoding, ExthHeader, MobiHeader, PalmDatabaseHeader, PalmDocHeader, RecordInfo,
};
use super::palmdoc;
use crate::error::{Error, Result};

/// Read a Mobipocket file from disk.
pub fn read_mobi<P: AsRef<Path>>(path: P) -> Result<MobiReader> {
    let file = std::fs::File::open(path)?;
    MobiReader::from_reader(file)
}

/// A decoded Mobipocket (KF7) file.
///
/// Record 0 is decoded into its PalmDOC, MOBI and EXTH headers. Book records
/// are decompressed up to the declared text length; every record after them
/// is kept raw.
#[derive(Debug, Clone)]
pub struct MobiReader {
    pub pdb_header: PalmDatabaseHeader,
    pub records: Vec<RecordInfo>,
    pub palmdoc_header: PalmDocHeader,
    pub mobi_header: Option<MobiHeader>,
    pub exth_header: Option<ExthHeader>,
    text: Vec<u8>,
    non_book_records: Vec<(usize, Vec<u8>)>,
}

impl MobiReader {
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        // 1. Database header and record list
        let pdb_header = PalmDatabaseHeader::parse(data)?;
        if !pdb_header.is_book() {
            warn!(
                "Unexpected database type {}{}",
                String::from_utf8_lossy(&pdb_header.type_code),
                String::from_utf8_lossy(&pdb_header.creator)
            );
        }

        let count = pdb_header.record_count as usize;
        if count == 0 {
            return Err(Error::InvalidMobi("database has no records".into()));
        }
        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let start = PalmDatabaseHeader::SIZE + i * RecordInfo::SIZE;
            let info = data
                .get(start..start + RecordInfo::SIZE)
                .ok_or_else(|| Error::InvalidMobi("record list truncated".into()))?;
            records.push(RecordInfo::parse(info)?);
        }

        // 2. Record 0
        let record0 = record_slice(data, &records, 0)?;
        let palmdoc_header = PalmDocHeader::parse(record0)?;
        let mobi_header = if record0.get(16..20) == Some(&b"MOBI"[..]) {
            Some(MobiHeader::parse(record0)?)
        } else {
            None
        };
        let exth_header = match &mobi_header {
            Some(mobi) if mobi.has_exth() => match record0.get(mobi.exth_offset()..) {
                Some(exth) => Some(ExthHeader::parse(exth, mobi.encoding)?),
                None => {
                    warn!("EXTH flag set but record 0 ends before the EXTH block");
                    None
                }
            },
            _ => None,
        };

        if palmdoc_header.encryption != 0 {
            return Err(Error::InvalidMobi(
                "Encrypted MOBI files are not supported".into(),
            ));
        }

        // 3. Book and non-book records
        let first_nonbook = mobi_header
            .as_ref()
            .map(|m| m.first_nonbook_index as usize)
            .unwrap_or(palmdoc_header.record_count as usize + 1)
            .min(count);

        let text_length = palmdoc_header.text_length as usize;
        // PalmDOC expands at most 8x; a header can claim far more.
        let mut text = Vec::with_capacity(text_length.min(data.len().saturating_mul(8)));
        for index in 1..first_nonbook {
            let left = text_length - text.len();
            if left == 0 {
                break;
            }
            let size = left.min(palmdoc_header.record_size as usize);
            let record = record_slice(data, &records, index)?;
            let decoded = match palmdoc_header.compression {
                Compression::None => record[..size.min(record.len())].to_vec(),
                Compression::PalmDoc => palmdoc::decompress(record, size)?,
                other => {
                    return Err(Error::InvalidMobi(format!(
                        "Unsupported compression {:?}",
                        other
                    )));
                }
            };
            text.extend_from_slice(&decoded);
        }

        let mut non_book_records = Vec::new();
        for index in first_nonbook.max(1)..count {
            non_book_records.push((index, record_slice(data, &records, index)?.to_vec()));
        }

        debug!(
            "Decoded {} text bytes from {} records, kept {} raw records",
            text.len(),
            first_nonbook.saturating_sub(1),
            non_book_records.len()
        );

        Ok(Self {
            pdb_header,
            records,
            palmdoc_header,
            mobi_header,
            exth_header,
            text,
            non_book_records,
        })
    }

    /// Decompressed text of all book records.
    pub fn text(&self) -> &[u8] {
        &self.text
    }

    /// Text decoded with the encoding declared in the MOBI header.
    pub fn text_string(&self) -> String {
        match &self.mobi_header {
            Some(mobi) => mobi.encoding.decode(&self.text),
            None => Encoding::Cp1252.decode(&self.text),
        }
    }

    /// Records after the text, with their record index.
    pub fn non_book_records(&self) -> &[(usize, Vec<u8>)] {
        &self.non_book_records
    }

    /// Title from EXTH, the MOBI full name, or the database name, in that order.
    pub fn title(&self) -> &str {
        self.exth_header
            .as_ref()
            .and_then(|e| e.title.as_deref())
            .or_else(|| {
                self.mobi_header
                    .as_ref()
                    .map(|m| m.title.as_str())
                    .filter(|t| !t.is_empty())
            })
            .unwrap_or(&self.pdb_header.name)
    }
}

/// Bytes of record `index`: up to the next record's offset, or the end of the file.
fn record_slice<'a>(data: &'a [u8], records: &[RecordInfo], index: usize) -> Result<&'a [u8]> {
    let start = records[index].offset as usize;
    let end = records
        .get(index + 1)
        .map(|r| r.offset as usize)
        .unwrap_or(data.len());
    data.get(start..end)
        .ok_or_else(|| Error::InvalidMobi(format!("record {} out of bounds", index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a file with a PalmDOC-only record 0 and the given text records.
    fn build(compression: u16, text_length: u32, record_size: u16, body: &[&[u8]]) -> Vec<u8> {
        let count = body.len() + 1;
        let mut data = vec![0u8; PalmDatabaseHeader::SIZE];
        data[..4].copy_from_slice(b"test");
        data[60..68].copy_from_slice(b"TEXtREAd");
        data[76..78].copy_from_slice(&(count as u16).to_be_bytes());

        let mut offset = PalmDatabaseHeader::SIZE + count * RecordInfo::SIZE;
        let mut record0 = vec![0u8; 16];
        record0[0..2].copy_from_slice(&compression.to_be_bytes());
        record0[4..8].copy_from_slice(&text_length.to_be_bytes());
        record0[8..10].copy_from_slice(&(body.len() as u16).to_be_bytes());
        record0[10..12].copy_from_slice(&record_size.to_be_bytes());

        let records: Vec<&[u8]> = std::iter::once(record0.as_slice()).chain(body.iter().copied()).collect();
        for (i, record) in records.iter().enumerate() {
            data.extend_from_slice(&(offset as u32).to_be_bytes());
            data.extend_from_slice(&[0, 0, 0, i as u8]);
            offset += record.len();
        }
        for record in records {
            data.extend_from_slice(record);
        }
        data
    }

    #[test]
    fn test_palmdoc_only_file() {
        let data = build(2, 9, 4096, &[&[b'a', b'b', b'c', 0x80, 0x1B]]);
        let reader = MobiReader::parse(&data).unwrap();
        assert!(reader.mobi_header.is_none());
        assert_eq!(reader.text(), b"abcabcabc");
        assert_eq!(reader.title(), "test");
        assert!(reader.non_book_records().is_empty());
    }

    #[test]
    fn test_text_limited_to_declared_length() {
        let data = build(1, 6, 4, &[b"abcd", b"efgh"]);
        let reader = MobiReader::parse(&data).unwrap();
        assert_eq!(reader.text(), b"abcdef");
        assert_eq!(reader.text_string(), "abcdef");
    }

    #[test]
    fn test_huffman_rejected() {
        let data = build(0x4448, 4, 4096, &[b"xxxx"]);
        assert!(matches!(MobiReader::parse(&data), Err(Error::InvalidMobi(_))));
    }

    #[test]
    fn test_declared_length_larger_than_file() {
        let data = build(1, u32::MAX, 4096, &[b"abcd"]);
        let reader = MobiReader::parse(&data).unwrap();
        assert_eq!(reader.text(), b"abcd");
        assert!(reader.text.capacity() <= data.len() * 8);
    }

    #[test]
    fn test_truncated_record_list() {
        let mut data = build(1, 4, 4096, &[b"abcd"]);
        data.truncate(PalmDatabaseHeader::SIZE + 4);
        assert!(matches!(MobiReader::parse(&data), Err(Error::InvalidMobi(_))));
    }
}
