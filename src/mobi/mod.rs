//! Mobipocket / PalmDOC decoding.
//!
//! Only the container layer is handled: database and record headers,
//! PalmDOC decompression and EXTH metadata. Huffman-compressed and encrypted
//! files are rejected.

pub mod headers;
pub mod palmdoc;
mod reader;

pub use headers::{
    Compression, Encoding, ExthHeader, ExthRecord, MobiHeader, PalmDatabaseHeader, PalmDocHeader,
    RecordInfo,
};
pub use reader::{MobiReader, read_mobi};
