use crate::format::FormatTag;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported format at offset 0x{offset:x}: expected {expected}, found {found:02x?}")]
    UnsupportedFormat {
        offset: usize,
        expected: &'static str,
        found: Vec<u8>,
    },
    #[error("Unsupported {kind} header version: {version}")]
    UnsupportedHeaderVersion { kind: &'static str, version: u32 },
    #[error("Page size must not be zero")]
    PageSizeZero,
    #[error(
        "Truncated image: {section} at offset 0x{offset:x} with size {size} exceeds image size {image_size}"
    )]
    TruncatedImage {
        section: &'static str,
        offset: usize,
        size: usize,
        image_size: usize,
    },
    #[error("Malformed {wrapper} wrapper: declared size {declared} exceeds available {available}")]
    MalformedWrapper {
        wrapper: &'static str,
        declared: usize,
        available: usize,
    },
    #[error("Invalid vendor ramdisk table: {0}")]
    InvalidVendorRamdiskTable(String),
    #[error(
        "AVB footer out of bounds: vbmeta 0x{vbmeta_offset:x}+0x{vbmeta_size:x}, original image size 0x{original_image_size:x}"
    )]
    AvbFooterInvalid {
        vbmeta_offset: u64,
        vbmeta_size: u64,
        original_image_size: u64,
    },
    #[error("Unknown section: {0}")]
    UnknownSection(String),
    #[error("Section {section} is too large: {size} bytes")]
    SectionTooLarge { section: String, size: usize },
    #[error("No codec available for {0:?}")]
    UnsupportedCodec(FormatTag),
    #[error("Invalid value for header field {key:?}: {value:?}")]
    InvalidHeaderField { key: String, value: String },
    #[error("I/O error")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
