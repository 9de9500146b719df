use crate::constants::{
    BOOT_MAGIC, BZIP_MAGIC, CHROMEOS_MAGIC, DHTB_MAGIC, DTB_MAGIC, GZIP1_MAGIC, GZIP2_MAGIC,
    LZ4_LEG_MAGIC, LZ41_MAGIC, LZ42_MAGIC, LZMA_MAGIC, LZOP_MAGIC, MTK_MAGIC, TEGRABLOB_MAGIC,
    VENDOR_BOOT_MAGIC, XZ_MAGIC, ZIMAGE_MAGIC, ZIMAGE_MAGIC_OFFSET,
};
use crate::utils::SliceExt;
use phf::phf_map;
use std::fmt::{Display, Formatter};

// https://github.com/topjohnwu/Magisk/blob/01cb75eaefbd14c2d10772ded3942660ebf0285f/native/src/boot/format.rs#L62
/// Every container and codec this crate can recognize. The declaration order
/// matters: `Gzip..Lzop` is the stream-codec range used by
/// [`FormatTag::is_compressed`].
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub enum FormatTag {
    Unknown,
    ChromeOs,
    Aosp,
    AospVendor,
    Dhtb,
    Blob,
    Gzip,
    Zopfli,
    Xz,
    Lzma,
    Bzip2,
    Lz4,
    Lz4Legacy,
    Lz4Lg,
    Lzop,
    Mtk,
    Dtb,
    Zimage,
}

const FORMAT_COUNT: usize = FormatTag::Zimage as usize + 1;

const FORMAT_NAMES: [&str; FORMAT_COUNT] = [
    "raw",        // Unknown
    "raw",        // ChromeOs
    "raw",        // Aosp
    "raw",        // AospVendor
    "raw",        // Dhtb
    "raw",        // Blob
    "gzip",       // Gzip
    "zopfli",     // Zopfli
    "xz",         // Xz
    "lzma",       // Lzma
    "bzip2",      // Bzip2
    "lz4",        // Lz4
    "lz4_legacy", // Lz4Legacy
    "lz4_lg",     // Lz4Lg
    "lzop",       // Lzop
    "raw",        // Mtk
    "dtb",        // Dtb
    "zimage",     // Zimage
];

const FORMAT_EXTENSIONS: [&str; FORMAT_COUNT] = [
    "",      // Unknown
    "",      // ChromeOs
    "",      // Aosp
    "",      // AospVendor
    "",      // Dhtb
    "",      // Blob
    ".gz",   // Gzip
    ".gz",   // Zopfli
    ".xz",   // Xz
    ".lzma", // Lzma
    ".bz2",  // Bzip2
    ".lz4",  // Lz4
    ".lz4",  // Lz4Legacy
    ".lz4",  // Lz4Lg
    ".lzo",  // Lzop
    "",      // Mtk
    "",      // Dtb
    "",      // Zimage
];

static NAME_TO_FORMAT: phf::Map<&'static str, FormatTag> = phf_map! {
    "gzip" => FormatTag::Gzip,
    "zopfli" => FormatTag::Zopfli,
    "xz" => FormatTag::Xz,
    "lzma" => FormatTag::Lzma,
    "bzip2" => FormatTag::Bzip2,
    "lz4" => FormatTag::Lz4,
    "lz4_legacy" => FormatTag::Lz4Legacy,
    "lz4_lg" => FormatTag::Lz4Lg,
};

impl FormatTag {
    pub const ALL: [FormatTag; FORMAT_COUNT] = [
        FormatTag::Unknown,
        FormatTag::ChromeOs,
        FormatTag::Aosp,
        FormatTag::AospVendor,
        FormatTag::Dhtb,
        FormatTag::Blob,
        FormatTag::Gzip,
        FormatTag::Zopfli,
        FormatTag::Xz,
        FormatTag::Lzma,
        FormatTag::Bzip2,
        FormatTag::Lz4,
        FormatTag::Lz4Legacy,
        FormatTag::Lz4Lg,
        FormatTag::Lzop,
        FormatTag::Mtk,
        FormatTag::Dtb,
        FormatTag::Zimage,
    ];

    /// Stream codecs, excluding lzop.
    pub fn is_compressed(self) -> bool {
        (FormatTag::Gzip..FormatTag::Lzop).contains(&self)
    }

    /// Any compression format, lzop included.
    pub fn is_compressed_any(self) -> bool {
        (FormatTag::Gzip..=FormatTag::Lzop).contains(&self)
    }

    pub fn name(self) -> &'static str {
        FORMAT_NAMES[self as usize]
    }

    pub fn extension(self) -> &'static str {
        FORMAT_EXTENSIONS[self as usize]
    }

    /// Inverse of [`FormatTag::name`] for the codecs that can be selected by
    /// name. Everything else maps to [`FormatTag::Unknown`].
    pub fn from_name(name: &str) -> FormatTag {
        NAME_TO_FORMAT
            .get(name)
            .copied()
            .unwrap_or(FormatTag::Unknown)
    }
}

impl Display for FormatTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the magic catalog: `bytes` must appear at `offset`, and
/// `check` (if any) must accept the whole buffer.
pub struct MagicSignature {
    pub tag: FormatTag,
    pub offset: usize,
    pub bytes: &'static [u8],
    pub check: Option<fn(&[u8]) -> bool>,
}

impl MagicSignature {
    const fn at_start(tag: FormatTag, bytes: &'static [u8]) -> Self {
        Self {
            tag,
            offset: 0,
            bytes,
            check: None,
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        let matched = data
            .get(self.offset..self.offset + self.bytes.len())
            .is_some_and(|d| d == self.bytes);
        matched && self.check.is_none_or(|check| check(data))
    }
}

// LZMA has no real magic. The properties byte and dictionary size are
// followed by the uncompressed size; byte 12 is its top byte, which is 0x00
// for any sane size or 0xff for "unknown".
fn check_lzma(data: &[u8]) -> bool {
    matches!(data.get(12), Some(0x00) | Some(0xff))
}

/// Priority-ordered magic catalog. The first matching entry wins.
pub static MAGIC_CATALOG: &[MagicSignature] = &[
    MagicSignature::at_start(FormatTag::ChromeOs, CHROMEOS_MAGIC),
    MagicSignature::at_start(FormatTag::Aosp, BOOT_MAGIC),
    MagicSignature::at_start(FormatTag::AospVendor, VENDOR_BOOT_MAGIC),
    MagicSignature::at_start(FormatTag::Gzip, GZIP1_MAGIC),
    MagicSignature::at_start(FormatTag::Gzip, GZIP2_MAGIC),
    MagicSignature::at_start(FormatTag::Lzop, LZOP_MAGIC),
    MagicSignature::at_start(FormatTag::Xz, XZ_MAGIC),
    MagicSignature {
        tag: FormatTag::Lzma,
        offset: 0,
        bytes: LZMA_MAGIC,
        check: Some(check_lzma),
    },
    MagicSignature::at_start(FormatTag::Bzip2, BZIP_MAGIC),
    MagicSignature::at_start(FormatTag::Lz4, LZ41_MAGIC),
    MagicSignature::at_start(FormatTag::Lz4, LZ42_MAGIC),
    MagicSignature::at_start(FormatTag::Lz4Legacy, LZ4_LEG_MAGIC),
    MagicSignature::at_start(FormatTag::Mtk, MTK_MAGIC),
    MagicSignature::at_start(FormatTag::Dtb, DTB_MAGIC),
    MagicSignature::at_start(FormatTag::Dhtb, DHTB_MAGIC),
    MagicSignature::at_start(FormatTag::Blob, TEGRABLOB_MAGIC),
    MagicSignature {
        tag: FormatTag::Zimage,
        offset: ZIMAGE_MAGIC_OFFSET,
        bytes: ZIMAGE_MAGIC,
        check: None,
    },
];

pub fn detect(data: &[u8]) -> FormatTag {
    MAGIC_CATALOG
        .iter()
        .find(|sig| sig.matches(data))
        .map(|sig| sig.tag)
        .unwrap_or(FormatTag::Unknown)
}

// https://github.com/topjohnwu/Magisk/blob/01cb75eaefbd14c2d10772ded3942660ebf0285f/native/src/boot/format.cpp#L70
/// Like [`detect`], but tells legacy LZ4 block streams apart from the LG
/// variant, whose trailing uncompressed size does not parse as a block.
pub fn detect_lg(data: &[u8]) -> FormatTag {
    let format = detect(data);
    if format != FormatTag::Lz4Legacy {
        return format;
    }

    let mut blocks = Lz4LegacyBlocks::new(data);
    for _ in blocks.by_ref() {}
    if blocks.rest().len() >= 4 {
        FormatTag::Lz4Lg
    } else {
        format
    }
}

/// Compressed blocks of a legacy LZ4 stream, each stored behind its
/// little-endian size. Iteration stops at the first size that runs past the
/// end of the stream.
pub(crate) struct Lz4LegacyBlocks<'a> {
    rest: &'a [u8],
}

impl<'a> Lz4LegacyBlocks<'a> {
    pub(crate) fn new(stream: &'a [u8]) -> Self {
        Self {
            rest: stream.get(LZ4_LEG_MAGIC.len()..).unwrap_or_default(),
        }
    }

    /// Bytes after the last complete block, e.g. the LG size trailer or
    /// another concatenated stream.
    pub(crate) fn rest(&self) -> &'a [u8] {
        self.rest
    }
}

impl<'a> Iterator for Lz4LegacyBlocks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let size = self.rest.u32_at(0)? as usize;
        let end = size.checked_add(4)?;
        let block = self.rest.get(4..end)?;
        self.rest = &self.rest[end..];
        Some(block)
    }
}
