use crate::constants::LZ4_LEG_MAGIC;
use crate::error::{Error, Result};
use crate::format::{FormatTag, Lz4LegacyBlocks};
use bzip2::Compression as BzCompression;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::Compression as GzCompression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use lz4::block::CompressionMode;
use lz4::liblz4::BlockChecksum;
use lz4::{
    BlockMode, BlockSize, ContentChecksum, Decoder as LZ4FrameDecoder,
    Encoder as LZ4FrameEncoder, EncoderBuilder as LZ4FrameEncoderBuilder,
};
use lzma_rust2::{CheckType, LzmaOptions, LzmaReader, LzmaWriter, XzOptions, XzReader, XzWriter};
use std::io::{BufWriter, Read, Write};
use std::num::NonZeroU64;
use tracing::debug;
use zopfli::{BlockType, GzipEncoder as ZopFliEncoder, Options as ZopfliOptions};

pub trait WriteFinish<W: Write>: Write {
    fn finish(self: Box<Self>) -> std::io::Result<W>;
}

// Boilerplate for existing types

macro_rules! finish_impl {
    ($($t:ty),*) => {$(
        impl<W: Write> WriteFinish<W> for $t {
            fn finish(self: Box<Self>) -> std::io::Result<W> {
                Self::finish(*self)
            }
        }
    )*}
}

finish_impl!(GzEncoder<W>, BzEncoder<W>, XzWriter<W>, LzmaWriter<W>);

impl<W: Write> WriteFinish<W> for BufWriter<ZopFliEncoder<W>> {
    fn finish(self: Box<Self>) -> std::io::Result<W> {
        let inner = self.into_inner()?;
        ZopFliEncoder::finish(inner)
    }
}

impl<W: Write> WriteFinish<W> for LZ4FrameEncoder<W> {
    fn finish(self: Box<Self>) -> std::io::Result<W> {
        let (w, r) = Self::finish(*self);
        r?;
        Ok(w)
    }
}

// Legacy LZ4 stream
//
// len:  |   4   |          4            |           n           | ... |           4             |
// data: | magic | compressed block size | compressed block data | ... | total uncompressed size |
//
// Only the LG variant writes the trailing total.

const LZ4_BLOCK_SIZE: usize = 0x800000;
const LZ4HC_CLEVEL_MAX: i32 = 12;

fn lz4_legacy_compress(input: &[u8], lg: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 2 + LZ4_LEG_MAGIC.len());
    out.extend_from_slice(LZ4_LEG_MAGIC);
    for chunk in input.chunks(LZ4_BLOCK_SIZE) {
        let block = lz4::block::compress(
            chunk,
            Some(CompressionMode::HIGHCOMPRESSION(LZ4HC_CLEVEL_MAX)),
            false,
        )?;
        out.extend_from_slice(&(block.len() as u32).to_le_bytes());
        out.extend_from_slice(&block);
    }
    if lg {
        let total = u32::try_from(input.len()).map_err(|_| Error::SectionTooLarge {
            section: FormatTag::Lz4Lg.to_string(),
            size: input.len(),
        })?;
        out.extend_from_slice(&total.to_le_bytes());
    }
    Ok(out)
}

/// Decodes every block, following streams concatenated behind the first.
/// Anything else after the last block, such as the LG trailer, is ignored.
fn lz4_legacy_decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; LZ4_BLOCK_SIZE];
    let mut stream = input;
    loop {
        let mut blocks = Lz4LegacyBlocks::new(stream);
        for block in blocks.by_ref() {
            let len = lz4::block::decompress_to_buffer(
                block,
                Some(LZ4_BLOCK_SIZE as i32),
                &mut buf,
            )?;
            out.extend_from_slice(&buf[..len]);
        }
        let rest = blocks.rest();
        if !rest.starts_with(LZ4_LEG_MAGIC) {
            if !rest.is_empty() {
                debug!("{} bytes after the last lz4 block", rest.len());
            }
            return Ok(out);
        }
        stream = rest;
    }
}

fn stream_decoder<'a, R: Read + 'a>(format: FormatTag, r: R) -> Result<Box<dyn Read + 'a>> {
    Ok(match format {
        FormatTag::Xz => Box::new(XzReader::new(r, true)),
        FormatTag::Lzma => Box::new(LzmaReader::new_mem_limit(r, u32::MAX, None)?),
        FormatTag::Bzip2 => Box::new(BzDecoder::new(r)),
        FormatTag::Lz4 => Box::new(LZ4FrameDecoder::new(r)?),
        FormatTag::Zopfli | FormatTag::Gzip => Box::new(MultiGzDecoder::new(r)),
        _ => return Err(Error::UnsupportedCodec(format)),
    })
}

fn stream_encoder<'a, W: Write + ?Sized>(
    format: FormatTag,
    w: &'a mut W,
) -> Result<Box<dyn WriteFinish<&'a mut W> + 'a>> {
    Ok(match format {
        FormatTag::Xz => {
            let mut opt = XzOptions::with_preset(9);
            opt.set_check_sum_type(CheckType::Crc32);
            Box::new(XzWriter::new(w, opt)?)
        }
        FormatTag::Lzma => Box::new(LzmaWriter::new_use_header(
            w,
            &LzmaOptions::with_preset(9),
            None,
        )?),
        FormatTag::Bzip2 => Box::new(BzEncoder::new(w, BzCompression::best())),
        FormatTag::Lz4 => {
            let encoder = LZ4FrameEncoderBuilder::new()
                .block_size(BlockSize::Max4MB)
                .block_mode(BlockMode::Independent)
                .checksum(ContentChecksum::ChecksumEnabled)
                .block_checksum(BlockChecksum::BlockChecksumEnabled)
                .level(9)
                .auto_flush(true)
                .build(w)?;
            Box::new(encoder)
        }
        FormatTag::Zopfli => {
            // These options are already better than gzip -9
            let opt = ZopfliOptions {
                iteration_count: NonZeroU64::MIN,
                maximum_block_splits: 1,
                ..Default::default()
            };
            Box::new(ZopFliEncoder::new_buffered(opt, BlockType::Dynamic, w)?)
        }
        FormatTag::Gzip => Box::new(GzEncoder::new(w, GzCompression::best())),
        _ => return Err(Error::UnsupportedCodec(format)),
    })
}

/// Decode a whole in-memory stream.
pub fn decompress(format: FormatTag, input: &[u8]) -> Result<Vec<u8>> {
    let out = match format {
        FormatTag::Lz4Legacy | FormatTag::Lz4Lg => lz4_legacy_decompress(input)?,
        _ => {
            let mut out = Vec::new();
            stream_decoder(format, input)?.read_to_end(&mut out)?;
            out
        }
    };
    debug!("decompressed {} {} -> {} bytes", format, input.len(), out.len());
    Ok(out)
}

pub fn compress(format: FormatTag, input: &[u8]) -> Result<Vec<u8>> {
    let out = match format {
        FormatTag::Lz4Legacy => lz4_legacy_compress(input, false)?,
        FormatTag::Lz4Lg => lz4_legacy_compress(input, true)?,
        _ => {
            let mut out = Vec::new();
            let mut encoder = stream_encoder(format, &mut out)?;
            encoder.write_all(input)?;
            encoder.finish()?;
            out
        }
    };
    debug!("compressed {} {} -> {} bytes", format, input.len(), out.len());
    Ok(out)
}
