use crate::constants::{
    ACCLAIM_MAGIC, ACCLAIM_PRE_HEADER_SZ, AMONET_MICROLOADER_MAGIC, AMONET_MICROLOADER_SZ,
    AVB_MAGIC, BLOB_HEADER_SIZE, BOOT_MAGIC, CHROMEOS_PRE_HEADER_SZ, DHTB_HEADER_SIZE, DTB_MAGIC,
    FDT_BEGIN_NODE, LG_BUMP_MAGIC, MTK_HEADER_SIZE, MTK_MAGIC, NOOKHD_EB_MAGIC, NOOKHD_ER_MAGIC,
    NOOKHD_GL_MAGIC, NOOKHD_GR_MAGIC, NOOKHD_PRE_HEADER_SZ, NOOKHD_RL_MAGIC, SEANDROID_MAGIC,
    VENDOR_BOOT_MAGIC, ZIMAGE_GZIP_MAGIC,
};
use crate::error::{Error, Result};
use crate::format::{FormatTag, detect};
use crate::layouts::{BOOT_HEADER_V0, FdtHeader, MtkHeader, ZimageHeader};
use crate::utils::SliceExt;
use bitflags::bitflags;
use memchr::memmem;
use tracing::info;

bitflags! {
    /// Wrappers and markers found while parsing an image.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BootFlags: u16 {
        const MTK_KERNEL = 1 << 0;
        const MTK_RAMDISK = 1 << 1;
        const CHROMEOS = 1 << 2;
        const DHTB = 1 << 3;
        const SEANDROID = 1 << 4;
        const LG_BUMP = 1 << 5;
        const SHA256 = 1 << 6;
        const BLOB = 1 << 7;
        const NOOKHD = 1 << 8;
        const ACCLAIM = 1 << 9;
        const AMONET = 1 << 10;
        const AVB1_SIGNED = 1 << 11;
        const AVB = 1 << 12;
        const ZIMAGE_KERNEL = 1 << 13;
    }
}

/// Where the boot header sits once outer wrappers and OEM prefixes are
/// accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixScan {
    pub flags: BootFlags,
    /// Offset of the first boot magic in the file.
    pub base: usize,
    /// Start of the header region. Section offsets are aligned relative to
    /// this.
    pub header_offset: usize,
    /// Where the header fields are read from. Differs from `header_offset`
    /// only for Amonet images, whose real header follows a microloader.
    pub header_view_offset: usize,
    pub dhtb_offset: Option<usize>,
    pub blob_offset: Option<usize>,
}

fn unsupported(data: &[u8], offset: usize) -> Error {
    Error::UnsupportedFormat {
        offset,
        expected: "ANDROID! or VNDRBOOT",
        found: data.iter().skip(offset).take(8).copied().collect(),
    }
}

fn is_boot_magic(data: &[u8], offset: usize) -> bool {
    data.get(offset..)
        .is_some_and(|d| d.starts_with(BOOT_MAGIC) || d.starts_with(VENDOR_BOOT_MAGIC))
}

/// Skip ChromeOS, DHTB and Tegra blob wrappers in front of the boot header
/// and detect OEM loader prefixes. Must run before any section is located.
pub fn scan_prefix(data: &[u8]) -> Result<PrefixScan> {
    let mut flags = BootFlags::empty();
    let mut pos = 0;
    let mut dhtb_offset = None;
    let mut blob_offset = None;

    loop {
        let Some(rest) = data.get(pos..) else {
            return Err(unsupported(data, pos));
        };
        match detect(rest) {
            FormatTag::ChromeOs if !flags.contains(BootFlags::CHROMEOS) => {
                info!("CHROMEOS");
                flags |= BootFlags::CHROMEOS;
                pos += CHROMEOS_PRE_HEADER_SZ;
            }
            FormatTag::Dhtb if !flags.contains(BootFlags::DHTB) => {
                info!("DHTB_HDR");
                flags |= BootFlags::DHTB | BootFlags::SHA256;
                dhtb_offset = Some(pos);
                pos += DHTB_HEADER_SIZE;
            }
            FormatTag::Blob if !flags.contains(BootFlags::BLOB) => {
                info!("TEGRA_BLOB");
                flags |= BootFlags::BLOB;
                blob_offset = Some(pos);
                pos += BLOB_HEADER_SIZE;
                // The signed payload is not necessarily right after the blob
                // header.
                if !is_boot_magic(data, pos) {
                    let found = data.get(pos..).and_then(|rest| {
                        [memmem::find(rest, BOOT_MAGIC), memmem::find(rest, VENDOR_BOOT_MAGIC)]
                            .into_iter()
                            .flatten()
                            .min()
                    });
                    match found {
                        Some(skip) => pos += skip,
                        None => return Err(unsupported(data, pos)),
                    }
                }
            }
            FormatTag::Aosp | FormatTag::AospVendor => break,
            _ => return Err(unsupported(data, pos)),
        }
    }

    let base = pos;
    let mut header_offset = base;
    let mut header_view_offset = base;

    if data[base..].starts_with(BOOT_MAGIC) {
        let cmdline_offset = base + BOOT_HEADER_V0.offset_cmdline as usize;
        let name_offset = base + BOOT_HEADER_V0.offset_name as usize;
        let cmdline = data.get(cmdline_offset..).unwrap_or_default();
        let name = data.get(name_offset..).unwrap_or_default();

        let microloader = data
            .get(base..base + AMONET_MICROLOADER_SZ)
            .is_some_and(|d| memmem::find(d, AMONET_MICROLOADER_MAGIC).is_some());

        if microloader && is_boot_magic(data, base + AMONET_MICROLOADER_SZ) {
            info!("AMONET_MICROLOADER");
            flags |= BootFlags::AMONET;
            header_view_offset = base + AMONET_MICROLOADER_SZ;
        } else if [
            NOOKHD_RL_MAGIC,
            NOOKHD_GL_MAGIC,
            NOOKHD_GR_MAGIC,
            NOOKHD_EB_MAGIC,
            NOOKHD_ER_MAGIC,
        ]
        .iter()
        .any(|m| cmdline.starts_with(m))
        {
            info!("NOOKHD_LOADER");
            flags |= BootFlags::NOOKHD;
            header_offset = base + NOOKHD_PRE_HEADER_SZ;
            header_view_offset = header_offset;
        } else if name.starts_with(ACCLAIM_MAGIC) {
            info!("ACCLAIM_LOADER");
            flags |= BootFlags::ACCLAIM;
            header_offset = base + ACCLAIM_PRE_HEADER_SZ;
            header_view_offset = header_offset;
        }

        if !is_boot_magic(data, header_view_offset) {
            return Err(unsupported(data, header_view_offset));
        }
    }

    Ok(PrefixScan {
        flags,
        base,
        header_offset,
        header_view_offset,
        dhtb_offset,
        blob_offset,
    })
}

/// Check a kernel or ramdisk section for a MediaTek sub-header. A header
/// whose declared size does not fit in the section is reported as
/// [`Error::MalformedWrapper`] so the caller can fall back to raw parsing.
pub fn scan_mtk(section: &[u8]) -> Result<Option<MtkHeader<'_>>> {
    if !section.starts_with(MTK_MAGIC) {
        return Ok(None);
    }
    let Some(hdr) = MtkHeader::from_bytes(section) else {
        return Err(Error::MalformedWrapper {
            wrapper: "MTK",
            declared: MTK_HEADER_SIZE,
            available: section.len(),
        });
    };
    let declared = hdr.get_size() as usize;
    let available = section.len() - MTK_HEADER_SIZE;
    if declared > available {
        return Err(Error::MalformedWrapper {
            wrapper: "MTK",
            declared,
            available,
        });
    }
    Ok(Some(hdr))
}

/// Markers found at the start of the bytes following the last section.
pub fn scan_tail(tail: &[u8], has_footer: bool) -> BootFlags {
    let mut flags = BootFlags::empty();
    if tail.starts_with(SEANDROID_MAGIC) {
        info!("SAMSUNG_SEANDROID");
        flags |= BootFlags::SEANDROID;
    } else if tail.starts_with(LG_BUMP_MAGIC) {
        info!("LG_BUMP_IMAGE");
        flags |= BootFlags::LG_BUMP;
    } else if !has_footer && tail.starts_with(AVB_MAGIC) {
        info!("AVB1_SIGNED");
        flags |= BootFlags::AVB1_SIGNED;
    }
    flags
}

/// Offset of a device tree appended to a kernel, if any. Candidates must
/// have a header that fits and a structure block that opens with a node.
pub fn find_kernel_dtb(kernel: &[u8]) -> Option<usize> {
    memmem::find_iter(kernel, DTB_MAGIC).find(|&offset| {
        let rest = &kernel[offset..];
        let Some(fdt) = FdtHeader::from_bytes(rest) else {
            return false;
        };
        let total = fdt.get_totalsize() as usize;
        let struct_off = fdt.get_off_dt_struct() as usize;
        total <= rest.len()
            && struct_off <= rest.len()
            && rest.u32_be_at(struct_off) == Some(FDT_BEGIN_NODE)
    })
}

/// A compressed kernel inside an ARM zImage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZimageInfo {
    pub start: u32,
    pub end: u32,
    pub endian: u32,
    /// Offset of the gzip stream from the start of the kernel.
    pub payload_offset: usize,
}

pub fn scan_zimage(kernel: &[u8]) -> Option<ZimageInfo> {
    let hdr = ZimageHeader::from_bytes(kernel)?;
    let payload_offset = memmem::find(kernel, ZIMAGE_GZIP_MAGIC)?;
    info!("ZIMAGE_KERNEL");
    Some(ZimageInfo {
        start: hdr.get_start(),
        end: hdr.get_end(),
        endian: hdr.get_endian(),
        payload_offset,
    })
}
