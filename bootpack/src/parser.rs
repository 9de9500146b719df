use crate::constants::{AVB_FOOTER_MAGIC, AVB_MAGIC, MTK_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::flags::{
    BootFlags, PrefixScan, ZimageInfo, find_kernel_dtb, scan_mtk, scan_prefix, scan_tail,
    scan_zimage,
};
use crate::format::{FormatTag, detect_lg};
use crate::header::{BootHeader, HeaderVariant};
use crate::layouts::{
    AVB_HEADER_SIZE, AvbFooter, AvbVBMetaHeader, MtkHeader, VendorRamdiskTableEntryType,
    VendorRamdiskTableEntryV4,
};
use crate::utils::{align_to, trim_end};
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Range;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Every region of an image that can be dumped or replaced on its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionId {
    Kernel,
    KernelDtb,
    Ramdisk,
    Second,
    Extra,
    RecoveryDtbo,
    Dtb,
    Signature,
    VendorRamdiskTable,
    Bootconfig,
}

impl SectionId {
    pub const ALL: [SectionId; 10] = [
        SectionId::Kernel,
        SectionId::KernelDtb,
        SectionId::Ramdisk,
        SectionId::Second,
        SectionId::Extra,
        SectionId::RecoveryDtbo,
        SectionId::Dtb,
        SectionId::Signature,
        SectionId::VendorRamdiskTable,
        SectionId::Bootconfig,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SectionId::Kernel => "kernel",
            SectionId::KernelDtb => "kernel_dtb",
            SectionId::Ramdisk => "ramdisk",
            SectionId::Second => "second",
            SectionId::Extra => "extra",
            SectionId::RecoveryDtbo => "recovery_dtbo",
            SectionId::Dtb => "dtb",
            SectionId::Signature => "signature",
            SectionId::VendorRamdiskTable => "vendor_ramdisk_table",
            SectionId::Bootconfig => "bootconfig",
        }
    }
}

impl Display for SectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SectionId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| Error::UnknownSection(s.to_owned()))
    }
}

/// A byte range of the source image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Section {
    pub offset: usize,
    pub size: usize,
}

impl Section {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// A region whose size is declared by one header field. The kernel block
/// also covers its MTK sub-header and appended device tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: SectionId,
    pub region: Section,
}

#[derive(Debug, Copy, Clone)]
pub struct VendorRamdisk<'a> {
    pub(crate) index: usize,
    pub(crate) data: &'a [u8],
    pub(crate) section: Section,
    pub(crate) format: FormatTag,
    pub(crate) entry: VendorRamdiskTableEntryV4<'a>,
}

impl<'a> VendorRamdisk<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Absolute position in the image.
    pub fn section(&self) -> Section {
        self.section
    }

    pub fn name_raw(&self) -> &'a [u8] {
        trim_end(self.entry.get_ramdisk_name())
    }

    pub fn name(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.name_raw())
    }

    pub fn entry_type(&self) -> VendorRamdiskTableEntryType {
        self.entry.get_ramdisk_type()
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    pub fn entry(&self) -> VendorRamdiskTableEntryV4<'a> {
        self.entry
    }
}

/// AVB structures found in the image. Offsets are absolute.
#[derive(Debug, Copy, Clone)]
pub struct AvbInfo<'a> {
    pub(crate) footer: Option<(usize, AvbFooter<'a>)>,
    pub(crate) vbmeta_offset: usize,
    pub(crate) vbmeta: Option<AvbVBMetaHeader<'a>>,
}

impl<'a> AvbInfo<'a> {
    pub fn footer(&self) -> Option<AvbFooter<'a>> {
        self.footer.map(|(_, f)| f)
    }

    pub fn footer_offset(&self) -> Option<usize> {
        self.footer.map(|(off, _)| off)
    }

    pub fn vbmeta_offset(&self) -> usize {
        self.vbmeta_offset
    }

    pub fn vbmeta_header(&self) -> Option<AvbVBMetaHeader<'a>> {
        self.vbmeta
    }

    /// Size of the vbmeta block, from the footer when there is one.
    pub fn vbmeta_size(&self) -> u64 {
        match (self.footer, self.vbmeta) {
            (Some((_, footer)), _) => footer.get_vbmeta_size(),
            (None, Some(hdr)) => (AVB_HEADER_SIZE as u64)
                .saturating_add(hdr.get_authentication_data_block_size())
                .saturating_add(hdr.get_auxiliary_data_block_size()),
            (None, None) => 0,
        }
    }
}

pub struct BootImage<'a> {
    pub(crate) data: &'a [u8],
    pub(crate) prefix: PrefixScan,
    pub(crate) header: BootHeader,
    pub(crate) flags: BootFlags,
    pub(crate) kernel_format: FormatTag,
    pub(crate) ramdisk_format: FormatTag,
    pub(crate) extra_format: FormatTag,
    pub(crate) blocks: Vec<Block>,
    pub(crate) sections: Vec<(SectionId, Section)>,
    pub(crate) mtk_kernel: Option<Section>,
    pub(crate) mtk_ramdisk: Option<Section>,
    pub(crate) zimage: Option<ZimageInfo>,
    pub(crate) vendor_ramdisks: Vec<VendorRamdisk<'a>>,
    /// End of the last block without its alignment padding.
    pub(crate) blocks_end: usize,
    pub(crate) tail: Section,
    pub(crate) avb: Option<AvbInfo<'a>>,
}

fn truncated(section: &'static str, region: Section, image_size: usize) -> Error {
    Error::TruncatedImage {
        section,
        offset: region.offset,
        size: region.size,
        image_size,
    }
}

impl<'a> BootImage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let prefix = scan_prefix(data)?;
        let mut flags = prefix.flags;

        let header = BootHeader::parse(&data[prefix.header_view_offset..])?;
        debug!("header variant {:?}", header.variant());
        if header.header_space() == 0 {
            return Err(Error::PageSizeZero);
        }
        if header.id_is_sha256() {
            info!("SHA256");
            flags |= BootFlags::SHA256;
        }

        let page_size = header.header_space();
        let header_region = Section {
            offset: prefix.header_offset,
            size: header.header_region_size(),
        };
        if header_region.end() > data.len() {
            return Err(truncated("header", header_region, data.len()));
        }

        let declared = [
            (SectionId::Kernel, header.has_kernel_size(), header.get_kernel_size()),
            (SectionId::Ramdisk, header.has_ramdisk_size(), header.get_ramdisk_size()),
            (SectionId::Second, header.has_second_size(), header.get_second_size()),
            (SectionId::Extra, header.has_extra_size(), header.get_extra_size()),
            (
                SectionId::RecoveryDtbo,
                header.has_recovery_dtbo_size(),
                header.get_recovery_dtbo_size(),
            ),
            (SectionId::Dtb, header.has_dtb_size(), header.get_dtb_size()),
            (
                SectionId::Signature,
                header.has_signature_size(),
                header.get_signature_size(),
            ),
            (
                SectionId::VendorRamdiskTable,
                header.has_vendor_ramdisk_table_size(),
                header.get_vendor_ramdisk_table_size(),
            ),
            (
                SectionId::Bootconfig,
                header.has_bootconfig_size(),
                header.get_bootconfig_size(),
            ),
        ];

        let mut blocks = Vec::new();
        let mut off = header_region.end();
        let mut blocks_end = off;
        for (id, present, size) in declared {
            if !present {
                continue;
            }
            let region = Section {
                offset: off,
                size: size as usize,
            };
            if region.end() > data.len() {
                return Err(truncated(id.name(), region, data.len()));
            }
            debug!("block {} at off {} sz {}", id, region.offset, region.size);
            blocks.push(Block { id, region });
            blocks_end = region.end();
            off = prefix.header_offset + align_to(blocks_end - prefix.header_offset, page_size);
        }
        let sections_end = off.min(data.len());

        let mut image = Self {
            data,
            prefix,
            header,
            flags,
            kernel_format: FormatTag::Unknown,
            ramdisk_format: FormatTag::Unknown,
            extra_format: FormatTag::Unknown,
            blocks,
            sections: Vec::new(),
            mtk_kernel: None,
            mtk_ramdisk: None,
            zimage: None,
            vendor_ramdisks: Vec::new(),
            blocks_end,
            tail: Section::default(),
            avb: None,
        };

        for block in image.blocks.clone() {
            match block.id {
                SectionId::Kernel => image.parse_kernel(block.region),
                SectionId::Ramdisk => {}
                SectionId::Extra => {
                    image.extra_format = detect_lg(&data[block.region.range()]);
                    image.sections.push((block.id, block.region));
                }
                id => image.sections.push((id, block.region)),
            }
        }
        if let Some(ramdisk) = image.block(SectionId::Ramdisk) {
            image.parse_ramdisk(ramdisk.region)?;
        }
        image.sections.sort_by_key(|(id, _)| *id);

        image.parse_tail(sections_end);

        Ok(image)
    }

    fn parse_kernel(&mut self, region: Section) {
        let mut payload = region;
        match scan_mtk(&self.data[region.range()]) {
            Ok(Some(hdr)) => {
                info!("MTK_KERNEL_HDR size {}", hdr.get_size());
                self.flags |= BootFlags::MTK_KERNEL;
                self.mtk_kernel = Some(Section {
                    offset: region.offset,
                    size: MTK_HEADER_SIZE,
                });
                payload.offset += MTK_HEADER_SIZE;
                payload.size -= MTK_HEADER_SIZE;
            }
            Ok(None) => {}
            Err(e) => warn!("{e}, treating kernel as raw"),
        }

        if let Some(dtb_off) = find_kernel_dtb(&self.data[payload.range()]) {
            let dtb = Section {
                offset: payload.offset + dtb_off,
                size: payload.size - dtb_off,
            };
            debug!("KERNEL_DTB_SZ {}", dtb.size);
            payload.size = dtb_off;
            self.sections.push((SectionId::KernelDtb, dtb));
        }

        let kernel = &self.data[payload.range()];
        self.kernel_format = detect_lg(kernel);
        if self.kernel_format == FormatTag::Zimage {
            if let Some(info) = scan_zimage(kernel) {
                self.flags |= BootFlags::ZIMAGE_KERNEL;
                self.kernel_format = detect_lg(&kernel[info.payload_offset..]);
                self.zimage = Some(info);
            }
        }
        debug!("KERNEL_FMT {}", self.kernel_format);
        self.sections.push((SectionId::Kernel, payload));
    }

    fn parse_ramdisk(&mut self, region: Section) -> Result<()> {
        if let Some(table) = self.section(SectionId::VendorRamdiskTable) {
            self.parse_vendor_ramdisk_table(region, table)?;
            self.ramdisk_format = detect_lg(&self.data[region.range()]);
            self.sections.push((SectionId::Ramdisk, region));
            return Ok(());
        }

        let mut payload = region;
        match scan_mtk(&self.data[region.range()]) {
            Ok(Some(hdr)) => {
                info!("MTK_RAMDISK_HDR size {}", hdr.get_size());
                self.flags |= BootFlags::MTK_RAMDISK;
                self.mtk_ramdisk = Some(Section {
                    offset: region.offset,
                    size: MTK_HEADER_SIZE,
                });
                payload.offset += MTK_HEADER_SIZE;
                payload.size -= MTK_HEADER_SIZE;
            }
            Ok(None) => {}
            Err(e) => warn!("{e}, treating ramdisk as raw"),
        }
        self.ramdisk_format = detect_lg(&self.data[payload.range()]);
        debug!("RAMDISK_FMT {}", self.ramdisk_format);
        self.sections.push((SectionId::Ramdisk, payload));
        Ok(())
    }

    fn parse_vendor_ramdisk_table(&mut self, region: Section, table: Section) -> Result<()> {
        let entry_size = self.header.get_vendor_ramdisk_table_entry_size() as usize;
        if entry_size != VendorRamdiskTableEntryV4::SIZE {
            return Err(Error::InvalidVendorRamdiskTable(format!(
                "entry size {entry_size}, expected {}",
                VendorRamdiskTableEntryV4::SIZE
            )));
        }
        let entry_num = self.header.get_vendor_ramdisk_table_entry_num() as usize;
        let entries_size = entry_num
            .checked_mul(entry_size)
            .filter(|&sz| sz <= table.size)
            .ok_or_else(|| {
                Error::InvalidVendorRamdiskTable(format!(
                    "{entry_num} entries do not fit in {} bytes",
                    table.size
                ))
            })?;

        let data = self.data;
        let mut total = 0usize;
        for (index, raw) in data[table.offset..table.offset + entries_size]
            .chunks_exact(entry_size)
            .enumerate()
        {
            let Some(entry) = VendorRamdiskTableEntryV4::from_bytes(raw) else {
                continue;
            };
            let section = Section {
                offset: region.offset + entry.get_ramdisk_offset() as usize,
                size: entry.get_ramdisk_size() as usize,
            };
            if section.end() > region.end() {
                return Err(Error::InvalidVendorRamdiskTable(format!(
                    "entry {index} at {}+{} exceeds ramdisk size {}",
                    entry.get_ramdisk_offset(),
                    section.size,
                    region.size
                )));
            }
            total += section.size;
            let bytes = &data[section.range()];
            let ramdisk = VendorRamdisk {
                index,
                data: bytes,
                section,
                format: detect_lg(bytes),
                entry,
            };
            debug!(
                "vendor ramdisk {:?} type {:?} at {} sz {}",
                ramdisk.name(),
                ramdisk.entry_type(),
                section.offset,
                section.size
            );
            self.vendor_ramdisks.push(ramdisk);
        }

        if total != region.size {
            return Err(Error::InvalidVendorRamdiskTable(format!(
                "entries cover {total} bytes, ramdisk is {} bytes",
                region.size
            )));
        }

        let mut ranges: Vec<_> = self
            .vendor_ramdisks
            .iter()
            .filter(|r| !r.section.is_empty())
            .map(|r| (r.section, r.index))
            .collect();
        ranges.sort_unstable_by_key(|(s, _)| s.offset);
        if let Some(&[(a, i), (b, j)]) = ranges
            .windows(2)
            .find(|w| w[0].0.end() > w[1].0.offset)
        {
            return Err(Error::InvalidVendorRamdiskTable(format!(
                "entry {j} at {} overlaps entry {i} ending at {}",
                b.offset - region.offset,
                a.end() - region.offset
            )));
        }
        Ok(())
    }

    fn parse_tail(&mut self, sections_end: usize) {
        let data = self.data;
        let footer = data
            .len()
            .checked_sub(AvbFooter::SIZE)
            .filter(|&off| off >= sections_end && data[off..].starts_with(AVB_FOOTER_MAGIC))
            .and_then(|off| AvbFooter::from_bytes(&data[off..]).map(|f| (off, f)));

        let tail_end = footer.map_or(data.len(), |(off, _)| off);
        self.tail = Section {
            offset: sections_end,
            size: tail_end - sections_end,
        };
        let tail = &data[self.tail.range()];
        self.flags |= scan_tail(tail, footer.is_some());

        if let Some((footer_offset, f)) = footer {
            let vbmeta_offset = usize::try_from(f.get_vbmeta_offset()).unwrap_or(usize::MAX);
            let vbmeta = data
                .get(vbmeta_offset..)
                .filter(|d| d.starts_with(AVB_MAGIC))
                .and_then(AvbVBMetaHeader::from_bytes);
            if vbmeta.is_some() {
                info!("VBMETA");
                self.flags |= BootFlags::AVB;
            } else {
                warn!("AVB footer without vbmeta header at 0x{:x}", vbmeta_offset);
            }
            self.avb = Some(AvbInfo {
                footer: Some((footer_offset, f)),
                vbmeta_offset,
                vbmeta,
            });
        } else if self.flags.contains(BootFlags::AVB1_SIGNED) {
            self.avb = Some(AvbInfo {
                footer: None,
                vbmeta_offset: self.tail.offset,
                vbmeta: AvbVBMetaHeader::from_bytes(tail),
            });
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn header(&self) -> &BootHeader {
        &self.header
    }

    pub fn variant(&self) -> HeaderVariant {
        self.header.variant()
    }

    pub fn flags(&self) -> BootFlags {
        self.flags
    }

    pub fn prefix(&self) -> PrefixScan {
        self.prefix
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: SectionId) -> Option<Block> {
        self.blocks.iter().copied().find(|b| b.id == id)
    }

    pub fn section(&self, id: SectionId) -> Option<Section> {
        self.sections
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, s)| *s)
    }

    /// Bytes of a section, borrowed from the source image.
    pub fn section_data(&self, id: SectionId) -> Option<&'a [u8]> {
        self.section(id).map(|s| &self.data[s.range()])
    }

    /// Present sections in layout order.
    pub fn sections(&self) -> impl Iterator<Item = (SectionId, Section)> + '_ {
        self.sections.iter().copied()
    }

    /// Codec of a section's payload, or [`FormatTag::Unknown`] for sections
    /// that are never compressed.
    pub fn section_format(&self, id: SectionId) -> FormatTag {
        match id {
            SectionId::Kernel => self.kernel_format,
            SectionId::Ramdisk => self.ramdisk_format,
            SectionId::Extra => self.extra_format,
            _ => FormatTag::Unknown,
        }
    }

    pub fn kernel_format(&self) -> FormatTag {
        self.kernel_format
    }

    pub fn ramdisk_format(&self) -> FormatTag {
        self.ramdisk_format
    }

    pub fn extra_format(&self) -> FormatTag {
        self.extra_format
    }

    pub fn mtk_header(&self, id: SectionId) -> Option<MtkHeader<'a>> {
        let region = match id {
            SectionId::Kernel => self.mtk_kernel?,
            SectionId::Ramdisk => self.mtk_ramdisk?,
            _ => return None,
        };
        MtkHeader::from_bytes(&self.data[region.range()])
    }

    pub fn zimage(&self) -> Option<ZimageInfo> {
        self.zimage
    }

    pub fn vendor_ramdisks(&self) -> &[VendorRamdisk<'a>] {
        &self.vendor_ramdisks
    }

    pub fn vendor_ramdisk(&self, name: &str) -> Option<&VendorRamdisk<'a>> {
        self.vendor_ramdisks
            .iter()
            .find(|r| r.name_raw() == name.as_bytes())
    }

    /// Bytes after the last section that are kept but not interpreted. Does
    /// not include an AVB footer.
    pub fn tail(&self) -> &'a [u8] {
        &self.data[self.tail.range()]
    }

    pub fn tail_section(&self) -> Section {
        self.tail
    }

    pub fn avb(&self) -> Option<&AvbInfo<'a>> {
        self.avb.as_ref()
    }
}

impl Debug for BootImage<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootImage")
            .field("len", &self.data.len())
            .field("variant", &self.header.variant())
            .field("flags", &self.flags)
            .field("prefix", &self.prefix)
            .field("sections", &self.sections)
            .field("vendor_ramdisks", &self.vendor_ramdisks.len())
            .field("tail", &self.tail)
            .field("avb", &self.avb)
            .finish_non_exhaustive()
    }
}

impl Display for BootImage<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.header)?;
        for (name, _) in self.flags.iter_names() {
            writeln!(f, "{:<15} [yes]", name)?;
        }
        if self.block(SectionId::Kernel).is_some() {
            writeln!(f, "{:<15} [{}]", "KERNEL_FMT", self.kernel_format)?;
        }
        if let Some(dtb) = self.section(SectionId::KernelDtb) {
            writeln!(f, "{:<15} [{}]", "KERNEL_DTB_SZ", dtb.size)?;
        }
        writeln!(f, "{:<15} [{}]", "RAMDISK_FMT", self.ramdisk_format)?;
        if self.section(SectionId::Extra).is_some_and(|s| !s.is_empty()) {
            writeln!(f, "{:<15} [{}]", "EXTRA_FMT", self.extra_format)?;
        }
        for ramdisk in &self.vendor_ramdisks {
            writeln!(
                f,
                "{:<15} [{}] {:?} {} bytes [{}]",
                "VND_RAMDISK",
                ramdisk.name(),
                ramdisk.entry_type(),
                ramdisk.section.size,
                ramdisk.format
            )?;
        }
        Ok(())
    }
}
