use crate::avb::{Crypto, DigestAlgorithm, RustCrypto};
use crate::constants::DHTB_HEADER_SIZE;
use crate::error::{Error, Result};
use crate::flags::BootFlags;
use crate::header::{BootHeader, HeaderVariant};
use crate::layouts::{BlobHeader, DhtbHeader, MtkHeader, VendorRamdiskTableEntryV4};
use crate::parser::{BootImage, Section, SectionId};
use crate::utils::{ImageWriter, align_to};
use paste::paste;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepackOptions {
    /// Refresh the header `id` when a section changed.
    pub recompute_id: bool,
    /// Leave out the tail and AVB footer, ending the image after the last
    /// section.
    pub drop_tail: bool,
    /// Zero-pad the output back to the size of the source image.
    pub pad_to_original: bool,
}

impl Default for RepackOptions {
    fn default() -> Self {
        Self {
            recompute_id: true,
            drop_tail: false,
            pad_to_original: true,
        }
    }
}

/// A block as it will be written to the new image.
struct OutBlock<'b> {
    id: SectionId,
    parts: Vec<Cow<'b, [u8]>>,
    source: Section,
}

impl OutBlock<'_> {
    fn len(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }

    fn size(&self) -> Result<u32> {
        let len = self.len();
        u32::try_from(len).map_err(|_| Error::SectionTooLarge {
            section: self.id.name().to_owned(),
            size: len,
        })
    }
}

pub struct BootImagePatcher<'a> {
    source: &'a BootImage<'a>,
    header: BootHeader,
    replacements: BTreeMap<SectionId, Vec<u8>>,
    vendor_ramdisks: BTreeMap<usize, Vec<u8>>,
    options: RepackOptions,
    crypto: &'a dyn Crypto,
}

impl std::fmt::Debug for BootImagePatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootImagePatcher")
            .field("source", self.source)
            .field("header", &self.header)
            .field("replacements", &self.replacements.keys().collect::<Vec<_>>())
            .field("vendor_ramdisks", &self.vendor_ramdisks.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

macro_rules! set_block_size {
    ($header:expr, $block:expr, $($name:ident => $id:ident),* $(,)?) => {
        paste! {
            match $block.id {
                $(SectionId::$id => $header.[<set_ $name _size>]($block.size()?),)*
                _ => {}
            }
        }
    };
}

impl<'a> BootImagePatcher<'a> {
    pub fn new(source: &'a BootImage<'a>) -> Self {
        Self {
            source,
            header: source.header().clone(),
            replacements: BTreeMap::new(),
            vendor_ramdisks: BTreeMap::new(),
            options: RepackOptions::default(),
            crypto: &RustCrypto,
        }
    }

    pub fn options(&mut self, options: RepackOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn crypto(&mut self, crypto: &'a dyn Crypto) -> &mut Self {
        self.crypto = crypto;
        self
    }

    pub fn header(&self) -> &BootHeader {
        &self.header
    }

    /// Header fields to write. Size fields are overwritten on repack.
    pub fn header_mut(&mut self) -> &mut BootHeader {
        &mut self.header
    }

    pub fn replace_section(&mut self, id: SectionId, data: Vec<u8>) -> Result<&mut Self> {
        let in_layout = match id {
            SectionId::KernelDtb => self.source.block(SectionId::Kernel).is_some(),
            id => self.source.block(id).is_some(),
        };
        if !in_layout {
            return Err(Error::UnknownSection(format!(
                "{id} is not part of a {:?} image",
                self.source.variant()
            )));
        }
        match id {
            SectionId::VendorRamdiskTable => {
                return Err(Error::InvalidVendorRamdiskTable(
                    "table is rebuilt from the vendor ramdisks".to_owned(),
                ));
            }
            SectionId::Ramdisk if !self.source.vendor_ramdisks().is_empty() => {
                return Err(Error::InvalidVendorRamdiskTable(
                    "ramdisk is split into fragments, replace them by name".to_owned(),
                ));
            }
            _ => {}
        }
        if u32::try_from(data.len()).is_err() {
            return Err(Error::SectionTooLarge {
                section: id.name().to_owned(),
                size: data.len(),
            });
        }
        debug!("replace {} with {} bytes", id, data.len());
        self.replacements.insert(id, data);
        Ok(self)
    }

    pub fn replace_vendor_ramdisk(&mut self, name: &str, data: Vec<u8>) -> Result<&mut Self> {
        let Some(ramdisk) = self.source.vendor_ramdisk(name) else {
            return Err(Error::UnknownSection(format!("vendor ramdisk {name:?}")));
        };
        if u32::try_from(data.len()).is_err() {
            return Err(Error::SectionTooLarge {
                section: name.to_owned(),
                size: data.len(),
            });
        }
        debug!("replace vendor ramdisk {:?} with {} bytes", name, data.len());
        self.vendor_ramdisks.insert(ramdisk.index(), data);
        Ok(self)
    }

    fn sections_changed(&self) -> bool {
        !self.replacements.is_empty() || !self.vendor_ramdisks.is_empty()
    }

    fn section_bytes(&self, id: SectionId) -> Cow<'_, [u8]> {
        match self.replacements.get(&id) {
            Some(data) => Cow::Borrowed(data.as_slice()),
            None => Cow::Borrowed(self.source.section_data(id).unwrap_or_default()),
        }
    }

    fn kernel_block(&self, source: Section) -> OutBlock<'_> {
        let changed = self.replacements.contains_key(&SectionId::Kernel)
            || self.replacements.contains_key(&SectionId::KernelDtb);
        let payload = self.section_bytes(SectionId::Kernel);
        let dtb = self.section_bytes(SectionId::KernelDtb);

        let mut parts = Vec::with_capacity(3);
        if let Some(mtk) = self.source.mtk_header(SectionId::Kernel) {
            parts.push(mtk_part(mtk, changed, payload.len() + dtb.len()));
        }
        parts.push(payload);
        parts.push(dtb);
        OutBlock {
            id: SectionId::Kernel,
            parts,
            source,
        }
    }

    /// Returns the ramdisk block and, for vendor v4 images with replaced
    /// fragments, the rebuilt table entries.
    fn ramdisk_block(&self, source: Section) -> (OutBlock<'_>, Option<Vec<u8>>) {
        let data = self.source.data();
        let vendor_ramdisks = self.source.vendor_ramdisks();

        if !vendor_ramdisks.is_empty() {
            if self.vendor_ramdisks.is_empty() {
                let block = OutBlock {
                    id: SectionId::Ramdisk,
                    parts: vec![Cow::Borrowed(&data[source.range()])],
                    source,
                };
                return (block, None);
            }

            let mut parts = Vec::with_capacity(vendor_ramdisks.len());
            let mut table = Vec::with_capacity(vendor_ramdisks.len() * VendorRamdiskTableEntryV4::SIZE);
            let mut offset = 0usize;
            for ramdisk in vendor_ramdisks {
                let bytes = match self.vendor_ramdisks.get(&ramdisk.index()) {
                    Some(new) => new.as_slice(),
                    None => ramdisk.data(),
                };
                debug!(
                    "vendor ramdisk {:?} new off {} sz {}",
                    ramdisk.name(),
                    offset,
                    bytes.len()
                );
                // Sizes are bounded by replace_vendor_ramdisk and the source
                // table; only the running offset can overflow.
                table.extend_from_slice(
                    &ramdisk
                        .entry()
                        .patch(bytes.len() as u32, offset.min(u32::MAX as usize) as u32),
                );
                offset += bytes.len();
                parts.push(Cow::Borrowed(bytes));
            }
            let block = OutBlock {
                id: SectionId::Ramdisk,
                parts,
                source,
            };
            return (block, Some(table));
        }

        let changed = self.replacements.contains_key(&SectionId::Ramdisk);
        let payload = self.section_bytes(SectionId::Ramdisk);
        let mut parts = Vec::with_capacity(2);
        if let Some(mtk) = self.source.mtk_header(SectionId::Ramdisk) {
            parts.push(mtk_part(mtk, changed, payload.len()));
        }
        parts.push(payload);
        let block = OutBlock {
            id: SectionId::Ramdisk,
            parts,
            source,
        };
        (block, None)
    }

    fn table_block(&self, source: Section, entries: Option<&[u8]>) -> OutBlock<'_> {
        let original = &self.source.data()[source.range()];
        let parts = match entries {
            Some(entries) => {
                let rest = original.get(entries.len()..).unwrap_or_default();
                vec![Cow::Owned(entries.to_vec()), Cow::Borrowed(rest)]
            }
            None => vec![Cow::Borrowed(original)],
        };
        OutBlock {
            id: SectionId::VendorRamdiskTable,
            parts,
            source,
        }
    }

    fn build_blocks(&self) -> Vec<OutBlock<'_>> {
        let mut blocks = Vec::with_capacity(self.source.blocks().len());
        let mut table_entries = None;
        for block in self.source.blocks() {
            let out = match block.id {
                SectionId::Kernel => self.kernel_block(block.region),
                SectionId::Ramdisk => {
                    let (out, entries) = self.ramdisk_block(block.region);
                    table_entries = entries;
                    out
                }
                SectionId::VendorRamdiskTable => {
                    self.table_block(block.region, table_entries.as_deref())
                }
                id => OutBlock {
                    id,
                    parts: vec![self.section_bytes(id)],
                    source: block.region,
                },
            };
            blocks.push(out);
        }
        blocks
    }

    /// Checksum over the sections, in the order the bootloader hashes
    /// them.
    fn compute_id(&self, blocks: &[OutBlock<'_>]) -> Vec<u8> {
        let algorithm = if self.source.flags().contains(BootFlags::SHA256) {
            DigestAlgorithm::Sha256
        } else {
            DigestAlgorithm::Sha1
        };
        let find = |id: SectionId| blocks.iter().find(|b| b.id == id);

        let mut hashed = vec![SectionId::Kernel, SectionId::Ramdisk, SectionId::Second];
        if find(SectionId::Extra).is_some_and(|b| b.len() != 0) {
            hashed.push(SectionId::Extra);
        }
        if matches!(self.header.variant(), HeaderVariant::V1 | HeaderVariant::V2) {
            hashed.push(SectionId::RecoveryDtbo);
        }
        if self.header.variant() == HeaderVariant::V2 {
            hashed.push(SectionId::Dtb);
        }

        let sizes: Vec<[u8; 4]> = hashed
            .iter()
            .map(|&id| (find(id).map_or(0, |b| b.len()) as u32).to_le_bytes())
            .collect();
        let mut parts: Vec<&[u8]> = Vec::new();
        for (id, size) in hashed.iter().zip(&sizes) {
            if let Some(block) = find(*id) {
                parts.extend(block.parts.iter().map(|p| p.as_ref()));
            }
            parts.push(size);
        }
        self.crypto.digest(algorithm, &parts)
    }

    pub fn repack(&self) -> Result<Vec<u8>> {
        let src = self.source;
        let data = src.data();
        let prefix = src.prefix();
        let header_offset = prefix.header_offset;
        let page = self.header.header_space();
        if page == 0 {
            return Err(Error::PageSizeZero);
        }
        let aligned = |pos: usize| header_offset + align_to(pos - header_offset, page);

        let blocks = self.build_blocks();

        let mut header = self.header.clone();
        let mut pos = header_offset + header.header_region_size();
        let mut starts = Vec::with_capacity(blocks.len());
        for block in &blocks {
            set_block_size!(
                header, block,
                kernel => Kernel,
                ramdisk => Ramdisk,
                second => Second,
                extra => Extra,
                recovery_dtbo => RecoveryDtbo,
                dtb => Dtb,
                signature => Signature,
                vendor_ramdisk_table => VendorRamdiskTable,
                bootconfig => Bootconfig,
            );
            starts.push(pos);
            pos = aligned(pos + block.len());
        }

        if let Some((i, block)) = blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.id == SectionId::RecoveryDtbo)
        {
            let old = header.get_recovery_dtbo_offset();
            let delta = starts[i] as i64 - block.source.offset as i64;
            if old != 0 && delta != 0 {
                let new = old.checked_add_signed(delta).ok_or_else(|| Error::SectionTooLarge {
                    section: SectionId::RecoveryDtbo.name().to_owned(),
                    size: starts[i],
                })?;
                debug!("recovery_dtbo offset 0x{:x} -> 0x{:x}", old, new);
                header.set_recovery_dtbo_offset(new);
            }
        }

        if self.sections_changed() && self.options.recompute_id && header.has_id() {
            let id = self.compute_id(&blocks);
            debug!("new id {:02x?}", id);
            header.set_id(&id);
        }

        let mut out = ImageWriter::with_capacity(data.len());
        out.write(&data[..header_offset + header.header_region_size()]);

        for (block, &start) in blocks.iter().zip(&starts) {
            debug!("block {} at off {} sz {}", block.id, start, block.len());
            for part in &block.parts {
                out.write(part);
            }
            let end = aligned(out.pos());
            if start == block.source.offset && block.len() == block.source.size {
                // Keep whatever the source had in the padding.
                let pad_end = end.min(data.len());
                out.write(data.get(block.source.end()..pad_end).unwrap_or_default());
            } else {
                out.pad_to(end);
            }
        }

        // An Amonet header sits past the microloader and may run into the
        // first block. Only the part inside the header pages is written.
        let header_room =
            header_offset + header.header_region_size() - prefix.header_view_offset;
        let header_bytes = &header.as_bytes()[..header.as_bytes().len().min(header_room)];
        if !out.patch(prefix.header_view_offset, header_bytes) {
            return Err(Error::TruncatedImage {
                section: "header",
                offset: prefix.header_view_offset,
                size: header_bytes.len(),
                image_size: out.pos(),
            });
        }

        let tail = src.tail_section();
        let shift = out.pos() as i64 - tail.offset as i64;
        debug!("sections end {} -> {} ({:+})", tail.offset, out.pos(), shift);

        if !self.options.drop_tail {
            self.write_tail(&mut out, shift);
        } else {
            info!("dropping {} tail bytes", tail.size);
        }

        let header_changed = header.as_bytes() != src.header().as_bytes();
        if self.sections_changed() || header_changed {
            self.regenerate_wrappers(&mut out, shift)?;
        }

        Ok(out.into_inner())
    }

    fn write_tail(&self, out: &mut ImageWriter, shift: i64) {
        let src = self.source;
        let data = src.data();
        let tail = src.tail_section();
        let avb = src.avb();

        if shift == 0 {
            out.write(src.tail());
        } else {
            let mut keep = src.tail().iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            if let Some(avb) = avb {
                let vbmeta_end = (avb.vbmeta_offset() as u64).saturating_add(avb.vbmeta_size());
                let original = avb.footer().map_or(0, |f| f.get_original_image_size());
                for end in [vbmeta_end, original] {
                    let end = usize::try_from(end).unwrap_or(usize::MAX);
                    if end > tail.offset {
                        keep = keep.max((end - tail.offset).min(tail.size));
                    }
                }
            }
            debug!("tail {} bytes, {} kept", tail.size, keep);
            out.write(&src.tail()[..keep]);
        }

        let pad = self.options.pad_to_original && !src.flags().contains(BootFlags::CHROMEOS);
        match avb.and_then(|a| a.footer_offset().zip(a.footer())) {
            Some((footer_offset, footer)) => {
                if pad {
                    out.pad_to(footer_offset);
                }
                if shift == 0 {
                    out.write(&data[footer_offset..]);
                } else {
                    let moved = |value: u64| {
                        if value >= tail.offset as u64 {
                            value.saturating_add_signed(shift)
                        } else {
                            value
                        }
                    };
                    let original = moved(footer.get_original_image_size());
                    let vbmeta = moved(footer.get_vbmeta_offset());
                    info!("AVB footer: image size 0x{:x} vbmeta 0x{:x}", original, vbmeta);
                    out.write(&footer.patch(original, vbmeta));
                }
            }
            None => {
                if pad {
                    out.pad_to(data.len());
                }
            }
        }
        if out.pos() > data.len() && self.options.pad_to_original {
            warn!(
                "repacked image is {} bytes larger than the source",
                out.pos() - data.len()
            );
        }
    }

    fn regenerate_wrappers(&self, out: &mut ImageWriter, shift: i64) -> Result<()> {
        let data = self.source.data();
        let prefix = self.source.prefix();
        let resize = |old: u32, wrapper: &str| {
            u32::try_from(i64::from(old) + shift).map_err(|_| Error::SectionTooLarge {
                section: wrapper.to_owned(),
                size: (i64::from(old) + shift).max(0) as usize,
            })
        };

        if let Some(offset) = prefix.dhtb_offset {
            if let Some(hdr) = DhtbHeader::from_bytes(&data[offset..]) {
                let size = resize(hdr.get_size(), "dhtb")?;
                let start = offset + DHTB_HEADER_SIZE;
                let end = (start + size as usize).min(out.pos());
                let payload = out.get(start, end.saturating_sub(start)).unwrap_or_default();
                let checksum = self.crypto.sha256(payload);
                info!("DHTB_HDR size {}", size);
                out.patch(offset, &hdr.patch(size, &checksum));
            }
        }

        if let Some(offset) = prefix.blob_offset {
            if let Some(hdr) = BlobHeader::from_bytes(&data[offset..]) {
                let size = resize(hdr.get_size(), "blob")?;
                info!("TEGRA_BLOB size {}", size);
                out.patch(offset, &hdr.patch(size));
            }
        }
        Ok(())
    }
}

fn mtk_part<'b>(mtk: MtkHeader<'b>, changed: bool, size: usize) -> Cow<'b, [u8]> {
    if changed {
        Cow::Owned(mtk.patch(size.min(u32::MAX as usize) as u32))
    } else {
        Cow::Borrowed(mtk.as_bytes())
    }
}

/// Rebuild `image` with the given sections replaced.
pub fn repack<I>(image: &BootImage<'_>, overrides: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (SectionId, Vec<u8>)>,
{
    let mut patcher = BootImagePatcher::new(image);
    for (id, data) in overrides {
        patcher.replace_section(id, data)?;
    }
    patcher.repack()
}
