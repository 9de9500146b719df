#![allow(dead_code)]

//! Builders for synthetic images. Nothing here goes through the library so
//! the tests check the parser against an independent layout.

pub const V0_HEADER_SIZE: usize = 1632;
pub const V1_HEADER_SIZE: usize = 1648;
pub const V2_HEADER_SIZE: usize = 1660;
pub const PXA_HEADER_SIZE: usize = 1620;
pub const V3_HEADER_SIZE: usize = 1580;
pub const V4_HEADER_SIZE: usize = 1584;
pub const VENDOR_V3_HEADER_SIZE: usize = 2112;
pub const VENDOR_V4_HEADER_SIZE: usize = 2128;
pub const VENDOR_ENTRY_SIZE: usize = 108;

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32_be(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

pub fn put_u64_be(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}

pub fn align(n: usize, page: usize) -> usize {
    n.div_ceil(page) * page
}

/// Bytes that no detector recognizes.
pub fn filler(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) | 0x80)
        .collect()
}

/// Header padded to a page, then every section padded to a page.
pub fn pack(header: Vec<u8>, page: usize, sections: &[&[u8]]) -> Vec<u8> {
    let mut out = header;
    out.resize(align(out.len(), page), 0);
    for section in sections {
        out.extend_from_slice(section);
        out.resize(align(out.len(), page), 0);
    }
    out
}

pub struct Legacy<'a> {
    pub page: u32,
    pub kernel: &'a [u8],
    pub ramdisk: &'a [u8],
    pub second: &'a [u8],
    pub extra: &'a [u8],
    pub recovery_dtbo: &'a [u8],
    pub dtb: &'a [u8],
}

impl Default for Legacy<'_> {
    fn default() -> Self {
        Self {
            page: 2048,
            kernel: &[],
            ramdisk: &[],
            second: &[],
            extra: &[],
            recovery_dtbo: &[],
            dtb: &[],
        }
    }
}

fn legacy_common(header: &mut [u8], s: &Legacy<'_>) {
    header[..8].copy_from_slice(b"ANDROID!");
    put_u32(header, 8, s.kernel.len() as u32);
    put_u32(header, 12, 0x1000_8000);
    put_u32(header, 16, s.ramdisk.len() as u32);
    put_u32(header, 20, 0x1100_0000);
    put_u32(header, 24, s.second.len() as u32);
    put_u32(header, 36, s.page);
    header[48..54].copy_from_slice(b"board\0");
    header[64..76].copy_from_slice(b"console=null");
}

pub fn boot_v0(s: &Legacy<'_>) -> Vec<u8> {
    let mut header = vec![0u8; V0_HEADER_SIZE];
    legacy_common(&mut header, s);
    put_u32(&mut header, 40, s.extra.len() as u32);
    pack(header, s.page as usize, &[s.kernel, s.ramdisk, s.second, s.extra])
}

pub fn boot_v1(s: &Legacy<'_>) -> Vec<u8> {
    let mut header = vec![0u8; V1_HEADER_SIZE];
    legacy_common(&mut header, s);
    put_u32(&mut header, 40, 1);
    let page = s.page as usize;
    let dtbo_offset = page
        + align(s.kernel.len(), page)
        + align(s.ramdisk.len(), page)
        + align(s.second.len(), page);
    put_u32(&mut header, 1632, s.recovery_dtbo.len() as u32);
    if !s.recovery_dtbo.is_empty() {
        put_u64(&mut header, 1636, dtbo_offset as u64);
    }
    put_u32(&mut header, 1644, V1_HEADER_SIZE as u32);
    pack(header, page, &[s.kernel, s.ramdisk, s.second, s.recovery_dtbo])
}

pub fn boot_v2(s: &Legacy<'_>) -> Vec<u8> {
    let mut header = vec![0u8; V2_HEADER_SIZE];
    legacy_common(&mut header, s);
    put_u32(&mut header, 40, 2);
    let page = s.page as usize;
    let dtbo_offset = page
        + align(s.kernel.len(), page)
        + align(s.ramdisk.len(), page)
        + align(s.second.len(), page);
    put_u32(&mut header, 1632, s.recovery_dtbo.len() as u32);
    if !s.recovery_dtbo.is_empty() {
        put_u64(&mut header, 1636, dtbo_offset as u64);
    }
    put_u32(&mut header, 1644, V2_HEADER_SIZE as u32);
    put_u32(&mut header, 1648, s.dtb.len() as u32);
    put_u64(&mut header, 1652, 0x0140_0000);
    pack(
        header,
        page,
        &[s.kernel, s.ramdisk, s.second, s.recovery_dtbo, s.dtb],
    )
}

pub fn boot_pxa(s: &Legacy<'_>) -> Vec<u8> {
    let mut header = vec![0u8; PXA_HEADER_SIZE];
    header[..8].copy_from_slice(b"ANDROID!");
    put_u32(&mut header, 8, s.kernel.len() as u32);
    put_u32(&mut header, 16, s.ramdisk.len() as u32);
    put_u32(&mut header, 24, s.second.len() as u32);
    put_u32(&mut header, 32, s.extra.len() as u32);
    // `unknown` holds an address, which is what tells PXA apart from v0.
    put_u32(&mut header, 36, 0x1000_0000);
    put_u32(&mut header, 40, 0x1000_0100);
    put_u32(&mut header, 44, s.page);
    header[48..51].copy_from_slice(b"pxa");
    header[52..58].copy_from_slice(b"quiet\0");
    pack(
        header,
        s.page as usize,
        &[s.kernel, s.ramdisk, s.second, s.extra],
    )
}

pub fn boot_v3(kernel: &[u8], ramdisk: &[u8]) -> Vec<u8> {
    let mut header = vec![0u8; V3_HEADER_SIZE];
    header[..8].copy_from_slice(b"ANDROID!");
    put_u32(&mut header, 8, kernel.len() as u32);
    put_u32(&mut header, 12, ramdisk.len() as u32);
    put_u32(&mut header, 16, (11 << 25) | (23 << 4) | 3);
    put_u32(&mut header, 20, V3_HEADER_SIZE as u32);
    put_u32(&mut header, 40, 3);
    header[44..52].copy_from_slice(b"init=/v3");
    pack(header, 4096, &[kernel, ramdisk])
}

pub fn boot_v4(kernel: &[u8], ramdisk: &[u8], signature: &[u8]) -> Vec<u8> {
    let mut header = vec![0u8; V4_HEADER_SIZE];
    header[..8].copy_from_slice(b"ANDROID!");
    put_u32(&mut header, 8, kernel.len() as u32);
    put_u32(&mut header, 12, ramdisk.len() as u32);
    put_u32(&mut header, 20, V4_HEADER_SIZE as u32);
    put_u32(&mut header, 40, 4);
    put_u32(&mut header, 1580, signature.len() as u32);
    pack(header, 4096, &[kernel, ramdisk, signature])
}

fn vendor_common(header: &mut [u8], version: u32, page: u32, ramdisk: usize, dtb: usize) {
    header[..8].copy_from_slice(b"VNDRBOOT");
    put_u32(header, 8, version);
    put_u32(header, 12, page);
    put_u32(header, 24, ramdisk as u32);
    header[28..45].copy_from_slice(b"androidboot.q=yes");
    header[2080..2086].copy_from_slice(b"vendor");
    let header_size = header.len() as u32;
    put_u32(header, 2096, header_size);
    put_u32(header, 2100, dtb as u32);
}

pub fn vendor_v3(ramdisk: &[u8], dtb: &[u8]) -> Vec<u8> {
    let mut header = vec![0u8; VENDOR_V3_HEADER_SIZE];
    vendor_common(&mut header, 3, 4096, ramdisk.len(), dtb.len());
    pack(header, 4096, &[ramdisk, dtb])
}

pub struct Fragment<'a> {
    pub name: &'a str,
    pub kind: u32,
    pub data: &'a [u8],
}

pub fn vendor_table(fragments: &[Fragment<'_>]) -> Vec<u8> {
    let mut table = Vec::new();
    let mut offset = 0;
    for fragment in fragments {
        let mut entry = vec![0u8; VENDOR_ENTRY_SIZE];
        put_u32(&mut entry, 0, fragment.data.len() as u32);
        put_u32(&mut entry, 4, offset as u32);
        put_u32(&mut entry, 8, fragment.kind);
        entry[12..12 + fragment.name.len()].copy_from_slice(fragment.name.as_bytes());
        offset += fragment.data.len();
        table.extend_from_slice(&entry);
    }
    table
}

pub fn vendor_v4(fragments: &[Fragment<'_>], dtb: &[u8], bootconfig: &[u8]) -> Vec<u8> {
    let ramdisk: Vec<u8> = fragments.iter().flat_map(|f| f.data.iter().copied()).collect();
    let table = vendor_table(fragments);
    let mut header = vec![0u8; VENDOR_V4_HEADER_SIZE];
    vendor_common(&mut header, 4, 4096, ramdisk.len(), dtb.len());
    put_u32(&mut header, 2112, table.len() as u32);
    put_u32(&mut header, 2116, fragments.len() as u32);
    put_u32(&mut header, 2120, VENDOR_ENTRY_SIZE as u32);
    put_u32(&mut header, 2124, bootconfig.len() as u32);
    pack(header, 4096, &[&ramdisk, dtb, &table, bootconfig])
}

/// A minimal flattened device tree: header, then a structure block that
/// opens with a node.
pub fn fdt(total: usize) -> Vec<u8> {
    let mut fdt = vec![0u8; total];
    put_u32_be(&mut fdt, 0, 0xd00d_feed);
    put_u32_be(&mut fdt, 4, total as u32);
    put_u32_be(&mut fdt, 8, 40);
    put_u32_be(&mut fdt, 40, 1);
    fdt
}

pub fn mtk_header(size: usize, name: &str) -> Vec<u8> {
    let mut hdr = vec![0u8; 512];
    hdr[..4].copy_from_slice(b"\x88\x16\x88\x58");
    put_u32(&mut hdr, 4, size as u32);
    hdr[8..8 + name.len()].copy_from_slice(name.as_bytes());
    hdr
}

pub struct Vbmeta {
    pub algorithm: u32,
    pub auth: Vec<u8>,
    pub aux: Vec<u8>,
    pub hash: (u64, u64),
    pub signature: (u64, u64),
    pub public_key: (u64, u64),
    pub rollback_index: u64,
}

impl Vbmeta {
    pub fn unsigned() -> Self {
        Self {
            algorithm: 0,
            auth: Vec::new(),
            aux: vec![0u8; 64],
            hash: (0, 0),
            signature: (0, 0),
            public_key: (0, 0),
            rollback_index: 0,
        }
    }

    pub fn header(&self) -> Vec<u8> {
        let mut hdr = vec![0u8; 256];
        hdr[..4].copy_from_slice(b"AVB0");
        put_u32_be(&mut hdr, 4, 1);
        put_u64_be(&mut hdr, 12, self.auth.len() as u64);
        put_u64_be(&mut hdr, 20, self.aux.len() as u64);
        put_u32_be(&mut hdr, 28, self.algorithm);
        put_u64_be(&mut hdr, 32, self.hash.0);
        put_u64_be(&mut hdr, 40, self.hash.1);
        put_u64_be(&mut hdr, 48, self.signature.0);
        put_u64_be(&mut hdr, 56, self.signature.1);
        put_u64_be(&mut hdr, 64, self.public_key.0);
        put_u64_be(&mut hdr, 72, self.public_key.1);
        put_u64_be(&mut hdr, 112, self.rollback_index);
        hdr[128..139].copy_from_slice(b"bootpack 1\0");
        hdr
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header();
        out.extend_from_slice(&self.auth);
        out.extend_from_slice(&self.aux);
        out
    }
}

/// Append a vbmeta block right after the image and a footer at the end of a
/// partition of `partition_size` bytes. Returns the vbmeta offset.
pub fn add_footer(image: &mut Vec<u8>, vbmeta: &[u8], partition_size: usize) -> usize {
    let vbmeta_offset = image.len();
    image.extend_from_slice(vbmeta);
    let original_image_size = image.len();
    image.resize(partition_size - 64, 0);
    let mut footer = vec![0u8; 64];
    footer[..4].copy_from_slice(b"AVBf");
    put_u32_be(&mut footer, 4, 1);
    put_u64_be(&mut footer, 12, original_image_size as u64);
    put_u64_be(&mut footer, 20, vbmeta_offset as u64);
    put_u64_be(&mut footer, 28, vbmeta.len() as u64);
    image.extend_from_slice(&footer);
    vbmeta_offset
}
