use crate::constants::{
    BOOT_ARGS_SIZE, BOOT_MAGIC, BOOT_V3_PAGE_SIZE, PXA_PAGE_SIZE_THRESHOLD, SHA1_DIGEST_SIZE,
    SHA256_DIGEST_SIZE, VENDOR_BOOT_MAGIC,
};
use crate::error::{Error, Result};
use crate::layouts::{
    BOOT_HEADER_PXA, BOOT_HEADER_V0, BOOT_HEADER_V1, BOOT_HEADER_V2, BOOT_HEADER_V3,
    BOOT_HEADER_V4, BootHeaderLayout, VENDOR_BOOT_HEADER_V3, VENDOR_BOOT_HEADER_V4,
};
use crate::utils::{SliceExt, SliceMutExt, align_to, trim_end};
use paste::paste;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Display for OsVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for OsVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidHeaderField {
            key: "os_version".to_owned(),
            value: s.to_owned(),
        };
        let mut parts = s.trim().split('.').map(|p| p.parse::<u32>());
        let mut next = || match parts.next() {
            Some(Ok(v)) if v < 128 => Ok(v),
            _ => Err(invalid()),
        };
        let version = Self {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PatchLevel {
    pub year: u32,
    pub month: u32,
}

impl Default for PatchLevel {
    fn default() -> Self {
        Self {
            year: 2000,
            month: 0,
        }
    }
}

impl Display for PatchLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for PatchLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidHeaderField {
            key: "os_patch_level".to_owned(),
            value: s.to_owned(),
        };
        let (y, m) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: u32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        if !(2000..2128).contains(&year) || month > 15 {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

/// Pack an OS version and patch level into the 32-bit header field:
/// 7 bits each of major, minor and patch, then 7 bits of `year - 2000` and
/// 4 bits of month.
pub fn encode_os_version(version: OsVersion, level: PatchLevel) -> u32 {
    let os_ver = ((version.major & 0x7f) << 14) | ((version.minor & 0x7f) << 7) | (version.patch & 0x7f);
    let patch_level = ((level.year.wrapping_sub(2000) & 0x7f) << 4) | (level.month & 0xf);
    (os_ver << 11) | patch_level
}

pub fn decode_os_version(raw: u32) -> (OsVersion, PatchLevel) {
    let os_ver = raw >> 11;
    let patch_level = raw & 0x7ff;

    let version = OsVersion {
        major: (os_ver >> 14) & 0x7f,
        minor: (os_ver >> 7) & 0x7f,
        patch: os_ver & 0x7f,
    };
    let level = PatchLevel {
        year: (patch_level >> 4) + 2000,
        month: patch_level & 0xf,
    };
    (version, level)
}

/// The concrete header layout of an image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeaderVariant {
    V0,
    V1,
    V2,
    Pxa,
    V3,
    V4,
    VendorV3,
    VendorV4,
}

impl HeaderVariant {
    pub fn layout(self) -> &'static BootHeaderLayout {
        match self {
            HeaderVariant::V0 => &BOOT_HEADER_V0,
            HeaderVariant::V1 => &BOOT_HEADER_V1,
            HeaderVariant::V2 => &BOOT_HEADER_V2,
            HeaderVariant::Pxa => &BOOT_HEADER_PXA,
            HeaderVariant::V3 => &BOOT_HEADER_V3,
            HeaderVariant::V4 => &BOOT_HEADER_V4,
            HeaderVariant::VendorV3 => &VENDOR_BOOT_HEADER_V3,
            HeaderVariant::VendorV4 => &VENDOR_BOOT_HEADER_V4,
        }
    }

    pub fn is_vendor(self) -> bool {
        matches!(self, HeaderVariant::VendorV3 | HeaderVariant::VendorV4)
    }

    pub fn header_version(self) -> u32 {
        match self {
            HeaderVariant::V0 | HeaderVariant::Pxa => 0,
            HeaderVariant::V1 => 1,
            HeaderVariant::V2 => 2,
            HeaderVariant::V3 | HeaderVariant::VendorV3 => 3,
            HeaderVariant::V4 | HeaderVariant::VendorV4 => 4,
        }
    }
}

/// Pick the header layout for the header starting at `data[0]`. The boolean
/// is true for vendor boot headers.
pub fn resolve(data: &[u8]) -> Result<(HeaderVariant, bool)> {
    let variant = if data.starts_with(BOOT_MAGIC) {
        let page_size = data
            .u32_at(BOOT_HEADER_V0.offset_page_size as usize)
            .ok_or(truncated_header(data, BOOT_HEADER_V0.total_size))?;
        if page_size >= PXA_PAGE_SIZE_THRESHOLD {
            HeaderVariant::Pxa
        } else {
            // The slot at offset 40 is shared by every boot layout.
            match data.u32_at(BOOT_HEADER_V1.offset_header_version as usize) {
                Some(1) => HeaderVariant::V1,
                Some(2) => HeaderVariant::V2,
                Some(3) => HeaderVariant::V3,
                Some(4) => HeaderVariant::V4,
                Some(_) => HeaderVariant::V0,
                None => return Err(truncated_header(data, BOOT_HEADER_V0.total_size)),
            }
        }
    } else if data.starts_with(VENDOR_BOOT_MAGIC) {
        match data.u32_at(VENDOR_BOOT_HEADER_V3.offset_header_version as usize) {
            Some(3) => HeaderVariant::VendorV3,
            Some(4) => HeaderVariant::VendorV4,
            Some(version) => {
                return Err(Error::UnsupportedHeaderVersion {
                    kind: "vendor boot",
                    version,
                });
            }
            None => return Err(truncated_header(data, VENDOR_BOOT_HEADER_V3.total_size)),
        }
    } else {
        return Err(Error::UnsupportedFormat {
            offset: 0,
            expected: "ANDROID! or VNDRBOOT",
            found: data.iter().take(8).copied().collect(),
        });
    };

    Ok((variant, variant.is_vendor()))
}

fn truncated_header(data: &[u8], size: u16) -> Error {
    Error::TruncatedImage {
        section: "header",
        offset: 0,
        size: size as usize,
        image_size: data.len(),
    }
}

/// Owned copy of a boot header with getters and setters that route through
/// the active layout. Fields the layout does not have read as zero and
/// ignore writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootHeader {
    data: Vec<u8>,
    variant: HeaderVariant,
}

macro_rules! impl_ifield_accessor {
    ($vis:vis, $t:ty, $name:ident $(,$suffix:ident)?) => {
        paste! {
            $vis fn [<has_ $name $($suffix)?>](&self) -> bool {
                self.layout().[<offset_ $name>] != 0
            }

            $vis fn [<get_ $name $($suffix)?>](&self) -> $t {
                let offset = self.layout().[<offset_ $name>] as usize;
                if offset == 0 {
                    return 0;
                }
                self.data
                    .array_at(offset)
                    .map(<$t>::from_le_bytes)
                    .unwrap_or_default()
            }

            $vis fn [<set_ $name $($suffix)?>](&mut self, value: $t) {
                let offset = self.layout().[<offset_ $name>] as usize;
                if offset != 0 {
                    self.data.put_at(offset, &value.to_le_bytes());
                }
            }
        }
    };
}

macro_rules! impl_sfield_accessor {
    ($vis:vis, $name:ident $(,$suffix:ident)?) => {
        paste! {
            $vis fn [<has_ $name $($suffix)?>](&self) -> bool {
                self.layout().[<offset_ $name>] != 0
            }

            $vis fn [<get_ $name $($suffix)?>](&self) -> &[u8] {
                let offset = self.layout().[<offset_ $name>] as usize;
                if offset == 0 {
                    return &[];
                }
                let sz = self.layout().[<size_ $name>] as usize;
                self.data.get(offset..offset + sz).unwrap_or_default()
            }

            fn [<put_ $name $($suffix)?>](&mut self, value: &[u8]) {
                let offset = self.layout().[<offset_ $name>] as usize;
                if offset == 0 {
                    return;
                }
                let sz = self.layout().[<size_ $name>] as usize;
                let mut field = vec![0u8; sz];
                let len = value.len().min(sz);
                field[..len].copy_from_slice(&value[..len]);
                self.data.put_at(offset, &field);
            }
        }
    };
}

impl BootHeader {
    impl_ifield_accessor! { pub, u32, kernel_size }
    impl_ifield_accessor! { pub, u32, ramdisk_size }
    impl_ifield_accessor! { pub, u32, second_size }
    impl_ifield_accessor! { pub, u32, extra_size }
    impl_ifield_accessor! { pub, u32, page_size, _raw }
    impl_ifield_accessor! { pub, u32, header_version, _raw }
    impl_ifield_accessor! { pub, u32, os_version, _raw }
    impl_ifield_accessor! { pub, u32, recovery_dtbo_size }
    impl_ifield_accessor! { pub, u64, recovery_dtbo_offset }
    impl_ifield_accessor! { pub, u32, header_size }
    impl_ifield_accessor! { pub, u32, dtb_size }
    impl_ifield_accessor! { pub, u64, dtb_addr }
    impl_ifield_accessor! { pub, u32, signature_size }
    impl_ifield_accessor! { pub, u32, vendor_ramdisk_table_size }
    impl_ifield_accessor! { pub, u32, vendor_ramdisk_table_entry_num }
    impl_ifield_accessor! { pub, u32, vendor_ramdisk_table_entry_size }
    impl_ifield_accessor! { pub, u32, bootconfig_size }
    impl_sfield_accessor! { pub, name }
    impl_sfield_accessor! { pub, cmdline, _raw }
    impl_sfield_accessor! { pub, id }
    impl_sfield_accessor! { pub, extra_cmdline, _raw }

    /// Copy the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (variant, _) = resolve(data)?;
        let size = variant.layout().total_size as usize;
        let data = data
            .get(..size)
            .ok_or_else(|| truncated_header(data, size as u16))?;

        Ok(Self {
            data: data.to_vec(),
            variant,
        })
    }

    pub fn variant(&self) -> HeaderVariant {
        self.variant
    }

    pub fn layout(&self) -> &'static BootHeaderLayout {
        self.variant.layout()
    }

    pub fn is_vendor(&self) -> bool {
        self.variant.is_vendor()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Version as selected by the layout. Legacy v0 and PXA images read 0
    /// here even though offset 40 holds their `extra_size`.
    pub fn header_version(&self) -> u32 {
        self.variant.header_version()
    }

    pub fn page_size(&self) -> u32 {
        match self.variant {
            HeaderVariant::V3 | HeaderVariant::V4 => BOOT_V3_PAGE_SIZE,
            _ => self.get_page_size_raw(),
        }
    }

    /// Alignment granularity for every section start.
    pub fn header_space(&self) -> usize {
        self.page_size() as usize
    }

    /// Bytes taken by the header itself, rounded up to whole pages.
    pub fn header_region_size(&self) -> usize {
        align_to(self.layout().total_size as usize, self.header_space())
    }

    pub fn os_version(&self) -> Option<(OsVersion, PatchLevel)> {
        match self.get_os_version_raw() {
            0 => None,
            raw => Some(decode_os_version(raw)),
        }
    }

    pub fn set_os_version(&mut self, version: OsVersion, level: PatchLevel) {
        self.set_os_version_raw(encode_os_version(version, level));
    }

    /// Replace only the version part, keeping the patch level.
    pub fn set_os_version_only(&mut self, version: OsVersion) {
        let (_, level) = decode_os_version(self.get_os_version_raw());
        self.set_os_version(version, level);
    }

    /// Replace only the patch level, keeping the version.
    pub fn set_patch_level(&mut self, level: PatchLevel) {
        let (version, _) = decode_os_version(self.get_os_version_raw());
        self.set_os_version(version, level);
    }

    /// The name field without its NUL padding.
    pub fn name(&self) -> &[u8] {
        trim_end(self.get_name())
    }

    /// Names always keep a terminating NUL, so at most `size - 1` bytes are
    /// stored.
    pub fn set_name(&mut self, name: &[u8]) {
        let max = (self.layout().size_name as usize).saturating_sub(1);
        self.put_name(&name[..name.len().min(max)]);
    }

    /// `cmdline` followed by `extra_cmdline`, each up to its first NUL.
    pub fn cmdline(&self) -> Vec<u8> {
        let mut cmdline = trim_end(self.get_cmdline_raw()).to_vec();
        cmdline.extend_from_slice(trim_end(self.get_extra_cmdline_raw()));
        cmdline
    }

    /// Store a command line, spilling into `extra_cmdline` past 512 bytes on
    /// layouts that have it. Anything that does not fit is dropped.
    pub fn set_cmdline(&mut self, cmdline: &[u8]) {
        if self.has_extra_cmdline_raw() && cmdline.len() > BOOT_ARGS_SIZE {
            let (head, tail) = cmdline.split_at(BOOT_ARGS_SIZE);
            self.put_cmdline_raw(head);
            self.put_extra_cmdline_raw(tail);
        } else {
            self.put_cmdline_raw(cmdline);
            self.put_extra_cmdline_raw(&[]);
        }
    }

    pub fn set_id(&mut self, id: &[u8]) {
        self.put_id(id);
    }

    /// A SHA-256 id fills the bytes a SHA-1 digest leaves zero.
    pub fn id_is_sha256(&self) -> bool {
        self.get_id()
            .get(SHA1_DIGEST_SIZE + 4..SHA256_DIGEST_SIZE)
            .is_some_and(|tail| tail.iter().any(|&b| b != 0))
    }
}

const PADDING: usize = 15;

impl Display for BootHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ver = self.header_version();
        writeln!(f, "{:<PADDING$} [{}]", "HEADER_VER", ver)?;
        if !self.is_vendor() {
            writeln!(f, "{:<PADDING$} [{}]", "KERNEL_SZ", self.get_kernel_size())?;
        }
        writeln!(f, "{:<PADDING$} [{}]", "RAMDISK_SZ", self.get_ramdisk_size())?;
        if self.has_second_size() {
            writeln!(f, "{:<PADDING$} [{}]", "SECOND_SZ", self.get_second_size())?;
        }
        if self.has_extra_size() {
            writeln!(f, "{:<PADDING$} [{}]", "EXTRA_SZ", self.get_extra_size())?;
        }
        if self.has_recovery_dtbo_size() {
            writeln!(f, "{:<PADDING$} [{}]", "RECOV_DTBO_SZ", self.get_recovery_dtbo_size())?;
        }
        if self.has_dtb_size() {
            writeln!(f, "{:<PADDING$} [{}]", "DTB_SZ", self.get_dtb_size())?;
        }
        if let Some((version, level)) = self.os_version() {
            writeln!(f, "{:<PADDING$} [{}]", "OS_VERSION", version)?;
            writeln!(f, "{:<PADDING$} [{}]", "OS_PATCH_LEVEL", level)?;
        }
        writeln!(f, "{:<PADDING$} [{}]", "PAGESIZE", self.page_size())?;
        if self.has_name() {
            writeln!(
                f,
                "{:<PADDING$} [{}]",
                "NAME",
                String::from_utf8_lossy(self.name())
            )?;
        }
        writeln!(
            f,
            "{:<PADDING$} [{}]",
            "CMDLINE",
            String::from_utf8_lossy(&self.cmdline())
        )?;
        if self.has_id() {
            let len = if self.id_is_sha256() {
                SHA256_DIGEST_SIZE
            } else {
                SHA1_DIGEST_SIZE
            };
            write!(f, "{:<PADDING$} [", "CHECKSUM")?;
            for b in &self.get_id()[..len] {
                write!(f, "{b:02x}")?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn boot_header(version: u32, page_size: u32) -> Vec<u8> {
        let mut data = vec![0u8; 4096];
        data[..8].copy_from_slice(BOOT_MAGIC);
        data.put_at(36, &page_size.to_le_bytes());
        data.put_at(40, &version.to_le_bytes());
        data
    }

    #[test]
    fn os_version_codec_inverts() {
        for major in (0..128).step_by(9) {
            for minor in (0..128).step_by(13) {
                for patch in [0, 1, 64, 127] {
                    for year in [2000, 2019, 2063, 2127] {
                        for month in 0..16 {
                            let v = OsVersion { major, minor, patch };
                            let l = PatchLevel { year, month };
                            assert_eq!(decode_os_version(encode_os_version(v, l)), (v, l));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn os_version_known_value() {
        let v = OsVersion {
            major: 11,
            minor: 0,
            patch: 0,
        };
        let l = PatchLevel {
            year: 2021,
            month: 3,
        };
        assert_eq!(encode_os_version(v, l), (11 << 25) | (21 << 4) | 3);
        assert_eq!("11.0.0".parse::<OsVersion>().unwrap(), v);
        assert_eq!("2021-03".parse::<PatchLevel>().unwrap(), l);
        assert!("11.0".parse::<OsVersion>().is_err());
        assert!("1999-01".parse::<PatchLevel>().is_err());
    }

    #[test]
    fn resolve_boot_versions() {
        for (version, variant) in [
            (0, HeaderVariant::V0),
            (1, HeaderVariant::V1),
            (2, HeaderVariant::V2),
            (3, HeaderVariant::V3),
            (4, HeaderVariant::V4),
            (0x1000, HeaderVariant::V0),
        ] {
            let data = boot_header(version, 2048);
            assert_eq!(resolve(&data).unwrap(), (variant, false));
        }
        let data = boot_header(0, 0x10000000);
        assert_eq!(resolve(&data).unwrap().0, HeaderVariant::Pxa);
    }

    #[test]
    fn resolve_vendor_versions() {
        let mut data = vec![0u8; 4096];
        data[..8].copy_from_slice(VENDOR_BOOT_MAGIC);
        data.put_at(8, &4u32.to_le_bytes());
        assert_eq!(resolve(&data).unwrap(), (HeaderVariant::VendorV4, true));
        data.put_at(8, &2u32.to_le_bytes());
        assert_matches!(
            resolve(&data),
            Err(Error::UnsupportedHeaderVersion { version: 2, .. })
        );
    }

    #[test]
    fn resolve_rejects_unknown_magic() {
        assert_matches!(
            resolve(b"NOTABOOTIMAGE"),
            Err(Error::UnsupportedFormat { offset: 0, .. })
        );
    }

    #[test]
    fn v0_reads_extra_size_from_version_slot() {
        let data = boot_header(0x1234, 2048);
        let hdr = BootHeader::parse(&data).unwrap();
        assert_eq!(hdr.variant(), HeaderVariant::V0);
        assert_eq!(hdr.get_extra_size(), 0x1234);
        assert_eq!(hdr.header_version(), 0);
        assert!(!hdr.has_header_version_raw());
    }

    #[test]
    fn v3_page_size_is_fixed() {
        let data = boot_header(3, 0);
        let hdr = BootHeader::parse(&data).unwrap();
        assert_eq!(hdr.page_size(), 4096);
        assert_eq!(hdr.header_region_size(), 4096);
        assert_eq!(hdr.get_second_size(), 0);
        assert!(!hdr.has_second_size());
    }

    #[test]
    fn cmdline_spills_into_extra() {
        let data = boot_header(2, 2048);
        let mut hdr = BootHeader::parse(&data).unwrap();
        let long: Vec<u8> = (0..700).map(|i| b'a' + (i % 26) as u8).collect();
        hdr.set_cmdline(&long);
        assert_eq!(hdr.get_cmdline_raw(), &long[..512]);
        assert_eq!(trim_end(hdr.get_extra_cmdline_raw()), &long[512..]);
        assert_eq!(hdr.cmdline(), long);

        hdr.set_cmdline(b"console=ttyMSM0");
        assert_eq!(hdr.cmdline(), b"console=ttyMSM0");
        assert!(hdr.get_extra_cmdline_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn name_keeps_terminator() {
        let data = boot_header(1, 2048);
        let mut hdr = BootHeader::parse(&data).unwrap();
        hdr.set_name(b"0123456789abcdefXYZ");
        assert_eq!(hdr.name(), b"0123456789abcde");
        assert_eq!(hdr.get_name()[15], 0);
    }

    #[test]
    fn summary_lists_variant_fields() {
        let mut data = boot_header(2, 4096);
        data.put_at(8, &100u32.to_le_bytes());
        let hdr = BootHeader::parse(&data).unwrap();
        let summary = hdr.to_string();
        assert!(summary.contains("HEADER_VER      [2]"));
        assert!(summary.contains("KERNEL_SZ       [100]"));
        assert!(summary.contains("DTB_SZ"));
        assert!(!summary.contains("EXTRA_SZ"));
        assert!(!summary.contains("OS_VERSION"));
    }
}
