use paste::paste;

use crate::constants::{
    AVB_FOOTER_MAGIC_LEN, AVB_MAGIC_LEN, AVB_RELEASE_STRING_SIZE, BOOT_ARGS_SIZE,
    BOOT_EXTRA_ARGS_SIZE, BOOT_ID_SIZE, BOOT_NAME_SIZE, BOOT_PXA_NAME_SIZE, VENDOR_BOOT_ARGS_SIZE,
    VENDOR_RAMDISK_NAME_SIZE, VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE,
};
use crate::utils::SliceExt;

macro_rules! def_boot_header_layout {
    ({$($name:ident $t:ident),+ $(,)?}, {$($name2:ident),+ $(,)?}) => {
        paste! {
            /// Field offsets of one concrete header layout. An offset of zero
            /// means the layout has no such field.
            #[derive(Debug, PartialEq, Eq)]
            pub struct BootHeaderLayout {
                pub name: &'static str,
                $(
                    pub [<offset_ $name>]: u16,
                )+
                $(
                    pub [<offset_ $name2>]: u16,
                    pub [<size_ $name2>]: u16,
                )+
                pub total_size: u16
            }

            const DEFAULT_LAYOUT: BootHeaderLayout = BootHeaderLayout {
                name: "default",
                $(
                    [<offset_ $name>]: 0,
                )+
                $(
                    [<offset_ $name2>]: 0,
                    [<size_ $name2>]: 0,
                )+
                total_size: 0
            };
        }
    };
}

def_boot_header_layout! {
    {
        kernel_size u32,
        ramdisk_size u32,
        second_size u32,
        extra_size u32,
        page_size u32,
        header_version u32,
        os_version u32,

        // v1/v2 specific
        recovery_dtbo_size u32,
        recovery_dtbo_offset u64,
        header_size u32,
        dtb_size u32,
        dtb_addr u64,

        // v4 specific
        signature_size u32,

        // v4 vendor specific
        vendor_ramdisk_table_size u32,
        vendor_ramdisk_table_entry_num u32,
        vendor_ramdisk_table_entry_size u32,
        bootconfig_size u32,
    },
    {
        name,
        cmdline,
        id,
        extra_cmdline,
    }
}

macro_rules! struct_item_size {
    (u32) => {
        4
    };
    (u64) => {
        8
    };
    ($sz:expr) => {
        $sz
    };
}

macro_rules! struct_item_maybe_def_size {
    ($name:ident u32) => {};
    ($name:ident u64) => {};
    ($name:ident $sz:expr) => {
        paste! {
            pub(super) const [<size_ $name>]: usize = $sz;
        }
    };
}

macro_rules! define_layout_offsets {
    ($name:ident $t:tt $(,)?) => {
        paste! {
            struct_item_maybe_def_size! { $name $t }
            pub(super) const total_size: usize = [<offset_ $name>] + struct_item_size! { $t };
        }
    };
    ($name1:ident $t1:tt, $name2:ident $t2:tt $(,)?) => {
        paste! {
            struct_item_maybe_def_size! { $name1 $t1 }
            pub(super) const [<offset_ $name2>]: usize = [<offset_ $name1>] + struct_item_size! { $t1 };
            struct_item_maybe_def_size! { $name2 $t2 }
            pub(super) const total_size: usize = [<offset_ $name2>] + struct_item_size! { $t2 };
        }
    };
    ($name1:ident $t1:tt, $name2:ident $t2:tt $(,$name:ident $t:tt)+ $(,)?) => {
        paste! {
            struct_item_maybe_def_size! { $name1 $t1 }
            pub(super) const [<offset_ $name2>]: usize = [<offset_ $name1>] + struct_item_size! { $t1 };
            define_layout_offsets! { $name2 $t2, $($name $t),+ }
        }
    };
}

macro_rules! define_layout_common {
    (
        $struct_name:ident,
        initial_offset $initial_offset:tt,
        structure {$name1:ident $t1:tt $(,$name:ident $t:tt)* $(,)?} $(,)?
    ) => {
        paste! {
            #[allow(dead_code, non_upper_case_globals, nonstandard_style)]
            mod [<mod_offsets_ $struct_name>] {
                use super::*;
                pub(super) const [<offset_ $name1>]: usize = $initial_offset;
                define_layout_offsets!{$name1 $t1, $($name $t),*}

            }
        }
    };
}

macro_rules! define_boot_header_layout_common {
    (
        $struct_name:ident,
        initial_offset $initial_offset:tt,
        default_layout $default_layout:ident,
        structure {$($name:ident $t:tt),+ $(,)?},
        ifields {$($ifield:ident),* $(,)?},
        sfields {$($sfield:ident),* $(,)?},
        aliases {$($alias:ident: $alias_offset:expr),* $(,)?} $(,)?
    ) => {
        define_layout_common! {
            $struct_name,
            initial_offset $initial_offset,
            structure { $($name $t),+ }
        }
        paste! {
            pub const $struct_name: BootHeaderLayout = BootHeaderLayout {
                name: stringify!($struct_name),
                $(
                    [<offset_ $ifield>]: [<mod_offsets_ $struct_name>]::[<offset_ $ifield>] as u16,
                )*
                $(
                    [<offset_ $sfield>]: [<mod_offsets_ $struct_name>]::[<offset_ $sfield>] as u16,
                    [<size_ $sfield>]: [<mod_offsets_ $struct_name>]::[<size_ $sfield>] as u16,
                )*
                $(
                    [<offset_ $alias>]: ($alias_offset) as u16,
                )*
                total_size: [<mod_offsets_ $struct_name>]::total_size as u16,
                ..$default_layout
            };
        }
    };
}

macro_rules! define_boot_header_layout {
    (
        $struct_name:ident,
        structure {$($name:ident $t:tt),+ $(,)?},
        ifields {$($ifield:ident),* $(,)?},
        sfields {$($sfield:ident),* $(,)?}
        $(, aliases {$($alias:ident: $alias_offset:expr),* $(,)?})? $(,)?
    ) => {
        define_boot_header_layout_common! {
            $struct_name,
            initial_offset 8,
            default_layout DEFAULT_LAYOUT,
            structure { $($name $t),+ },
            ifields { $($ifield),* },
            sfields { $($sfield),* },
            aliases { $($($alias: $alias_offset),*)? },
        }
    };
}

macro_rules! define_boot_header_layout_inherits {
    (
        $struct_name:ident,
        $inherited_name:ident,
        structure {$($name:ident $t:tt),+ $(,)?},
        ifields {$($ifield:ident),* $(,)?},
        sfields {$($sfield:ident),* $(,)?}
        $(, aliases {$($alias:ident: $alias_offset:expr),* $(,)?})? $(,)?
    ) => {
        define_boot_header_layout_common! {
            $struct_name,
            initial_offset ($inherited_name.total_size as usize),
            default_layout $inherited_name,
            structure { $($name $t),+ },
            ifields { $($ifield),* },
            sfields { $($sfield),* },
            aliases { $($($alias: $alias_offset),*)? },
        }
    }
}

// The u32 at offset 40 is `header_version` from v1 on, but `extra_size` on
// legacy v0 images.
define_boot_header_layout! {
    BOOT_HEADER_V0,
    structure {
        kernel_size u32,
        kernel_addr u32,
        ramdisk_size u32,
        ramdisk_addr u32,
        second_size u32,
        second_addr u32,
        tags_addr u32,
        page_size u32,
        header_version u32,
        os_version u32,
        name BOOT_NAME_SIZE,
        cmdline BOOT_ARGS_SIZE,
        id BOOT_ID_SIZE,
        extra_cmdline BOOT_EXTRA_ARGS_SIZE,
    },
    ifields {
        kernel_size,
        ramdisk_size,
        second_size,
        page_size,
        os_version
    },
    sfields {
        name,
        cmdline,
        id,
        extra_cmdline,
    },
    aliases {
        extra_size: mod_offsets_BOOT_HEADER_V0::offset_header_version,
    }
}

define_boot_header_layout_inherits! {
    BOOT_HEADER_V1, BOOT_HEADER_V0,
    structure {
        recovery_dtbo_size u32,
        recovery_dtbo_offset u64,
        header_size u32,
    },
    ifields {
        recovery_dtbo_size,
        recovery_dtbo_offset,
        header_size,
    },
    sfields {},
    aliases {
        header_version: mod_offsets_BOOT_HEADER_V0::offset_header_version,
        extra_size: 0,
    }
}

define_boot_header_layout_inherits! {
    BOOT_HEADER_V2, BOOT_HEADER_V1,
    structure {
        dtb_size u32,
        dtb_addr u64,
    },
    ifields {
        dtb_size,
        dtb_addr,
    },
    sfields {}
}

define_boot_header_layout! {
    BOOT_HEADER_PXA,
    structure {
        kernel_size u32,
        kernel_addr u32,
        ramdisk_size u32,
        ramdisk_addr u32,
        second_size u32,
        second_addr u32,
        extra_size u32,
        unknown u32,
        tags_addr u32,
        page_size u32,
        name BOOT_PXA_NAME_SIZE,
        cmdline BOOT_ARGS_SIZE,
        id BOOT_ID_SIZE,
        extra_cmdline BOOT_EXTRA_ARGS_SIZE,
    },
    ifields {
        kernel_size,
        ramdisk_size,
        second_size,
        extra_size,
        page_size,
    },
    sfields {
        name,
        cmdline,
        id,
        extra_cmdline,
    },
}

define_boot_header_layout! {
    BOOT_HEADER_V3,
    structure {
        kernel_size u32,
        ramdisk_size u32,
        os_version u32,
        header_size u32,
        reserved 16,
        header_version u32,
        cmdline (BOOT_ARGS_SIZE + BOOT_EXTRA_ARGS_SIZE),
    },
    ifields {
        kernel_size,
        ramdisk_size,
        header_version,
        os_version,
        header_size,
    },
    sfields {
        cmdline,
    },
}

define_boot_header_layout_inherits! {
    BOOT_HEADER_V4, BOOT_HEADER_V3,
    structure {
        signature_size u32,
    },
    ifields {
        signature_size,
    },
    sfields {}
}

define_boot_header_layout! {
    VENDOR_BOOT_HEADER_V3,
    structure {
        header_version u32,
        page_size u32,
        kernel_addr u32,
        ramdisk_addr u32,
        ramdisk_size u32,
        cmdline VENDOR_BOOT_ARGS_SIZE,
        tags_addr u32,
        name BOOT_NAME_SIZE,
        header_size u32,
        dtb_size u32,
        dtb_addr u64,
    },
    ifields {
        page_size,
        ramdisk_size,
        header_version,
        header_size,
        dtb_size,
        dtb_addr,
    },
    sfields {
        cmdline,
        name,
    },
}

define_boot_header_layout_inherits! {
    VENDOR_BOOT_HEADER_V4, VENDOR_BOOT_HEADER_V3,
    structure {
        vendor_ramdisk_table_size u32,
        vendor_ramdisk_table_entry_num u32,
        vendor_ramdisk_table_entry_size u32,
        bootconfig_size u32,
    },
    ifields {
        vendor_ramdisk_table_size,
        vendor_ramdisk_table_entry_num,
        vendor_ramdisk_table_entry_size,
        bootconfig_size,
    },
    sfields {}
}

macro_rules! impl_ifield_accessor {
    ($vis:vis, $mod_name:ident, $t:ty, $name:ident $(,$suffix:ident)?) => {
        paste! {
            $vis fn [<get_ $name $($suffix)?>](&self) -> $t {
                let offset = [<mod_offsets_ $mod_name>]::[<offset_ $name>] as usize;
                self.data
                    .array_at(offset)
                    .map(<$t>::from_le_bytes)
                    .unwrap_or_default()
            }
        }
    };
}

macro_rules! impl_ifield_accessor_be {
    ($vis:vis, $mod_name:ident, $t:ty, $name:ident $(,$suffix:ident)?) => {
        paste! {
            $vis fn [<get_ $name $($suffix)?>](&self) -> $t {
                let offset = [<mod_offsets_ $mod_name>]::[<offset_ $name>] as usize;
                self.data
                    .array_at(offset)
                    .map(<$t>::from_be_bytes)
                    .unwrap_or_default()
            }
        }
    };
}

macro_rules! impl_sfield_accessor {
    ($vis:vis, $lt:lifetime, $mod_name:ident, $name:ident $(,$suffix:ident)?) => {
        paste! {
            $vis fn [<get_ $name $($suffix)?>](&self) -> &$lt [u8] {
                let offset = [<mod_offsets_ $mod_name>]::[<offset_ $name>] as usize;
                let sz = [<mod_offsets_ $mod_name>]::[<size_ $name>] as usize;
                let data: &$lt [u8] = self.data;
                &data[offset..offset + sz]
            }
        }
    };
}

macro_rules! impl_patch_field {
    ($mod_name:ident, $buf:ident, $name:ident, $value:expr) => {
        paste! {
            let offset = [<mod_offsets_ $mod_name>]::[<offset_ $name>];
            let value = $value;
            $buf[offset..offset + size_of_val(&value)].copy_from_slice(&value);
        }
    };
}

macro_rules! impl_view_ctor {
    ($view:ident, $mod_name:ident) => {
        paste! {
            impl<'a> $view<'a> {
                pub const SIZE: usize = [<mod_offsets_ $mod_name>]::total_size;

                /// View the first [`Self::SIZE`] bytes of `data`, if there
                /// are that many.
                pub fn from_bytes(data: &'a [u8]) -> Option<Self> {
                    data.get(..Self::SIZE).map(|data| Self { data })
                }

                pub fn as_bytes(&self) -> &'a [u8] {
                    self.data
                }
            }
        }
    };
}

define_layout_common! {
    VendorRamdiskTableEntryV4,
    initial_offset 0,
    structure {
        ramdisk_size u32,
        ramdisk_offset u32,
        ramdisk_type u32,
        ramdisk_name VENDOR_RAMDISK_NAME_SIZE,
        board_id (VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE * size_of::<u32>()),
    },
}

#[derive(Debug, Copy, Clone)]
pub struct VendorRamdiskTableEntryV4<'a> {
    data: &'a [u8],
}

impl_view_ctor! { VendorRamdiskTableEntryV4, VendorRamdiskTableEntryV4 }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VendorRamdiskTableEntryType {
    None,
    Platform,
    Recovery,
    Dlkm,
    Unknown(u32),
}

impl<'a> VendorRamdiskTableEntryV4<'a> {
    impl_ifield_accessor! { pub, VendorRamdiskTableEntryV4, u32, ramdisk_size }
    impl_ifield_accessor! { pub, VendorRamdiskTableEntryV4, u32, ramdisk_offset }
    impl_ifield_accessor! { pub, VendorRamdiskTableEntryV4, u32, ramdisk_type, _raw }
    impl_sfield_accessor! { pub, 'a, VendorRamdiskTableEntryV4, ramdisk_name }
    impl_sfield_accessor! { pub, 'a, VendorRamdiskTableEntryV4, board_id }

    pub fn get_ramdisk_type(&self) -> VendorRamdiskTableEntryType {
        let raw = self.get_ramdisk_type_raw();
        match raw {
            0 => VendorRamdiskTableEntryType::None,
            1 => VendorRamdiskTableEntryType::Platform,
            2 => VendorRamdiskTableEntryType::Recovery,
            3 => VendorRamdiskTableEntryType::Dlkm,
            _ => VendorRamdiskTableEntryType::Unknown(raw),
        }
    }

    pub fn patch(&self, ramdisk_size: u32, ramdisk_offset: u32) -> Vec<u8> {
        let mut v = self.data.to_owned();
        impl_patch_field! { VendorRamdiskTableEntryV4, v, ramdisk_size, ramdisk_size.to_le_bytes() }
        impl_patch_field! { VendorRamdiskTableEntryV4, v, ramdisk_offset, ramdisk_offset.to_le_bytes() }
        v
    }
}

// https://github.com/topjohnwu/Magisk/blob/01cb75eaefbd14c2d10772ded3942660ebf0285f/native/src/boot/bootimg.hpp#L11-L70

define_layout_common! {
    MtkHeaderLayout,
    initial_offset 0,
    structure {
        magic u32,
        size u32,
        name 32,
        padding 472,
    },
}

/// MediaTek sub-header in front of a kernel or ramdisk payload.
#[derive(Debug, Copy, Clone)]
pub struct MtkHeader<'a> {
    data: &'a [u8],
}

impl_view_ctor! { MtkHeader, MtkHeaderLayout }

impl<'a> MtkHeader<'a> {
    impl_ifield_accessor! { pub, MtkHeaderLayout, u32, size }
    impl_sfield_accessor! { pub, 'a, MtkHeaderLayout, name }

    pub fn patch(&self, size: u32) -> Vec<u8> {
        let mut v = self.data.to_owned();
        impl_patch_field! { MtkHeaderLayout, v, size, size.to_le_bytes() }
        v
    }
}

define_layout_common! {
    DhtbHeaderLayout,
    initial_offset 0,
    structure {
        magic 8,
        checksum 40,
        size u32,
        padding 460,
    },
}

#[derive(Debug, Copy, Clone)]
pub struct DhtbHeader<'a> {
    data: &'a [u8],
}

impl_view_ctor! { DhtbHeader, DhtbHeaderLayout }

impl<'a> DhtbHeader<'a> {
    impl_ifield_accessor! { pub, DhtbHeaderLayout, u32, size }
    impl_sfield_accessor! { pub, 'a, DhtbHeaderLayout, checksum }

    /// The checksum field is 40 bytes wide but only holds a SHA-256 digest.
    pub fn patch(&self, size: u32, sha256: &[u8; 32]) -> Vec<u8> {
        let mut v = self.data.to_owned();
        let mut checksum = [0u8; mod_offsets_DhtbHeaderLayout::size_checksum];
        checksum[..sha256.len()].copy_from_slice(sha256);
        impl_patch_field! { DhtbHeaderLayout, v, checksum, checksum }
        impl_patch_field! { DhtbHeaderLayout, v, size, size.to_le_bytes() }
        v
    }
}

define_layout_common! {
    BlobHeaderLayout,
    initial_offset 0,
    structure {
        secure_magic 20,
        datalen u32,
        signature u32,
        magic 16,
        hdr_version u32,
        hdr_size u32,
        part_offset u32,
        num_parts u32,
        unknown 28,
        name 4,
        offset u32,
        size u32,
        version u32,
    },
}

/// Tegra "SIGNBLOB" header.
#[derive(Debug, Copy, Clone)]
pub struct BlobHeader<'a> {
    data: &'a [u8],
}

impl_view_ctor! { BlobHeader, BlobHeaderLayout }

impl<'a> BlobHeader<'a> {
    impl_ifield_accessor! { pub, BlobHeaderLayout, u32, size }
    impl_ifield_accessor! { pub, BlobHeaderLayout, u32, offset }
    impl_sfield_accessor! { pub, 'a, BlobHeaderLayout, name }

    pub fn patch(&self, size: u32) -> Vec<u8> {
        let mut v = self.data.to_owned();
        impl_patch_field! { BlobHeaderLayout, v, size, size.to_le_bytes() }
        v
    }
}

define_layout_common! {
    ZimageHeaderLayout,
    initial_offset 0,
    structure {
        code 36,
        magic u32,
        start u32,
        end u32,
        endian u32,
    },
}

#[derive(Debug, Copy, Clone)]
pub struct ZimageHeader<'a> {
    data: &'a [u8],
}

impl_view_ctor! { ZimageHeader, ZimageHeaderLayout }

impl ZimageHeader<'_> {
    impl_ifield_accessor! { pub, ZimageHeaderLayout, u32, start }
    impl_ifield_accessor! { pub, ZimageHeaderLayout, u32, end }
    impl_ifield_accessor! { pub, ZimageHeaderLayout, u32, endian }
}

define_layout_common! {
    FdtHeaderLayout,
    initial_offset 0,
    structure {
        magic u32,
        totalsize u32,
        off_dt_struct u32,
        off_dt_strings u32,
        off_mem_rsvmap u32,
        version u32,
        last_comp_version u32,
        boot_cpuid_phys u32,
        size_dt_strings u32,
        size_dt_struct u32,
    },
}

/// Flattened device tree header. All fields are big-endian.
#[derive(Debug, Copy, Clone)]
pub struct FdtHeader<'a> {
    data: &'a [u8],
}

impl_view_ctor! { FdtHeader, FdtHeaderLayout }

impl FdtHeader<'_> {
    impl_ifield_accessor_be! { pub, FdtHeaderLayout, u32, totalsize }
    impl_ifield_accessor_be! { pub, FdtHeaderLayout, u32, off_dt_struct }
}

define_layout_common! {
    AvbFooterLayout,
    initial_offset AVB_FOOTER_MAGIC_LEN,
    structure {
        version_major u32,
        version_minor u32,
        original_image_size u64,
        vbmeta_offset u64,
        vbmeta_size u64,
        reserved 28,
    },
}

#[derive(Debug, Copy, Clone)]
pub struct AvbFooter<'a> {
    data: &'a [u8],
}

impl_view_ctor! { AvbFooter, AvbFooterLayout }

impl AvbFooter<'_> {
    impl_ifield_accessor_be! { pub, AvbFooterLayout, u32, version_major }
    impl_ifield_accessor_be! { pub, AvbFooterLayout, u32, version_minor }
    impl_ifield_accessor_be! { pub, AvbFooterLayout, u64, original_image_size }
    impl_ifield_accessor_be! { pub, AvbFooterLayout, u64, vbmeta_offset }
    impl_ifield_accessor_be! { pub, AvbFooterLayout, u64, vbmeta_size }

    pub fn patch(&self, original_image_size: u64, vbmeta_offset: u64) -> Vec<u8> {
        let mut v = self.data.to_owned();
        impl_patch_field! { AvbFooterLayout, v, original_image_size, original_image_size.to_be_bytes() }
        impl_patch_field! { AvbFooterLayout, v, vbmeta_offset, vbmeta_offset.to_be_bytes() }
        v
    }
}

define_layout_common! {
    AvbVBMetaImageHeaderLayout,
    initial_offset AVB_MAGIC_LEN,
    structure {
        required_libavb_version_major u32,
        required_libavb_version_minor u32,
        authentication_data_block_size u64,
        auxiliary_data_block_size u64,
        algorithm_type u32,
        hash_offset u64,
        hash_size u64,
        signature_offset u64,
        signature_size u64,
        public_key_offset u64,
        public_key_size u64,
        public_key_metadata_offset u64,
        public_key_metadata_size u64,
        descriptors_offset u64,
        descriptors_size u64,
        rollback_index u64,
        flags u32,
        rollback_index_location u32,
        release_string AVB_RELEASE_STRING_SIZE,
        reserved 80,
    },
}

/// The fixed 256-byte header at the start of a vbmeta block. Offsets in the
/// header are relative to the authentication or auxiliary block, not to the
/// file.
#[derive(Debug, Copy, Clone)]
pub struct AvbVBMetaHeader<'a> {
    data: &'a [u8],
}

impl_view_ctor! { AvbVBMetaHeader, AvbVBMetaImageHeaderLayout }

impl<'a> AvbVBMetaHeader<'a> {
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u32, required_libavb_version_major }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u32, required_libavb_version_minor }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, authentication_data_block_size }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, auxiliary_data_block_size }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u32, algorithm_type }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, hash_offset }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, hash_size }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, signature_offset }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, signature_size }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, public_key_offset }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, public_key_size }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u64, rollback_index }
    impl_ifield_accessor_be! { pub, AvbVBMetaImageHeaderLayout, u32, flags }
    impl_sfield_accessor! { pub, 'a, AvbVBMetaImageHeaderLayout, release_string }
}

pub const AVB_HEADER_SIZE: usize = mod_offsets_AvbVBMetaImageHeaderLayout::total_size;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BLOB_HEADER_SIZE, DHTB_HEADER_SIZE, MTK_HEADER_SIZE};

    #[test]
    fn header_sizes() {
        assert_eq!(BOOT_HEADER_V0.total_size, 1632);
        assert_eq!(BOOT_HEADER_V1.total_size, 1648);
        assert_eq!(BOOT_HEADER_V2.total_size, 1660);
        assert_eq!(BOOT_HEADER_PXA.total_size, 1620);
        assert_eq!(BOOT_HEADER_V3.total_size, 1580);
        assert_eq!(BOOT_HEADER_V4.total_size, 1584);
        assert_eq!(VENDOR_BOOT_HEADER_V3.total_size, 2112);
        assert_eq!(VENDOR_BOOT_HEADER_V4.total_size, 2128);
    }

    #[test]
    fn version_slot_is_shared() {
        assert_eq!(BOOT_HEADER_V0.offset_extra_size, 40);
        assert_eq!(BOOT_HEADER_V0.offset_header_version, 0);
        assert_eq!(BOOT_HEADER_V1.offset_header_version, 40);
        assert_eq!(BOOT_HEADER_V1.offset_extra_size, 0);
        assert_eq!(BOOT_HEADER_V2.offset_header_version, 40);
        assert_eq!(BOOT_HEADER_V3.offset_header_version, 40);
        assert_eq!(VENDOR_BOOT_HEADER_V3.offset_header_version, 8);
    }

    #[test]
    fn inherited_fields() {
        assert_eq!(BOOT_HEADER_V2.offset_recovery_dtbo_size, 1632);
        assert_eq!(BOOT_HEADER_V2.offset_dtb_size, 1648);
        assert_eq!(BOOT_HEADER_V2.offset_page_size, 36);
        assert_eq!(BOOT_HEADER_V4.offset_signature_size, 1580);
        assert_eq!(BOOT_HEADER_V4.size_cmdline, 1536);
        assert_eq!(BOOT_HEADER_V4.offset_extra_cmdline, 0);
        assert_eq!(VENDOR_BOOT_HEADER_V4.offset_bootconfig_size, 2124);
        assert_eq!(BOOT_HEADER_PXA.offset_page_size, 44);
        assert_eq!(BOOT_HEADER_PXA.size_name, 4);
    }

    #[test]
    fn wrapper_sizes() {
        assert_eq!(MtkHeader::SIZE, MTK_HEADER_SIZE);
        assert_eq!(DhtbHeader::SIZE, DHTB_HEADER_SIZE);
        assert_eq!(BlobHeader::SIZE, BLOB_HEADER_SIZE);
        assert_eq!(ZimageHeader::SIZE, 52);
        assert_eq!(AvbFooter::SIZE, 64);
        assert_eq!(AVB_HEADER_SIZE, 256);
        assert_eq!(VendorRamdiskTableEntryV4::SIZE, 108);
    }

    #[test]
    fn footer_patch_is_big_endian() {
        let mut raw = vec![0u8; AvbFooter::SIZE];
        raw[..4].copy_from_slice(b"AVBf");
        let footer = AvbFooter::from_bytes(&raw).unwrap();
        let patched = footer.patch(0x1122, 0x3344);
        let footer = AvbFooter::from_bytes(&patched).unwrap();
        assert_eq!(footer.get_original_image_size(), 0x1122);
        assert_eq!(footer.get_vbmeta_offset(), 0x3344);
        assert_eq!(&patched[12..20], &0x1122u64.to_be_bytes());
    }
}
