// Container magics
pub const BOOT_MAGIC: &[u8] = b"ANDROID!";
pub const VENDOR_BOOT_MAGIC: &[u8] = b"VNDRBOOT";
pub const CHROMEOS_MAGIC: &[u8] = b"CHROMEOS";
pub const DHTB_MAGIC: &[u8] = b"DHTB\x01\x00\x00\x00";
pub const TEGRABLOB_MAGIC: &[u8] = b"-SIGNED-BY-SIGNBLOB-";
pub const MTK_MAGIC: &[u8] = b"\x88\x16\x88\x58";
pub const DTB_MAGIC: &[u8] = b"\xd0\x0d\xfe\xed";
pub const ZIMAGE_MAGIC: &[u8] = b"\x18\x28\x6f\x01";
pub const ZIMAGE_MAGIC_OFFSET: usize = 0x24;

// Compression magics
pub const GZIP1_MAGIC: &[u8] = b"\x1f\x8b";
pub const GZIP2_MAGIC: &[u8] = b"\x1f\x9e";
pub const LZOP_MAGIC: &[u8] = b"\x89LZO";
pub const XZ_MAGIC: &[u8] = b"\xfd7zXZ";
pub const LZMA_MAGIC: &[u8] = b"\x5d\x00\x00";
pub const BZIP_MAGIC: &[u8] = b"BZh";
pub const LZ4_LEG_MAGIC: &[u8] = b"\x02\x21\x4c\x18";
pub const LZ41_MAGIC: &[u8] = b"\x03\x21\x4c\x18";
pub const LZ42_MAGIC: &[u8] = b"\x04\x22\x4d\x18";

/// Deflate stream header searched for inside ARM zImage kernels.
pub const ZIMAGE_GZIP_MAGIC: &[u8] = b"\x1f\x8b\x08\x00";

// Trailing markers
pub const SEANDROID_MAGIC: &[u8] = b"SEANDROIDENFORCE";
pub const LG_BUMP_MAGIC: &[u8] =
    b"\x41\xa9\xe4\x67\x74\x4d\x1d\x1b\xa4\x29\xf2\xec\xea\x65\x52\x79";
pub const DHTB_TRAILER: &[u8] = b"\xff\xff\xff\xff";

// OEM prefixes
pub const NOOKHD_RL_MAGIC: &[u8] = b"Red Loader";
pub const NOOKHD_GL_MAGIC: &[u8] = b"Green Loader";
pub const NOOKHD_GR_MAGIC: &[u8] = b"Green Recovery";
pub const NOOKHD_EB_MAGIC: &[u8] = b"eMMC boot.img+secondloader";
pub const NOOKHD_ER_MAGIC: &[u8] = b"eMMC recovery.img+secondloader";
pub const NOOKHD_PRE_HEADER_SZ: usize = 1048576;
pub const ACCLAIM_MAGIC: &[u8] = b"BauwksBoot";
pub const ACCLAIM_PRE_HEADER_SZ: usize = 262144;
pub const AMONET_MICROLOADER_MAGIC: &[u8] = b"microloader";
pub const AMONET_MICROLOADER_SZ: usize = 1024;
pub const CHROMEOS_PRE_HEADER_SZ: usize = 65536;

// AVB
pub const AVB_FOOTER_MAGIC: &[u8] = b"AVBf";
pub const AVB_MAGIC: &[u8] = b"AVB0";
pub const AVB_FOOTER_MAGIC_LEN: usize = 4;
pub const AVB_MAGIC_LEN: usize = 4;
pub const AVB_RELEASE_STRING_SIZE: usize = 48;

// Boot header field sizes
pub const BOOT_MAGIC_SIZE: usize = 8;
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_PXA_NAME_SIZE: usize = 4;
pub const BOOT_ID_SIZE: usize = 32;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_EXTRA_ARGS_SIZE: usize = 1024;
pub const VENDOR_BOOT_ARGS_SIZE: usize = 2048;
pub const VENDOR_RAMDISK_NAME_SIZE: usize = 32;
pub const VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE: usize = 16;

/// Page size implied by boot image v3 and v4 headers.
pub const BOOT_V3_PAGE_SIZE: u32 = 4096;

/// The V0 `page_size` slot holds a load address on PXA images.
pub const PXA_PAGE_SIZE_THRESHOLD: u32 = 0x02000000;

pub const SHA1_DIGEST_SIZE: usize = 20;
pub const SHA256_DIGEST_SIZE: usize = 32;

pub const MTK_HEADER_SIZE: usize = 512;
pub const DHTB_HEADER_SIZE: usize = 512;
pub const BLOB_HEADER_SIZE: usize = 104;

pub const FDT_BEGIN_NODE: u32 = 0x00000001;
