use anyhow::{Context, Result, bail};
use bootpack::avb::{AvbReport, Check, RustCrypto, VerifyOutcome, verify};
use bootpack::compress::{compress, decompress};
use bootpack::flags::BootFlags;
use bootpack::format::{FormatTag, detect_lg};
use bootpack::{BootImage, BootImagePatcher, RepackOptions, SectionId, hdr_file, sections};
use clap::{Parser, Subcommand};
use memmap2::Mmap;
use paste::paste;
use std::borrow::Cow;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};

const HEADER_FILE: &str = "header";
const VENDOR_RAMDISK_DIR: &str = "vendor_ramdisk";
const NEW_BOOT: &str = "new-boot.img";

/// Sections that are written to and restored from plain files.
const RAW_SECTIONS: [SectionId; 6] = [
    SectionId::KernelDtb,
    SectionId::Second,
    SectionId::Extra,
    SectionId::RecoveryDtbo,
    SectionId::Dtb,
    SectionId::Bootconfig,
];

/// Inspect, unpack and repack Android boot images.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print debug output. Repeat for more.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    Info(InfoCli),
    Unpack(UnpackCli),
    Repack(RepackCli),
    Verify(VerifyCli),
}

/// Display the header and detected wrappers.
#[derive(Debug, Parser)]
struct InfoCli {
    /// Path to input boot image.
    #[arg(value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Extract every section to a directory.
#[derive(Debug, Parser)]
struct UnpackCli {
    /// Path to input boot image.
    #[arg(value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Output directory.
    #[arg(short = 'd', long, value_name = "DIR", value_parser, default_value = ".")]
    directory: PathBuf,

    /// Keep the kernel and ramdisk compressed.
    #[arg(short = 'n', long)]
    raw: bool,

    /// Header text file. Relative to the output directory by default.
    #[arg(long, value_name = "FILE", value_parser)]
    header: Option<PathBuf>,
}

/// Rebuild an image from its original and the unpacked files.
#[derive(Debug, Parser)]
struct RepackCli {
    /// Path to the original boot image.
    #[arg(value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output boot image.
    #[arg(short, long, value_name = "FILE", value_parser, default_value = NEW_BOOT)]
    output: PathBuf,

    /// Directory containing the unpacked files.
    #[arg(short = 'd', long, value_name = "DIR", value_parser, default_value = ".")]
    directory: PathBuf,

    /// Store the kernel and ramdisk files as they are, without recompressing.
    #[arg(short = 'n', long)]
    raw: bool,

    /// Header text file. Relative to the unpack directory by default.
    #[arg(long, value_name = "FILE", value_parser)]
    header: Option<PathBuf>,

    /// Drop everything after the last section, AVB footer included.
    #[arg(long)]
    drop_tail: bool,

    /// Keep the header checksum as is.
    #[arg(long)]
    keep_id: bool,
}

/// Check the AVB hash and signature.
#[derive(Debug, Parser)]
struct VerifyCli {
    /// Path to input boot image.
    #[arg(value_name = "FILE", value_parser)]
    input: PathBuf,

    /// AVB public key to check against instead of the embedded one.
    #[arg(long, value_name = "FILE", value_parser)]
    public_key: Option<PathBuf>,
}

fn map_image(path: &Path) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("Failed to open for reading: {path:?}"))?;
    // The mapping is only read, and nothing in this process writes the file.
    let mem = unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to map: {path:?}"))?;
    Ok(mem)
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read data: {path:?}")),
    }
}

fn write_if_not_empty(path: &Path, data: &[u8]) -> Result<()> {
    if !data.is_empty() {
        fs::write(path, data).with_context(|| format!("Failed to write data: {path:?}"))?;
    }
    Ok(())
}

fn header_path(directory: &Path, header: &Option<PathBuf>) -> PathBuf {
    header.clone().unwrap_or_else(|| directory.join(HEADER_FILE))
}

fn vendor_ramdisk_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(VENDOR_RAMDISK_DIR).join(format!("{name}.cpio"))
}

/// Decompress a payload for unpacking unless it is raw or the user asked to
/// keep it as is.
fn unpack_payload<'d>(data: &'d [u8], format: FormatTag, raw: bool) -> Result<Cow<'d, [u8]>> {
    if raw || !format.is_compressed() {
        return Ok(data.into());
    }
    let out = decompress(format, data).with_context(|| format!("Failed to decompress {format}"))?;
    Ok(out.into())
}

/// Bring a restored payload back to the original codec. Returns `None` when
/// the file decompresses to what the image already holds.
fn repack_payload(new: Vec<u8>, original: &[u8], format: FormatTag, raw: bool) -> Result<Option<Vec<u8>>> {
    if new == original {
        return Ok(None);
    }
    if raw || !format.is_compressed() || detect_lg(&new).is_compressed_any() {
        return Ok(Some(new));
    }
    if decompress(format, original).is_ok_and(|old| old == new) {
        return Ok(None);
    }
    info!("Compressing with {format}");
    let out = compress(format, &new).with_context(|| format!("Failed to compress {format}"))?;
    Ok(Some(out))
}

fn print_info(image: &BootImage<'_>) {
    let header = image.header();

    macro_rules! print_item {
        ($($name:ident),*) => {
            paste! {
                $(
                    if header.[<has_ $name>]() {
                        println!("{:<15} [0x{:x}]", stringify!([<$name:upper>]), header.[<get_ $name>]());
                    }
                )*
            }
        };
    }

    print!("{image}");
    print_item! { recovery_dtbo_offset, dtb_addr, header_size, signature_size }
    print_item! {
        vendor_ramdisk_table_size,
        vendor_ramdisk_table_entry_num,
        bootconfig_size
    }
    if let Some(avb) = image.avb() {
        println!("{:<15} [0x{:x}]", "VBMETA_OFFSET", avb.vbmeta_offset());
    }
}

fn info_subcommand(cli: &InfoCli) -> Result<()> {
    let mem = map_image(&cli.input)?;
    let image = BootImage::parse(&mem)
        .with_context(|| format!("Failed to parse boot image: {:?}", cli.input))?;
    print_info(&image);
    Ok(())
}

fn unpack_subcommand(cli: &UnpackCli) -> Result<()> {
    let mem = map_image(&cli.input)?;
    let image = BootImage::parse(&mem)
        .with_context(|| format!("Failed to parse boot image: {:?}", cli.input))?;
    print_info(&image);
    let dir = &cli.directory;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {dir:?}"))?;

    if let Some(kernel) = image.section_data(SectionId::Kernel) {
        // zImage kernels are kept whole, the decompressor stub is part of it.
        let raw = cli.raw || image.flags().contains(BootFlags::ZIMAGE_KERNEL);
        let data = unpack_payload(kernel, image.kernel_format(), raw)?;
        write_if_not_empty(&dir.join(SectionId::Kernel.name()), &data)?;
    }

    if image.vendor_ramdisks().is_empty() {
        if let Some(ramdisk) = image.section_data(SectionId::Ramdisk) {
            let data = unpack_payload(ramdisk, image.ramdisk_format(), cli.raw)?;
            write_if_not_empty(&dir.join("ramdisk.cpio"), &data)?;
        }
    } else {
        let vendor_dir = dir.join(VENDOR_RAMDISK_DIR);
        fs::create_dir_all(&vendor_dir)
            .with_context(|| format!("Failed to create directory: {vendor_dir:?}"))?;
        for ramdisk in image.vendor_ramdisks() {
            let name = ramdisk.name();
            let data = unpack_payload(ramdisk.data(), ramdisk.format(), cli.raw)
                .with_context(|| format!("Vendor ramdisk {name:?}"))?;
            write_if_not_empty(&vendor_ramdisk_path(dir, &name), &data)?;
        }
    }

    for id in RAW_SECTIONS {
        let path = dir.join(id.name());
        sections::dump_section(&image, id, &path)
            .with_context(|| format!("Failed to write {id}: {path:?}"))?;
    }

    let path = header_path(dir, &cli.header);
    hdr_file::dump_to_path(image.header(), &path)
        .with_context(|| format!("Failed to write header: {path:?}"))?;

    Ok(())
}

fn repack_subcommand(cli: &RepackCli) -> Result<()> {
    let mem = map_image(&cli.input)?;
    let image = BootImage::parse(&mem)
        .with_context(|| format!("Failed to parse boot image: {:?}", cli.input))?;
    let dir = &cli.directory;

    let mut patcher = BootImagePatcher::new(&image);
    patcher.options(RepackOptions {
        recompute_id: !cli.keep_id,
        drop_tail: cli.drop_tail,
        ..Default::default()
    });

    let path = header_path(dir, &cli.header);
    if path.exists() {
        hdr_file::load_from_path(patcher.header_mut(), &path)
            .with_context(|| format!("Failed to load header: {path:?}"))?;
    }

    if let Some(kernel) = image.section_data(SectionId::Kernel) {
        let path = dir.join(SectionId::Kernel.name());
        if let Some(data) = read_if_exists(&path)? {
            let raw = cli.raw || image.flags().contains(BootFlags::ZIMAGE_KERNEL);
            if let Some(data) = repack_payload(data, kernel, image.kernel_format(), raw)? {
                patcher.replace_section(SectionId::Kernel, data)?;
            }
        }
    }

    if image.vendor_ramdisks().is_empty() {
        if let Some(ramdisk) = image.section_data(SectionId::Ramdisk) {
            if let Some(data) = read_if_exists(&dir.join("ramdisk.cpio"))? {
                if let Some(data) = repack_payload(data, ramdisk, image.ramdisk_format(), cli.raw)? {
                    patcher.replace_section(SectionId::Ramdisk, data)?;
                }
            }
        }
    } else {
        for ramdisk in image.vendor_ramdisks() {
            let name = ramdisk.name();
            let Some(data) = read_if_exists(&vendor_ramdisk_path(dir, &name))? else {
                warn!("Vendor ramdisk {name:?} not found, keeping original");
                continue;
            };
            if let Some(data) = repack_payload(data, ramdisk.data(), ramdisk.format(), cli.raw)? {
                patcher.replace_vendor_ramdisk(&name, data)?;
            }
        }
    }

    for id in RAW_SECTIONS {
        let in_layout = match id {
            SectionId::KernelDtb => image.block(SectionId::Kernel).is_some(),
            id => image.block(id).is_some(),
        };
        if !in_layout {
            continue;
        }
        let original = image.section_data(id).unwrap_or_default();
        if let Some(data) = read_if_exists(&dir.join(id.name()))? {
            if data != original {
                patcher.replace_section(id, data)?;
            }
        }
    }

    let out = patcher.repack().context("Failed to repack boot image")?;
    fs::write(&cli.output, &out)
        .with_context(|| format!("Failed to write boot image: {:?}", cli.output))?;
    info!("Wrote {} bytes to {:?}", out.len(), cli.output);
    Ok(())
}

fn print_check(name: &str, check: Check) {
    println!("{:<15} [{:?}]", name, check);
}

fn print_report(report: &AvbReport) {
    println!("{:<15} [{:?}]", "AVB", report.kind);
    println!("{:<15} [0x{:x}]", "VBMETA_OFFSET", report.vbmeta_offset);
    println!("{:<15} [0x{:x}]", "VBMETA_SIZE", report.vbmeta_size);
    println!("{:<15} [{:?}]", "ALGORITHM", report.algorithm);
    println!("{:<15} [{}]", "ROLLBACK_INDEX", report.rollback_index);
    print_check("HASH", report.hash);
    print_check("SIGNATURE", report.signature);
}

fn verify_subcommand(cli: &VerifyCli) -> Result<()> {
    let mem = map_image(&cli.input)?;
    let image = BootImage::parse(&mem)
        .with_context(|| format!("Failed to parse boot image: {:?}", cli.input))?;
    let key = match &cli.public_key {
        Some(path) => {
            Some(fs::read(path).with_context(|| format!("Failed to read public key: {path:?}"))?)
        }
        None => None,
    };

    match verify(&image, key.as_deref(), &RustCrypto).context("Failed to verify AVB")? {
        VerifyOutcome::Unsigned => {
            println!("Image is not signed");
            Ok(())
        }
        VerifyOutcome::Signed(report) => {
            print_report(&report);
            if !report.is_verified() {
                bail!("AVB verification failed");
            }
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match &cli.command {
        Command::Info(c) => info_subcommand(c),
        Command::Unpack(c) => unpack_subcommand(c),
        Command::Repack(c) => repack_subcommand(c),
        Command::Verify(c) => verify_subcommand(c),
    }
}
