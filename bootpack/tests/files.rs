mod common;

use bootpack::sections::{dump_section, dump_vendor_ramdisk, restore_section, restore_vendor_ramdisk};
use bootpack::{BootImage, BootImagePatcher, SectionId, hdr_file};
use common::*;
use std::fs;

#[test]
fn unpack_edit_repack() {
    let kernel = filler(5000, 1);
    let ramdisk = filler(3000, 2);
    let data = boot_v2(&Legacy {
        kernel: &kernel,
        ramdisk: &ramdisk,
        dtb: &filler(600, 3),
        ..Default::default()
    });
    let image = BootImage::parse(&data).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = |name: &str| dir.path().join(name);

    for id in SectionId::ALL {
        dump_section(&image, id, &path(id.name())).unwrap();
    }
    hdr_file::dump_to_path(image.header(), &path("header")).unwrap();

    assert_eq!(fs::read(path("kernel")).unwrap(), kernel);
    assert_eq!(fs::read(path("ramdisk")).unwrap(), ramdisk);
    assert!(!path("second").exists());
    assert!(!path("kernel_dtb").exists());
    assert_eq!(
        fs::read_to_string(path("header")).unwrap(),
        "name=board\ncmdline=console=null\n"
    );

    let new_ramdisk = filler(6000, 4);
    fs::write(path("ramdisk"), &new_ramdisk).unwrap();
    fs::write(path("header"), "name=board\ncmdline=console=ttyMSM0 quiet\n").unwrap();

    let mut patcher = BootImagePatcher::new(&image);
    for id in [SectionId::Kernel, SectionId::Ramdisk, SectionId::Dtb] {
        assert!(restore_section(&mut patcher, id, &path(id.name())).unwrap());
    }
    assert!(!restore_section(&mut patcher, SectionId::Second, &path("second")).unwrap());
    hdr_file::load_from_path(patcher.header_mut(), &path("header")).unwrap();
    let out = patcher.repack().unwrap();

    let new = BootImage::parse(&out).unwrap();
    assert_eq!(new.section_data(SectionId::Kernel), Some(&kernel[..]));
    assert_eq!(new.section_data(SectionId::Ramdisk), Some(&new_ramdisk[..]));
    assert_eq!(new.header().cmdline(), b"console=ttyMSM0 quiet");
    assert_eq!(new.section_data(SectionId::Dtb).unwrap().len(), 600);
}

#[test]
fn vendor_ramdisk_files() {
    let platform = filler(3000, 1);
    let recovery = filler(700, 2);
    let data = vendor_v4(
        &[
            Fragment {
                name: "platform",
                kind: 1,
                data: &platform,
            },
            Fragment {
                name: "recovery",
                kind: 2,
                data: &recovery,
            },
        ],
        &[],
        &[],
    );
    let image = BootImage::parse(&data).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let platform_path = dir.path().join("platform.cpio");
    let recovery_path = dir.path().join("recovery.cpio");

    assert!(dump_vendor_ramdisk(&image, "platform", &platform_path).unwrap());
    assert!(dump_vendor_ramdisk(&image, "recovery", &recovery_path).unwrap());
    assert!(!dump_vendor_ramdisk(&image, "dlkm", &dir.path().join("dlkm.cpio")).unwrap());
    assert_eq!(fs::read(&recovery_path).unwrap(), recovery);

    let new_recovery = filler(1500, 5);
    fs::write(&recovery_path, &new_recovery).unwrap();
    let mut patcher = BootImagePatcher::new(&image);
    assert!(restore_vendor_ramdisk(&mut patcher, "recovery", &recovery_path).unwrap());
    let out = patcher.repack().unwrap();

    let new = BootImage::parse(&out).unwrap();
    assert_eq!(new.vendor_ramdisk("platform").unwrap().data(), &platform[..]);
    assert_eq!(new.vendor_ramdisk("recovery").unwrap().data(), &new_recovery[..]);
    assert_eq!(new.header().get_ramdisk_size(), 3000 + 1500);
}

#[test]
fn v3_header_file_carries_os_version() {
    let data = boot_v3(&filler(100, 1), &filler(100, 2));
    let image = BootImage::parse(&data).unwrap();

    let mut text = Vec::new();
    hdr_file::dump(image.header(), &mut text).unwrap();
    assert_eq!(
        String::from_utf8(text).unwrap(),
        "cmdline=init=/v3\nos_version=11.0.0\nos_patch_level=2023-03\n"
    );

    let mut patcher = BootImagePatcher::new(&image);
    hdr_file::load(
        patcher.header_mut(),
        &b"os_version=13.0.0\r\nos_patch_level=2024-06\r\nname=ignored\r\n"[..],
    )
    .unwrap();
    let out = patcher.repack().unwrap();

    let new = BootImage::parse(&out).unwrap();
    let (version, level) = new.header().os_version().unwrap();
    assert_eq!(version.to_string(), "13.0.0");
    assert_eq!(level.to_string(), "2024-06");
    assert_eq!(new.header().cmdline(), b"init=/v3");
    assert_eq!(&out[4096..], &data[4096..]);
}
