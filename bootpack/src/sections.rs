//! Moving single sections between an image and standalone files.

use crate::error::Result;
use crate::parser::{BootImage, SectionId};
use crate::patcher::BootImagePatcher;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Write the raw bytes of a section. Returns `false`, without creating a
/// file, when the section is absent or empty.
pub fn dump_section(image: &BootImage<'_>, id: SectionId, path: &Path) -> Result<bool> {
    match image.section_data(id) {
        Some(data) if !data.is_empty() => {
            debug!("dump {} ({} bytes) to {:?}", id, data.len(), path);
            fs::write(path, data)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Same as [`dump_section`] for one fragment of a vendor v4 ramdisk.
pub fn dump_vendor_ramdisk(image: &BootImage<'_>, name: &str, path: &Path) -> Result<bool> {
    match image.vendor_ramdisk(name) {
        Some(ramdisk) if !ramdisk.data().is_empty() => {
            debug!("dump vendor ramdisk {:?} to {:?}", name, path);
            fs::write(path, ramdisk.data())?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Replace a section with the contents of `path` for the next repack.
/// Returns `false` when the file does not exist.
pub fn restore_section(patcher: &mut BootImagePatcher<'_>, id: SectionId, path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let data = fs::read(path)?;
    debug!("restore {} from {:?} ({} bytes)", id, path, data.len());
    patcher.replace_section(id, data)?;
    Ok(true)
}

pub fn restore_vendor_ramdisk(
    patcher: &mut BootImagePatcher<'_>,
    name: &str,
    path: &Path,
) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let data = fs::read(path)?;
    debug!("restore vendor ramdisk {:?} from {:?}", name, path);
    patcher.replace_vendor_ramdisk(name, data)?;
    Ok(true)
}
