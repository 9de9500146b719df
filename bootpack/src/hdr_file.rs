//! `key=value` text form of the user-editable header fields.
//!
//! Recognized keys are `name`, `cmdline`, `os_version` (`MAJOR.MINOR.PATCH`)
//! and `os_patch_level` (`YEAR-MONTH`). Anything else is skipped on load.

use crate::error::Result;
use crate::header::{BootHeader, OsVersion, PatchLevel};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

pub fn dump<W: Write>(header: &BootHeader, mut w: W) -> Result<()> {
    let name = header.name();
    if !name.is_empty() {
        w.write_all(b"name=")?;
        w.write_all(name)?;
        w.write_all(b"\n")?;
    }
    w.write_all(b"cmdline=")?;
    w.write_all(&header.cmdline())?;
    w.write_all(b"\n")?;
    if let Some((version, level)) = header.os_version() {
        writeln!(w, "os_version={version}")?;
        writeln!(w, "os_patch_level={level}")?;
    }
    w.flush()?;
    Ok(())
}

pub fn load<R: BufRead>(header: &mut BootHeader, r: R) -> Result<()> {
    for line in r.split(b'\n') {
        let line = line?;
        let line = line.strip_suffix(b"\r").unwrap_or(&line);
        let Some(eq) = line.iter().position(|&b| b == b'=') else {
            continue;
        };
        let (key, value) = (&line[..eq], &line[eq + 1..]);
        match key {
            b"name" if header.has_name() => header.set_name(value),
            b"cmdline" => header.set_cmdline(value),
            b"os_version" => {
                let version: OsVersion = String::from_utf8_lossy(value).parse()?;
                header.set_os_version_only(version);
            }
            b"os_patch_level" => {
                let level: PatchLevel = String::from_utf8_lossy(value).parse()?;
                header.set_patch_level(level);
            }
            _ => debug!("ignoring header key {:?}", String::from_utf8_lossy(key)),
        }
    }
    Ok(())
}

pub fn dump_to_path(header: &BootHeader, path: &Path) -> Result<()> {
    dump(header, BufWriter::new(File::create(path)?))
}

pub fn load_from_path(header: &mut BootHeader, path: &Path) -> Result<()> {
    load(header, BufReader::new(File::open(path)?))
}
