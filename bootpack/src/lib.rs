pub mod avb;
pub mod compress;
pub mod constants;
pub mod error;
pub mod flags;
pub mod format;
pub mod hdr_file;
pub mod header;
pub mod layouts;
pub mod parser;
pub mod patcher;
pub mod sections;
pub mod utils;

pub use error::{Error, Result};
pub use parser::{BootImage, SectionId};
pub use patcher::{BootImagePatcher, RepackOptions, repack};
