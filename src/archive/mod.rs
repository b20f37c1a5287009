//! Template package archives.

mod zip;

pub use zip::ZipExtractor;
