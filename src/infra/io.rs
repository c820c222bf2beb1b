use std::{borrow::Cow, fs::File, path::Path};

use anyhow::{Context, Result};
use memmap2::Mmap;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// Listing bytes, either mapped or read into memory
pub enum FileContent
{
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl FileContent
{
    pub fn as_bytes(&self) -> &[u8]
    {
        match self
        {
            FileContent::Mapped(mmap) => mmap,
            FileContent::Buffered(bytes) => bytes,
        }
    }

    /// Listing text; invalid UTF-8 sequences become U+FFFD
    pub fn text(&self) -> Cow<'_, str>
    {
        String::from_utf8_lossy(self.as_bytes())
    }
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> Result<FileContent>
{
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD
    {
        let file = File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: read-only mapping; listings are not modified while loaded
        let mmap = unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to memory-map {}", path.display()))?;

        Ok(FileContent::Mapped(mmap))
    }
    else
    {
        let content = std::fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))?;

        Ok(FileContent::Buffered(content))
    }
}
