use std::{
    collections::HashSet,
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use super::{codec::SectionReader, types::*, volume::Volume};
use crate::error::{Error, Result};

/// A parsed container: the init payload and the volumes in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eof {
    pub version: u16,
    pub init:    Vec<u8>,
    pub volumes: Vec<Volume>,
}
impl Eof {
    /// The volume the runtime boots from, the first one in chain order.
    pub fn startup(&self) -> Option<&Volume> { self.volumes.first() }

    /// Virtual path of the main module, `<startup name>/<startup index>`.
    pub fn main_path(&self) -> Option<String> { self.startup().map(Volume::entry_path) }
}

/// Loads the container appended to the file at `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Eof> {
    let file = File::open(path.as_ref())?;
    load_from(file)
}

/// Loads a container from the end of `reader`.
///
/// Only positioned reads are used: root header, init payload, then one
/// section at a time walking backwards along the chain.
pub fn load_from<R: Read + Seek>(mut reader: R) -> Result<Eof> {
    let total_size = reader.seek(SeekFrom::End(0))?;
    let mut position = total_size
        .checked_sub(EOF_HEADER_SIZE as u64)
        .ok_or_else(|| {
            Error::Truncated(format!(
                "file of {} bytes is smaller than the root header",
                total_size
            ))
        })?;

    let header = read_at(&mut reader, position, EOF_HEADER_SIZE as u32)?;
    let header = RootHeader::read_from_bytes(&header)
        .map_err(|_| Error::Truncated("root header".into()))?;
    if header.signature != *EOF_SIGNATURE {
        return Err(Error::InvalidSignature);
    }
    let version = header.version.get();
    if version > EOF_VERSION {
        return Err(Error::UnsupportedVersion {
            found:     version,
            supported: EOF_VERSION,
        });
    }
    let volume_count = header.volumes.get();
    if volume_count < 1 || volume_count > MAX_VOLUMES {
        return Err(Error::VolumeCountOutOfRange(volume_count));
    }
    let init_size = header.init_size.get();
    if init_size == 0 {
        return Err(Error::EmptyInitSection);
    }

    position = step_back(position, init_size, "init section")?;
    let init = read_at(&mut reader, position, init_size)?;

    let mut volumes = Vec::<Volume>::with_capacity(volume_count as usize);
    let mut names = HashSet::new();
    let mut header_size = header.first_header_size.get();
    let mut section_size = header.first_section_size.get();
    while header_size > 0 && section_size > 0 {
        if volumes.len() == volume_count as usize {
            return Err(Error::VolumeCountMismatch {
                declared: volume_count,
                found:    volumes.len() + 1,
            });
        }
        position = step_back(position, section_size, "volume section")?;
        let section = read_at(&mut reader, position, section_size)?;
        let (volume, next_header_size, next_section_size) =
            decode_section(&section, header_size, volumes.is_empty())?;
        if !names.insert(volume.name.clone()) {
            return Err(Error::DuplicateMountName(volume.name));
        }
        #[cfg(debug_assertions)]
        eprintln!(
            "kriboot: volume {} ({}, {} bytes)",
            volume.name,
            volume.kind,
            volume.data.len()
        );
        volumes.push(volume);
        header_size = next_header_size;
        section_size = next_section_size;
    }
    if volumes.len() != volume_count as usize {
        return Err(Error::VolumeCountMismatch {
            declared: volume_count,
            found:    volumes.len(),
        });
    }

    Ok(Eof {
        version,
        init,
        volumes,
    })
}

fn step_back(position: u64, size: u32, what: &str) -> Result<u64> {
    position.checked_sub(size as u64).ok_or_else(|| {
        Error::Truncated(format!(
            "{} of {} bytes starts before the beginning of the file",
            what, size
        ))
    })
}

fn read_at<R: Read + Seek>(reader: &mut R, position: u64, size: u32) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(position))?;
    let mut buffer = vec![0; size as usize];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Splits a section into header and data and validates it against the chain.
///
/// Returns the volume and the chain pointers to the next section.
fn decode_section(section: &[u8], header_size: u32, first: bool) -> Result<(Volume, u32, u32)> {
    if header_size as usize > section.len() {
        return Err(Error::InvalidDataSize {
            declared: header_size,
            expected: section.len() as u32,
        });
    }
    let (header, data) = section.split_at(header_size as usize);
    let (fixed, _) = VolumeHeader::read_from_prefix(header)
        .map_err(|_| Error::Truncated(format!("volume header of {} bytes", header_size)))?;

    let declared_header_size = fixed.header_size.get();
    if declared_header_size != header_size {
        return Err(Error::InvalidHeaderSize {
            declared: declared_header_size,
            expected: header_size,
        });
    }
    let declared_data_size = fixed.data_size.get();
    if declared_data_size as usize != data.len() {
        return Err(Error::InvalidDataSize {
            declared: declared_data_size,
            expected: data.len() as u32,
        });
    }

    let mut reader = SectionReader::at(header, STRINGS_OFFSET);
    let name = reader.string("name")?;
    if !name.starts_with('/') {
        return Err(Error::InvalidMountName(name));
    }
    let kind = reader.string("type")?;
    if kind.is_empty() {
        return Err(Error::MissingType(name));
    }
    let mapping = reader.string("mapping")?;
    let mut index = reader.string("index")?;
    if index.is_empty() && first {
        index = DEFAULT_INDEX.to_owned();
    }

    Ok((
        Volume {
            kind,
            name,
            mapping,
            index,
            data: data.to_vec(),
            startup: first,
        },
        fixed.next_header_size.get(),
        fixed.next_section_size.get(),
    ))
}
