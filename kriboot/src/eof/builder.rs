use std::{fs::read, io::Write, iter::once};

use zerocopy::byteorder::big_endian::{U16, U32};

use super::{
    codec::{string_size, SectionWriter},
    types::*,
    volume::{Volume, VolumeSource, VolumeSpec},
};
use crate::error::{Error, Result};

struct Section {
    volume: Volume,
    header: Vec<u8>,
}

/// Assembles volumes and the init payload into an EOF container.
///
/// The container is frozen by [`build`](EofBuilder::build) and then emitted
/// with [`to_stream`](EofBuilder::to_stream) or [`write_to`](EofBuilder::write_to)
/// in the following order:
/// - every volume header followed by its data, last volume of the chain first
/// - the init payload
/// - the root header
#[derive(Default)]
pub struct EofBuilder {
    sections: Vec<Section>,
    init:     Vec<u8>,
    header:   Vec<u8>,
    built:    bool,
}
impl EofBuilder {
    pub fn new() -> Self { EofBuilder::default() }

    /// Sets the init payload, replacing any previous one.
    pub fn add_init(&mut self, init: impl Into<Vec<u8>>) { self.init = init.into(); }

    pub fn init(&self) -> &[u8] { &self.init }

    pub fn add_volume(&mut self, spec: VolumeSpec) -> Result<()> {
        if self.built {
            return Err(Error::IllegalState("EOF already built".into()));
        }
        let VolumeSpec {
            kind,
            mut name,
            mapping,
            index,
            source,
            startup,
        } = spec;
        if kind.is_empty() {
            return Err(Error::NotValid("Invalid volume type".into()));
        }
        if name.is_empty() {
            return Err(Error::NotValid("Invalid volume name".into()));
        }
        if !name.starts_with('/') {
            name.insert(0, '/');
        }
        if startup && self.sections.iter().any(|section| section.volume.startup) {
            return Err(Error::NotAllowed(
                "Multiple startup volumes are not allowed".into(),
            ));
        }
        for (field, value) in [
            ("type", &kind),
            ("name", &name),
            ("mapping", &mapping),
            ("index", &index),
        ] {
            if value.len() > u16::MAX as usize {
                return Err(Error::NotValid(format!(
                    "Invalid volume {}: longer than {} bytes",
                    field,
                    u16::MAX
                )));
            }
        }

        let data = match source {
            VolumeSource::Path(path) => read(&path)?,
            VolumeSource::Bytes(bytes) => bytes,
        };
        if data.len() < MIN_VOLUME_SIZE {
            return Err(Error::NotValid(format!(
                "Invalid volume source data: {} bytes, at least {} required",
                data.len(),
                MIN_VOLUME_SIZE
            )));
        }
        if u32::try_from(data.len()).is_err() {
            return Err(Error::NotValid(format!(
                "Invalid volume source data: {} bytes exceed the section size limit",
                data.len()
            )));
        }

        self.sections.push(Section {
            volume: Volume {
                kind,
                name,
                mapping,
                index,
                data,
                startup,
            },
            header: Vec::new(),
        });
        Ok(())
    }

    /// Moves the startup volume to the front, encodes all headers and freezes the container.
    ///
    /// With `validate` set, a container without a startup volume is refused.
    pub fn build(&mut self, validate: bool) -> Result<()> {
        if self.built {
            return Err(Error::IllegalState("EOF already built".into()));
        }
        let startup = self
            .sections
            .iter()
            .position(|section| section.volume.startup);
        if validate && startup.is_none() {
            return Err(Error::NotAllowed("No startup volume".into()));
        }
        if self.sections.len() > MAX_VOLUMES as usize {
            return Err(Error::NotAllowed(format!(
                "{} volumes exceed the limit of {}",
                self.sections.len(),
                MAX_VOLUMES
            )));
        }
        let init_size = u32::try_from(self.init.len())
            .map_err(|_| Error::NotValid("init payload exceeds the section size limit".into()))?;

        // chain order: startup volume first, swapped rather than sorted
        let mut order = (0..self.sections.len()).collect::<Vec<_>>();
        if let Some(startup) = startup {
            order.swap(0, startup);
        }

        let sizes = order
            .iter()
            .map(|&i| section_sizes(&self.sections[i].volume))
            .collect::<Result<Vec<_>>>()?;
        let headers = order
            .iter()
            .enumerate()
            .map(|(position, &i)| {
                let (next_header_size, next_section_size) =
                    sizes.get(position + 1).copied().unwrap_or((0, 0));
                encode_volume_header(
                    &self.sections[i].volume,
                    sizes[position].0,
                    next_header_size,
                    next_section_size,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut header = RootHeader::new_zeroed();
        header.signature = *EOF_SIGNATURE;
        header.version = U16::new(EOF_VERSION);
        header.volumes = U16::new(self.sections.len() as u16);
        if let Some(&(first_header_size, first_section_size)) = sizes.first() {
            header.first_header_size = U32::new(first_header_size);
            header.first_section_size = U32::new(first_section_size);
        }
        header.init_size = U32::new(init_size);

        if let Some(startup) = startup {
            self.sections.swap(0, startup);
        }
        for (section, volume_header) in self.sections.iter_mut().zip(headers) {
            section.header = volume_header;
        }
        // stored back to front so the loader meets volume 0 first when reading from the end
        self.sections.reverse();
        self.header = header.as_bytes().to_vec();
        self.built = true;
        Ok(())
    }

    pub fn is_built(&self) -> bool { self.built }

    /// Volumes in their current order, storage order once built.
    pub fn volumes(&self) -> impl Iterator<Item = &Volume> + '_ {
        self.sections.iter().map(|section| &section.volume)
    }

    pub fn volume_headers(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.sections.iter().map(|section| section.header.as_slice())
    }

    pub fn len(&self) -> usize { self.sections.len() }

    pub fn is_empty(&self) -> bool { self.sections.is_empty() }

    /// The encoded root header, empty before [`build`](EofBuilder::build).
    pub fn header(&self) -> &[u8] { &self.header }

    /// The container as a sequence of byte chunks in file order.
    pub fn to_stream(&self) -> Result<impl Iterator<Item = &[u8]> + '_> {
        if !self.built {
            return Err(Error::IllegalState("EOF is not built".into()));
        }
        Ok(self
            .sections
            .iter()
            .flat_map(|section| [section.header.as_slice(), section.volume.data.as_slice()])
            .chain(once(self.init.as_slice()))
            .chain(once(self.header.as_slice())))
    }

    /// Total number of bytes [`to_stream`](EofBuilder::to_stream) produces.
    pub fn stream_size(&self) -> Result<u64> {
        Ok(self.to_stream()?.map(|chunk| chunk.len() as u64).sum())
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<u64> {
        let mut written = 0;
        for chunk in self.to_stream()? {
            writer.write_all(chunk)?;
            written += chunk.len() as u64;
        }
        writer.flush()?;
        Ok(written)
    }
}

fn volume_header_size(volume: &Volume) -> usize {
    VOLUME_HEADER_FIXED_SIZE
        + string_size(&volume.name)
        + string_size(&volume.kind)
        + string_size(&volume.mapping)
        + string_size(&volume.index)
}

fn section_sizes(volume: &Volume) -> Result<(u32, u32)> {
    let too_large = || Error::NotValid(format!("volume {} exceeds the section size limit", volume.name));
    let header_size = u32::try_from(volume_header_size(volume)).map_err(|_| too_large())?;
    let section_size = u32::try_from(volume.data.len())
        .ok()
        .and_then(|data_size| data_size.checked_add(header_size))
        .ok_or_else(too_large)?;
    Ok((header_size, section_size))
}

fn encode_volume_header(
    volume: &Volume, header_size: u32, next_header_size: u32, next_section_size: u32,
) -> Result<Vec<u8>> {
    let mut fixed = VolumeHeader::new_zeroed();
    fixed.header_size = U32::new(header_size);
    fixed.data_size = U32::new(volume.data.len() as u32);
    fixed.next_header_size = U32::new(next_header_size);
    fixed.next_section_size = U32::new(next_section_size);

    let mut writer = SectionWriter::with_capacity(header_size as usize);
    writer.bytes(fixed.as_bytes());
    writer
        .string(&volume.name)?
        .string(&volume.kind)?
        .string(&volume.mapping)?
        .string(&volume.index)?;
    debug_assert_eq!(writer.len(), header_size as usize);
    Ok(writer.into_inner())
}
