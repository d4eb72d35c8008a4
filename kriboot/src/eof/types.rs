pub use zerocopy::{FromBytes, FromZeros, IntoBytes};
use zerocopy::{
    byteorder::big_endian::{U16, U32},
    Immutable, KnownLayout, Unaligned,
};

pub const EOF_SIGNATURE: &[u8; 12] = b"nodeadonekri";
pub const EOF_HEADER_SIZE: usize = 64;
pub const EOF_VERSION: u16 = 1;
/// Version of the globals handed to the init script.
pub const LOADER_VERSION: u16 = 1;
pub const MAX_VOLUMES: u16 = 64;
pub const MIN_VOLUME_SIZE: usize = 128;
pub const DEFAULT_INDEX: &str = "index.js";

/// Size of the fixed part of a volume header, the strings start right after it.
pub const VOLUME_HEADER_FIXED_SIZE: usize = 24;
pub const STRINGS_OFFSET: usize = VOLUME_HEADER_FIXED_SIZE;

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct RootHeader {
    pub signature:          [u8; 12],
    pub version:            U16,
    pub volumes:            U16,
    pub first_header_size:  U32,
    pub first_section_size: U32,
    pub init_size:          U32,
    pub reserved:           [u8; 36],
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct VolumeHeader {
    pub header_size:       U32,
    pub data_size:         U32,
    pub reserved_1:        U32,
    pub reserved_2:        U32,
    pub next_header_size:  U32,
    pub next_section_size: U32,
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn layouts_match_the_wire_format() {
        assert_eq!(size_of::<RootHeader>(), EOF_HEADER_SIZE);
        assert_eq!(size_of::<VolumeHeader>(), VOLUME_HEADER_FIXED_SIZE);
    }

    #[test]
    fn root_header_fields_are_big_endian() {
        let mut header = RootHeader::new_zeroed();
        header.signature = *EOF_SIGNATURE;
        header.version = U16::new(EOF_VERSION);
        header.volumes = U16::new(2);
        header.first_header_size = U32::new(0x0102_0304);
        header.init_size = U32::new(7);
        let bytes = header.as_bytes();
        assert_eq!(&bytes[0..12], b"nodeadonekri");
        assert_eq!(&bytes[12..14], &[0, 1]);
        assert_eq!(&bytes[14..16], &[0, 2]);
        assert_eq!(&bytes[16..20], &[1, 2, 3, 4]);
        assert_eq!(&bytes[24..28], &[0, 0, 0, 7]);
        assert!(bytes[28..].iter().all(|&b| b == 0));
    }
}
