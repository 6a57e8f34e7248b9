//! Binary tagged-value documents.
//!
//! A document is a tree of [`Tag`] values with a [`Compound`] at the root,
//! written big-endian with length-prefixed strings and arrays. This is the
//! format of the game's `servers.dat`.
//!
//! Lists on the wire have a single element type. A heterogeneous list is
//! written as a COMPOUND list with each element wrapped as `{"": value}`, and
//! reading unwraps every such element again, so `from_bytes(to_bytes(x)) == x`
//! holds for mixed lists too.
//!
//! Gzip wrapping is a storage choice and is not recorded in the format;
//! callers pick [`read`]/[`write`] or [`read_compressed`]/[`write_compressed`].

use std::io::{BufReader, BufWriter, Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;

mod mutf8;
mod read;
mod tag;
mod text;
mod write;

pub use tag::{Compound, Tag, TagType};

/// Nesting limit for lists and compounds while decoding.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown tag type {0}")]
    UnknownTag(u8),
    #[error("negative {what} length: {len}")]
    NegativeLength { what: &'static str, len: i32 },
    #[error("root tag must be a compound, found {0:?}")]
    RootNotCompound(TagType),
    #[error("string is not valid modified UTF-8")]
    InvalidString,
    #[error("string of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),
    #[error("sequence of {0} elements is too long")]
    TooLong(usize),
    #[error("document nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,
}

/// Reads an uncompressed document whose root is a compound.
pub fn read<R: Read>(reader: R) -> Result<Compound, NbtError> {
    let (_, tag) = read::Reader::new(BufReader::new(reader)).read_root()?;
    match tag {
        Tag::Compound(compound) => Ok(compound),
        other => Err(NbtError::RootNotCompound(other.tag_type())),
    }
}

/// Reads a gzip-wrapped document.
pub fn read_compressed<R: Read>(reader: R) -> Result<Compound, NbtError> {
    read(GzDecoder::new(BufReader::new(reader)))
}

/// Reads a root tag of any type together with its name.
pub fn read_named<R: Read>(reader: R) -> Result<(String, Tag), NbtError> {
    read::Reader::new(BufReader::new(reader)).read_root()
}

/// Writes `root` as an uncompressed document with an empty root name.
pub fn write<W: Write>(writer: W, root: &Compound) -> Result<(), NbtError> {
    write_named(writer, "", &Tag::Compound(root.clone()))
}

/// Writes `root` wrapped in gzip.
pub fn write_compressed<W: Write>(writer: W, root: &Compound) -> Result<(), NbtError> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    write(&mut encoder, root)?;
    encoder.finish()?;
    Ok(())
}

pub fn write_named<W: Write>(writer: W, name: &str, tag: &Tag) -> Result<(), NbtError> {
    let mut writer = write::Writer::new(BufWriter::new(writer));
    writer.write_root(name, tag)?;
    writer.into_inner().flush()?;
    Ok(())
}

pub fn from_bytes(bytes: &[u8]) -> Result<Compound, NbtError> {
    read(bytes)
}

pub fn to_bytes(root: &Compound) -> Result<Vec<u8>, NbtError> {
    let mut out = Vec::new();
    write(&mut out, root)?;
    Ok(out)
}
