use std::io::Read;

use crate::tag::{Compound, Tag, TagType};
use crate::{MAX_DEPTH, NbtError, mutf8};

/// Upper bound on capacity reserved from an untrusted length prefix.
/// Larger sequences grow as their data actually arrives.
const PREALLOC_LIMIT: usize = 4096;

pub(crate) struct Reader<R> {
    inner: R,
    depth: usize,
}

impl<R: Read> Reader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, depth: 0 }
    }

    /// Reads `(id, name, payload)` for a root document.
    pub(crate) fn read_root(&mut self) -> Result<(String, Tag), NbtError> {
        let id = self.u8()?;
        let tag_type = TagType::require(id)?;
        let name = self.string()?;
        let tag = self.payload(tag_type)?;
        Ok((name, tag))
    }

    fn payload(&mut self, tag_type: TagType) -> Result<Tag, NbtError> {
        Ok(match tag_type {
            TagType::Byte => Tag::Byte(self.u8()? as i8),
            TagType::Short => Tag::Short(i16::from_be_bytes(self.array()?)),
            TagType::Int => Tag::Int(self.i32()?),
            TagType::Long => Tag::Long(i64::from_be_bytes(self.array()?)),
            TagType::Float => Tag::Float(f32::from_be_bytes(self.array()?)),
            TagType::Double => Tag::Double(f64::from_be_bytes(self.array()?)),
            TagType::ByteArray => {
                let len = self.length("byte array")?;
                let bytes = self.bytes(len)?;
                Tag::ByteArray(bytes.into_iter().map(|b| b as i8).collect())
            }
            TagType::String => Tag::String(self.string()?),
            TagType::List => self.nested(Self::list)?,
            TagType::Compound => Tag::Compound(self.nested(Self::compound)?),
            TagType::IntArray => {
                let len = self.length("int array")?;
                let mut values = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                for _ in 0..len {
                    values.push(self.i32()?);
                }
                Tag::IntArray(values)
            }
            TagType::LongArray => {
                let len = self.length("long array")?;
                let mut values = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                for _ in 0..len {
                    values.push(i64::from_be_bytes(self.array()?));
                }
                Tag::LongArray(values)
            }
        })
    }

    fn nested<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, NbtError>,
    ) -> Result<T, NbtError> {
        if self.depth >= MAX_DEPTH {
            return Err(NbtError::TooDeep);
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn list(&mut self) -> Result<Tag, NbtError> {
        let id = self.u8()?;
        let count = self.i32()?;
        if count < 0 {
            return Err(NbtError::NegativeLength {
                what: "list",
                len: count,
            });
        }
        if count == 0 {
            return Ok(Tag::List(Vec::new()));
        }
        let element_type = TagType::require(id)?;
        let mut values = Vec::with_capacity((count as usize).min(PREALLOC_LIMIT));
        for _ in 0..count {
            let element = self.payload(element_type)?;
            values.push(element.unwrap_wrapped());
        }
        Ok(Tag::List(values))
    }

    fn compound(&mut self) -> Result<Compound, NbtError> {
        let mut compound = Compound::new();
        loop {
            let id = self.u8()?;
            if id == TagType::END {
                return Ok(compound);
            }
            let tag_type = TagType::require(id)?;
            let key = self.string()?;
            let value = self.payload(tag_type)?;
            compound.insert(key, value);
        }
    }

    fn string(&mut self) -> Result<String, NbtError> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        let bytes = self.bytes(len)?;
        mutf8::decode(&bytes)
    }

    /// Reads exactly `len` bytes without trusting `len` for the allocation.
    fn bytes(&mut self, len: usize) -> Result<Vec<u8>, NbtError> {
        let mut bytes = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        (&mut self.inner).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(bytes)
    }

    fn length(&mut self, what: &'static str) -> Result<usize, NbtError> {
        let len = self.i32()?;
        if len < 0 {
            return Err(NbtError::NegativeLength { what, len });
        }
        Ok(len as usize)
    }

    fn u8(&mut self) -> Result<u8, NbtError> {
        let [b] = self.array()?;
        Ok(b)
    }

    fn i32(&mut self) -> Result<i32, NbtError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], NbtError> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}
