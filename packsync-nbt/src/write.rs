use std::io::Write;

use crate::tag::{Compound, Tag, TagType};
use crate::{NbtError, mutf8};

pub(crate) struct Writer<W> {
    inner: W,
}

impl<W: Write> Writer<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner }
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }

    pub(crate) fn write_root(&mut self, name: &str, tag: &Tag) -> Result<(), NbtError> {
        self.inner.write_all(&[tag.tag_type().id()])?;
        self.string(name)?;
        self.payload(tag)
    }

    fn payload(&mut self, tag: &Tag) -> Result<(), NbtError> {
        match tag {
            Tag::Byte(value) => self.inner.write_all(&value.to_be_bytes())?,
            Tag::Short(value) => self.inner.write_all(&value.to_be_bytes())?,
            Tag::Int(value) => self.inner.write_all(&value.to_be_bytes())?,
            Tag::Long(value) => self.inner.write_all(&value.to_be_bytes())?,
            Tag::Float(value) => self.inner.write_all(&value.to_be_bytes())?,
            Tag::Double(value) => self.inner.write_all(&value.to_be_bytes())?,
            Tag::ByteArray(values) => {
                self.length(values.len())?;
                let bytes: Vec<u8> = values.iter().map(|b| *b as u8).collect();
                self.inner.write_all(&bytes)?;
            }
            Tag::String(value) => self.string(value)?,
            Tag::List(values) => self.list(values)?,
            Tag::Compound(compound) => self.compound(compound)?,
            Tag::IntArray(values) => {
                self.length(values.len())?;
                for value in values {
                    self.inner.write_all(&value.to_be_bytes())?;
                }
            }
            Tag::LongArray(values) => {
                self.length(values.len())?;
                for value in values {
                    self.inner.write_all(&value.to_be_bytes())?;
                }
            }
        }
        Ok(())
    }

    fn list(&mut self, values: &[Tag]) -> Result<(), NbtError> {
        let Some(element_type) = list_element_type(values) else {
            self.inner.write_all(&[TagType::END])?;
            return self.length(0);
        };
        self.inner.write_all(&[element_type.id()])?;
        self.length(values.len())?;

        for value in values {
            if element_type == TagType::Compound && needs_wrap(value) {
                self.payload(&value.clone().wrap())?;
            } else {
                self.payload(value)?;
            }
        }
        Ok(())
    }

    fn compound(&mut self, compound: &Compound) -> Result<(), NbtError> {
        for (key, value) in compound.iter() {
            self.inner.write_all(&[value.tag_type().id()])?;
            self.string(key)?;
            self.payload(value)?;
        }
        self.inner.write_all(&[TagType::END])?;
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<(), NbtError> {
        let bytes = mutf8::encode(value);
        let len = u16::try_from(bytes.len()).map_err(|_| NbtError::StringTooLong(bytes.len()))?;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(&bytes)?;
        Ok(())
    }

    fn length(&mut self, len: usize) -> Result<(), NbtError> {
        let len = i32::try_from(len).map_err(|_| NbtError::TooLong(len))?;
        self.inner.write_all(&len.to_be_bytes())?;
        Ok(())
    }
}

/// Element type a list is written with: the common variant when the list is
/// homogeneous, COMPOUND otherwise.
pub(crate) fn list_element_type(values: &[Tag]) -> Option<TagType> {
    let first = values.first()?.tag_type();
    if values.iter().all(|v| v.tag_type() == first) {
        Some(first)
    } else {
        Some(TagType::Compound)
    }
}

/// A value inside a COMPOUND-typed list that would not survive the read-side
/// unwrap unchanged. Bare values are wrapped; a compound already shaped like
/// a wrapper is wrapped once more so unwrapping restores it exactly.
fn needs_wrap(value: &Tag) -> bool {
    value.tag_type() != TagType::Compound || value.is_wrapped()
}
