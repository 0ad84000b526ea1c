//! Binary log codec
//!
//! All values are little-endian. Lengths and indices are `u64`, Vulkan enums
//! their raw `i32`, Vulkan flags their raw `u32`, booleans a `u32` holding 0 or
//! 1 and floats their `f32` bit pattern. Strings and byte vectors are a `u64`
//! length followed by the bytes.

use ash::vk;

use crate::error::MalformedLog;

/// Append-only writer for log records
#[derive(Debug, Clone, Default)]
pub struct LogWriter {
    buffer: Vec<u8>,
}

impl LogWriter {
    /// Writer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a `u32`
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a `u64`
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an `i32`
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append the bit pattern of an `f32`
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Append a boolean as `u32` 0 or 1
    pub fn write_bool(&mut self, value: bool) {
        self.write_u32(u32::from(value));
    }

    /// Append a length prefix
    pub fn write_len(&mut self, len: usize) {
        self.write_u64(len as u64);
    }

    /// Length-prefixed byte vector
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_len(bytes.len());
        self.buffer.extend_from_slice(bytes);
    }

    /// Length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Encode any value
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) {
        value.encode(self);
    }
}

/// Cursor over a log produced by [`LogWriter`]
#[derive(Debug, Clone)]
pub struct LogReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> LogReader<'a> {
    /// Reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current byte offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Whether the whole stream has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], MalformedLog> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(MalformedLog::Truncated {
                offset: self.offset,
                needed,
                remaining,
            });
        }
        let bytes = &self.data[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], MalformedLog> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    /// Read a `u32`
    pub fn read_u32(&mut self) -> Result<u32, MalformedLog> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Read a `u64`
    pub fn read_u64(&mut self) -> Result<u64, MalformedLog> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Read an `i32`
    pub fn read_i32(&mut self) -> Result<i32, MalformedLog> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Read an `f32` from its bit pattern
    pub fn read_f32(&mut self) -> Result<f32, MalformedLog> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read a boolean, rejecting values other than 0 and 1
    pub fn read_bool(&mut self) -> Result<bool, MalformedLog> {
        let offset = self.offset;
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(MalformedLog::InvalidBool { offset, value }),
        }
    }

    /// Read a length prefix
    ///
    /// A length that cannot be addressed on this platform is reported as
    /// truncation, since no stream can hold that many bytes.
    pub fn read_len(&mut self) -> Result<usize, MalformedLog> {
        let offset = self.offset;
        let len = self.read_u64()?;
        usize::try_from(len).map_err(|_| MalformedLog::Truncated {
            offset,
            needed: usize::MAX,
            remaining: self.remaining(),
        })
    }

    /// Length-prefixed byte vector
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, MalformedLog> {
        let len = self.read_len()?;
        self.take(len).map(<[u8]>::to_vec)
    }

    /// Length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, MalformedLog> {
        let offset = self.offset;
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| MalformedLog::InvalidUtf8 { offset })
    }

    /// Decode any value
    pub fn read<T: Decode>(&mut self) -> Result<T, MalformedLog> {
        T::decode(self)
    }
}

/// Serialization into a log
pub trait Encode {
    /// Append `self` to the writer
    fn encode(&self, writer: &mut LogWriter);
}

/// Deserialization from a log
pub trait Decode: Sized {
    /// Read a value from the reader
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog>;
}

impl Encode for u32 {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_u32(*self);
    }
}

impl Decode for u32 {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        reader.read_u32()
    }
}

impl Encode for u64 {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_u64(*self);
    }
}

impl Decode for u64 {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        reader.read_u64()
    }
}

impl Encode for bool {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_bool(*self);
    }
}

impl Decode for bool {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        reader.read_bool()
    }
}

impl Encode for f32 {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_f32(*self);
    }
}

impl Decode for f32 {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        reader.read_f32()
    }
}

impl Encode for str {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_str(self);
    }
}

impl Encode for String {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_str(self);
    }
}

impl Decode for String {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        reader.read_string()
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_len(self.len());
        for item in self {
            item.encode(writer);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, writer: &mut LogWriter) {
        self.as_slice().encode(writer);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        let len = reader.read_len()?;
        // Every element takes at least one byte; never trust a length past that.
        let mut items = Vec::with_capacity(len.min(reader.remaining()));
        for _ in 0..len {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

macro_rules! vk_enum_codec {
    ($($ty:ty),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(&self, writer: &mut LogWriter) {
                writer.write_i32(self.as_raw());
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
                reader.read_i32().map(<$ty>::from_raw)
            }
        }
    )*};
}

macro_rules! vk_flags_codec {
    ($($ty:ty),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(&self, writer: &mut LogWriter) {
                writer.write_u32(self.as_raw());
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
                reader.read_u32().map(<$ty>::from_raw)
            }
        }
    )*};
}

vk_enum_codec!(
    vk::Format,
    vk::AttachmentLoadOp,
    vk::AttachmentStoreOp,
    vk::VertexInputRate,
    vk::PrimitiveTopology,
    vk::PolygonMode,
    vk::FrontFace,
    vk::StencilOp,
    vk::CompareOp,
    vk::BlendFactor,
    vk::BlendOp,
    vk::LogicOp,
);

vk_flags_codec!(
    vk::ShaderStageFlags,
    vk::SampleCountFlags,
    vk::ImageUsageFlags,
    vk::CullModeFlags,
    vk::ColorComponentFlags,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut writer = LogWriter::default();
        writer.write_u32(1);
        writer.write_u64(2);
        writer.write_bool(true);
        writer.write_str("ab");

        assert_eq!(
            writer.as_bytes(),
            [1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, b'a', b'b']
        );
    }

    #[test]
    fn test_vk_values_use_raw_representation() {
        let mut writer = LogWriter::default();
        writer.write(&vk::Format::D32_SFLOAT);
        writer.write(&(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT));

        let mut reader = LogReader::new(writer.as_bytes());
        assert_eq!(reader.read_i32().unwrap(), vk::Format::D32_SFLOAT.as_raw());
        assert_eq!(
            reader.read::<vk::ShaderStageFlags>().unwrap(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert!(reader.is_empty());
    }

    #[test]
    fn test_short_read_reports_truncation() {
        let mut reader = LogReader::new(&[1, 2, 3]);

        assert_eq!(
            reader.read_u32(),
            Err(MalformedLog::Truncated {
                offset: 0,
                needed: 4,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_invalid_bool_and_utf8() {
        let mut reader = LogReader::new(&[2, 0, 0, 0]);
        assert_eq!(reader.read_bool(), Err(MalformedLog::InvalidBool { offset: 0, value: 2 }));

        let mut writer = LogWriter::default();
        writer.write_bytes(&[0xff, 0xfe]);
        let mut reader = LogReader::new(writer.as_bytes());
        assert_eq!(reader.read_string(), Err(MalformedLog::InvalidUtf8 { offset: 0 }));
    }

    #[test]
    fn test_oversized_length_does_not_allocate() {
        let mut writer = LogWriter::default();
        writer.write_u64(u64::from(u32::MAX));
        let mut reader = LogReader::new(writer.as_bytes());

        assert!(matches!(reader.read::<Vec<u32>>(), Err(MalformedLog::Truncated { .. })));
    }
}
