use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Write,
    Read,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StreamError {
    #[error("stream overrun: {requested} bits requested at bit {processed} of {available}")]
    Overrun {
        requested: u32,
        processed: usize,
        available: usize,
    },
    #[error("decoded value {value} outside range [{min}, {max}]")]
    ValueOutOfRange { value: i64, min: i64, max: i64 },
}

/// Bit-level codec driven by a single schema in both directions: every
/// `serialize_*` call takes the value by `&mut` and branches on the stream
/// mode, so the same routine that writes a packet also reads it back and
/// consumes exactly the same number of bits.
///
/// Bits are packed MSB-first within each 32-bit word; words are emitted
/// big-endian so the byte stream matches wire order.
#[derive(Debug)]
pub struct Stream {
    mode: StreamMode,
    words: Vec<u32>,
    scratch: u64,
    scratch_bits: u32,
    word_index: usize,
    bits_processed: usize,
    num_bits: usize,
}

pub fn bits_required(range: u32) -> u32 {
    if range == 0 { 0 } else { 32 - range.leading_zeros() }
}

impl Stream {
    pub fn writer() -> Self {
        Self {
            mode: StreamMode::Write,
            words: Vec::new(),
            scratch: 0,
            scratch_bits: 0,
            word_index: 0,
            bits_processed: 0,
            num_bits: 0,
        }
    }

    pub fn reader(bytes: &[u8]) -> Self {
        let mut words = Vec::with_capacity(bytes.len().div_ceil(4));
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            words.push(u32::from_be_bytes(word));
        }
        Self {
            mode: StreamMode::Read,
            words,
            scratch: 0,
            scratch_bits: 0,
            word_index: 0,
            bits_processed: 0,
            num_bits: bytes.len() * 8,
        }
    }

    pub fn is_writing(&self) -> bool {
        self.mode == StreamMode::Write
    }

    pub fn is_reading(&self) -> bool {
        self.mode == StreamMode::Read
    }

    pub fn bits_processed(&self) -> usize {
        self.bits_processed
    }

    pub fn bytes_processed(&self) -> usize {
        self.bits_processed.div_ceil(8)
    }

    /// Writes any pending partial word, zero-padded at the tail. No-op when
    /// reading.
    pub fn flush(&mut self) {
        if self.is_writing() && self.scratch_bits > 0 {
            let word = (self.scratch << (32 - self.scratch_bits)) as u32;
            self.words.push(word);
            self.scratch = 0;
            self.scratch_bits = 0;
        }
    }

    /// Finished wire bytes. Call `flush` first.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush();
        let mut bytes = Vec::with_capacity(self.words.len() * 4);
        for word in &self.words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    fn write_bits(&mut self, value: u32, bits: u32) {
        debug_assert!(bits >= 1 && bits <= 32);
        let masked = if bits == 32 {
            value as u64
        } else {
            value as u64 & ((1u64 << bits) - 1)
        };
        self.scratch = (self.scratch << bits) | masked;
        self.scratch_bits += bits;
        while self.scratch_bits >= 32 {
            let word = (self.scratch >> (self.scratch_bits - 32)) as u32;
            self.words.push(word);
            self.scratch_bits -= 32;
            if self.scratch_bits > 0 {
                self.scratch &= (1u64 << self.scratch_bits) - 1;
            } else {
                self.scratch = 0;
            }
        }
        self.bits_processed += bits as usize;
    }

    fn read_bits(&mut self, bits: u32) -> Result<u32, StreamError> {
        debug_assert!(bits >= 1 && bits <= 32);
        if self.bits_processed + bits as usize > self.num_bits {
            return Err(StreamError::Overrun {
                requested: bits,
                processed: self.bits_processed,
                available: self.num_bits,
            });
        }
        while self.scratch_bits < bits {
            let word = self.words[self.word_index];
            self.word_index += 1;
            self.scratch = (self.scratch << 32) | word as u64;
            self.scratch_bits += 32;
        }
        let value = (self.scratch >> (self.scratch_bits - bits)) as u32;
        self.scratch_bits -= bits;
        if self.scratch_bits > 0 {
            self.scratch &= (1u64 << self.scratch_bits) - 1;
        } else {
            self.scratch = 0;
        }
        self.bits_processed += bits as usize;
        let value = if bits == 32 {
            value
        } else {
            value & ((1u32 << bits) - 1)
        };
        Ok(value)
    }

    pub fn serialize_bits(&mut self, value: &mut u32, bits: u32) -> Result<(), StreamError> {
        match self.mode {
            StreamMode::Write => {
                self.write_bits(*value, bits);
                Ok(())
            }
            StreamMode::Read => {
                *value = self.read_bits(bits)?;
                Ok(())
            }
        }
    }

    pub fn serialize_int(
        &mut self,
        value: &mut i32,
        min: i32,
        max: i32,
    ) -> Result<(), StreamError> {
        assert!(min < max);
        let range = (max as i64 - min as i64) as u32;
        let bits = bits_required(range);
        match self.mode {
            StreamMode::Write => {
                assert!(
                    *value >= min && *value <= max,
                    "serialize_int: {} outside [{}, {}]",
                    value,
                    min,
                    max
                );
                let unsigned = (*value as i64 - min as i64) as u32;
                self.write_bits(unsigned, bits);
                Ok(())
            }
            StreamMode::Read => {
                let unsigned = self.read_bits(bits)?;
                let decoded = min as i64 + unsigned as i64;
                if decoded > max as i64 {
                    return Err(StreamError::ValueOutOfRange {
                        value: decoded,
                        min: min as i64,
                        max: max as i64,
                    });
                }
                *value = decoded as i32;
                Ok(())
            }
        }
    }

    pub fn serialize_bool(&mut self, value: &mut bool) -> Result<(), StreamError> {
        let mut bit = *value as u32;
        self.serialize_bits(&mut bit, 1)?;
        *value = bit != 0;
        Ok(())
    }

    pub fn serialize_u16(&mut self, value: &mut u16) -> Result<(), StreamError> {
        let mut raw = *value as u32;
        self.serialize_bits(&mut raw, 16)?;
        *value = raw as u16;
        Ok(())
    }

    pub fn serialize_u32(&mut self, value: &mut u32) -> Result<(), StreamError> {
        self.serialize_bits(value, 32)
    }

    pub fn serialize_float(&mut self, value: &mut f32) -> Result<(), StreamError> {
        let mut raw = value.to_bits();
        self.serialize_bits(&mut raw, 32)?;
        *value = f32::from_bits(raw);
        Ok(())
    }

    pub fn serialize_vector(&mut self, value: &mut Vec3) -> Result<(), StreamError> {
        self.serialize_float(&mut value.x)?;
        self.serialize_float(&mut value.y)?;
        self.serialize_float(&mut value.z)?;
        Ok(())
    }

    pub fn serialize_quaternion(&mut self, value: &mut Quat) -> Result<(), StreamError> {
        let mut q = [value.x, value.y, value.z, value.w];
        for component in &mut q {
            self.serialize_float(component)?;
        }
        *value = Quat::from_xyzw(q[0], q[1], q[2], q[3]);
        Ok(())
    }

    pub fn serialize_compressed_vector(
        &mut self,
        value: &mut Vec3,
        min: Vec3,
        max: Vec3,
        resolution: f32,
    ) -> Result<(), StreamError> {
        debug_assert!(resolution > 0.0);
        let min_arr = min.to_array();
        let max_arr = max.to_array();
        let mut out = value.to_array();
        for i in 0..3 {
            let steps = ((max_arr[i] - min_arr[i]) / resolution).ceil() as i32;
            let mut integer = 0i32;
            if self.is_writing() {
                let clamped = out[i].clamp(min_arr[i], max_arr[i]);
                integer = ((clamped - min_arr[i]) / resolution).round() as i32;
                integer = integer.min(steps);
            }
            self.serialize_int(&mut integer, 0, steps)?;
            out[i] = min_arr[i] + integer as f32 * resolution;
        }
        *value = Vec3::from_array(out);
        Ok(())
    }

    /// Smallest-three unit quaternion codec. The largest-magnitude component
    /// is dropped (its sign is forced positive by negating the whole
    /// quaternion if needed, since q and -q denote the same rotation) and the
    /// remaining three, each in [-1/sqrt(2), +1/sqrt(2)], are sent as ranged
    /// ints over [-M, +M] with M = (1 << bits) - 1.
    pub fn serialize_compressed_quaternion(
        &mut self,
        value: &mut Quat,
        bits: u32,
    ) -> Result<(), StreamError> {
        debug_assert!(bits >= 2 && bits <= 16);
        let max_integer = ((1u32 << bits) - 1) as i32;
        let scale = core::f32::consts::SQRT_2 * max_integer as f32;

        let mut largest: u32 = 0;
        let mut integers = [0i32; 3];

        if self.is_writing() {
            let q = [value.x, value.y, value.z, value.w];
            for i in 1..4 {
                if q[i].abs() > q[largest as usize].abs() {
                    largest = i as u32;
                }
            }
            let sign = if q[largest as usize] < 0.0 { -1.0 } else { 1.0 };
            let mut slot = 0;
            for (i, component) in q.iter().enumerate() {
                if i == largest as usize {
                    continue;
                }
                let scaled = (component * sign * scale).round() as i32;
                integers[slot] = scaled.clamp(-max_integer, max_integer);
                slot += 1;
            }
        }

        self.serialize_bits(&mut largest, 2)?;
        for integer in &mut integers {
            self.serialize_int(integer, -max_integer, max_integer)?;
        }

        if self.is_reading() {
            let inv_scale = 1.0 / scale;
            let a = integers[0] as f32 * inv_scale;
            let b = integers[1] as f32 * inv_scale;
            let c = integers[2] as f32 * inv_scale;
            let d = (1.0 - a * a - b * b - c * c).max(0.0).sqrt();
            *value = match largest {
                0 => Quat::from_xyzw(d, a, b, c),
                1 => Quat::from_xyzw(a, d, b, c),
                2 => Quat::from_xyzw(a, b, d, c),
                _ => Quat::from_xyzw(a, b, c, d),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX_ITEMS: usize = 16;

    // Mixed-schema object exercising every scalar op through one routine.
    #[derive(Debug, Default, PartialEq)]
    struct TestObject {
        a: i32,
        b: i32,
        c: i32,
        d: u32,
        e: u32,
        f: u32,
        g: bool,
        num_items: i32,
        items: [u32; MAX_ITEMS],
    }

    impl TestObject {
        fn init() -> Self {
            let mut items = [0u32; MAX_ITEMS];
            let num_items = MAX_ITEMS as i32 / 2;
            for (i, item) in items.iter_mut().enumerate().take(num_items as usize) {
                *item = i as u32 + 10;
            }
            Self {
                a: 1,
                b: -2,
                c: 150,
                d: 55,
                e: 255,
                f: 127,
                g: true,
                num_items,
                items,
            }
        }

        fn serialize(&mut self, stream: &mut Stream) -> Result<(), StreamError> {
            stream.serialize_int(&mut self.a, 0, 10)?;
            stream.serialize_int(&mut self.b, -5, 5)?;
            stream.serialize_int(&mut self.c, -100, 10000)?;

            stream.serialize_bits(&mut self.d, 6)?;
            stream.serialize_bits(&mut self.e, 8)?;
            stream.serialize_bits(&mut self.f, 7)?;

            stream.serialize_bool(&mut self.g)?;

            stream.serialize_int(&mut self.num_items, 0, MAX_ITEMS as i32 - 1)?;
            for i in 0..self.num_items as usize {
                stream.serialize_bits(&mut self.items[i], 8)?;
            }
            Ok(())
        }
    }

    #[test]
    fn mixed_schema_roundtrip() {
        let mut written = TestObject::init();
        let mut stream = Stream::writer();
        written.serialize(&mut stream).unwrap();
        let bytes = stream.into_bytes();

        let mut read_back = TestObject::default();
        let mut stream = Stream::reader(&bytes);
        read_back.serialize(&mut stream).unwrap();

        assert_eq!(written, read_back);
    }

    #[test]
    fn write_and_read_consume_same_bits() {
        let mut written = TestObject::init();
        let mut writer = Stream::writer();
        written.serialize(&mut writer).unwrap();
        let written_bits = writer.bits_processed();
        let bytes = writer.into_bytes();

        let mut read_back = TestObject::default();
        let mut reader = Stream::reader(&bytes);
        read_back.serialize(&mut reader).unwrap();

        assert_eq!(written_bits, reader.bits_processed());
    }

    #[test]
    fn read_past_end_is_an_error() {
        let mut stream = Stream::writer();
        let mut value = 0xABu32;
        stream.serialize_bits(&mut value, 8).unwrap();
        let bytes = stream.into_bytes();

        // flush pads to a word, so exhaust it then overrun
        let mut stream = Stream::reader(&bytes);
        let mut out = 0u32;
        stream.serialize_bits(&mut out, 32).unwrap();
        assert!(matches!(
            stream.serialize_bits(&mut out, 1),
            Err(StreamError::Overrun { .. })
        ));
    }

    #[test]
    fn float_vector_roundtrip_is_bitwise() {
        let mut v = Vec3::new(1.5, -202.25, 0.000123);
        let mut stream = Stream::writer();
        stream.serialize_vector(&mut v).unwrap();
        let bytes = stream.into_bytes();

        let mut out = Vec3::ZERO;
        let mut stream = Stream::reader(&bytes);
        stream.serialize_vector(&mut out).unwrap();
        assert_eq!(v, out);
    }

    #[test]
    fn compressed_vector_respects_resolution() {
        let min = Vec3::splat(-10.0);
        let max = Vec3::splat(10.0);
        let mut v = Vec3::new(1.2345, -9.8765, 0.5);

        let mut stream = Stream::writer();
        stream
            .serialize_compressed_vector(&mut v, min, max, 0.001)
            .unwrap();
        let bytes = stream.into_bytes();

        let mut out = Vec3::ZERO;
        let mut stream = Stream::reader(&bytes);
        stream
            .serialize_compressed_vector(&mut out, min, max, 0.001)
            .unwrap();

        assert!((out - Vec3::new(1.2345, -9.8765, 0.5)).abs().max_element() <= 0.001);
    }

    #[test]
    fn quaternion_sign_pair_encodes_identically() {
        let mut positive = Quat::from_xyzw(1.0, 0.0, 0.0, 0.0);
        let mut negative = Quat::from_xyzw(-1.0, 0.0, 0.0, 0.0);

        let mut a = Stream::writer();
        a.serialize_compressed_quaternion(&mut positive, 9).unwrap();
        let mut b = Stream::writer();
        b.serialize_compressed_quaternion(&mut negative, 9).unwrap();

        let bytes_a = a.into_bytes();
        assert_eq!(bytes_a, b.into_bytes());

        let mut decoded = Quat::IDENTITY;
        let mut reader = Stream::reader(&bytes_a);
        reader
            .serialize_compressed_quaternion(&mut decoded, 9)
            .unwrap();
        assert_eq!(decoded, Quat::from_xyzw(1.0, 0.0, 0.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_serialize_int_roundtrip(min in -100_000i32..100_000, span in 1i32..200_000, offset in 0i32..200_000) {
            let max = min.saturating_add(span);
            let value = min + offset % (span + 1);

            let mut written = value;
            let mut stream = Stream::writer();
            stream.serialize_int(&mut written, min, max).unwrap();
            let bytes = stream.into_bytes();

            let mut read_back = 0i32;
            let mut stream = Stream::reader(&bytes);
            stream.serialize_int(&mut read_back, min, max).unwrap();
            prop_assert_eq!(read_back, value);
        }

        #[test]
        fn prop_serialize_bits_roundtrip(value: u32, bits in 1u32..=32) {
            let expected = if bits == 32 { value } else { value & ((1 << bits) - 1) };

            let mut written = value;
            let mut stream = Stream::writer();
            stream.serialize_bits(&mut written, bits).unwrap();
            let bytes = stream.into_bytes();

            let mut read_back = 0u32;
            let mut stream = Stream::reader(&bytes);
            stream.serialize_bits(&mut read_back, bits).unwrap();
            prop_assert_eq!(read_back, expected);
        }

        #[test]
        fn prop_compressed_quaternion_same_rotation(x in -1.0f32..1.0, y in -1.0f32..1.0, z in -1.0f32..1.0, w in -1.0f32..1.0) {
            let length = (x * x + y * y + z * z + w * w).sqrt();
            prop_assume!(length > 1e-3);
            let q = Quat::from_xyzw(x / length, y / length, z / length, w / length);

            let mut written = q;
            let mut stream = Stream::writer();
            stream.serialize_compressed_quaternion(&mut written, 9).unwrap();
            let bytes = stream.into_bytes();

            let mut decoded = Quat::IDENTITY;
            let mut stream = Stream::reader(&bytes);
            stream.serialize_compressed_quaternion(&mut decoded, 9).unwrap();

            prop_assert!((decoded.length() - 1.0).abs() < 1e-4);
            // same rotation up to sign, within 9-bit quantization error
            prop_assert!(q.dot(decoded).abs() > 0.999);
        }
    }
}
