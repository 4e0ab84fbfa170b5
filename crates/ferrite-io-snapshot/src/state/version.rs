use thiserror::Error;

/// Device snapshot version, `major.minor`.
///
/// A reader accepts any snapshot whose major version matches; minor bumps are
/// reserved for forward-compatible field additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot device id mismatch: expected {expected:?}, found {found:?}")]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported snapshot major version {found} (expected {expected})")]
    UnsupportedMajor { expected: u16, found: u16 },
    #[error("snapshot truncated while reading {context}")]
    Truncated { context: &'static str },
    #[error("snapshot field tag {tag} has {found} bytes, expected {expected}")]
    FieldSize {
        tag: u16,
        expected: usize,
        found: usize,
    },
    #[error("snapshot field tag {tag} has an invalid encoding")]
    InvalidField { tag: u16 },
    #[error("trailing bytes after decoding a nested snapshot blob")]
    TrailingBytes,
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

const HEADER_LEN: usize = 4 + 2 + 2;

/// TLV snapshot builder.
///
/// Layout: `device_id[4] | major:u16 | minor:u16` followed by
/// `tag:u16 | len:u32 | payload` records in the order the fields were written.
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], version: SnapshotVersion) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&device_id);
        buf.extend_from_slice(&version.major.to_le_bytes());
        buf.extend_from_slice(&version.minor.to_le_bytes());
        Self { buf }
    }

    fn field(&mut self, tag: u16, payload: &[u8]) {
        self.buf.extend_from_slice(&tag.to_le_bytes());
        self.buf
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(payload);
    }

    pub fn field_bool(&mut self, tag: u16, value: bool) {
        self.field(tag, &[u8::from(value)]);
    }

    pub fn field_u16(&mut self, tag: u16, value: u16) {
        self.field(tag, &value.to_le_bytes());
    }

    pub fn field_u32(&mut self, tag: u16, value: u32) {
        self.field(tag, &value.to_le_bytes());
    }

    pub fn field_u64(&mut self, tag: u16, value: u64) {
        self.field(tag, &value.to_le_bytes());
    }

    pub fn field_bytes(&mut self, tag: u16, payload: impl AsRef<[u8]>) {
        self.field(tag, payload.as_ref());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Parsed view over a TLV snapshot.
///
/// Lookups are by tag; the first occurrence wins and unknown tags are ignored,
/// so newer writers can add fields without breaking older readers.
pub struct SnapshotReader<'a> {
    version: SnapshotVersion,
    fields: Vec<(u16, &'a [u8])>,
}

impl<'a> SnapshotReader<'a> {
    pub fn parse(bytes: &'a [u8], device_id: [u8; 4]) -> SnapshotResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::Truncated { context: "header" });
        }
        let mut found = [0u8; 4];
        found.copy_from_slice(&bytes[..4]);
        if found != device_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: device_id,
                found,
            });
        }
        let major = u16::from_le_bytes([bytes[4], bytes[5]]);
        let minor = u16::from_le_bytes([bytes[6], bytes[7]]);

        let mut fields = Vec::new();
        let mut pos = HEADER_LEN;
        while pos < bytes.len() {
            if bytes.len() - pos < 6 {
                return Err(SnapshotError::Truncated {
                    context: "field header",
                });
            }
            let tag = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]);
            let len = u32::from_le_bytes([
                bytes[pos + 2],
                bytes[pos + 3],
                bytes[pos + 4],
                bytes[pos + 5],
            ]) as usize;
            pos += 6;
            if bytes.len() - pos < len {
                return Err(SnapshotError::Truncated {
                    context: "field payload",
                });
            }
            fields.push((tag, &bytes[pos..pos + len]));
            pos += len;
        }

        Ok(Self {
            version: SnapshotVersion::new(major, minor),
            fields,
        })
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn ensure_device_major(&self, expected: u16) -> SnapshotResult<()> {
        if self.version.major != expected {
            return Err(SnapshotError::UnsupportedMajor {
                expected,
                found: self.version.major,
            });
        }
        Ok(())
    }

    fn lookup(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, payload)| *payload)
    }

    fn fixed<const N: usize>(&self, tag: u16) -> SnapshotResult<Option<[u8; N]>> {
        match self.lookup(tag) {
            None => Ok(None),
            Some(payload) => {
                let arr: [u8; N] =
                    payload
                        .try_into()
                        .map_err(|_| SnapshotError::FieldSize {
                            tag,
                            expected: N,
                            found: payload.len(),
                        })?;
                Ok(Some(arr))
            }
        }
    }

    pub fn bool(&self, tag: u16) -> SnapshotResult<Option<bool>> {
        match self.fixed::<1>(tag)? {
            None => Ok(None),
            Some([0]) => Ok(Some(false)),
            Some([1]) => Ok(Some(true)),
            Some(_) => Err(SnapshotError::InvalidField { tag }),
        }
    }

    pub fn u16(&self, tag: u16) -> SnapshotResult<Option<u16>> {
        Ok(self.fixed::<2>(tag)?.map(u16::from_le_bytes))
    }

    pub fn u32(&self, tag: u16) -> SnapshotResult<Option<u32>> {
        Ok(self.fixed::<4>(tag)?.map(u32::from_le_bytes))
    }

    pub fn u64(&self, tag: u16) -> SnapshotResult<Option<u64>> {
        Ok(self.fixed::<8>(tag)?.map(u64::from_le_bytes))
    }

    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.lookup(tag)
    }
}

/// Plain little-endian encode/decode helpers for nested blobs stored inside a
/// single TLV field (e.g. a variable-length device sub-array).
pub mod codec {
    use super::{SnapshotError, SnapshotResult};

    #[derive(Default)]
    pub struct Encoder {
        buf: Vec<u8>,
    }

    impl Encoder {
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn bool(mut self, value: bool) -> Self {
            self.buf.push(u8::from(value));
            self
        }

        #[must_use]
        pub fn u16(mut self, value: u16) -> Self {
            self.buf.extend_from_slice(&value.to_le_bytes());
            self
        }

        #[must_use]
        pub fn u32(mut self, value: u32) -> Self {
            self.buf.extend_from_slice(&value.to_le_bytes());
            self
        }

        #[must_use]
        pub fn u64(mut self, value: u64) -> Self {
            self.buf.extend_from_slice(&value.to_le_bytes());
            self
        }

        pub fn finish(self) -> Vec<u8> {
            self.buf
        }
    }

    pub struct Decoder<'a> {
        buf: &'a [u8],
    }

    impl<'a> Decoder<'a> {
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf }
        }

        fn take<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
            if self.buf.len() < N {
                return Err(SnapshotError::Truncated {
                    context: "nested blob",
                });
            }
            let (head, rest) = self.buf.split_at(N);
            self.buf = rest;
            Ok(head.try_into().expect("split_at length"))
        }

        pub fn bool(&mut self) -> SnapshotResult<bool> {
            Ok(self.take::<1>()?[0] != 0)
        }

        pub fn u16(&mut self) -> SnapshotResult<u16> {
            Ok(u16::from_le_bytes(self.take::<2>()?))
        }

        pub fn u32(&mut self) -> SnapshotResult<u32> {
            Ok(u32::from_le_bytes(self.take::<4>()?))
        }

        pub fn u64(&mut self) -> SnapshotResult<u64> {
            Ok(u64::from_le_bytes(self.take::<8>()?))
        }

        /// Asserts the blob was fully consumed.
        pub fn finish(self) -> SnapshotResult<()> {
            if !self.buf.is_empty() {
                return Err(SnapshotError::TrailingBytes);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: [u8; 4] = *b"TEST";
    const V1: SnapshotVersion = SnapshotVersion::new(1, 0);

    #[test]
    fn fields_round_trip() {
        let mut w = SnapshotWriter::new(ID, V1);
        w.field_u16(1, 0xBEEF);
        w.field_u32(2, 0xDEAD_BEEF);
        w.field_u64(3, u64::MAX - 1);
        w.field_bool(4, true);
        w.field_bytes(5, [1u8, 2, 3]);
        let bytes = w.finish();

        let r = SnapshotReader::parse(&bytes, ID).unwrap();
        r.ensure_device_major(1).unwrap();
        assert_eq!(r.u16(1).unwrap(), Some(0xBEEF));
        assert_eq!(r.u32(2).unwrap(), Some(0xDEAD_BEEF));
        assert_eq!(r.u64(3).unwrap(), Some(u64::MAX - 1));
        assert_eq!(r.bool(4).unwrap(), Some(true));
        assert_eq!(r.bytes(5), Some(&[1u8, 2, 3][..]));

        // Absent tags read as None, not an error.
        assert_eq!(r.u32(99).unwrap(), None);
        assert_eq!(r.bytes(99), None);
    }

    #[test]
    fn output_is_deterministic() {
        let build = || {
            let mut w = SnapshotWriter::new(ID, V1);
            w.field_u32(1, 7);
            w.field_bytes(2, [9u8; 5]);
            w.finish()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn device_id_and_major_are_checked() {
        let bytes = SnapshotWriter::new(ID, V1).finish();

        assert!(matches!(
            SnapshotReader::parse(&bytes, *b"OTHR"),
            Err(SnapshotError::DeviceIdMismatch { .. })
        ));

        let r = SnapshotReader::parse(&bytes, ID).unwrap();
        assert!(matches!(
            r.ensure_device_major(2),
            Err(SnapshotError::UnsupportedMajor {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn wrong_field_size_is_an_error() {
        let mut w = SnapshotWriter::new(ID, V1);
        w.field_u16(1, 5);
        let bytes = w.finish();

        let r = SnapshotReader::parse(&bytes, ID).unwrap();
        assert!(matches!(
            r.u32(1),
            Err(SnapshotError::FieldSize {
                tag: 1,
                expected: 4,
                found: 2
            })
        ));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut w = SnapshotWriter::new(ID, V1);
        w.field_u64(1, 42);
        let bytes = w.finish();

        for cut in 1..bytes.len() {
            assert!(SnapshotReader::parse(&bytes[..cut], ID).is_err());
        }
    }

    #[test]
    fn nested_codec_round_trips_and_detects_trailing_bytes() {
        let blob = codec::Encoder::new()
            .u32(3)
            .u64(0x1122_3344_5566_7788)
            .bool(false)
            .u16(17)
            .finish();

        let mut d = codec::Decoder::new(&blob);
        assert_eq!(d.u32().unwrap(), 3);
        assert_eq!(d.u64().unwrap(), 0x1122_3344_5566_7788);
        assert!(!d.bool().unwrap());
        assert_eq!(d.u16().unwrap(), 17);
        d.finish().unwrap();

        let mut d = codec::Decoder::new(&blob);
        assert_eq!(d.u32().unwrap(), 3);
        assert!(matches!(d.finish(), Err(SnapshotError::TrailingBytes)));
    }
}
