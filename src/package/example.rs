//! `tf.train.Example` messages and the TFRecord container they are stored in.
//!
//! A TFRecord file is a sequence of frames:
//!
//! ```text
//! u64  length (little endian)
//! u32  masked crc32c of the 8 length bytes
//! [u8] payload (one serialized Example)
//! u32  masked crc32c of the payload
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;

use crate::error::AnnopackError;

#[derive(Clone, PartialEq, Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    use super::{BytesList, FloatList, Int64List};

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(BytesList),
        #[prost(message, tag = "2")]
        FloatList(FloatList),
        #[prost(message, tag = "3")]
        Int64List(Int64List),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

impl Feature {
    pub fn bytes<I, B>(values: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self {
            kind: Some(feature::Kind::BytesList(BytesList {
                value: values.into_iter().map(Into::into).collect(),
            })),
        }
    }

    pub fn floats(value: Vec<f32>) -> Self {
        Self {
            kind: Some(feature::Kind::FloatList(FloatList { value })),
        }
    }

    pub fn int64s(value: Vec<i64>) -> Self {
        Self {
            kind: Some(feature::Kind::Int64List(Int64List { value })),
        }
    }
}

impl Example {
    pub fn from_features(feature: HashMap<String, Feature>) -> Self {
        Self {
            features: Some(Features { feature }),
        }
    }

    fn feature(&self, key: &str) -> Option<&feature::Kind> {
        self.features
            .as_ref()
            .and_then(|features| features.feature.get(key))
            .and_then(|feature| feature.kind.as_ref())
    }

    pub fn bytes_list(&self, key: &str) -> Option<&[Vec<u8>]> {
        match self.feature(key)? {
            feature::Kind::BytesList(list) => Some(&list.value),
            _ => None,
        }
    }

    pub fn float_list(&self, key: &str) -> Option<&[f32]> {
        match self.feature(key)? {
            feature::Kind::FloatList(list) => Some(&list.value),
            _ => None,
        }
    }

    pub fn int64_list(&self, key: &str) -> Option<&[i64]> {
        match self.feature(key)? {
            feature::Kind::Int64List(list) => Some(&list.value),
            _ => None,
        }
    }

    /// Byte-string features decoded as UTF-8, lossy.
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.bytes_list(key).map(|values| {
            values
                .iter()
                .map(|value| String::from_utf8_lossy(value).into_owned())
                .collect()
        })
    }
}

const MASK_DELTA: u32 = 0xa282_ead8;

fn masked_crc(bytes: &[u8]) -> u32 {
    let crc = crc32c::crc32c(bytes);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Frames payloads into a TFRecord stream.
pub struct TfRecordWriter<W: Write> {
    inner: W,
}

impl<W: Write> TfRecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let length = (payload.len() as u64).to_le_bytes();
        self.inner.write_all(&length)?;
        self.inner.write_all(&masked_crc(&length).to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.write_all(&masked_crc(payload).to_le_bytes())
    }

    pub fn write_example(&mut self, example: &Example) -> std::io::Result<()> {
        self.write_record(&example.encode_to_vec())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads a TFRecord stream back, checking both checksums of every frame.
pub struct TfRecordReader<R: Read> {
    inner: R,
    path: PathBuf,
}

impl TfRecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, AnnopackError> {
        let file = File::open(path).map_err(|err| AnnopackError::TfRecordRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: Read> TfRecordReader<R> {
    /// `path` only labels errors.
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }

    fn corrupt(&self, message: impl Into<String>) -> AnnopackError {
        AnnopackError::TfRecordRead {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    /// Next payload, or `None` at a clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>, AnnopackError> {
        let mut length = [0u8; 8];
        let mut filled = 0;
        while filled < length.len() {
            match self.inner.read(&mut length[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < length.len() {
            return Err(self.corrupt(format!("truncated length: {filled} of 8 bytes")));
        }
        let length_crc = self.read_u32()?;
        if masked_crc(&length) != length_crc {
            return Err(self.corrupt("length checksum mismatch"));
        }

        let length = u64::from_le_bytes(length);
        let mut payload = Vec::new();
        (&mut self.inner)
            .take(length)
            .read_to_end(&mut payload)?;
        if payload.len() as u64 != length {
            return Err(self.corrupt(format!(
                "truncated payload: {} of {length} bytes",
                payload.len()
            )));
        }
        let payload_crc = self.read_u32()?;
        if masked_crc(&payload) != payload_crc {
            return Err(self.corrupt("payload checksum mismatch"));
        }
        Ok(Some(payload))
    }

    pub fn read_example(&mut self) -> Result<Option<Example>, AnnopackError> {
        let Some(payload) = self.read_record()? else {
            return Ok(None);
        };
        Example::decode(payload.as_slice())
            .map(Some)
            .map_err(|err| self.corrupt(format!("invalid Example: {err}")))
    }

    pub fn read_all_examples(&mut self) -> Result<Vec<Example>, AnnopackError> {
        let mut examples = Vec::new();
        while let Some(example) = self.read_example()? {
            examples.push(example);
        }
        Ok(examples)
    }

    fn read_u32(&mut self) -> Result<u32, AnnopackError> {
        let mut bytes = [0u8; 4];
        self.inner
            .read_exact(&mut bytes)
            .map_err(|err| self.corrupt(format!("truncated frame: {err}")))?;
        Ok(u32::from_le_bytes(bytes))
    }
}

/// Reads every Example in a TFRecord file.
pub fn read_examples(path: &Path) -> Result<Vec<Example>, AnnopackError> {
    TfRecordReader::open(path)?.read_all_examples()
}
