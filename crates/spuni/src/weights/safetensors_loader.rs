//! Safetensors container reader backed by mmap.
//!
//! Layout: an 8-byte little-endian unsigned header length `N`, then `N`
//! bytes of a JSON object mapping tensor name to `{dtype, shape,
//! data_offsets: [start, end]}` (offsets relative to the end of the
//! header), then the raw tensor bytes. A `__metadata__` entry holds
//! free-form string pairs and is not a tensor.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use log::{debug, info};
use memmap2::Mmap;
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;

use super::{WeightsError, WeightsResult};

/// Known foreign signatures, rejected with a distinct error instead of
/// being misparsed as a header length.
const FOREIGN_MAGICS: &[(&[u8], &str)] = &[
    (b"GGUF", "GGUF"),
    (b"lmgg", "legacy GGML"),
    (b"PK\x03\x04", "PyTorch zip archive"),
];

/// Tensor element type as named in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    BF16,
    I64,
    I32,
    U8,
    Bool,
}

impl DType {
    fn parse(s: &str) -> WeightsResult<Self> {
        match s {
            "F32" => Ok(Self::F32),
            "F16" => Ok(Self::F16),
            "BF16" => Ok(Self::BF16),
            "I64" => Ok(Self::I64),
            "I32" => Ok(Self::I32),
            "U8" => Ok(Self::U8),
            "BOOL" => Ok(Self::Bool),
            other => Err(WeightsError::UnsupportedDtype(other.to_string())),
        }
    }

    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 => 2,
            Self::I64 => 8,
            Self::U8 | Self::Bool => 1,
        }
    }
}

/// Parsed header entry for one tensor.
#[derive(Debug, Clone)]
pub struct TensorInfo {
    pub dtype: DType,
    pub shape: Vec<usize>,
    /// Byte range within the data section.
    pub data_offsets: (usize, usize),
}

/// A borrowed view of one tensor's raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub dtype: DType,
    pub shape: &'a [usize],
    pub data: &'a [u8],
}

#[derive(Deserialize)]
struct RawTensorInfo {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// Reads tensors from a `.safetensors` file without copying the data.
#[derive(Debug)]
pub struct SafeTensorsReader {
    mmap: Mmap,
    data_start: usize,
    tensors: HashMap<String, TensorInfo>,
    metadata: HashMap<String, String>,
}

impl SafeTensorsReader {
    /// Opens and validates a safetensors file.
    ///
    /// The whole header is validated here: every tensor's byte range must
    /// lie within the data section and match its shape and dtype, so later
    /// `tensor` calls cannot fail on out-of-bounds slices.
    pub fn open(path: &Path) -> WeightsResult<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        for (magic, name) in FOREIGN_MAGICS {
            if mmap.len() >= magic.len() && &mmap[..magic.len()] == *magic {
                return Err(WeightsError::UnsupportedFormat((*name).to_string()));
            }
        }

        if mmap.len() < 8 {
            return Err(WeightsError::Header(
                "file too short for the 8-byte header length".to_string(),
            ));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&mmap[..8]);
        let header_len = u64::from_le_bytes(len_bytes) as usize;
        let data_start = 8usize
            .checked_add(header_len)
            .filter(|&end| end <= mmap.len())
            .ok_or_else(|| {
                WeightsError::Header(format!(
                    "header length {} exceeds file size {}",
                    header_len,
                    mmap.len()
                ))
            })?;

        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&mmap[8..data_start])
                .map_err(|e| WeightsError::Header(e.to_string()))?;

        let data_len = mmap.len() - data_start;
        let mut tensors = HashMap::new();
        let mut metadata = HashMap::new();

        for (name, value) in raw {
            if name == "__metadata__" {
                let pairs: HashMap<String, String> = serde_json::from_value(value)
                    .map_err(|e| WeightsError::Header(format!("__metadata__: {e}")))?;
                metadata = pairs;
                continue;
            }

            let info: RawTensorInfo = serde_json::from_value(value)
                .map_err(|e| WeightsError::Header(format!("tensor '{name}': {e}")))?;
            let dtype = DType::parse(&info.dtype)?;
            let [start, end] = info.data_offsets;

            if start > end || end > data_len {
                return Err(WeightsError::Header(format!(
                    "tensor '{name}': data_offsets [{start}, {end}] outside data section of {data_len} bytes"
                )));
            }
            let expected = info.shape.iter().product::<usize>() * dtype.size();
            if end - start != expected {
                return Err(WeightsError::Header(format!(
                    "tensor '{name}': {} bytes for shape {:?} ({} expected)",
                    end - start,
                    info.shape,
                    expected
                )));
            }

            tensors.insert(
                name,
                TensorInfo {
                    dtype,
                    shape: info.shape,
                    data_offsets: (start, end),
                },
            );
        }

        info!(
            "opened safetensors file {:?}: {} tensors",
            path.file_name().unwrap_or_default(),
            tensors.len()
        );
        debug!("data section: {} bytes", data_len);

        Ok(Self {
            mmap,
            data_start,
            tensors,
            metadata,
        })
    }

    /// All tensor names.
    pub fn tensor_names(&self) -> Vec<&str> {
        self.tensors.keys().map(|s| s.as_str()).collect()
    }

    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Free-form `__metadata__` pairs from the header.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Header entry for a tensor.
    pub fn info(&self, name: &str) -> WeightsResult<&TensorInfo> {
        self.tensors
            .get(name)
            .ok_or_else(|| WeightsError::TensorNotFound(name.to_string()))
    }

    /// Borrowed raw view of a tensor.
    pub fn tensor(&self, name: &str) -> WeightsResult<TensorView<'_>> {
        let info = self.info(name)?;
        let (start, end) = info.data_offsets;
        Ok(TensorView {
            dtype: info.dtype,
            shape: &info.shape,
            data: &self.mmap[self.data_start + start..self.data_start + end],
        })
    }

    /// Loads an f32 tensor into an owned n-dimensional array.
    pub fn f32_array(&self, name: &str) -> WeightsResult<ArrayD<f32>> {
        let view = self.tensor(name)?;
        if view.dtype != DType::F32 {
            return Err(WeightsError::UnsupportedDtype(format!(
                "tensor '{}' is {:?}, expected F32",
                name, view.dtype
            )));
        }
        let values: Vec<f32> = view
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        ArrayD::from_shape_vec(IxDyn(view.shape), values).map_err(|e| {
            WeightsError::Header(format!("tensor '{name}': shape mismatch: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal single-tensor safetensors file on disk.
    fn write_safetensors(header: &str, data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&(header.len() as u64).to_le_bytes()).unwrap();
        file.write_all(header.as_bytes()).unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_reads_single_f32_tensor() {
        let header = r#"{"w":{"dtype":"F32","shape":[2,2],"data_offsets":[0,16]},"__metadata__":{"format":"pt"}}"#;
        let file = write_safetensors(header, &f32_bytes(&[1.0, 2.0, 3.0, 4.0]));

        let reader = SafeTensorsReader::open(file.path()).unwrap();

        assert_eq!(reader.tensor_count(), 1);
        assert!(reader.contains("w"));
        assert_eq!(reader.metadata().get("format").unwrap(), "pt");

        let info = reader.info("w").unwrap();
        assert_eq!(info.dtype, DType::F32);
        assert_eq!(info.shape, vec![2, 2]);

        let array = reader.f32_array("w").unwrap();
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array[[1, 0]], 3.0);
    }

    #[test]
    fn test_tensor_view_borrows_raw_bytes() {
        let header = r#"{"b":{"dtype":"U8","shape":[3],"data_offsets":[0,3]}}"#;
        let file = write_safetensors(header, &[7, 8, 9]);

        let reader = SafeTensorsReader::open(file.path()).unwrap();
        let view = reader.tensor("b").unwrap();

        assert_eq!(view.dtype, DType::U8);
        assert_eq!(view.data, &[7, 8, 9]);
    }

    #[test]
    fn test_rejects_gguf_magic_with_distinct_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"GGUF\x03\x00\x00\x00rest-of-file").unwrap();
        file.flush().unwrap();

        let err = SafeTensorsReader::open(file.path()).unwrap_err();
        assert!(matches!(err, WeightsError::UnsupportedFormat(ref f) if f == "GGUF"));
    }

    #[test]
    fn test_rejects_pytorch_zip_magic() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04not-a-safetensors-file").unwrap();
        file.flush().unwrap();

        let err = SafeTensorsReader::open(file.path()).unwrap_err();
        assert!(matches!(err, WeightsError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_rejects_header_length_past_eof() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&u64::MAX.to_le_bytes()).unwrap();
        file.write_all(b"{}").unwrap();
        file.flush().unwrap();

        let err = SafeTensorsReader::open(file.path()).unwrap_err();
        assert!(matches!(err, WeightsError::Header(_)));
    }

    #[test]
    fn test_rejects_offsets_outside_data_section() {
        let header = r#"{"w":{"dtype":"F32","shape":[4],"data_offsets":[0,16]}}"#;
        // Only 8 bytes of data, but the header claims 16.
        let file = write_safetensors(header, &f32_bytes(&[1.0, 2.0]));

        let err = SafeTensorsReader::open(file.path()).unwrap_err();
        assert!(matches!(err, WeightsError::Header(_)));
    }

    #[test]
    fn test_rejects_shape_dtype_size_mismatch() {
        let header = r#"{"w":{"dtype":"F32","shape":[3],"data_offsets":[0,8]}}"#;
        let file = write_safetensors(header, &f32_bytes(&[1.0, 2.0]));

        let err = SafeTensorsReader::open(file.path()).unwrap_err();
        assert!(matches!(err, WeightsError::Header(_)));
    }

    #[test]
    fn test_missing_tensor_is_not_found() {
        let header = r#"{"w":{"dtype":"F32","shape":[1],"data_offsets":[0,4]}}"#;
        let file = write_safetensors(header, &f32_bytes(&[1.0]));

        let reader = SafeTensorsReader::open(file.path()).unwrap();
        let err = reader.tensor("missing").unwrap_err();
        assert!(matches!(err, WeightsError::TensorNotFound(_)));
    }

    #[test]
    fn test_unknown_dtype_rejected() {
        let header = r#"{"w":{"dtype":"F8_E4M3","shape":[4],"data_offsets":[0,4]}}"#;
        let file = write_safetensors(header, &[0, 0, 0, 0]);

        let err = SafeTensorsReader::open(file.path()).unwrap_err();
        assert!(matches!(err, WeightsError::UnsupportedDtype(_)));
    }
}
