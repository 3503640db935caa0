//! Minimal NPY v1.0 serialization for `f32` arrays.
//!
//! Region time courses are published as NumPy `.npy` files so downstream
//! analysis stacks can `np.load` them directly. Only the subset this crate
//! writes is supported when reading back: version 1.0, little-endian `f32`,
//! C order.

use std::path::Path;

use thiserror::Error;

/// `\x93NUMPY` magic prefix.
const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Total header (magic + version + length field + dict) is padded to this.
const HEADER_ALIGN: usize = 64;

/// Errors reading or writing NPY files.
#[derive(Debug, Error)]
pub enum NpyError {
    #[error("npy io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an npy file: bad magic")]
    Magic,

    #[error("unsupported npy version {major}.{minor}")]
    Version { major: u8, minor: u8 },

    #[error("unsupported or malformed npy header: {0}")]
    Header(String),

    #[error("npy payload truncated: expected {expected} values, got {actual}")]
    Payload { expected: usize, actual: usize },
}

/// Serialize a C-order `f32` array to NPY v1.0 bytes.
pub fn to_bytes(shape: &[usize], data: &[f32]) -> Vec<u8> {
    let shape_repr = match shape.len() {
        // Single-element tuples need the trailing comma in Python syntax.
        1 => format!("({},)", shape[0]),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_repr
    );

    // magic + version (2) + header length field (2) + dict + padding + '\n'
    let prefix_len = MAGIC.len() + 2 + 2;
    let unpadded = prefix_len + dict.len() + 1;
    let padding = (HEADER_ALIGN - (unpadded % HEADER_ALIGN)) % HEADER_ALIGN;
    let header_len = (dict.len() + padding + 1) as u16;

    let mut bytes = Vec::with_capacity(prefix_len + header_len as usize + data.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.push(1); // major version
    bytes.push(0); // minor version
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(dict.as_bytes());
    bytes.extend(std::iter::repeat(b' ').take(padding));
    bytes.push(b'\n');

    for value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Read an NPY file written by [`to_bytes`]; returns (shape, values).
pub fn read_file(path: &Path) -> Result<(Vec<usize>, Vec<f32>), NpyError> {
    parse_bytes(&std::fs::read(path)?)
}

/// Parse NPY v1.0 bytes; returns (shape, values).
pub fn parse_bytes(bytes: &[u8]) -> Result<(Vec<usize>, Vec<f32>), NpyError> {
    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(NpyError::Magic);
    }
    let major = bytes[6];
    let minor = bytes[7];
    if (major, minor) != (1, 0) {
        return Err(NpyError::Version { major, minor });
    }

    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let header_end = 10 + header_len;
    if bytes.len() < header_end {
        return Err(NpyError::Header("truncated header".to_string()));
    }
    let header = std::str::from_utf8(&bytes[10..header_end])
        .map_err(|_| NpyError::Header("non-utf8 header".to_string()))?;

    if !header.contains("'descr': '<f4'") {
        return Err(NpyError::Header(format!(
            "unsupported dtype in header: {}",
            header.trim()
        )));
    }
    if !header.contains("'fortran_order': False") {
        return Err(NpyError::Header("fortran order not supported".to_string()));
    }

    let shape = parse_shape(header)?;
    let expected: usize = shape.iter().product();

    let payload = &bytes[header_end..];
    let actual = payload.len() / 4;
    if actual < expected {
        return Err(NpyError::Payload { expected, actual });
    }

    let mut data = Vec::with_capacity(expected);
    for chunk in payload[..expected * 4].chunks_exact(4) {
        data.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok((shape, data))
}

fn parse_shape(header: &str) -> Result<Vec<usize>, NpyError> {
    let start = header
        .find("'shape':")
        .ok_or_else(|| NpyError::Header("missing shape".to_string()))?;
    let open = header[start..]
        .find('(')
        .map(|i| start + i)
        .ok_or_else(|| NpyError::Header("missing shape tuple".to_string()))?;
    let close = header[open..]
        .find(')')
        .map(|i| open + i)
        .ok_or_else(|| NpyError::Header("unterminated shape tuple".to_string()))?;

    header[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| NpyError::Header(format!("bad shape component '{}'", s)))
        })
        .collect()
}
