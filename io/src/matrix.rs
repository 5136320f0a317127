//! Raw matrix records used by the binary v1 calibration format.
//!
//! Each record is a 12 byte header of three little-endian `u32` values
//! (`element size, rows, cols`) followed by `rows * cols` elements in
//! row-major order. A `0 x 0` header marks an absent matrix and carries
//! no body.

use cv_core::{calib_error, calib_warn, CalibConfig, Error, Result};
use nalgebra::{DMatrix, SMatrix};
use std::io::{Read, Write};

/// Headers with `rows` or `cols` at or above this value are rejected.
pub const MAX_MATRIX_DIM: u32 = 32;

/// Element size written for empty placeholder records.
const EMPTY_ELEMENT_SIZE: u32 = 1;

const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    F64,
}

impl ElementType {
    pub fn size(self) -> u32 {
        match self {
            ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }

    fn from_size(size: u32) -> Option<Self> {
        match size {
            4 => Some(ElementType::F32),
            8 => Some(ElementType::F64),
            _ => None,
        }
    }
}

/// A matrix as stored in a v1 file: the on-disk element type plus the
/// values widened to `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMatrix {
    pub element: ElementType,
    pub data: DMatrix<f64>,
}

impl BinaryMatrix {
    /// A `0 x 0` matrix. Reading into it adopts whatever shape is decoded.
    pub fn empty(element: ElementType) -> Self {
        Self {
            element,
            data: DMatrix::zeros(0, 0),
        }
    }

    pub fn zeros(element: ElementType, rows: usize, cols: usize) -> Self {
        Self {
            element,
            data: DMatrix::zeros(rows, cols),
        }
    }

    pub fn from_row_slice(element: ElementType, rows: usize, cols: usize, values: &[f64]) -> Self {
        Self {
            element,
            data: DMatrix::from_row_slice(rows, cols, values),
        }
    }

    /// `n x 1` column of doubles.
    pub fn column(values: &[f64]) -> Self {
        Self {
            element: ElementType::F64,
            data: DMatrix::from_column_slice(values.len(), 1, values),
        }
    }

    pub fn from_fixed<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> Self {
        Self {
            element: ElementType::F64,
            data: DMatrix::from_iterator(R, C, m.iter().copied()),
        }
    }

    /// Copy into a fixed-size matrix when the shape is exactly `R x C`.
    pub fn to_fixed<const R: usize, const C: usize>(&self) -> Option<SMatrix<f64, R, C>> {
        (self.data.shape() == (R, C)).then(|| SMatrix::from_iterator(self.data.iter().copied()))
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Write one matrix record.
pub fn write_matrix<W: Write>(writer: &mut W, m: &BinaryMatrix) -> Result<()> {
    let element_size = if m.is_empty() {
        EMPTY_ELEMENT_SIZE
    } else {
        m.element.size()
    };
    for word in [element_size, m.rows() as u32, m.cols() as u32] {
        writer.write_all(&word.to_le_bytes())?;
    }

    for r in 0..m.rows() {
        for c in 0..m.cols() {
            let v = m.data[(r, c)];
            match m.element {
                ElementType::F32 => writer.write_all(&(v as f32).to_le_bytes())?,
                ElementType::F64 => writer.write_all(&v.to_le_bytes())?,
            }
        }
    }
    Ok(())
}

/// Read one matrix record into `out`.
///
/// An absent (`0 x 0`) record leaves `out` untouched. If `out` is empty it
/// takes the decoded shape. Otherwise the element type and element count
/// must match, and a record whose shape is the transpose of `out` is
/// transposed on load. `out` is only modified on success.
pub fn read_matrix<R: Read>(
    reader: &mut R,
    out: &mut BinaryMatrix,
    name: &str,
    config: &CalibConfig,
) -> Result<()> {
    let mut header = [0u8; HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut header) {
        calib_error!(config, "Failed to read mat header: '{}'", name);
        return Err(Error::Parse(format!(
            "failed to read header of matrix '{name}': {e}"
        )));
    }
    let element_size = header_word(&header, 0);
    let rows = header_word(&header, 1);
    let cols = header_word(&header, 2);

    if rows == 0 && cols == 0 {
        return Ok(());
    }

    if rows >= MAX_MATRIX_DIM || cols >= MAX_MATRIX_DIM {
        calib_error!(
            config,
            "Mat dimension unreasonably large for '{}': {}x{}",
            name,
            rows,
            cols
        );
        return Err(Error::DimensionMismatch(format!(
            "matrix '{name}' header claims {rows}x{cols}, limit is {}",
            MAX_MATRIX_DIM - 1
        )));
    }

    let element = ElementType::from_size(element_size).ok_or_else(|| {
        calib_error!(config, "Unsupported mat element size for '{}': {}", name, element_size);
        Error::Parse(format!(
            "matrix '{name}' has unsupported element size {element_size}"
        ))
    })?;

    let (rows, cols) = (rows as usize, cols as usize);
    let mut body = vec![0u8; rows * cols * element_size as usize];
    if let Err(e) = reader.read_exact(&mut body) {
        calib_error!(config, "Failed to read mat body: '{}'", name);
        return Err(Error::Parse(format!(
            "failed to read body of matrix '{name}': {e}"
        )));
    }

    let values: Vec<f64> = match element {
        ElementType::F32 => body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        ElementType::F64 => body
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
    };
    let decoded = DMatrix::from_row_slice(rows, cols, &values);

    if out.is_empty() {
        *out = BinaryMatrix {
            element,
            data: decoded,
        };
        return Ok(());
    }

    if out.element != element {
        calib_error!(config, "Mat body type does not match: '{}'", name);
        return Err(Error::Parse(format!(
            "matrix '{name}' stored as {element:?}, expected {:?}",
            out.element
        )));
    }

    if out.len() != decoded.len() {
        calib_error!(config, "Mat total size does not match: '{}'", name);
        return Err(Error::DimensionMismatch(format!(
            "matrix '{name}' has {} elements, expected {}",
            decoded.len(),
            out.len()
        )));
    }

    if out.data.shape() == decoded.shape() {
        out.data = decoded;
    } else if out.data.shape() == (cols, rows) {
        calib_warn!(config, "Mat transposing on load: '{}'", name);
        out.data = decoded.transpose();
    } else {
        calib_error!(config, "Mat dimension unknown mismatch: '{}'", name);
        return Err(Error::DimensionMismatch(format!(
            "matrix '{name}' is {rows}x{cols}, expected {}x{}",
            out.rows(),
            out.cols()
        )));
    }
    Ok(())
}

fn header_word(header: &[u8; HEADER_LEN], index: usize) -> u32 {
    let i = index * 4;
    u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn quiet() -> CalibConfig {
        CalibConfig::default()
    }

    fn encode(m: &BinaryMatrix) -> Vec<u8> {
        let mut buf = Vec::new();
        write_matrix(&mut buf, m).unwrap();
        buf
    }

    #[test]
    fn header_layout_is_little_endian() {
        let m = BinaryMatrix::from_row_slice(ElementType::F32, 1, 2, &[640.0, 480.0]);
        let buf = encode(&m);
        assert_eq!(buf.len(), 12 + 8);
        assert_eq!(&buf[0..4], &4u32.to_le_bytes());
        assert_eq!(&buf[4..8], &1u32.to_le_bytes());
        assert_eq!(&buf[8..12], &2u32.to_le_bytes());
        assert_eq!(&buf[12..16], &640.0f32.to_le_bytes());
    }

    #[test]
    fn empty_matrix_is_header_only() {
        let buf = encode(&BinaryMatrix::empty(ElementType::F64));
        assert_eq!(buf, [1u32, 0, 0].iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<_>>());

        let mut out = BinaryMatrix::zeros(ElementType::F64, 3, 3);
        out.data[(0, 0)] = 7.0;
        read_matrix(&mut Cursor::new(buf), &mut out, "absent", &quiet()).unwrap();
        assert_eq!(out.data[(0, 0)], 7.0);
    }

    #[test]
    fn row_major_body() {
        let m = BinaryMatrix::from_row_slice(ElementType::F64, 2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let buf = encode(&m);
        assert_eq!(&buf[12..20], &1.0f64.to_le_bytes());
        assert_eq!(&buf[20..28], &2.0f64.to_le_bytes());

        let mut out = BinaryMatrix::empty(ElementType::F64);
        read_matrix(&mut Cursor::new(buf), &mut out, "m", &quiet()).unwrap();
        assert_eq!(out, m);
    }

    #[test]
    fn transposed_shape_is_accepted() {
        let stored = BinaryMatrix::from_row_slice(ElementType::F64, 1, 3, &[0.1, 0.2, 0.3]);
        let mut out = BinaryMatrix::zeros(ElementType::F64, 3, 1);
        read_matrix(&mut Cursor::new(encode(&stored)), &mut out, "t", &quiet()).unwrap();
        assert_eq!(out.data.shape(), (3, 1));
        assert_eq!(out.data[(2, 0)], 0.3);
    }

    #[test]
    fn mismatches_leave_destination_untouched() {
        let stored = BinaryMatrix::from_row_slice(ElementType::F64, 2, 3, &[1.0; 6]);

        let mut wrong_count = BinaryMatrix::zeros(ElementType::F64, 3, 3);
        assert!(read_matrix(&mut Cursor::new(encode(&stored)), &mut wrong_count, "c", &quiet()).is_err());
        assert_eq!(wrong_count, BinaryMatrix::zeros(ElementType::F64, 3, 3));

        let mut wrong_shape = BinaryMatrix::zeros(ElementType::F64, 6, 1);
        assert!(read_matrix(&mut Cursor::new(encode(&stored)), &mut wrong_shape, "s", &quiet()).is_err());

        let mut wrong_type = BinaryMatrix::zeros(ElementType::F32, 2, 3);
        assert!(read_matrix(&mut Cursor::new(encode(&stored)), &mut wrong_type, "e", &quiet()).is_err());
    }

    #[test]
    fn oversized_header_rejected_before_body() {
        let mut buf: Vec<u8> = [8u32, 64, 64].iter().flat_map(|w| w.to_le_bytes()).collect();
        buf.extend_from_slice(&[0u8; 16]);
        let mut cursor = Cursor::new(buf);
        let mut out = BinaryMatrix::empty(ElementType::F64);
        let err = read_matrix(&mut cursor, &mut out, "big", &quiet()).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
        assert_eq!(cursor.position(), 12);
        assert!(out.is_empty());
    }

    #[test]
    fn truncated_input_fails() {
        let m = BinaryMatrix::from_row_slice(ElementType::F64, 1, 2, &[1.0, 2.0]);
        let mut buf = encode(&m);
        buf.truncate(buf.len() - 3);
        let mut out = BinaryMatrix::empty(ElementType::F64);
        assert!(read_matrix(&mut Cursor::new(buf), &mut out, "short", &quiet()).is_err());

        let mut out = BinaryMatrix::empty(ElementType::F64);
        assert!(read_matrix(&mut Cursor::new(vec![0u8; 5]), &mut out, "hdr", &quiet()).is_err());
    }

    #[test]
    fn unknown_element_size_rejected() {
        let buf: Vec<u8> = [2u32, 1, 1].iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut out = BinaryMatrix::empty(ElementType::F64);
        assert!(read_matrix(&mut Cursor::new(buf), &mut out, "half", &quiet()).is_err());
    }
}
