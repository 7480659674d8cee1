use nalgebra::{DMatrix, DVector};
use serde::ser::{SerializeSeq, Serializer};

use crate::types::{BaseType, SignalType};

/// Runtime payload of one signal edge.
///
/// The tag always agrees with the producing block's declared output type:
/// numeric bases (double/float/long) carry `f64` payloads, bool carries
/// `bool`. Matrices are stored column-major (nalgebra) but every external
/// surface (JSON, mux/demux ordering, C emission) is row-major.
#[derive(Clone, Debug, PartialEq)]
pub enum SignalValue {
    Scalar(f64),
    Bool(bool),
    Vector(DVector<f64>),
    BoolVector(DVector<bool>),
    Matrix(DMatrix<f64>),
    BoolMatrix(DMatrix<bool>),
}

impl SignalValue {
    /// Zero value of the given type (`false` for bool bases).
    pub fn default_for(ty: &SignalType) -> SignalValue {
        match (ty, ty.is_bool()) {
            (SignalType::Scalar(_), false) => SignalValue::Scalar(0.0),
            (SignalType::Scalar(_), true) => SignalValue::Bool(false),
            (SignalType::Vector(_, n), false) => SignalValue::Vector(DVector::zeros(*n)),
            (SignalType::Vector(_, n), true) => {
                SignalValue::BoolVector(DVector::from_element(*n, false))
            }
            (SignalType::Matrix(_, r, c), false) => SignalValue::Matrix(DMatrix::zeros(*r, *c)),
            (SignalType::Matrix(_, r, c), true) => {
                SignalValue::BoolMatrix(DMatrix::from_element(*r, *c, false))
            }
        }
    }

    /// Broadcasts a scalar sample to the shape of `ty`. Numeric shapes get
    /// the value everywhere; bool shapes get its truthiness.
    pub fn broadcast(sample: f64, ty: &SignalType) -> SignalValue {
        match (ty, ty.is_bool()) {
            (SignalType::Scalar(_), false) => SignalValue::Scalar(sample),
            (SignalType::Scalar(_), true) => SignalValue::Bool(sample != 0.0),
            (SignalType::Vector(_, n), false) => {
                SignalValue::Vector(DVector::from_element(*n, sample))
            }
            (SignalType::Vector(_, n), true) => {
                SignalValue::BoolVector(DVector::from_element(*n, sample != 0.0))
            }
            (SignalType::Matrix(_, r, c), false) => {
                SignalValue::Matrix(DMatrix::from_element(*r, *c, sample))
            }
            (SignalType::Matrix(_, r, c), true) => {
                SignalValue::BoolMatrix(DMatrix::from_element(*r, *c, sample != 0.0))
            }
        }
    }

    /// The type this value would have under the given base, or the inferred
    /// shape with a `Double` base when only the shape matters.
    pub fn shape_type(&self, base: BaseType) -> SignalType {
        match self {
            SignalValue::Scalar(_) | SignalValue::Bool(_) => SignalType::Scalar(base),
            SignalValue::Vector(v) => SignalType::Vector(base, v.len()),
            SignalValue::BoolVector(v) => SignalType::Vector(base, v.len()),
            SignalValue::Matrix(m) => SignalType::Matrix(base, m.nrows(), m.ncols()),
            SignalValue::BoolMatrix(m) => SignalType::Matrix(base, m.nrows(), m.ncols()),
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            SignalValue::Scalar(_) | SignalValue::Bool(_) => 1,
            SignalValue::Vector(v) => v.len(),
            SignalValue::BoolVector(v) => v.len(),
            SignalValue::Matrix(m) => m.len(),
            SignalValue::BoolMatrix(m) => m.len(),
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(
            self,
            SignalValue::Bool(_) | SignalValue::BoolVector(_) | SignalValue::BoolMatrix(_)
        )
    }

    /// Shape-and-kind check against a declared type. `NaN` anywhere makes a
    /// numeric value invalid.
    pub fn is_valid_for(&self, ty: &SignalType) -> bool {
        match (self, ty) {
            (SignalValue::Scalar(x), SignalType::Scalar(b)) => !b.is_bool() && !x.is_nan(),
            (SignalValue::Bool(_), SignalType::Scalar(b)) => b.is_bool(),
            (SignalValue::Vector(v), SignalType::Vector(b, n)) => {
                !b.is_bool() && v.len() == *n && v.iter().all(|x| !x.is_nan())
            }
            (SignalValue::BoolVector(v), SignalType::Vector(b, n)) => {
                b.is_bool() && v.len() == *n
            }
            (SignalValue::Matrix(m), SignalType::Matrix(b, r, c)) => {
                !b.is_bool()
                    && m.nrows() == *r
                    && m.ncols() == *c
                    && m.iter().all(|x| !x.is_nan())
            }
            (SignalValue::BoolMatrix(m), SignalType::Matrix(b, r, c)) => {
                b.is_bool() && m.nrows() == *r && m.ncols() == *c
            }
            _ => false,
        }
    }

    /// Enable-signal conversion: bool as-is, number non-zero, arrays by
    /// their first element.
    pub fn is_truthy(&self) -> bool {
        match self {
            SignalValue::Scalar(x) => *x != 0.0,
            SignalValue::Bool(b) => *b,
            SignalValue::Vector(v) => v.get(0).copied().unwrap_or(0.0) != 0.0,
            SignalValue::BoolVector(v) => v.get(0).copied().unwrap_or(false),
            SignalValue::Matrix(m) => m.get(0).copied().unwrap_or(0.0) != 0.0,
            SignalValue::BoolMatrix(m) => m.get(0).copied().unwrap_or(false),
        }
    }

    /// Numeric elements in row-major order. Bool payloads yield 0.0/1.0.
    pub fn elements_row_major(&self) -> Vec<f64> {
        match self {
            SignalValue::Scalar(x) => vec![*x],
            SignalValue::Bool(b) => vec![*b as u8 as f64],
            SignalValue::Vector(v) => v.iter().copied().collect(),
            SignalValue::BoolVector(v) => v.iter().map(|b| *b as u8 as f64).collect(),
            SignalValue::Matrix(m) => m.transpose().iter().copied().collect(),
            SignalValue::BoolMatrix(m) => {
                m.transpose().iter().map(|b| *b as u8 as f64).collect()
            }
        }
    }

    /// The single numeric payload of a scalar value, if this is one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SignalValue::Scalar(x) => Some(*x),
            SignalValue::Bool(b) => Some(*b as u8 as f64),
            _ => None,
        }
    }

    /// Applies `f` to every numeric element, keeping the shape. Returns
    /// `None` for bool payloads.
    pub fn map_elements(&self, mut f: impl FnMut(f64) -> f64) -> Option<SignalValue> {
        match self {
            SignalValue::Scalar(x) => Some(SignalValue::Scalar(f(*x))),
            SignalValue::Vector(v) => Some(SignalValue::Vector(v.map(f))),
            SignalValue::Matrix(m) => Some(SignalValue::Matrix(m.map(f))),
            _ => None,
        }
    }

    /// Element-wise combination of two same-shape numeric values. The
    /// propagator guarantees shapes agree; `None` signals a bool payload or
    /// a shape mismatch that slipped past it.
    pub fn zip_elements(
        &self,
        other: &SignalValue,
        mut f: impl FnMut(f64, f64) -> f64,
    ) -> Option<SignalValue> {
        match (self, other) {
            (SignalValue::Scalar(a), SignalValue::Scalar(b)) => Some(SignalValue::Scalar(f(*a, *b))),
            (SignalValue::Vector(a), SignalValue::Vector(b)) if a.len() == b.len() => {
                Some(SignalValue::Vector(a.zip_map(b, f)))
            }
            (SignalValue::Matrix(a), SignalValue::Matrix(b)) if a.shape() == b.shape() => {
                Some(SignalValue::Matrix(a.zip_map(b, f)))
            }
            _ => None,
        }
    }

    /// Parses a JSON literal (number / bool / array / nested array) into a
    /// value whose kind follows `base`.
    pub fn from_json(json: &serde_json::Value, base: BaseType) -> Option<SignalValue> {
        fn number(v: &serde_json::Value) -> Option<f64> {
            match v {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::Bool(b) => Some(*b as u8 as f64),
                _ => None,
            }
        }

        match json {
            serde_json::Value::Number(_) | serde_json::Value::Bool(_) => {
                let x = number(json)?;
                Some(if base.is_bool() {
                    SignalValue::Bool(x != 0.0)
                } else {
                    SignalValue::Scalar(x)
                })
            }
            serde_json::Value::Array(items) if items.iter().all(|i| !i.is_array()) => {
                let elems: Option<Vec<f64>> = items.iter().map(number).collect();
                let elems = elems?;
                Some(if base.is_bool() {
                    SignalValue::BoolVector(DVector::from_iterator(
                        elems.len(),
                        elems.iter().map(|x| *x != 0.0),
                    ))
                } else {
                    SignalValue::Vector(DVector::from_vec(elems))
                })
            }
            serde_json::Value::Array(rows) => {
                let nrows = rows.len();
                let ncols = rows.first()?.as_array()?.len();
                let mut flat = Vec::with_capacity(nrows * ncols);
                for row in rows {
                    let row = row.as_array()?;
                    if row.len() != ncols {
                        return None;
                    }
                    for item in row {
                        flat.push(number(item)?);
                    }
                }
                Some(if base.is_bool() {
                    SignalValue::BoolMatrix(DMatrix::from_row_iterator(
                        nrows,
                        ncols,
                        flat.iter().map(|x| *x != 0.0),
                    ))
                } else {
                    SignalValue::Matrix(DMatrix::from_row_slice(nrows, ncols, &flat))
                })
            }
            _ => None,
        }
    }
}

// Serializes as a plain JSON literal: number, bool, array, or array of
// row-major rows. Hosts diff these against the generated-C harness output.
impl serde::Serialize for SignalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SignalValue::Scalar(x) => serializer.serialize_f64(*x),
            SignalValue::Bool(b) => serializer.serialize_bool(*b),
            SignalValue::Vector(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for x in v.iter() {
                    seq.serialize_element(x)?;
                }
                seq.end()
            }
            SignalValue::BoolVector(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for b in v.iter() {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            SignalValue::Matrix(m) => {
                let mut seq = serializer.serialize_seq(Some(m.nrows()))?;
                for r in 0..m.nrows() {
                    let row: Vec<f64> = (0..m.ncols()).map(|c| m[(r, c)]).collect();
                    seq.serialize_element(&row)?;
                }
                seq.end()
            }
            SignalValue::BoolMatrix(m) => {
                let mut seq = serializer.serialize_seq(Some(m.nrows()))?;
                for r in 0..m.nrows() {
                    let row: Vec<bool> = (0..m.ncols()).map(|c| m[(r, c)]).collect();
                    seq.serialize_element(&row)?;
                }
                seq.end()
            }
        }
    }
}
