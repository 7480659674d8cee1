use core::fmt;
use core::str::FromStr;

/// Element type of a signal.
///
/// Numeric bases all evaluate as `f64` in the interpreter; the base only
/// matters for C declarations and for compatibility checks, which never
/// unify distinct bases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum BaseType {
    #[strum(serialize = "double")]
    Double,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "long")]
    Long,
    #[strum(serialize = "bool")]
    Bool,
}

impl BaseType {
    pub fn is_bool(&self) -> bool {
        matches!(self, BaseType::Bool)
    }

    /// The C99 spelling of this base type.
    pub fn c_name(&self) -> &'static str {
        match self {
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Long => "long",
            BaseType::Bool => "bool",
        }
    }
}

/// The shape-and-base type of a signal edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalType {
    Scalar(BaseType),
    Vector(BaseType, usize),
    Matrix(BaseType, usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeParseError {
    #[error("unknown base type `{0}`")]
    UnknownBase(String),
    #[error("invalid array size `{0}`")]
    InvalidSize(String),
    #[error("array size must be positive, got {0}")]
    NonPositiveSize(i64),
    #[error("too many dimensions in `{0}` (at most 2 are supported)")]
    TooManyDimensions(String),
    #[error("trailing characters after type in `{0}`")]
    TrailingGarbage(String),
}

impl SignalType {
    pub fn base(&self) -> BaseType {
        match self {
            SignalType::Scalar(b) | SignalType::Vector(b, _) | SignalType::Matrix(b, _, _) => *b,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, SignalType::Scalar(_))
    }

    pub fn is_bool(&self) -> bool {
        self.base().is_bool()
    }

    /// Number of elements carried by one value of this type.
    pub fn element_count(&self) -> usize {
        match self {
            SignalType::Scalar(_) => 1,
            SignalType::Vector(_, n) => *n,
            SignalType::Matrix(_, r, c) => r * c,
        }
    }

    /// Same type with a different base, keeping the shape.
    pub fn with_base(&self, base: BaseType) -> SignalType {
        match *self {
            SignalType::Scalar(_) => SignalType::Scalar(base),
            SignalType::Vector(_, n) => SignalType::Vector(base, n),
            SignalType::Matrix(_, r, c) => SignalType::Matrix(base, r, c),
        }
    }

    /// Whether `source` may drive a port expecting `self`.
    ///
    /// Compatibility is exact equality: no base promotion, no shape
    /// unification. Reflexive and symmetric by construction.
    pub fn compatible(&self, other: &SignalType) -> bool {
        self == other
    }

    /// Human-readable description of why `a` cannot drive `b`, or `None`
    /// when the two are compatible. The propagator reports this verbatim.
    pub fn compatibility_error(a: &SignalType, b: &SignalType) -> Option<String> {
        if a.compatible(b) {
            return None;
        }
        Some(match (a, b) {
            (SignalType::Scalar(x), SignalType::Scalar(y)) => {
                format!("scalar base types differ: {x} vs {y}")
            }
            (SignalType::Vector(x, n), SignalType::Vector(y, m)) if x == y => {
                format!("vector sizes differ: {x}[{n}] vs {y}[{m}]")
            }
            (SignalType::Matrix(x, r1, c1), SignalType::Matrix(y, r2, c2)) if x == y => {
                format!("matrix dimensions differ: {x}[{r1}][{c1}] vs {y}[{r2}][{c2}]")
            }
            _ => format!("incompatible signal types: {a} vs {b}"),
        })
    }

    /// Whether `text` parses as a signal type.
    pub fn is_valid(text: &str) -> bool {
        text.parse::<SignalType>().is_ok()
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Scalar(b) => write!(f, "{b}"),
            SignalType::Vector(b, n) => write!(f, "{b}[{n}]"),
            SignalType::Matrix(b, r, c) => write!(f, "{b}[{r}][{c}]"),
        }
    }
}

impl FromStr for SignalType {
    type Err = TypeParseError;

    /// Parses `base`, `base[n]` or `base[r][c]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let base_end = s.find('[').unwrap_or(s.len());
        let (base_str, mut rest) = s.split_at(base_end);
        let base = base_str
            .trim()
            .parse::<BaseType>()
            .map_err(|_| TypeParseError::UnknownBase(base_str.trim().to_string()))?;

        let mut dims = Vec::new();
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped
                .find(']')
                .ok_or_else(|| TypeParseError::TrailingGarbage(s.to_string()))?;
            let dim_str = &stripped[..close];
            let dim: i64 = dim_str
                .trim()
                .parse()
                .map_err(|_| TypeParseError::InvalidSize(dim_str.trim().to_string()))?;
            if dim <= 0 {
                return Err(TypeParseError::NonPositiveSize(dim));
            }
            dims.push(dim as usize);
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return Err(TypeParseError::TrailingGarbage(s.to_string()));
        }

        match dims.as_slice() {
            [] => Ok(SignalType::Scalar(base)),
            [n] => Ok(SignalType::Vector(base, *n)),
            [r, c] => Ok(SignalType::Matrix(base, *r, *c)),
            _ => Err(TypeParseError::TooManyDimensions(s.to_string())),
        }
    }
}

impl serde::Serialize for SignalType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SignalType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
