use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    InvalidBox { axis: usize, length: f64 },
    InvalidCutoff(f64),
    InvalidReferenceVolume(f64),
    InvalidSelection(String),
    NonFiniteCoordinate { atom: usize, value: f64 },
    InvalidSpecies { atom: usize, value: f64 },
    AtomCountMismatch { expected: usize, found: usize },
    MissingProperty(String),
    ResourceExhausted(String),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBox { axis, length } => {
                let axis = ["x", "y", "z"].get(*axis).copied().unwrap_or("?");
                write!(f, "box length along {axis} must be positive, got {length}")
            }
            Self::InvalidCutoff(cutoff) => write!(f, "cutoff must be positive, got {cutoff}"),
            Self::InvalidReferenceVolume(volume) => {
                write!(f, "reference atomic volume must be positive, got {volume}")
            }
            Self::InvalidSelection(reason) => write!(f, "invalid selection: {reason}"),
            Self::NonFiniteCoordinate { atom, value } => {
                write!(f, "atom {atom} has a non-finite coordinate: {value}")
            }
            Self::InvalidSpecies { atom, value } => {
                write!(f, "atom {atom} has an invalid species tag: {value}")
            }
            Self::AtomCountMismatch { expected, found } => {
                write!(f, "expected {expected} atoms in frame, found {found}")
            }
            Self::MissingProperty(key) => write!(f, "frame has no per-atom property '{key}'"),
            Self::ResourceExhausted(what) => write!(f, "out of memory while {what}"),
        }
    }
}

impl std::error::Error for ClusterError {}

pub type ClusterResult<T> = Result<T, ClusterError>;
