use std::fmt;

use num_bigint::BigInt;
use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while loading, running or searching a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("malformed program: {0}")]
    MalformedProgram(Malformation),

    #[error("invalid operand at ip {ip}: {fault}")]
    InvalidOperand { ip: usize, fault: OperandFault },

    #[error("jump at ip {ip} targets {target}, past the end of a {len}-word program")]
    OutOfBoundsJump { ip: usize, target: u64, len: usize },

    #[error("no self-reproducing seed in {attempts} candidates starting at {start}")]
    SearchExhausted { start: u64, attempts: u64 },

    #[error("no self-reproducing seed is consistent with the program's octal structure")]
    NoSelfReproducingSeed,

    #[error("seed {seed} prints '{output}', not the program")]
    NotReproduced { seed: BigInt, output: String },

    #[error("search interrupted after {candidates} candidates")]
    Interrupted { candidates: u64 },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl Error {
    /// True for faults that depend on the seed rather than on the program.
    ///
    /// The search drivers skip a candidate that fails this way instead of
    /// aborting.
    pub fn is_candidate_fault(&self) -> bool {
        matches!(
            self,
            Error::InvalidOperand { .. }
                | Error::OutOfBoundsJump { .. }
                | Error::MalformedProgram(Malformation::Truncated { .. })
                | Error::MalformedProgram(Malformation::BadOpcode { .. })
        )
    }
}

/// Structural defects in a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformation {
    /// No words at all.
    Empty,
    /// Odd number of words; the last opcode has no operand.
    OddLength(usize),
    /// A word in opcode position lies outside 0..=7.
    BadOpcode { ip: usize, word: u64 },
    /// An instruction fetch would read past the end of the program.
    Truncated { ip: usize, len: usize },
}

impl fmt::Display for Malformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformation::Empty => write!(f, "program is empty"),
            Malformation::OddLength(len) => {
                write!(f, "odd length {len}, last opcode has no operand")
            }
            Malformation::BadOpcode { ip, word } => {
                write!(f, "word {word} at ip {ip} is not an opcode")
            }
            Malformation::Truncated { ip, len } => {
                write!(f, "fetch at ip {ip} reads past the end of a {len}-word program")
            }
        }
    }
}

/// Why a combo operand could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandFault {
    /// Combo operand 7 (or anything above it) is reserved.
    Reserved(u64),
    /// A division resolved a negative power of two.
    NegativeShift(BigInt),
}

impl fmt::Display for OperandFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandFault::Reserved(word) => write!(f, "combo operand {word} is reserved"),
            OperandFault::NegativeShift(count) => {
                write!(f, "division by 2^{count} has a negative exponent")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_faults() {
        let fault = Error::InvalidOperand {
            ip: 0,
            fault: OperandFault::NegativeShift(BigInt::from(-1)),
        };
        assert!(fault.is_candidate_fault());
        assert!(
            Error::OutOfBoundsJump {
                ip: 2,
                target: 9,
                len: 4
            }
            .is_candidate_fault()
        );
        assert!(!Error::MalformedProgram(Malformation::OddLength(3)).is_candidate_fault());
        assert!(!Error::NoSelfReproducingSeed.is_candidate_fault());
    }

    #[test]
    fn test_messages() {
        let err = Error::InvalidOperand {
            ip: 4,
            fault: OperandFault::Reserved(7),
        };
        assert_eq!(err.to_string(), "invalid operand at ip 4: combo operand 7 is reserved");
        let err = Error::MalformedProgram(Malformation::OddLength(5));
        assert_eq!(
            err.to_string(),
            "malformed program: odd length 5, last opcode has no operand"
        );
    }
}
