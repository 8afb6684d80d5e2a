use std::path::Path;

use num_bigint::BigInt;

use crate::error::{Error, Result};
use crate::machine::Registers;
use crate::program::Program;

/// A program together with its initial registers, as written in an input
/// file:
///
/// ```text
/// Register A: 729
/// Register B: 0
/// Register C: 0
///
/// Program: 0,1,5,4,3,0
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInput {
    pub registers: Registers,
    pub program: Program,
}

impl MachineInput {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Parse {
            line: 0,
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::parse(&text)
    }

    /// Parse the labelled block. Blank lines are ignored; every register and
    /// the program must appear exactly once.
    pub fn parse(text: &str) -> Result<Self> {
        let mut a = None;
        let mut b = None;
        let mut c = None;
        let mut program = None;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let Some((label, value)) = raw.split_once(':') else {
                return Err(parse_error(line, format!("expected 'label: value', got '{raw}'")));
            };
            let value = value.trim();
            let slot = match label.trim() {
                "Register A" => &mut a,
                "Register B" => &mut b,
                "Register C" => &mut c,
                "Program" => {
                    if program.is_some() {
                        return Err(parse_error(line, "duplicate Program".to_string()));
                    }
                    program = Some(Program::parse(value).map_err(|err| match err {
                        Error::Parse { message, .. } => Error::Parse { line, message },
                        other => other,
                    })?);
                    continue;
                }
                other => return Err(parse_error(line, format!("unknown label '{other}'"))),
            };
            if slot.is_some() {
                return Err(parse_error(line, format!("duplicate {}", label.trim())));
            }
            let parsed = value
                .parse::<BigInt>()
                .map_err(|e| parse_error(line, format!("invalid register value '{value}': {e}")))?;
            *slot = Some(parsed);
        }

        let missing = |what: &str| parse_error(text.lines().count(), format!("missing {what}"));
        Ok(Self {
            registers: Registers {
                a: a.ok_or_else(|| missing("Register A"))?,
                b: b.ok_or_else(|| missing("Register B"))?,
                c: c.ok_or_else(|| missing("Register C"))?,
            },
            program: program.ok_or_else(|| missing("Program"))?,
        })
    }
}

fn parse_error(line: usize, message: String) -> Error {
    Error::Parse { line, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Malformation;

    const EXAMPLE: &str = "Register A: 729\nRegister B: 0\nRegister C: 0\n\nProgram: 0,1,5,4,3,0\n";

    #[test]
    fn test_parse_example() {
        let input = MachineInput::parse(EXAMPLE).unwrap();
        assert_eq!(input.registers, Registers::new(729, 0, 0));
        assert_eq!(input.program.to_string(), "0,1,5,4,3,0");
    }

    #[test]
    fn test_parse_example_runs() {
        let input = MachineInput::parse(EXAMPLE).unwrap();
        let output = crate::machine::run(&input.program, input.registers).unwrap();
        assert_eq!(output.to_string(), "4,6,3,5,6,3,5,2,1,0");
    }

    #[test]
    fn test_parse_register_beyond_128_bits() {
        let huge = "-340282366920938463463374607431768211457";
        let text = format!("Register A: {huge}\nRegister B: 0\nRegister C: 0\nProgram: 5,4\n");
        let input = MachineInput::parse(&text).unwrap();
        assert_eq!(input.registers.a, huge.parse::<BigInt>().unwrap());
    }

    #[test]
    fn test_parse_any_order_and_crlf() {
        let text = "Program: 1,7\r\nRegister C: 3\r\nRegister B: 29\r\nRegister A: 0\r\n";
        let input = MachineInput::parse(text).unwrap();
        assert_eq!(input.registers, Registers::new(0, 29, 3));
        assert_eq!(input.program.words(), &[1, 7]);
    }

    #[test]
    fn test_missing_register() {
        let err = MachineInput::parse("Register A: 1\nRegister B: 0\nProgram: 5,4\n").unwrap_err();
        assert_eq!(
            err,
            Error::Parse {
                line: 3,
                message: "missing Register C".to_string()
            }
        );
    }

    #[test]
    fn test_bad_register_value_reports_line() {
        let err = MachineInput::parse("Register A: 1\nRegister B: x\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_bad_program_word_reports_line() {
        let text = "Register A: 1\nRegister B: 0\nRegister C: 0\n\nProgram: 0,q\n";
        let err = MachineInput::parse(text).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 5, .. }));
    }

    #[test]
    fn test_malformed_program_passes_through() {
        let text = "Register A: 1\nRegister B: 0\nRegister C: 0\nProgram: 0,1,5\n";
        assert_eq!(
            MachineInput::parse(text).unwrap_err(),
            Error::MalformedProgram(Malformation::OddLength(3))
        );
    }

    #[test]
    fn test_duplicate_and_unknown_labels() {
        let err = MachineInput::parse("Register A: 1\nRegister A: 2\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
        let err = MachineInput::parse("Register D: 1\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
        let err = MachineInput::parse("just text\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = MachineInput::from_path(Path::new("/nonexistent/threebit-input.txt")).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 0, .. }));
    }
}
