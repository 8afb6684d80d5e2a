use std::fmt;

use crate::error::{Error, Malformation, OperandFault, Result};

/// The eight opcodes of the three-bit machine.
///
/// Every instruction is a pair of words `(opcode, operand)`. How the operand
/// is read depends on the opcode: `bxl` and `jnz` take it as a literal, `bxc`
/// ignores it, and everything else resolves it as a [`Combo`] operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `A := A / 2^combo`
    Adv,
    /// `B := B ^ literal`
    Bxl,
    /// `B := combo mod 8`
    Bst,
    /// `if A != 0 { ip := literal }`
    Jnz,
    /// `B := B ^ C`
    Bxc,
    /// emit `combo mod 8`
    Out,
    /// `B := A / 2^combo`
    Bdv,
    /// `C := A / 2^combo`
    Cdv,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Adv => "adv",
            Opcode::Bxl => "bxl",
            Opcode::Bst => "bst",
            Opcode::Jnz => "jnz",
            Opcode::Bxc => "bxc",
            Opcode::Out => "out",
            Opcode::Bdv => "bdv",
            Opcode::Cdv => "cdv",
        }
    }

    /// Whether the operand is resolved through [`Combo::decode`].
    pub fn takes_combo(self) -> bool {
        matches!(
            self,
            Opcode::Adv | Opcode::Bst | Opcode::Out | Opcode::Bdv | Opcode::Cdv
        )
    }
}

impl TryFrom<u64> for Opcode {
    type Error = u64;

    fn try_from(word: u64) -> std::result::Result<Self, u64> {
        Ok(match word {
            0 => Opcode::Adv,
            1 => Opcode::Bxl,
            2 => Opcode::Bst,
            3 => Opcode::Jnz,
            4 => Opcode::Bxc,
            5 => Opcode::Out,
            6 => Opcode::Bdv,
            7 => Opcode::Cdv,
            other => return Err(other),
        })
    }
}

/// A decoded combo operand. The reserved value 7 has no representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combo {
    Literal(u8),
    A,
    B,
    C,
}

impl Combo {
    pub fn decode(word: u64) -> std::result::Result<Combo, OperandFault> {
        match word {
            0..=3 => Ok(Combo::Literal(word as u8)),
            4 => Ok(Combo::A),
            5 => Ok(Combo::B),
            6 => Ok(Combo::C),
            _ => Err(OperandFault::Reserved(word)),
        }
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combo::Literal(v) => write!(f, "{v}"),
            Combo::A => write!(f, "A"),
            Combo::B => write!(f, "B"),
            Combo::C => write!(f, "C"),
        }
    }
}

/// One fetched `(opcode, operand)` pair. The operand is kept raw; decoding
/// it as a combo happens at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: u64,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode.mnemonic();
        if self.opcode.takes_combo() {
            return match Combo::decode(self.operand) {
                Ok(combo) => write!(f, "{name} {combo}"),
                Err(_) => write!(f, "{name} ?{}", self.operand),
            };
        }
        match self.opcode {
            Opcode::Bxc => write!(f, "{name}"),
            _ => write!(f, "{name} {}", self.operand),
        }
    }
}

/// An immutable, validated program: an even number of words whose opcode
/// positions all hold 0..=7.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Program {
    words: Vec<u64>,
}

impl Program {
    pub fn new(words: Vec<u64>) -> Result<Self> {
        if words.is_empty() {
            return Err(Error::MalformedProgram(Malformation::Empty));
        }
        if words.len() % 2 != 0 {
            return Err(Error::MalformedProgram(Malformation::OddLength(words.len())));
        }
        for (ip, &word) in words.iter().enumerate().step_by(2) {
            if Opcode::try_from(word).is_err() {
                return Err(Error::MalformedProgram(Malformation::BadOpcode { ip, word }));
            }
        }
        Ok(Self { words })
    }

    /// Parse the canonical comma-separated decimal form, e.g. `0,3,5,4,3,0`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::MalformedProgram(Malformation::Empty));
        }
        let words = text
            .split(',')
            .map(|field| {
                let field = field.trim();
                field.parse::<u64>().map_err(|e| Error::Parse {
                    line: 1,
                    message: format!("invalid program word '{field}': {e}"),
                })
            })
            .collect::<Result<Vec<u64>>>()?;
        Self::new(words)
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false: [`Program::new`] rejects an empty word list.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Fetch the instruction starting at `ip`.
    ///
    /// `ip` may be odd after a jump, in which case an operand word is read as
    /// an opcode and must still be in range.
    pub fn fetch(&self, ip: usize) -> Result<Instruction> {
        let len = self.words.len();
        if ip + 1 >= len {
            return Err(Error::MalformedProgram(Malformation::Truncated { ip, len }));
        }
        let word = self.words[ip];
        let opcode = Opcode::try_from(word)
            .map_err(|word| Error::MalformedProgram(Malformation::BadOpcode { ip, word }))?;
        Ok(Instruction {
            opcode,
            operand: self.words[ip + 1],
        })
    }

    /// True when `output` is exactly this program, element for element.
    ///
    /// Equivalent to comparing `canonical_text(output)` with the program's
    /// own text, without building either string.
    pub fn is_reproduced_by(&self, output: &[u8]) -> bool {
        output.len() == self.words.len()
            && output
                .iter()
                .zip(&self.words)
                .all(|(&digit, &word)| digit as u64 == word)
    }

    /// Human-readable listing, one instruction pair per line.
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (pair, chunk) in self.words.chunks(2).enumerate() {
            let ip = pair * 2;
            // Construction guarantees both words exist and the opcode is valid.
            if let Ok(instruction) = self.fetch(ip) {
                let _ = writeln!(out, "{ip:04}: [{} {}]  {instruction}", chunk[0], chunk[1]);
            }
        }
        out
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&canonical_text(&self.words))
    }
}

/// Render values as comma-joined decimal text with no trailing separator.
pub fn canonical_text<T: fmt::Display>(values: &[T]) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{value}");
    }
    out
}
