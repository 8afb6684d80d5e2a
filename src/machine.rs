use std::fmt;

use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

use crate::error::{Error, OperandFault, Result};
use crate::program::{Combo, Instruction, Opcode, Program, canonical_text};

/// The three-bit register machine.
///
/// State is three signed registers, an instruction pointer into a borrowed
/// [`Program`], and an append-only output buffer. Each step fetches an
/// `(opcode, operand)` pair at `ip`, executes it, and advances `ip` by two
/// unless a `jnz` is taken. The run is over once `ip` reaches the end of the
/// program.
///
/// Registers are arbitrary-precision [`BigInt`]s and never wrap: divisions
/// are truncating shifts of the magnitude and XOR acts on the
/// two's-complement value.
///
/// The machine imposes no step limit of its own. [`Machine::run`] will spin
/// forever on a program like `3,0` with `A != 0`; callers that need a bound
/// use [`Machine::run_for`].
pub struct Machine<'p> {
    program: &'p Program,
    registers: Registers,
    ip: usize,
    output: Vec<u8>,
    steps: u64,
}

/// The `A`, `B` and `C` registers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Registers {
    pub a: BigInt,
    pub b: BigInt,
    pub c: BigInt,
}

impl Registers {
    pub fn new(a: impl Into<BigInt>, b: impl Into<BigInt>, c: impl Into<BigInt>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            c: c.into(),
        }
    }

    /// `A` set, `B` and `C` zero: the search's starting state.
    pub fn with_a(a: impl Into<BigInt>) -> Self {
        Self {
            a: a.into(),
            ..Default::default()
        }
    }
}

/// What a single [`Machine::step`] left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halted,
}

/// How a bounded run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Halted,
    StepLimit,
}

/// Digits emitted by `out`, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Output(pub Vec<u8>);

impl Output {
    pub fn digits(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&canonical_text(&self.0))
    }
}

impl<'p> Machine<'p> {
    pub fn load(program: &'p Program, registers: Registers) -> Self {
        Self {
            program,
            registers,
            ip: 0,
            output: Vec::new(),
            steps: 0,
        }
    }

    /// Reinitialize for another run of the same program, keeping the output
    /// buffer's allocation.
    pub fn reset(&mut self, registers: Registers) {
        self.registers = registers;
        self.ip = 0;
        self.output.clear();
        self.steps = 0;
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_halted(&self) -> bool {
        self.ip >= self.program.len()
    }

    /// The instruction `step` would execute next, if any.
    pub fn current(&self) -> Option<Instruction> {
        if self.is_halted() {
            None
        } else {
            self.program.fetch(self.ip).ok()
        }
    }

    /// Execute one instruction. Calling this on a halted machine is a no-op.
    pub fn step(&mut self) -> Result<Step> {
        if self.is_halted() {
            return Ok(Step::Halted);
        }
        let Instruction { opcode, operand } = self.program.fetch(self.ip)?;
        let mut next = self.ip + 2;

        match opcode {
            Opcode::Adv => {
                self.registers.a = self.divide_a(operand)?;
            }
            Opcode::Bxl => {
                self.registers.b ^= BigInt::from(operand);
            }
            Opcode::Bst => {
                let value = self.combo(operand)?;
                self.registers.b = BigInt::from(low_octal(&value));
            }
            Opcode::Jnz => {
                if !self.registers.a.is_zero() {
                    let len = self.program.len();
                    if operand > len as u64 {
                        return Err(Error::OutOfBoundsJump {
                            ip: self.ip,
                            target: operand,
                            len,
                        });
                    }
                    next = operand as usize;
                }
            }
            Opcode::Bxc => {
                self.registers.b ^= &self.registers.c;
            }
            Opcode::Out => {
                let value = self.combo(operand)?;
                self.output.push(low_octal(&value));
            }
            Opcode::Bdv => {
                self.registers.b = self.divide_a(operand)?;
            }
            Opcode::Cdv => {
                self.registers.c = self.divide_a(operand)?;
            }
        }

        self.ip = next;
        self.steps += 1;
        if self.is_halted() {
            Ok(Step::Halted)
        } else {
            Ok(Step::Continue)
        }
    }

    /// Step until the instruction pointer runs off the end of the program.
    pub fn run(&mut self) -> Result<Output> {
        while self.step()? == Step::Continue {}
        Ok(Output(self.output.clone()))
    }

    /// Step until halted or until `max_steps` more instructions have run.
    pub fn run_for(&mut self, max_steps: u64) -> Result<Outcome> {
        let mut executed = 0;
        while !self.is_halted() {
            if executed >= max_steps {
                return Ok(Outcome::StepLimit);
            }
            self.step()?;
            executed += 1;
        }
        Ok(Outcome::Halted)
    }

    fn combo(&self, operand: u64) -> Result<BigInt> {
        let combo = Combo::decode(operand).map_err(|fault| Error::InvalidOperand {
            ip: self.ip,
            fault,
        })?;
        Ok(match combo {
            Combo::Literal(v) => BigInt::from(v),
            Combo::A => self.registers.a.clone(),
            Combo::B => self.registers.b.clone(),
            Combo::C => self.registers.c.clone(),
        })
    }

    /// `A / 2^combo(operand)`, truncated toward zero.
    fn divide_a(&self, operand: u64) -> Result<BigInt> {
        let exponent = self.combo(operand)?;
        shift_toward_zero(&self.registers.a, exponent).map_err(|fault| Error::InvalidOperand {
            ip: self.ip,
            fault,
        })
    }
}

/// `value mod 8` with a non-negative result.
fn low_octal(value: &BigInt) -> u8 {
    // Masking the two's-complement value with 7 is the floored remainder,
    // so the conversion always succeeds.
    (value & BigInt::from(7u8)).to_u8().unwrap_or(0)
}

/// Divide `value` by `2^exponent`, rounding toward zero.
fn shift_toward_zero(
    value: &BigInt,
    exponent: BigInt,
) -> std::result::Result<BigInt, OperandFault> {
    if exponent.sign() == Sign::Minus {
        return Err(OperandFault::NegativeShift(exponent));
    }
    // Past u64 the exponent exceeds the bit length of any value in memory.
    let Some(shift) = exponent.to_u64() else {
        return Ok(BigInt::zero());
    };
    // `>>` on a negative BigInt floors; shifting the magnitude truncates.
    let magnitude = value.magnitude() >> shift;
    Ok(BigInt::from_biguint(value.sign(), magnitude))
}

/// Run `program` to completion from the given registers.
pub fn run(program: &Program, registers: Registers) -> Result<Output> {
    Machine::load(program, registers).run()
}

/// Run `program` with `A = a` and `B = C = 0`; the search's evaluation
/// function.
pub fn evaluate(program: &Program, a: impl Into<BigInt>) -> Result<Output> {
    run(program, Registers::with_a(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Malformation;

    fn program(text: &str) -> Program {
        Program::parse(text).unwrap()
    }

    fn run_to_end(text: &str, registers: Registers) -> (Output, Registers) {
        let program = program(text);
        let mut machine = Machine::load(&program, registers);
        let output = machine.run().unwrap();
        (output, machine.registers().clone())
    }

    fn int(v: i64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn test_bst_from_c() {
        let (output, regs) = run_to_end("2,6", Registers::new(0, 0, 9));
        assert_eq!(regs.b, int(1));
        assert!(output.digits().is_empty());
        assert_eq!(output.to_string(), "");
    }

    #[test]
    fn test_out_literals_and_register() {
        let (output, _) = run_to_end("5,0,5,1,5,4", Registers::with_a(10));
        assert_eq!(output.to_string(), "0,1,2");
    }

    #[test]
    fn test_countdown_loop() {
        let (output, regs) = run_to_end("0,1,5,4,3,0", Registers::with_a(2024));
        assert_eq!(output.to_string(), "4,2,5,6,7,7,7,7,3,1,0");
        assert_eq!(regs.a, int(0));
    }

    #[test]
    fn test_halving_loop_from_ten() {
        // adv 1 halves A, out emits A mod 8, jnz loops while A != 0.
        let (output, regs) = run_to_end("0,1,5,4,3,0", Registers::with_a(10));
        assert_eq!(output.to_string(), "5,2,1,0");
        assert_eq!(regs.a, int(0));
    }

    #[test]
    fn test_bxl_literal() {
        let (_, regs) = run_to_end("1,7", Registers::new(0, 29, 0));
        assert_eq!(regs.b, int(26));
    }

    #[test]
    fn test_bxc() {
        let (_, regs) = run_to_end("4,0", Registers::new(0, 2029, 44354));
        assert_eq!(regs.b, int(2029 ^ 44354));
        assert_eq!(regs.c, int(44354));
    }

    #[test]
    fn test_bxl_large_literal() {
        let (_, regs) = run_to_end("1,1000", Registers::new(0, 1, 0));
        assert_eq!(regs.b, int(1001));
    }

    #[test]
    fn test_bdv_cdv() {
        let (_, regs) = run_to_end("6,2,7,3", Registers::with_a(100));
        assert_eq!(regs.a, int(100));
        assert_eq!(regs.b, int(25));
        assert_eq!(regs.c, int(12));
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        let (_, regs) = run_to_end("6,1", Registers::with_a(-7));
        assert_eq!(regs.b, int(-3));
    }

    #[test]
    fn test_huge_shift_clears() {
        // adv A: divides A by 2^A.
        let (_, regs) = run_to_end("0,4", Registers::with_a(BigInt::from(1) << 100));
        assert_eq!(regs.a, int(0));
        let (_, regs) = run_to_end("6,6", Registers::new(BigInt::from(1) << 500, 0, 500));
        assert_eq!(regs.b, int(1));
    }

    #[test]
    fn test_values_beyond_128_bits() {
        let big: BigInt = BigInt::from(1) << 200;
        let (_, regs) = run_to_end("0,0", Registers::with_a(-big.clone()));
        assert_eq!(regs.a, -big.clone());
        let (_, regs) = run_to_end("0,1", Registers::with_a(-big.clone()));
        assert_eq!(regs.a, -(BigInt::from(1) << 199usize));
        // Low octal digit of 2^200 + 5 is 5; bxl keeps the high bits.
        let (output, regs) = run_to_end("5,4,1,3", Registers::new(&big + 5, big.clone(), 0));
        assert_eq!(output.to_string(), "5");
        assert_eq!(regs.b, &big ^ BigInt::from(3));
    }

    #[test]
    fn test_negative_values_reduce_into_range() {
        let (output, regs) = run_to_end("2,4,5,4", Registers::with_a(-1));
        assert_eq!(regs.b, int(7));
        assert_eq!(output.to_string(), "7");
    }

    #[test]
    fn test_reserved_combo_operand() {
        let program = program("1,0,5,7");
        let err = Machine::load(&program, Registers::default()).run().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidOperand {
                ip: 2,
                fault: OperandFault::Reserved(7)
            }
        );
    }

    #[test]
    fn test_negative_shift() {
        let program = program("0,5");
        let err = Machine::load(&program, Registers::new(8, -1, 0)).run().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidOperand {
                ip: 0,
                fault: OperandFault::NegativeShift(int(-1))
            }
        );
    }

    #[test]
    fn test_jump_out_of_bounds() {
        let program = program("3,9");
        let err = Machine::load(&program, Registers::with_a(1)).run().unwrap_err();
        assert_eq!(
            err,
            Error::OutOfBoundsJump {
                ip: 0,
                target: 9,
                len: 2
            }
        );
    }

    #[test]
    fn test_jump_to_end_halts() {
        let program = program("3,4,5,4");
        let mut machine = Machine::load(&program, Registers::with_a(1));
        assert_eq!(machine.step().unwrap(), Step::Halted);
        assert_eq!(machine.ip(), 4);
        assert!(machine.output().is_empty());
        // Further steps do nothing.
        assert_eq!(machine.step().unwrap(), Step::Halted);
        assert_eq!(machine.steps(), 1);
    }

    #[test]
    fn test_jnz_not_taken_when_a_zero() {
        let (output, _) = run_to_end("3,0,5,1", Registers::default());
        assert_eq!(output.to_string(), "1");
    }

    #[test]
    fn test_jump_to_odd_ip_runs_off_end() {
        // jnz 1 lands on the operand word, which decodes as bxl 5, then the
        // fetch at ip 3 has no operand.
        let program = program("3,1,5,4");
        let err = Machine::load(&program, Registers::with_a(1)).run().unwrap_err();
        assert_eq!(
            err,
            Error::MalformedProgram(Malformation::Truncated { ip: 3, len: 4 })
        );
    }

    #[test]
    fn test_run_for_reports_step_limit() {
        let program = program("3,0");
        let mut machine = Machine::load(&program, Registers::with_a(1));
        assert_eq!(machine.run_for(100).unwrap(), Outcome::StepLimit);
        assert_eq!(machine.steps(), 100);
        assert!(!machine.is_halted());
    }

    #[test]
    fn test_run_for_halts() {
        let program = program("0,1,5,4,3,0");
        let mut machine = Machine::load(&program, Registers::with_a(2024));
        assert_eq!(machine.run_for(1_000).unwrap(), Outcome::Halted);
        assert_eq!(canonical_text(machine.output()), "4,2,5,6,7,7,7,7,3,1,0");
    }

    #[test]
    fn test_reset_clears_state() {
        let program = program("0,1,5,4,3,0");
        let mut machine = Machine::load(&program, Registers::with_a(2024));
        machine.run().unwrap();
        machine.reset(Registers::with_a(10));
        assert_eq!(machine.ip(), 0);
        assert!(machine.output().is_empty());
        assert_eq!(machine.run().unwrap().to_string(), "5,2,1,0");
    }

    #[test]
    fn test_current_instruction() {
        let program = program("0,1,5,4");
        let mut machine = Machine::load(&program, Registers::with_a(4));
        assert_eq!(machine.current().unwrap().opcode, Opcode::Adv);
        machine.step().unwrap();
        assert_eq!(machine.current().unwrap().opcode, Opcode::Out);
        machine.step().unwrap();
        assert!(machine.current().is_none());
    }

    #[test]
    fn test_evaluate() {
        let program = program("0,3,5,4,3,0");
        assert_eq!(
            evaluate(&program, 117440).unwrap().to_string(),
            program.to_string()
        );
    }
}
