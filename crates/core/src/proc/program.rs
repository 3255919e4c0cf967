//! Instruction set and program parsing.
//!
//! Programs are submitted as a single string of semicolon-separated
//! instructions. Each instruction is space-tokenized except for `PRINT`,
//! whose single parenthesized argument may contain spaces. Addresses are
//! written `0x` followed by hex digits; identifiers match
//! `[A-Za-z][A-Za-z0-9_]*`.

use crate::common::error::{SimError, SimResult};

/// Hard upper bound on program length, in instructions.
pub const MAX_PROGRAM_LEN: usize = 50;

/// One instruction of a process program.
///
/// Arithmetic sources and `WRITE` sources are kept as raw tokens: they
/// resolve at execution time as a variable lookup first, falling back to a
/// decimal literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Binds a variable to an immediate (clamped to u16 range at execution).
    Declare {
        /// Variable name.
        name: String,
        /// Raw immediate; may exceed u16 range until clamped.
        value: i64,
    },
    /// `dst = lhs + rhs`, clamped to [0, 65535].
    Add { dst: String, lhs: String, rhs: String },
    /// `dst = lhs - rhs`, clamped to [0, 65535].
    Sub { dst: String, lhs: String, rhs: String },
    /// `dst = lhs * rhs`, clamped to [0, 65535].
    Mul { dst: String, lhs: String, rhs: String },
    /// `dst = lhs / rhs`; division by zero halts the program.
    Div { dst: String, lhs: String, rhs: String },
    /// Writes a variable or literal value through the pager.
    Write {
        /// Target virtual address.
        addr: u32,
        /// Source variable name or decimal literal.
        src: String,
    },
    /// Reads through the pager into a variable.
    Read {
        /// Destination variable name.
        dst: String,
        /// Source virtual address.
        addr: u32,
    },
    /// Emits text or a variable's value to the process output.
    Print {
        /// Raw argument: a variable name, `"literal" + var`, or a quoted literal.
        arg: String,
    },
}

/// Returns true when `name` is a valid identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses a `0x…` hexadecimal address token.
fn parse_address(token: &str) -> Option<u32> {
    let digits = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Parses a full program source string.
///
/// Splits on `;`, trims each piece, skips empties, and parses the rest.
/// The parsed program must contain between 1 and [`MAX_PROGRAM_LEN`]
/// instructions or the whole submission is rejected.
pub fn parse_program(source: &str) -> SimResult<Vec<Instruction>> {
    let mut program = Vec::new();
    for piece in source.split(';') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        program.push(parse_instruction(piece)?);
    }

    if program.is_empty() || program.len() > MAX_PROGRAM_LEN {
        return Err(SimError::InvalidProgram(format!(
            "program must contain 1..={} instructions, found {}",
            MAX_PROGRAM_LEN,
            program.len()
        )));
    }
    Ok(program)
}

/// Parses one trimmed instruction string.
pub fn parse_instruction(text: &str) -> SimResult<Instruction> {
    let opcode = text.split_whitespace().next().unwrap_or("");

    // PRINT keeps its parenthesized argument intact, spaces included.
    if opcode == "PRINT" || text.starts_with("PRINT(") {
        let arg = text["PRINT".len()..].trim();
        let inner = arg
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| {
                SimError::InvalidProgram("PRINT argument must be parenthesized".into())
            })?;
        return Ok(Instruction::Print {
            arg: inner.to_string(),
        });
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    match opcode {
        "DECLARE" => {
            expect_arity(&tokens, 3, "DECLARE <variable> <value>")?;
            let name = expect_identifier(tokens[1])?;
            let value = tokens[2].parse::<i64>().map_err(|_| {
                SimError::InvalidProgram(format!("DECLARE value '{}' is not a number", tokens[2]))
            })?;
            Ok(Instruction::Declare { name, value })
        }
        "ADD" | "SUB" | "MUL" | "DIV" => {
            expect_arity(&tokens, 4, "<op> <result> <operand1> <operand2>")?;
            let dst = expect_identifier(tokens[1])?;
            let lhs = tokens[2].to_string();
            let rhs = tokens[3].to_string();
            Ok(match opcode {
                "ADD" => Instruction::Add { dst, lhs, rhs },
                "SUB" => Instruction::Sub { dst, lhs, rhs },
                "MUL" => Instruction::Mul { dst, lhs, rhs },
                _ => Instruction::Div { dst, lhs, rhs },
            })
        }
        "WRITE" => {
            expect_arity(&tokens, 3, "WRITE <address> <source>")?;
            let addr = parse_address(tokens[1]).ok_or_else(|| {
                SimError::InvalidProgram(format!("invalid address '{}', use 0xABCD form", tokens[1]))
            })?;
            let src = tokens[2].to_string();
            if !is_identifier(&src) && src.parse::<i64>().is_err() {
                return Err(SimError::InvalidProgram(format!(
                    "WRITE source '{}' is neither a variable nor a literal",
                    src
                )));
            }
            Ok(Instruction::Write { addr, src })
        }
        "READ" => {
            expect_arity(&tokens, 3, "READ <variable> <address>")?;
            let dst = expect_identifier(tokens[1])?;
            let addr = parse_address(tokens[2]).ok_or_else(|| {
                SimError::InvalidProgram(format!("invalid address '{}', use 0xABCD form", tokens[2]))
            })?;
            Ok(Instruction::Read { dst, addr })
        }
        "" => Err(SimError::InvalidProgram("empty instruction".into())),
        other => Err(SimError::InvalidProgram(format!(
            "unknown instruction '{}'",
            other
        ))),
    }
}

fn expect_arity(tokens: &[&str], want: usize, usage: &str) -> SimResult<()> {
    if tokens.len() != want {
        return Err(SimError::InvalidProgram(format!(
            "{} requires the form: {}",
            tokens.first().copied().unwrap_or(""),
            usage
        )));
    }
    Ok(())
}

fn expect_identifier(token: &str) -> SimResult<String> {
    if !is_identifier(token) {
        return Err(SimError::InvalidProgram(format!(
            "invalid variable name '{}'",
            token
        )));
    }
    Ok(token.to_string())
}
