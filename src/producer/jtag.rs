//! JTAG producer: converts SVF files into a compact command stream.
//!
//! Every command starts with a one-byte opcode; integers are big-endian.
//!
//! | command | bytes |
//! |---|---|
//! | `STATE s` | `01 s` |
//! | `HDR/HIR/TDR/TIR n` | `02..05`, then as `SIR` |
//! | `ENDDR/ENDIR s` | `06/07 s` |
//! | `FREQUENCY f HZ` | `08 floor(f):u32` |
//! | `RUNTEST [s] n TCK [t SEC]` | `0B s n:u16 floor(t × 10⁷):u32` |
//! | `SIR/SDR n ...` | `0D/0E n:u32`, then per argument `code len:u32 bytes` |
//!
//! States: RESET 1, IDLE 2, DRPAUSE 3, IRPAUSE 4. Scan arguments are
//! written in descending code order (MASK 0E, TDO 0D, TDI 0C) so the TDI
//! payload comes last.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::scan::Declaration;

use super::{failure, option_param, Produced, ProducerContext};

const STREAM_PARAM: usize = 0;
const PATH_PARAM: usize = 2;

const STATE: u8 = 0x01;
const FREQUENCY: u8 = 0x08;
const RUNTEST: u8 = 0x0B;

fn scan_opcode(command: &str) -> Option<u8> {
    let opcode = match command {
        "HDR" => 0x02,
        "HIR" => 0x03,
        "TDR" => 0x04,
        "TIR" => 0x05,
        "SIR" => 0x0D,
        "SDR" => 0x0E,
        _ => return None,
    };
    Some(opcode)
}

fn end_opcode(command: &str) -> Option<u8> {
    match command {
        "ENDDR" => Some(0x06),
        "ENDIR" => Some(0x07),
        _ => None,
    }
}

fn state_code(state: &str) -> Option<u8> {
    let code = match state {
        "RESET" => 0x01,
        "IDLE" => 0x02,
        "DRPAUSE" => 0x03,
        "IRPAUSE" => 0x04,
        _ => return None,
    };
    Some(code)
}

fn argument_code(name: &str) -> Option<u8> {
    match name {
        "TDI" => Some(0x0C),
        "TDO" => Some(0x0D),
        "MASK" => Some(0x0E),
        _ => None,
    }
}

pub fn dependencies(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Vec<PathBuf>> {
    Ok(vec![ctx.resolve_param(decl, PATH_PARAM)?])
}

pub fn produce(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Produced> {
    let stream = option_param(decl, STREAM_PARAM, "a stream type")?;
    if stream != "svf" {
        return Err(failure(
            decl,
            format!("unsupported JTAG stream type '{}', expected svf", stream),
        ));
    }

    let (path, bytes) = ctx.read_param(decl, PATH_PARAM)?;
    let text = String::from_utf8_lossy(&bytes);
    let stream = convert_svf(&text).map_err(|(line, message)| {
        failure(decl, format!("{}:{}: {}", path.display(), line, message))
    })?;

    log::debug!(
        "{}: {} bytes of SVF became a {} byte JTAG stream",
        display_name(&path),
        bytes.len(),
        stream.len()
    );
    Ok(Produced {
        bytes: stream,
        dependencies: vec![path],
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    /// Contents of `( ... )` with whitespace removed.
    Group(String),
}

/// One `;`-terminated statement and the line it starts on.
struct Statement {
    line: usize,
    tokens: Vec<Token>,
}

type SvfError = (usize, String);

fn statements(text: &str) -> std::result::Result<Vec<Statement>, SvfError> {
    let mut statements = Vec::new();
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut group: Option<String> = None;
    let mut start_line = 1;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let code = match (raw.find('!'), raw.find("//")) {
            (Some(a), Some(b)) => &raw[..a.min(b)],
            (Some(a), None) | (None, Some(a)) => &raw[..a],
            (None, None) => raw,
        };

        for c in code.chars() {
            if group.is_some() {
                match c {
                    ')' => tokens.push(Token::Group(group.take().unwrap_or_default())),
                    c if c.is_whitespace() => {}
                    c => {
                        if let Some(content) = group.as_mut() {
                            content.push(c);
                        }
                    }
                }
                continue;
            }

            if c.is_whitespace() || c == '(' || c == ';' {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word).to_ascii_uppercase()));
                }
            } else {
                if tokens.is_empty() && word.is_empty() {
                    start_line = line_no;
                }
                word.push(c);
            }

            match c {
                '(' => {
                    if tokens.is_empty() {
                        start_line = line_no;
                    }
                    group = Some(String::new());
                }
                ';' => {
                    if !tokens.is_empty() {
                        statements.push(Statement {
                            line: start_line,
                            tokens: std::mem::take(&mut tokens),
                        });
                    }
                }
                _ => {}
            }
        }
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(&mut word).to_ascii_uppercase()));
        }
    }

    if group.is_some() {
        return Err((start_line, "unclosed '(' in SVF data".to_string()));
    }
    if !tokens.is_empty() {
        return Err((start_line, "statement is missing its terminating ';'".to_string()));
    }
    Ok(statements)
}

/// Convert SVF text to the command stream; errors carry the statement's line.
fn convert_svf(text: &str) -> std::result::Result<Vec<u8>, SvfError> {
    let mut out = Vec::new();
    for statement in statements(text)? {
        encode_statement(&statement.tokens, &mut out)
            .map_err(|message| (statement.line, message))?;
    }
    Ok(out)
}

fn word(tokens: &[Token], index: usize, what: &str) -> std::result::Result<String, String> {
    match tokens.get(index) {
        Some(Token::Word(word)) => Ok(word.clone()),
        Some(Token::Group(_)) => Err(format!("expected {}, found a data group", what)),
        None => Err(format!("expected {}", what)),
    }
}

fn state(tokens: &[Token], index: usize) -> std::result::Result<u8, String> {
    let name = word(tokens, index, "a TAP state")?;
    state_code(&name).ok_or_else(|| format!("unsupported TAP state '{}'", name))
}

fn number(text: &str) -> std::result::Result<f64, String> {
    text.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(|| format!("invalid number '{}'", text))
}

fn u32_field(value: f64, what: &str) -> std::result::Result<u32, String> {
    let floored = value.floor();
    if floored > u32::MAX as f64 {
        return Err(format!("{} {} does not fit in 32 bits", what, value));
    }
    Ok(floored as u32)
}

fn encode_statement(tokens: &[Token], out: &mut Vec<u8>) -> std::result::Result<(), String> {
    let command = word(tokens, 0, "a command")?;

    if command == "STATE" {
        if tokens.len() != 2 {
            return Err("STATE takes exactly one target state".to_string());
        }
        out.push(STATE);
        out.push(state(tokens, 1)?);
    } else if let Some(opcode) = end_opcode(&command) {
        if tokens.len() != 2 {
            return Err(format!("{} takes exactly one state", command));
        }
        out.push(opcode);
        out.push(state(tokens, 1)?);
    } else if command == "FREQUENCY" {
        let value = number(&word(tokens, 1, "a frequency")?)?;
        if word(tokens, 2, "HZ")? != "HZ" || tokens.len() != 3 {
            return Err("expected FREQUENCY <cycles> HZ".to_string());
        }
        out.push(FREQUENCY);
        out.extend_from_slice(&u32_field(value, "frequency")?.to_be_bytes());
    } else if command == "RUNTEST" {
        encode_runtest(&tokens[1..], out)?;
    } else if let Some(opcode) = scan_opcode(&command) {
        encode_scan(opcode, &tokens[1..], out)?;
    } else {
        return Err(format!("unsupported SVF command '{}'", command));
    }
    Ok(())
}

fn encode_runtest(args: &[Token], out: &mut Vec<u8>) -> std::result::Result<(), String> {
    let mut index = 0;
    let run_state = match args.first() {
        Some(Token::Word(w)) if state_code(w).is_some() => {
            index += 1;
            state(args, 0)?
        }
        _ => 0x02,
    };

    let count = word(args, index, "a TCK count")?;
    if word(args, index + 1, "TCK")? != "TCK" {
        return Err("expected RUNTEST [state] <count> TCK [<time> SEC]".to_string());
    }
    let edges: u16 = count
        .parse()
        .map_err(|_| format!("TCK count '{}' does not fit in 16 bits", count))?;
    index += 2;

    let mut time = 0.0;
    if index < args.len() {
        time = number(&word(args, index, "a time")?)?;
        if word(args, index + 1, "SEC")? != "SEC" || index + 2 != args.len() {
            return Err("expected RUNTEST [state] <count> TCK [<time> SEC]".to_string());
        }
    }

    out.push(RUNTEST);
    out.push(run_state);
    out.extend_from_slice(&edges.to_be_bytes());
    out.extend_from_slice(&u32_field(time * 10_000_000.0, "run time")?.to_be_bytes());
    Ok(())
}

fn encode_scan(opcode: u8, args: &[Token], out: &mut Vec<u8>) -> std::result::Result<(), String> {
    let length = word(args, 0, "a bit length")?;
    let bits: u32 = length
        .parse()
        .map_err(|_| format!("invalid bit length '{}'", length))?;

    let mut data: Vec<(u8, Vec<u8>)> = Vec::new();
    let mut rest = args[1..].iter();
    while let Some(token) = rest.next() {
        let Token::Word(name) = token else {
            return Err("data group without an argument name".to_string());
        };
        let code = argument_code(name)
            .ok_or_else(|| format!("unsupported scan argument '{}'", name))?;
        let Some(Token::Group(hex)) = rest.next() else {
            return Err(format!("{} needs a (hex) value", name));
        };
        if data.iter().any(|(c, _)| *c == code) {
            return Err(format!("{} given twice", name));
        }
        data.push((code, hex_bytes(hex)?));
    }
    data.sort_by(|a, b| b.0.cmp(&a.0));

    out.push(opcode);
    out.extend_from_slice(&bits.to_be_bytes());
    for (code, bytes) in data {
        out.push(code);
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&bytes);
    }
    Ok(())
}

/// Hex digits to bytes; an odd digit count gets a leading zero.
fn hex_bytes(hex: &str) -> std::result::Result<Vec<u8>, String> {
    let padded;
    let digits = if hex.len() % 2 == 1 {
        padded = format!("0{}", hex);
        padded.as_str()
    } else {
        hex
    };
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex data '{}'", hex))
        })
        .collect()
}
