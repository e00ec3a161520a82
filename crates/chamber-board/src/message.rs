//! Textual messages exchanged with the control board.
//!
//! Instructions flow host to board (and come from protocol files), replies
//! flow board to host. Parsing checks each grammar from the most to the least
//! specific and fails with a single [`UnrecognizedMessage`] when none match.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Text that matches no known message grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized message {text:?}")]
pub struct UnrecognizedMessage {
    pub text: String,
}

impl UnrecognizedMessage {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

/// Instruction kinds, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstructionKind {
    Set,
    Wait,
    WaitInput,
    Measure,
    Reset,
}

impl InstructionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InstructionKind::Set => "SET",
            InstructionKind::Wait => "WAIT",
            InstructionKind::WaitInput => "WAIT_INPUT",
            InstructionKind::Measure => "MSR",
            InstructionKind::Reset => "RST",
        }
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of an experiment protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Set an actuator or parameter. `value` is kept as written (decimal or
    /// `1/N`) and forwarded verbatim.
    Set { target: String, value: String },
    /// Pause locally.
    Wait { millis: u64 },
    /// Pause until the operator confirms.
    WaitInput { prompt: String },
    /// Take `count` measurements, `wait_ms` apart.
    Measure { count: u32, wait_ms: u64 },
    /// Reset the board.
    Reset,
}

impl Instruction {
    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::Set { .. } => InstructionKind::Set,
            Instruction::Wait { .. } => InstructionKind::Wait,
            Instruction::WaitInput { .. } => InstructionKind::WaitInput,
            Instruction::Measure { .. } => InstructionKind::Measure,
            Instruction::Reset => InstructionKind::Reset,
        }
    }

    /// Parse text that must be an instruction.
    pub fn parse(text: &str) -> Result<Self, UnrecognizedMessage> {
        match Message::parse(text)? {
            Message::Instruction(instruction) => Ok(instruction),
            Message::Reply(_) => Err(UnrecognizedMessage::new(text)),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Set { target, value } => write!(f, "SET,{target},{value}"),
            Instruction::Wait { millis } => write!(f, "WAIT,{millis}"),
            Instruction::WaitInput { prompt } => write!(f, "WAIT_INPUT,{prompt}"),
            Instruction::Measure { count, wait_ms } => write!(f, "MSR,{count},{wait_ms}"),
            Instruction::Reset => f.write_str("RST"),
        }
    }
}

impl FromStr for Instruction {
    type Err = UnrecognizedMessage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instruction::parse(s)
    }
}

/// A message sent by the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledgement, with optional arguments (`OK,MSR`, `OK,DONE`, `OK,`).
    Ok { args: Vec<String> },
    /// Ordered names of the board's variables.
    VariablesList(Vec<String>),
    /// Identity of the chamber configuration.
    ChamberConfig(String),
}

impl Reply {
    /// Parse text that must be a reply.
    pub fn parse(text: &str) -> Result<Self, UnrecognizedMessage> {
        match Message::parse(text)? {
            Message::Reply(reply) => Ok(reply),
            Message::Instruction(_) => Err(UnrecognizedMessage::new(text)),
        }
    }

    /// Parse a reply from a transport payload.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, UnrecognizedMessage> {
        Reply::parse(&payload_text(raw)?)
    }

    /// Arguments of an `OK` reply, `None` for other replies.
    pub fn ok_args(&self) -> Option<&[String]> {
        match self {
            Reply::Ok { args } => Some(args),
            _ => None,
        }
    }

    /// Whether this is `OK` with `arg` as its first argument.
    pub fn is_ok_with(&self, arg: &str) -> bool {
        self.ok_args()
            .and_then(|args| args.first())
            .is_some_and(|first| first == arg)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok { args } if args.is_empty() => f.write_str("OK"),
            Reply::Ok { args } => write!(f, "OK,{}", args.join(",")),
            Reply::VariablesList(names) => write!(f, "VARIABLES_LIST,{}", names.join(",")),
            Reply::ChamberConfig(config) => write!(f, "CHAMBER_CONFIG,{config}"),
        }
    }
}

/// Every message of the board protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Instruction(Instruction),
    Reply(Reply),
}

impl Message {
    pub fn parse(text: &str) -> Result<Self, UnrecognizedMessage> {
        let unrecognized = || UnrecognizedMessage::new(text);
        let (head, rest) = match text.split_once(',') {
            Some((head, rest)) => (head, Some(rest)),
            None => (text, None),
        };

        let message: Message = match (head, rest) {
            ("WAIT_INPUT", Some(prompt)) => Instruction::WaitInput {
                prompt: prompt.to_string(),
            }
            .into(),
            ("VARIABLES_LIST", Some(names)) => {
                let names: Vec<&str> = names.split(',').collect();
                if !names.iter().all(|name| is_variable_name(name)) {
                    return Err(unrecognized());
                }
                Reply::VariablesList(names.into_iter().map(str::to_string).collect()).into()
            }
            ("CHAMBER_CONFIG", Some(config)) if is_config_name(config) => {
                Reply::ChamberConfig(config.to_string()).into()
            }
            ("SET", Some(args)) => {
                let (target, value) = args.split_once(',').ok_or_else(unrecognized)?;
                if !is_set_target(target) || !is_set_value(value) {
                    return Err(unrecognized());
                }
                Instruction::Set {
                    target: target.to_string(),
                    value: value.to_string(),
                }
                .into()
            }
            ("MSR", Some(args)) => {
                let (count, wait_ms) = args.split_once(',').ok_or_else(unrecognized)?;
                Instruction::Measure {
                    count: parse_digits(count).ok_or_else(unrecognized)?,
                    wait_ms: parse_digits(wait_ms).ok_or_else(unrecognized)?,
                }
                .into()
            }
            ("WAIT", Some(millis)) => Instruction::Wait {
                millis: parse_digits(millis).ok_or_else(unrecognized)?,
            }
            .into(),
            ("RST", None) => Instruction::Reset.into(),
            ("OK", rest) => Reply::Ok {
                args: rest
                    .map(|rest| rest.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
            }
            .into(),
            _ => return Err(unrecognized()),
        };
        Ok(message)
    }

    /// Parse a transport payload. Payloads that are not UTF-8 are unrecognized.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, UnrecognizedMessage> {
        Message::parse(&payload_text(raw)?)
    }
}

impl From<Instruction> for Message {
    fn from(instruction: Instruction) -> Self {
        Message::Instruction(instruction)
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        Message::Reply(reply)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Instruction(instruction) => fmt::Display::fmt(instruction, f),
            Message::Reply(reply) => fmt::Display::fmt(reply, f),
        }
    }
}

impl FromStr for Message {
    type Err = UnrecognizedMessage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s)
    }
}

fn payload_text(raw: &[u8]) -> Result<String, UnrecognizedMessage> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| UnrecognizedMessage::new(&String::from_utf8_lossy(raw)))
}

fn parse_digits<T: FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// `[a-z0-9_]*`
fn is_set_target(text: &str) -> bool {
    text.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// `-?\d*\.?\d*` or `1/\d*`
fn is_set_value(text: &str) -> bool {
    if let Some(divisor) = text.strip_prefix("1/") {
        return divisor.bytes().all(|b| b.is_ascii_digit());
    }
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    int.bytes().all(|b| b.is_ascii_digit()) && frac.bytes().all(|b| b.is_ascii_digit())
}

/// `[A-Za-z0-9_]+`
fn is_variable_name(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// `[A-Za-z0-9-]+`
fn is_config_name(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(text: &str) -> Instruction {
        Instruction::parse(text).unwrap()
    }

    fn reply(text: &str) -> Reply {
        Reply::parse(text).unwrap()
    }

    #[test]
    fn parse_set() {
        assert_eq!(
            instruction("SET,red,255"),
            Instruction::Set {
                target: "red".into(),
                value: "255".into()
            }
        );
        for value in ["-1.5", "0.25", ".5", "3.", "1/8", "1/", ""] {
            let text = format!("SET,pol_1,{value}");
            assert!(Instruction::parse(&text).is_ok(), "{text} should parse");
        }
    }

    #[test]
    fn reject_malformed_set() {
        for text in [
            "ST,red,255",
            "SET,Red,255",
            "SET,red",
            "SET,red,abc",
            "SET,red,1.2.3",
            "SET,red,2/3",
            "SET,red,--1",
            "SET,red,1,2",
        ] {
            assert!(Message::parse(text).is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn parse_measure() {
        assert_eq!(
            instruction("MSR,100,10"),
            Instruction::Measure {
                count: 100,
                wait_ms: 10
            }
        );
        assert!(Message::parse("MR,100,10").is_err());
        assert!(Message::parse("MSR,,10").is_err());
        assert!(Message::parse("MSR,10").is_err());
        assert!(Message::parse("MSR,-1,0").is_err());
        assert!(Message::parse("MSR,99999999999,0").is_err());
    }

    #[test]
    fn parse_waits() {
        assert_eq!(instruction("WAIT,100"), Instruction::Wait { millis: 100 });
        assert!(Message::parse("WAIT,").is_err());
        assert!(Message::parse("WAIT,1s").is_err());
        assert_eq!(
            instruction("WAIT_INPUT,Insert polarizer, then press enter"),
            Instruction::WaitInput {
                prompt: "Insert polarizer, then press enter".into()
            }
        );
        assert_eq!(
            instruction("WAIT_INPUT,"),
            Instruction::WaitInput { prompt: "".into() }
        );
    }

    #[test]
    fn parse_reset() {
        assert_eq!(instruction("RST"), Instruction::Reset);
        assert!(Message::parse("RST,now").is_err());
    }

    #[test]
    fn parse_ok_replies() {
        assert_eq!(reply("OK"), Reply::Ok { args: vec![] });
        assert_eq!(reply("OK,"), Reply::Ok { args: vec!["".into()] });
        assert!(reply("OK,DONE").is_ok_with("DONE"));
        assert!(reply("OK,MSR").is_ok_with("MSR"));
        assert!(!reply("OK,").is_ok_with("MSR"));
        assert!(Message::parse("OKAY").is_err());
    }

    #[test]
    fn parse_variables_list() {
        assert_eq!(
            reply("VARIABLES_LIST,counter,flag,red,green,blue,current"),
            Reply::VariablesList(
                ["counter", "flag", "red", "green", "blue", "current"]
                    .map(String::from)
                    .to_vec()
            )
        );
        assert!(Message::parse("VARIABLES_LIST,counter,").is_err());
        assert!(Message::parse("VARIABLES_LIST").is_err());
        assert!(Message::parse("VARIABLES_LIST,a-b").is_err());
    }

    #[test]
    fn parse_chamber_config() {
        assert_eq!(
            reply("CHAMBER_CONFIG,lt-standard"),
            Reply::ChamberConfig("lt-standard".into())
        );
        assert!(Message::parse("CHAMBER_CONFIG,standard,asd").is_err());
        assert!(Message::parse("CHAMBER_CONFIG,").is_err());
    }

    #[test]
    fn kind_filters() {
        assert!(Instruction::parse("OK,DONE").is_err());
        assert!(Reply::parse("SET,red,1").is_err());
        assert!(Message::parse("TEST,hello").is_err());
    }

    #[test]
    fn display_renders_wire_text() {
        for text in [
            "SET,red,128",
            "SET,osr_c,1/8",
            "MSR,3,0",
            "WAIT,250",
            "WAIT_INPUT,ready?",
            "RST",
            "OK",
            "OK,MSR",
            "VARIABLES_LIST,counter,red",
            "CHAMBER_CONFIG,wt-standard",
        ] {
            assert_eq!(Message::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn non_utf8_payload_is_unrecognized() {
        let err = Message::from_bytes(&[0x4f, 0x4b, 0xff]).unwrap_err();
        assert_eq!(err.text, "OK\u{fffd}");
        assert!(Reply::from_bytes(b"OK,DONE").unwrap().is_ok_with("DONE"));
    }
}
