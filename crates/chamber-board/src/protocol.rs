//! Experiment protocols: instruction text, one instruction per line.
//!
//! Blank lines and lines starting with `#` are ignored. Errors carry the
//! 1-based line number they were found on.

use std::path::{Path, PathBuf};

use crate::message::{Instruction, Message};

/// Errors raised while loading or validating a protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("cannot read protocol {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: unrecognized instruction {text:?}")]
    Unrecognized { line: usize, text: String },

    /// A board reply where an instruction was expected.
    #[error("line {line}: {text:?} is a reply, not an instruction")]
    NotAnInstruction { line: usize, text: String },

    #[error("line {line}: SET targets unknown variable {target:?}")]
    UnknownTarget { line: usize, target: String },
}

/// One protocol instruction and the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub line: usize,
    pub instruction: Instruction,
}

/// A parsed experiment protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protocol {
    steps: Vec<Step>,
}

impl Protocol {
    /// Parse protocol text.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut steps = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match Message::parse(trimmed) {
                Ok(Message::Instruction(instruction)) => steps.push(Step { line, instruction }),
                Ok(Message::Reply(_)) => {
                    return Err(ProtocolError::NotAnInstruction {
                        line,
                        text: trimmed.to_string(),
                    })
                }
                Err(_) => {
                    return Err(ProtocolError::Unrecognized {
                        line,
                        text: trimmed.to_string(),
                    })
                }
            }
        }
        Ok(Self { steps })
    }

    /// Read and parse a protocol file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ProtocolError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Check that every `SET` targets one of `variables`.
    pub fn validate(&self, variables: &[String]) -> Result<(), ProtocolError> {
        for step in &self.steps {
            if let Instruction::Set { target, .. } = &step.instruction {
                if !variables.iter().any(|v| v == target) {
                    return Err(ProtocolError::UnknownTarget {
                        line: step.line,
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.steps.iter().map(|step| &step.instruction)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total measurements the protocol requests.
    pub fn expected_observations(&self) -> u64 {
        self.instructions()
            .map(|instruction| match instruction {
                Instruction::Measure { count, .. } => u64::from(*count),
                _ => 0,
            })
            .sum()
    }
}

impl FromIterator<Instruction> for Protocol {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self {
            steps: iter
                .into_iter()
                .enumerate()
                .map(|(index, instruction)| Step {
                    line: index + 1,
                    instruction,
                })
                .collect(),
        }
    }
}
