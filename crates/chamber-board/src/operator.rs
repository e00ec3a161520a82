use std::io::{self, BufRead, Write};

/// Confirms `WAIT_INPUT` instructions.
pub trait Operator {
    /// Show `prompt` and block until the operator confirms.
    fn confirm(&mut self, prompt: &str) -> io::Result<()>;
}

impl<F> Operator for F
where
    F: FnMut(&str) -> io::Result<()>,
{
    fn confirm(&mut self, prompt: &str) -> io::Result<()> {
        self(prompt)
    }
}

/// Prompts on stderr and waits for a line on stdin.
///
/// Stdout is left alone since it may carry observation data.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinOperator;

impl Operator for StdinOperator {
    fn confirm(&mut self, prompt: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        read_confirmation(&mut io::stdin().lock())
    }
}

fn read_confirmation(input: &mut impl BufRead) -> io::Result<()> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed while waiting for confirmation",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn confirmation_reads_one_line() {
        let mut input = Cursor::new(b"\nnext\n".to_vec());
        read_confirmation(&mut input).unwrap();
        let mut rest = String::new();
        input.read_line(&mut rest).unwrap();
        assert_eq!(rest, "next\n");
    }

    #[test]
    fn closed_input_is_an_error() {
        let err = read_confirmation(&mut Cursor::new(Vec::new())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn closures_are_operators() {
        let mut prompts = Vec::new();
        let mut operator = |prompt: &str| -> io::Result<()> {
            prompts.push(prompt.to_string());
            Ok(())
        };
        operator.confirm("ready?").unwrap();
        assert_eq!(prompts, vec!["ready?"]);
    }
}
