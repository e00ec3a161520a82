use std::io::{self, BufRead, Write};

use crate::cmd::{install_ctrlc_handler, ConsoleArgs};
use crate::exit::{io_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

const PROMPT: &str = ">>> ";

pub fn run(args: ConsoleArgs, format: OutputFormat) -> CliResult<i32> {
    let mut board = args.link.open_board()?;
    install_ctrlc_handler(board.cancellation_token())?;

    let schema = board.schema();
    eprintln!("connected to {} ({})", schema.config, schema.variables.join(","));

    let stdin = io::stdin();
    let mut lines = stdin.lock();
    loop {
        let Some(command) = next_command(&mut lines).map_err(|err| io_error("stdin", err))? else {
            break;
        };

        let transport = board.transport_mut();
        transport
            .send(command.as_bytes())
            .map_err(|err| transport_error("send failed", err))?;
        let reply = transport
            .receive_within(args.reply_timeout)
            .map_err(|err| transport_error("receive failed", err))?;
        print_reply(&reply, format);
    }

    eprintln!("{}", board.stats());
    Ok(SUCCESS)
}

/// Prompt on stderr and read the next non-empty line. `None` at end of input.
fn next_command(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    loop {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{PROMPT}")?;
        stderr.flush()?;
        drop(stderr);

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let command = line.trim();
        if !command.is_empty() {
            return Ok(Some(command.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn skips_blank_lines() {
        let mut input = Cursor::new(b"\n  \nSET,red,1\r\nRST\n".to_vec());
        assert_eq!(next_command(&mut input).unwrap().as_deref(), Some("SET,red,1"));
        assert_eq!(next_command(&mut input).unwrap().as_deref(), Some("RST"));
        assert_eq!(next_command(&mut input).unwrap(), None);
    }
}
