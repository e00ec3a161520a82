use chamber_board::{InstructionKind, Protocol};
use serde::Serialize;

use crate::cmd::CheckArgs;
use crate::exit::{protocol_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Debug, Serialize)]
struct CheckOutput {
    protocol: String,
    instructions: usize,
    observations: u64,
    counts: Vec<KindCount>,
    targets_checked: bool,
}

#[derive(Debug, Serialize)]
struct KindCount {
    instruction: &'static str,
    count: usize,
}

const KINDS: [InstructionKind; 5] = [
    InstructionKind::Set,
    InstructionKind::Measure,
    InstructionKind::Wait,
    InstructionKind::WaitInput,
    InstructionKind::Reset,
];

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let protocol = Protocol::load(&args.protocol).map_err(protocol_error)?;
    if let Some(variables) = &args.variables {
        protocol.validate(variables).map_err(protocol_error)?;
    }

    let out = summarize(
        args.protocol.display().to_string(),
        &protocol,
        args.variables.is_some(),
    );
    print_check(&out, format);
    Ok(SUCCESS)
}

fn summarize(name: String, protocol: &Protocol, targets_checked: bool) -> CheckOutput {
    let counts = KINDS
        .iter()
        .map(|&kind| KindCount {
            instruction: kind.as_str(),
            count: protocol.instructions().filter(|i| i.kind() == kind).count(),
        })
        .filter(|c| c.count > 0)
        .collect();

    CheckOutput {
        protocol: name,
        instructions: protocol.len(),
        observations: protocol.expected_observations(),
        counts,
        targets_checked,
    }
}

fn print_check(out: &CheckOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["INSTRUCTION", "COUNT"]);
            for count in &out.counts {
                table.add_row(vec![count.instruction.to_string(), count.count.to_string()]);
            }
            println!("{table}");
            println!(
                "{}: {} instructions, {} observations",
                out.protocol, out.instructions, out.observations
            );
        }
        OutputFormat::Pretty => {
            println!("Protocol:      {}", out.protocol);
            println!("Instructions:  {}", out.instructions);
            println!("Observations:  {}", out.observations);
            println!(
                "SET targets:   {}",
                if out.targets_checked { "checked" } else { "not checked" }
            );
        }
        OutputFormat::Raw => println!("ok"),
    }
}
