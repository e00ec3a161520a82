use chamber_frame::DEVICE_BUFFER_SIZE;
use chamber_transport::FIRMWARE_SEQUENCE_ORIGIN;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("chamber {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: chamber");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("CHAMBER_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("device_buffer: {DEVICE_BUFFER_SIZE} bytes");
    println!("sequence_origin: {FIRMWARE_SEQUENCE_ORIGIN}");

    Ok(SUCCESS)
}
