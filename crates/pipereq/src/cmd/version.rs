use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("pipereq {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pipereq");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PIPEREQ_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("features: rpc={}, cli=true", cfg!(feature = "rpc"));
    println!(
        "wire: max_payload={} bytes, max_in_flight={}",
        pipereq_frame::DEFAULT_MAX_PAYLOAD,
        pipereq_rpc::DEFAULT_MAX_IN_FLIGHT
    );

    Ok(SUCCESS)
}
