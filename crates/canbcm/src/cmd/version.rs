use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("canbcm {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: canbcm");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("CANBCM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("wire: header {} bytes, frame {} bytes", canbcm_frame::HEAD_SIZE, canbcm_frame::FRAME_SIZE);
    println!("default_tick_hz: {}", canbcm_manager::DEFAULT_TICK_HZ);
    println!("features: manager={}, cli=true", cfg!(feature = "manager"));

    Ok(SUCCESS)
}
