use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("arraybridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: arraybridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("ARRAYBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "wire: native-endian ({})",
        if cfg!(target_endian = "little") {
            "little"
        } else {
            "big"
        }
    );
    println!(
        "limits: max_depth={}, max_rank={}",
        arraybridge_codec::DEFAULT_MAX_DEPTH,
        arraybridge_codec::DEFAULT_MAX_RANK
    );

    Ok(SUCCESS)
}
