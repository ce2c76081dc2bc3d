use clap::Parser;
use std::path::PathBuf;

/// Package a video into an adaptive-bitrate HLS ladder.
#[derive(Parser, Debug)]
#[command(name = "ladder", version, about, long_about = None)]
pub struct Args {
    /// Source video to package
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory to write the ladder into [default: output/<unix millis>]
    #[arg(short, long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// TOML configuration file. LADDER_* environment variables override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run at most this many encodes at once
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel: Option<u64>,

    /// Delete the input once the ladder has been written
    #[arg(long)]
    pub delete_input: bool,

    /// Print the package report as JSON instead of the manifest path
    #[arg(long)]
    pub json: bool,
}
