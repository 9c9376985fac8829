use std::num::NonZeroU16;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    #[clap(short, long, default_value = "8080", env = "SANDBAR_PORT")]
    pub port: NonZeroU16,

    #[clap(long, default_value = "127.0.0.1", env = "SANDBAR_HOST")]
    pub host: String,

    #[clap(short, long, default_value = "./sandbar.yaml", env = "SANDBAR_CONFIG_FILE")]
    pub config_file: PathBuf,
}
