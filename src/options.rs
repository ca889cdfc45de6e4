use clap::Parser;

/// mate3-bridge - decodes Outback MATE3 UDP telemetry
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Listen on this UDP port instead of the configured one
    #[clap(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
