use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use map_reduce::{input_files, Config, Coordinator};

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Port to serve workers on
    #[structopt(short, long, default_value = "1234")]
    port: u16,

    /// Seconds before an unreported task is handed to another worker
    #[structopt(short, long, default_value = "10")]
    timeout: u64,

    /// Milliseconds to keep answering workers after the job is done
    #[structopt(long, default_value = "1000")]
    grace: u64,

    /// Directory to take input files from, in addition to FILE
    #[structopt(short, long, parse(from_os_str))]
    dir: Option<PathBuf>,

    /// Extension of the input files picked from --dir
    #[structopt(long, default_value = ".txt")]
    ext: String,

    /// Files to process
    #[structopt(name = "FILE", parse(from_os_str))]
    files: Vec<PathBuf>,

    #[structopt(long, default_value = "10")]
    nreduce: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let mut files = opt.files;
    if let Some(dir) = opt.dir {
        files.extend(input_files(&dir, &opt.ext)?);
    }
    let c = Coordinator::new(Config {
        port: opt.port,
        files,
        nreduce: opt.nreduce,
        timeout: Duration::from_secs(opt.timeout),
        grace: Duration::from_millis(opt.grace),
    })?;
    c.launch().await?;
    Ok(())
}
