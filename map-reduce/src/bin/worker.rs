use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use map_reduce::{app, Worker};

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Address of the coordinator
    #[structopt(short, long, default_value = "127.0.0.1:1234")]
    server: String,

    /// Shared directory for intermediate and output files
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    dir: PathBuf,

    /// Application to run: wc, indexer or crash
    #[structopt(short, long, default_value = "wc")]
    app: String,

    /// Milliseconds to wait before asking again when no task is idle
    #[structopt(short, long, default_value = "500")]
    backoff: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let (map, reduce) = app::named(&opt.app)?;
    let w = Worker {
        dir: opt.dir,
        server: opt.server,
        backoff: Duration::from_millis(opt.backoff),
        map,
        reduce,
    };
    w.launch().await?;
    Ok(())
}
