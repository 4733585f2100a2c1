use atomicwrites::{AllowOverwrite, AtomicFile};

use log::trace;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::fs;

use map_reduce::{app, output_path};

use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Files to process
    #[structopt(name = "FILE", parse(from_os_str))]
    files: Vec<PathBuf>,

    /// Directory to write mr-out-0 into
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    dir: PathBuf,

    /// Application to run: wc, indexer or crash
    #[structopt(short, long, default_value = "wc")]
    app: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let (map, reduce) = app::named(&opt.app)?;
    let mut cnt = BTreeMap::<String, Vec<String>>::new();

    for fname in opt.files.iter() {
        let contents = fs::read_to_string(fname)?;
        for kv in map(fname, &contents) {
            cnt.entry(kv.key).or_default().push(kv.value);
        }
    }

    let path = output_path(&opt.dir, 0);
    let mut s = String::new();
    for (k, vs) in cnt.iter() {
        s.push_str(&format!("{} {}\n", k, reduce(k, vs)));
    }
    let af = AtomicFile::new(&path, AllowOverwrite);
    af.write(|f| f.write_all(s.as_bytes()))?;
    trace!("output {:?}", path);
    Ok(())
}
