use argh::FromArgs;
use tracing::{info, Level};

use caskade::{Caskade, ConcreteSystem};

#[derive(Debug, FromArgs)]
/// Drives a caskade directory through a write/link/checkpoint/pause/resume/close cycle.
struct Opts {
    #[argh(switch)]
    /// emit debug info
    debug: bool,

    #[argh(option, default = "String::from(\"./caskade-data\")")]
    /// directory to open or create the caskade in
    dir: String,

    #[argh(option, default = "1000")]
    /// number of distinct blobs to write
    count: usize,
}

fn main() {
    let opts: Opts = argh::from_env();

    if opts.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .init();
    }

    let mut caskade: Caskade<ConcreteSystem> = Caskade::open(opts.dir, None).unwrap();

    let anchor = caskade::Rake::build_new(0).unwrap();
    let mut last_hash = None;
    for i in 0..opts.count {
        let value = format!("entry {i}");
        let hash = caskade.write_bytes(value.as_bytes(), false).unwrap();
        caskade.set_link(anchor, 0, hash).unwrap();
        last_hash = Some(hash);
    }

    caskade.checkpoint().unwrap();
    info!(count = opts.count, "wrote entries");

    if let Some(hash) = last_hash {
        let back = caskade.read_bytes(&hash).unwrap();
        info!(value = %String::from_utf8_lossy(&back), "read back last entry");
    }

    caskade.pause().unwrap();
    caskade.resume().unwrap();
    caskade.close().unwrap();
}
