use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use async_std::prelude::*;
use async_std::task;

use log::error;

use bsm::{PsSnapshots, SnapshotSource};
use provgraph::export::{self, Format};
use provgraph::graph::ProvenanceGraph;
use provgraph::translate::{Config, Session};
use provgraph::{load, Error};

#[derive(StructOpt)]
struct Opt {
    /// json or dot
    #[structopt(short, long, default_value = "json")]
    format: Format,

    /// Where to write the graph instead of stdout
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Loads a provenance store from its record dumps
    Load {
        #[structopt(parse(from_os_str))]
        dir: PathBuf,
    },
    /// Translates an audit trail printed by `praudit -n -d,`
    Audit {
        #[structopt(parse(from_os_str))]
        trail: PathBuf,

        /// Dump of periodic `date; ps` output used to name processes
        #[structopt(long, parse(from_os_str))]
        ps: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let code = match run() {
        Ok(()) => exitcode::OK,
        Err(Error::IO(e)) => {
            error!("{}", e);
            exitcode::IOERR
        }
        Err(e) => {
            error!("{}", e);
            exitcode::DATAERR
        }
    };
    process::exit(code);
}

fn run() -> Result<(), Error> {
    let opt = Opt::from_args();

    let graph = match opt.cmd {
        Command::Load { dir } => load::load_dir(dir)?,
        Command::Audit { trail, ps } => audit(trail, ps)?,
    };

    match &opt.output {
        Some(path) => export::write(&graph, opt.format, BufWriter::new(File::create(path)?)),
        None => {
            let stdout = io::stdout();
            export::write(&graph, opt.format, stdout.lock())
        }
    }
}

fn audit(trail: PathBuf, ps: Option<PathBuf>) -> Result<ProvenanceGraph, Error> {
    let mut session: Session = match ps {
        Some(path) => {
            let snapshots: Box<dyn SnapshotSource> =
                Box::new(PsSnapshots::new(BufReader::new(File::open(path)?)));
            Session::with_snapshots(Config::default(), snapshots)
        }
        None => Session::new(Config::default()),
    };

    let dropped = task::block_on(async {
        let file = async_std::fs::File::open(&trail).await?;
        let lines = async_std::io::BufReader::new(file).lines();
        session.consume(lines).await
    })?;
    if dropped > 0 {
        eprintln!("{} audit records dropped", dropped);
    }
    Ok(session.into_graph())
}
