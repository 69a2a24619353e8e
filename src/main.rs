//! FlowVisor: an OpenFlow 1.0 network virtualization proxy.
//!
//! Physical switches connect to the listen endpoint as if it were their
//! controller; each configured slice gets a dialed-out connection to its
//! own controller, presenting a virtual switch assembled from the fabric.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate futures;
extern crate log4rs;
extern crate tokio;

extern crate flowvisor;

use std::io;
use std::process::exit;

use futures::future;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use flowvisor::config;
use flowvisor::session::FlowVisor;
use flowvisor::topology::FabricTopology;

fn init_logging(level: LevelFilter) {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} {t} - {m}{n}")))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .expect("logging configuration is valid");
    log4rs::init_config(config).expect("error on logging initialization");
}

/// Reads command line arguments and runs the proxy.
fn handle_cli_args() -> io::Result<()> {
    let usage = "-v...             'Repeat to set the level of verbosity'
        -c, --conf <ini>  'The INI configuration file'";
    let matches = app_from_crate!().args_from_usage(usage).get_matches();

    let log_lvl = match matches.occurrences_of("v") {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    init_logging(log_lvl);

    let conf_path = matches.value_of("conf").expect("required conf argument");
    let conf = config::parse_file(conf_path)?;

    let mut topology = FabricTopology::new();
    for link in &conf.links {
        topology.add_link(link.a_dpid, link.a_port, link.b_dpid, link.b_port);
    }

    let fv = FlowVisor::new(Box::new(topology));
    let listen = conf.listen;
    let slices = conf.slices;

    tokio::run(future::lazy(move || {
        FlowVisor::start(&fv);
        if let Err(e) = FlowVisor::listen(&fv, &listen) {
            error!("cannot listen on {}: {}", listen, e);
            return Err(());
        }
        for slice in slices {
            let id = FlowVisor::add_slice(&fv, slice.filter, slice.controller, slice.dpid);
            info!(
                "slice '{}' registered as {} (dpid {:#x}, controller {})",
                slice.name, id, slice.dpid, slice.controller
            );
        }
        Ok(())
    }));
    Ok(())
}

/// Entry function with top level error handling.
fn main() {
    if let Err(e) = handle_cli_args() {
        error!("{}", e);
        exit(1);
    }
}
