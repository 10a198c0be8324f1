//
//   This Source Code Form is subject to the terms of the Mozilla Public
//   License, v. 2.0. If a copy of the MPL was not distributed with this
//   file, You can obtain one at http://mozilla.org/MPL/2.0/.
//

use std::fs;
use std::io::Read;
use std::io::{self};
use std::path::PathBuf;

use clap::Parser as ClapParser;
use clap::Subcommand;
use filterlist_core::parser::Parser as FilterListParser;
use filterlist_core::serializer::Serializer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a filter-list file and print a one-line summary per subscription.
    Parse {
        /// Path to read, or `-` for stdin.
        path: PathBuf,
    },
    /// Parse a filter-list file and immediately re-serialize it to stdout.
    Roundtrip {
        /// Path to read, or `-` for stdin.
        path: PathBuf,
    },
}

fn read_input(path: &PathBuf) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        fs::read_to_string(path)
    }
}

fn main() {
    let args = Args::parse();

    let filter = tracing_subscriber::filter::EnvFilter::from_default_env();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();

    match args.command {
        Command::Parse { path } => {
            let input = read_input(&path).unwrap_or_else(|err| {
                tracing::error!(?err, ?path, "failed to read input");
                std::process::exit(1);
            });
            let mut parser = FilterListParser::new().with_fail_handler(Box::new(|line| {
                tracing::warn!(%line, "could not parse property line");
            }));
            for line in input.lines() {
                parser.process(line);
            }
            parser.finalize();
            for subscription in parser.subscriptions() {
                println!(
                    "{}\t{:?}\t{} filter(s)",
                    subscription.id(),
                    subscription.sub_type(),
                    subscription.filter_count()
                );
            }
        }
        Command::Roundtrip { path } => {
            let input = read_input(&path).unwrap_or_else(|err| {
                tracing::error!(?err, ?path, "failed to read input");
                std::process::exit(1);
            });
            let mut parser = FilterListParser::new();
            for line in input.lines() {
                parser.process(line);
            }
            parser.finalize();

            let mut serializer = Serializer::new();
            for subscription in parser.subscriptions() {
                serializer.serialize(subscription);
            }
            print!("{}", serializer.data());
        }
    }
}
