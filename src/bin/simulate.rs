/*
 * Recloop
 * Copyright (C) 2020 The recloop developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::env;
use std::process;

use getopts::Options;
use tracing_subscriber::EnvFilter;

use recloop::experiment::{self, ExperimentConfig};

fn main() {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("a", "algorithms", "Algorithm configuration file (required). One dash separated \
        algorithm description per line, lines starting with // are comments.", "PATH");
    opts.optopt("i", "input", "Dataset file (required). One user, item, value triple per line, \
        separated by tabs; with --contact, one directed user, user edge per line.", "PATH");
    opts.optopt("o", "output", "Output directory (required). One log file per algorithm plus \
        the rngseed file and a summary are written here.", "PATH");
    opts.optopt("n", "num-iter", "Number of iterations per algorithm (optional, defaults to 0, \
        which runs until every user is exhausted).", "NUMBER");
    opts.optopt("t", "threshold", "Relevance threshold for ratings (optional, defaults to \
        0.5).", "NUMBER");
    opts.optflag("r", "resume", "Replay existing logs and the recorded rngseed before \
        continuing.");
    opts.optflag("", "use-ratings", "Keep raw rating values instead of binarizing them against \
        the threshold.");
    opts.optflag("", "contact", "People to people mode: the dataset is a directed contact \
        network and nobody is recommended to themselves.");
    opts.optflag("", "not-reciprocal", "With --contact, stop suggesting a link once it has \
        been reciprocated.");
    opts.optopt("", "threads", "Number of worker threads (optional, defaults to the number of \
        cpus).", "NUMBER");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            print_usage_and_exit(&program, opts, Some(&hint))
        }
    };

    if matches.opt_present("h") {
        print_usage_and_exit(&program, opts, None);
    }

    if !matches.opt_present("a") {
        print_usage_and_exit(
            &program,
            opts,
            Some("Please specify an algorithm configuration file via --algorithms."),
        );
    }

    if !matches.opt_present("i") {
        print_usage_and_exit(&program, opts, Some("Please specify a dataset via --input."));
    }

    if !matches.opt_present("o") {
        print_usage_and_exit(
            &program,
            opts,
            Some("Please specify an output directory via --output."),
        );
    }

    let num_iter: u32 = match matches.opt_get_default("n", 0) {
        Ok(num_iter) => num_iter,
        Err(failure) => {
            let hint = format!("Problem with option 'n': {}", failure);
            print_usage_and_exit(&program, opts, Some(&hint))
        }
    };

    let threshold: f64 = match matches.opt_get_default("t", 0.5) {
        Ok(threshold) => threshold,
        Err(failure) => {
            let hint = format!("Problem with option 't': {}", failure);
            print_usage_and_exit(&program, opts, Some(&hint))
        }
    };

    let threads: usize = match matches.opt_get_default("threads", num_cpus::get()) {
        Ok(threads) => threads,
        Err(failure) => {
            let hint = format!("Problem with option 'threads': {}", failure);
            print_usage_and_exit(&program, opts, Some(&hint))
        }
    };

    let config = ExperimentConfig {
        algorithms: matches.opt_str("a").unwrap(),
        input: matches.opt_str("i").unwrap(),
        output: matches.opt_str("o").unwrap(),
        num_iter,
        threshold,
        resume: matches.opt_present("r"),
        use_ratings: matches.opt_present("use-ratings"),
        contact: matches.opt_present("contact"),
        not_reciprocal: matches.opt_present("not-reciprocal"),
        threads,
    };

    if let Err(error) = experiment::run(&config) {
        eprintln!("\n{}\n", error);
        process::exit(1);
    }
}

fn print_usage_and_exit(program: &str, opts: Options, hint: Option<&str>) -> ! {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));

    process::exit(if hint.is_some() { 2 } else { 0 });
}
