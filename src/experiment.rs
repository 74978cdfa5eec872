//! Runs every configured algorithm over one dataset, in parallel, writing
//! one log file per algorithm and a closing summary.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::index::Renaming;
use crate::io::{self, Dataset, LogWriter, SummaryEntry};
use crate::metrics::{CumulativeGini, CumulativeMetric, CumulativeRecall};
use crate::preferences::Preferences;
use crate::recommenders::InteractiveRecommender;
use crate::selector::AlgorithmSelector;
use crate::simulation::RecommendationLoop;
use crate::types::Seeds;

/// Recall threshold over the weighted preference values.
const RECALL_THRESHOLD: f64 = 0.5;

/// The loop draws users from its own fixed stream.
const LOOP_SEED: u64 = 0;

/// Everything one invocation needs, mirroring the command line one to one.
pub struct ExperimentConfig {
    pub algorithms: String,
    pub input: String,
    pub output: String,
    pub num_iter: u32,
    pub threshold: f64,
    pub resume: bool,
    pub use_ratings: bool,
    pub contact: bool,
    pub not_reciprocal: bool,
    pub threads: usize,
}

/// Runs every algorithm in the configuration file over the dataset. Each
/// algorithm gets its own loop, metrics and log file; the runs are
/// independent and execute in parallel.
pub fn run(config: &ExperimentConfig) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();

    let dataset = if config.contact {
        io::read_contact_dataset(&config.input)?
    } else {
        io::read_dataset(&config.input, config.use_ratings, config.threshold)?
    };

    let num_users = dataset.dictionary.num_users();
    let num_items = dataset.dictionary.num_items();

    println!(
        "Read {} preferences ({} relevant) between {} users and {} items from {}",
        dataset.triples.len(),
        dataset.num_relevant,
        num_users,
        num_items,
        config.input
    );

    let ground_truth = Preferences::load(num_users, num_items, &dataset.triples);
    let renaming = Renaming::from(&dataset.dictionary);

    fs::create_dir_all(&config.output)?;

    let master_seed = if config.resume {
        io::read_seed(&config.output).unwrap_or_else(|_| rand::random::<u64>())
    } else {
        rand::random::<u64>()
    };
    io::write_seed(&config.output, master_seed)?;
    let seeds = Seeds::derive(master_seed);

    let threshold = if config.use_ratings { config.threshold } else { RECALL_THRESHOLD };
    let mut selector = AlgorithmSelector::new();
    if config.contact {
        selector.configure_contacts(&ground_truth, threshold, config.not_reciprocal, seeds);
    } else {
        selector.configure(&ground_truth, threshold, seeds);
    }

    let algorithms = selector.select_file(&config.algorithms)?;
    println!("Running {} algorithms from {}", algorithms.len(), config.algorithms);

    let pool = rayon::ThreadPoolBuilder::new().num_threads(config.threads).build()?;

    let summaries: Vec<SummaryEntry> = pool.install(|| {
        algorithms
            .into_par_iter()
            .filter_map(|(name, recommender)| {
                match run_algorithm(&name, recommender, config, &ground_truth, &dataset, &renaming)
                {
                    Ok(entry) => Some(entry),
                    Err(error) => {
                        warn!(algorithm = name.as_str(), %error, "run failed");
                        None
                    }
                }
            })
            .collect()
    });

    io::write_summary(&config.output, &summaries)?;

    println!("Finished {} runs in {}ms", summaries.len(), start.elapsed().as_millis());

    Ok(())
}

fn run_algorithm<'a>(
    name: &str,
    recommender: Box<dyn InteractiveRecommender<'a> + 'a>,
    config: &ExperimentConfig,
    ground_truth: &'a Preferences,
    dataset: &Dataset,
    renaming: &Renaming,
) -> Result<SummaryEntry, Box<dyn Error>> {
    let algorithm_start = Instant::now();

    let metrics: Vec<(String, Box<dyn CumulativeMetric + 'a>)> = vec![
        (
            "recall".to_string(),
            Box::new(CumulativeRecall::new(ground_truth, dataset.num_relevant, RECALL_THRESHOLD)),
        ),
        ("gini".to_string(), Box::new(CumulativeGini::new(ground_truth.num_items()))),
    ];

    let mut simulation =
        RecommendationLoop::new(ground_truth, recommender, metrics, config.num_iter, LOOP_SEED);

    let log_path = Path::new(&config.output).join(format!("{}.txt", name));

    // the old log has to be consumed before the writer truncates it
    let replayed = if config.resume && log_path.exists() {
        io::read_resume_log(&log_path, &dataset.dictionary)?
    } else {
        Vec::new()
    };

    let mut log = LogWriter::create(&log_path, renaming)?;
    let mut row = 0;

    for &(uidx, iidx, millis) in replayed.iter() {
        simulation.update(uidx, iidx);
        log.write_row(row, uidx, iidx, &simulation.metric_values(), millis)?;
        row += 1;
    }
    if !replayed.is_empty() {
        info!(algorithm = name, rows = replayed.len(), "replayed an earlier log");
    }

    while !simulation.has_ended() {
        let step_start = Instant::now();
        match simulation.next_iteration() {
            Some((uidx, iidx)) => {
                let millis = step_start.elapsed().as_millis();
                log.write_row(row, uidx, iidx, &simulation.metric_values(), millis)?;
                row += 1;
            }
            None => break,
        }
    }
    log.flush()?;

    let metric_summary: BTreeMap<String, f64> = simulation
        .metric_names()
        .iter()
        .map(|metric_name| metric_name.to_string())
        .zip(simulation.metric_values())
        .collect();

    info!(
        algorithm = name,
        iterations = simulation.current_iteration(),
        millis = algorithm_start.elapsed().as_millis() as u64,
        "run complete"
    );
    println!(
        "{} finished after {} iterations ({}ms)",
        name,
        simulation.current_iteration(),
        algorithm_start.elapsed().as_millis()
    );

    Ok(SummaryEntry {
        algorithm: name.to_string(),
        iterations: simulation.current_iteration(),
        metrics: metric_summary,
    })
}

#[cfg(test)]
mod tests {

    use super::*;

    fn write_algorithms(dir: &Path, lines: &str) -> String {
        let path = dir.join("algorithms.txt");
        fs::write(&path, lines).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn write_input(dir: &Path, content: &str) -> String {
        let path = dir.join("input.tsv");
        fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn an_experiment_writes_a_log_a_seed_and_a_summary() {
        let dir = tempfile::tempdir().unwrap();
        let algorithms = write_algorithms(dir.path(), "// baselines\nrandom\n");
        let input = write_input(
            dir.path(),
            "alice\tmatrix\t1.0\nalice\tbrazil\t1.0\nbob\tmatrix\t1.0\n",
        );
        let output = dir.path().join("out");

        let config = ExperimentConfig {
            algorithms,
            input,
            output: output.to_string_lossy().into_owned(),
            num_iter: 4,
            threshold: 0.5,
            resume: false,
            use_ratings: false,
            contact: false,
            not_reciprocal: false,
            threads: 1,
        };
        run(&config).unwrap();

        assert!(io::read_seed(&output).is_ok());

        let log = fs::read_to_string(output.join("random.txt")).unwrap();
        let rows: Vec<&str> = log.lines().collect();
        assert_eq!(rows.len(), 4);
        for row in rows.iter() {
            assert_eq!(row.split('\t').count(), 6);
        }

        let summary = fs::read_to_string(output.join(io::SUMMARY_FILE)).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 1);
        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["algorithm"], "random");
        assert_eq!(entry["iterations"], 4);
        assert_eq!(entry["metrics"]["recall"], 1.0);
    }

    #[test]
    fn resuming_replays_the_log_and_continues_it() {
        let dir = tempfile::tempdir().unwrap();
        let algorithms = write_algorithms(dir.path(), "random\n");
        let input = write_input(
            dir.path(),
            "alice\tmatrix\t1.0\nalice\tbrazil\t1.0\nbob\tmatrix\t1.0\nbob\tbrazil\t1.0\n",
        );
        let output = dir.path().join("out");

        let mut config = ExperimentConfig {
            algorithms,
            input,
            output: output.to_string_lossy().into_owned(),
            num_iter: 2,
            threshold: 0.5,
            resume: false,
            use_ratings: false,
            contact: false,
            not_reciprocal: false,
            threads: 1,
        };
        run(&config).unwrap();

        let before = fs::read_to_string(output.join("random.txt")).unwrap();
        let seed_before = fs::read_to_string(output.join(io::SEED_FILE)).unwrap();
        assert_eq!(before.lines().count(), 2);

        config.num_iter = 4;
        config.resume = true;
        run(&config).unwrap();

        let after = fs::read_to_string(output.join("random.txt")).unwrap();
        let after_rows: Vec<&str> = after.lines().collect();
        assert_eq!(after_rows.len(), 4);

        // the replayed prefix keeps its pairs and its historical timings
        for (old, new) in before.lines().zip(after_rows.iter()) {
            let old_columns: Vec<&str> = old.split('\t').collect();
            let new_columns: Vec<&str> = new.split('\t').collect();
            assert_eq!(old_columns[1], new_columns[1]);
            assert_eq!(old_columns[2], new_columns[2]);
            assert_eq!(old_columns.last(), new_columns.last());
        }

        assert_eq!(fs::read_to_string(output.join(io::SEED_FILE)).unwrap(), seed_before);
    }

    #[test]
    fn contact_mode_never_recommends_anyone_to_themselves() {
        let dir = tempfile::tempdir().unwrap();
        let algorithms = write_algorithms(dir.path(), "random\n");
        let input = write_input(dir.path(), "a\tb\nb\ta\na\tc\nc\ta\nb\tc\n");
        let output = dir.path().join("out");

        let config = ExperimentConfig {
            algorithms,
            input,
            output: output.to_string_lossy().into_owned(),
            num_iter: 0,
            threshold: 0.5,
            resume: false,
            use_ratings: false,
            contact: true,
            not_reciprocal: false,
            threads: 1,
        };
        run(&config).unwrap();

        let log = fs::read_to_string(output.join("random.txt")).unwrap();
        let rows: Vec<&str> = log.lines().collect();
        assert_eq!(rows.len(), 6);
        for row in rows.iter() {
            let columns: Vec<&str> = row.split('\t').collect();
            assert_ne!(columns[1], columns[2]);
        }
    }
}
