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

//! Reading datasets, writing per iteration logs, and picking both up again
//! when a run is resumed.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use fnv::FnvHashSet;
use serde::Serialize;

use crate::index::{Dictionary, Renaming};

/// Name of the one line file recording the master seed of a run.
pub const SEED_FILE: &str = "rngseed";

/// Name of the JSON lines file summarizing all runs of an experiment.
pub const SUMMARY_FILE: &str = "summary.json";

/// A parsed dataset: interned names, weighted triples, and the number of
/// relevant pairs that fixes the recall denominator.
pub struct Dataset {
    pub dictionary: Dictionary,
    pub triples: Vec<(u32, u32, f64)>,
    pub num_relevant: u64,
}

/// Reads tab separated `user item value` triples without headers. Unless
/// `use_ratings` is set, values are binarized against the threshold and a
/// pair is relevant when its weighted value is positive; with `use_ratings`
/// the raw value is kept and relevance means clearing the threshold.
pub fn read_dataset<P: AsRef<Path>>(
    path: P,
    use_ratings: bool,
    threshold: f64,
) -> Result<Dataset, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_path(path)?;

    let mut dictionary = Dictionary::new();
    let mut triples = Vec::new();
    let mut num_relevant = 0;

    for record in reader.deserialize() {
        let (user, item, value): (String, String, f64) = record?;

        let uidx = dictionary.intern_user(&user);
        let iidx = dictionary.intern_item(&item);

        let weighted = if use_ratings {
            value
        } else if value >= threshold {
            1.0
        } else {
            0.0
        };

        let relevant = if use_ratings { weighted >= threshold } else { weighted > 0.0 };
        if relevant {
            num_relevant += 1;
        }

        triples.push((uidx, iidx, weighted));
    }

    Ok(Dataset { dictionary, triples, num_relevant })
}

/// Reads a contact network of directed `user user` edges. A link weighs 2.0
/// when its reverse edge also exists and 1.0 otherwise, which is how the
/// contact recommenders tell reciprocated links apart. Duplicate edges
/// collapse. Every endpoint is interned as both a user and an item, so the
/// two index spaces coincide.
pub fn read_contact_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_path(path)?;

    let mut dictionary = Dictionary::new();
    let mut edges: Vec<(u32, u32)> = Vec::new();
    let mut present: FnvHashSet<(u32, u32)> = FnvHashSet::default();

    for record in reader.deserialize() {
        let (from, to): (String, String) = record?;

        let uidx = dictionary.intern_user(&from);
        dictionary.intern_item(&from);
        let iidx = dictionary.intern_item(&to);
        dictionary.intern_user(&to);

        if present.insert((uidx, iidx)) {
            edges.push((uidx, iidx));
        }
    }

    let triples: Vec<(u32, u32, f64)> = edges
        .iter()
        .map(|&(uidx, iidx)| {
            let value = if present.contains(&(iidx, uidx)) { 2.0 } else { 1.0 };
            (uidx, iidx, value)
        })
        .collect();

    // every link carries at least weight 1.0 and counts as relevant
    let num_relevant = triples.len() as u64;

    Ok(Dataset { dictionary, triples, num_relevant })
}

/// Reads the master seed a previous run recorded next to its logs.
pub fn read_seed<P: AsRef<Path>>(output_dir: P) -> io::Result<u64> {
    let content = fs::read_to_string(output_dir.as_ref().join(SEED_FILE))?;
    content
        .trim()
        .parse()
        .map_err(|parse_error| io::Error::new(io::ErrorKind::InvalidData, parse_error))
}

/// Records the master seed so an interrupted run can be picked up again.
pub fn write_seed<P: AsRef<Path>>(output_dir: P, seed: u64) -> io::Result<()> {
    let mut file = File::create(output_dir.as_ref().join(SEED_FILE))?;
    writeln!(file, "{}", seed)
}

/// Replays the log of a previous run. The first line fixes the expected
/// column count; reading stops at the first row that falls short of it or
/// does not resolve against the dictionary, so a partially written trailing
/// line never poisons the resume. Returns one (user, item, elapsed millis)
/// tuple per replayed row.
pub fn read_resume_log<P: AsRef<Path>>(
    path: P,
    dictionary: &Dictionary,
) -> io::Result<Vec<(u32, u32, u128)>> {
    let reader = BufReader::new(File::open(path)?);

    let mut rows = Vec::new();
    let mut expected_columns = 0;

    for line in reader.lines() {
        let line = line?;
        let columns: Vec<&str> = line.split('\t').collect();

        if expected_columns == 0 {
            expected_columns = columns.len();
        }
        if columns.len() < expected_columns || columns.len() < 4 {
            break;
        }

        let user = dictionary.user_index(columns[1]);
        let item = dictionary.item_index(columns[2]);
        let millis = columns[columns.len() - 1].parse::<u128>();

        match (user, item, millis) {
            (Some(uidx), Some(iidx), Ok(millis)) => rows.push((uidx, iidx, millis)),
            _ => break,
        }
    }

    Ok(rows)
}

/// Writes one row per iteration in the shape `read_resume_log` consumes:
/// iteration, user name, item name, one column per metric, elapsed millis.
pub struct LogWriter<'a> {
    out: BufWriter<File>,
    renaming: &'a Renaming,
}

impl<'a> LogWriter<'a> {

    pub fn create<P: AsRef<Path>>(path: P, renaming: &'a Renaming) -> io::Result<Self> {
        let out = BufWriter::new(File::create(path)?);
        Ok(LogWriter { out, renaming })
    }

    pub fn write_row(
        &mut self,
        iteration: u32,
        uidx: u32,
        iidx: u32,
        metric_values: &[f64],
        millis: u128,
    ) -> io::Result<()> {
        write!(
            self.out,
            "{}\t{}\t{}",
            iteration,
            self.renaming.user_name(uidx),
            self.renaming.item_name(iidx)
        )?;
        for value in metric_values {
            write!(self.out, "\t{}", value)?;
        }
        writeln!(self.out, "\t{}", millis)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Final state of one algorithm's run, serialized into the summary.
#[derive(Serialize)]
pub struct SummaryEntry {
    pub algorithm: String,
    pub iterations: u32,
    pub metrics: BTreeMap<String, f64>,
}

/// Writes the end of run summary as one JSON document per line, next to
/// the individual logs.
pub fn write_summary<P: AsRef<Path>>(output_dir: P, entries: &[SummaryEntry]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(output_dir.as_ref().join(SUMMARY_FILE))?);

    for entry in entries {
        let entry_as_json = serde_json::to_string(entry)?;
        writeln!(out, "{}", entry_as_json)?;
    }

    out.flush()
}
