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

//! Builds recommenders from configuration lines.
//!
//! One line describes one algorithm, dash separated:
//!
//! ```text
//! random
//! average-ignore
//! popularity
//! itembandit-epsilon-0.2-stationary
//! itembandit-epsilont-1.0-nonStationary-0.1
//! itembandit-ucb1
//! itembandit-ucb1tuned
//! itembandit-thompson-1-1
//! ubknn-10-ignore-ignore
//! knnbandit-10-1-1
//! mf-10-imf-1.0-0.1-20
//! ```
//!
//! Lines starting with `//` are comments. Unrecognized or malformed lines
//! are reported and skipped rather than failing the whole experiment.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::bandits::{
    identity_value, EpsilonGreedy, EpsilonTGreedy, ItemBandit, ThompsonSampling, Ucb1,
    Ucb1Tuned, UpdateFunction,
};
use crate::factorization::{AlsFactorizer, MfRecommender};
use crate::knn::UserKnnRecommender;
use crate::preferences::Preferences;
use crate::recommenders::{
    AvgRecommender, InteractiveRecommender, ItemBanditRecommender, PopularityRecommender,
    RandomRecommender, RecommenderCore,
};
use crate::similarity::{BetaStochasticSimilarity, CosineSimilarity, UpdateableSimilarity};
use crate::types::Seeds;

#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("the selector has not been configured")]
    NotConfigured,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Turns configuration lines into recommenders over a fixed ground truth.
pub struct AlgorithmSelector<'a> {
    ground_truth: Option<&'a Preferences>,
    threshold: f64,
    contact: bool,
    not_reciprocal: bool,
    seeds: Seeds,
}

impl<'a> AlgorithmSelector<'a> {

    pub fn new() -> Self {
        AlgorithmSelector {
            ground_truth: None,
            threshold: 0.5,
            contact: false,
            not_reciprocal: false,
            seeds: Seeds::derive(0),
        }
    }

    /// Configuration for rating datasets.
    pub fn configure(&mut self, ground_truth: &'a Preferences, threshold: f64, seeds: Seeds) {
        self.ground_truth = Some(ground_truth);
        self.threshold = threshold;
        self.contact = false;
        self.not_reciprocal = false;
        self.seeds = seeds;
    }

    /// Configuration for contact networks, where items are the users.
    pub fn configure_contacts(
        &mut self,
        ground_truth: &'a Preferences,
        threshold: f64,
        not_reciprocal: bool,
        seeds: Seeds,
    ) {
        self.ground_truth = Some(ground_truth);
        self.threshold = threshold;
        self.contact = true;
        self.not_reciprocal = not_reciprocal;
        self.seeds = seeds;
    }

    fn core(&self, ground_truth: &'a Preferences, ignore_unknown: bool) -> RecommenderCore<'a> {
        if self.contact {
            RecommenderCore::for_contacts(
                ground_truth,
                ignore_unknown,
                self.not_reciprocal,
                self.seeds.untie,
            )
        } else {
            RecommenderCore::new(ground_truth, ignore_unknown, self.seeds.untie)
        }
    }

    /// Builds the recommender a configuration line describes. Comments and
    /// lines that cannot be understood yield `Ok(None)`.
    pub fn select(
        &self,
        line: &str,
    ) -> Result<Option<Box<dyn InteractiveRecommender<'a> + 'a>>, SelectorError> {
        let ground_truth = self.ground_truth.ok_or(SelectorError::NotConfigured)?;

        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(None);
        }

        let tokens: Vec<&str> = line.split('-').collect();
        let num_users = ground_truth.num_users();
        let num_items = ground_truth.num_items();

        let recommender: Option<Box<dyn InteractiveRecommender<'a> + 'a>> = match tokens[0] {
            "random" => Some(Box::new(RandomRecommender::new(self.core(ground_truth, true)))),

            "average" => {
                let ignore_unknown =
                    tokens.get(1).map_or(false, |t| t.eq_ignore_ascii_case("ignore"));
                Some(Box::new(AvgRecommender::new(self.core(ground_truth, ignore_unknown))))
            }

            "popularity" => Some(Box::new(PopularityRecommender::new(
                self.core(ground_truth, true),
                self.threshold,
            ))),

            "itembandit" => self.parse_bandit(&tokens[1..], num_items).map(
                |(bandit, consumed)| {
                    let ignore_unknown = tokens
                        .get(1 + consumed)
                        .map_or(false, |t| t.eq_ignore_ascii_case("ignore"));
                    Box::new(ItemBanditRecommender::new(
                        self.core(ground_truth, ignore_unknown),
                        bandit,
                        identity_value,
                    )) as Box<dyn InteractiveRecommender<'a> + 'a>
                },
            ),

            "ubknn" => tokens.get(1).and_then(|t| t.parse::<usize>().ok()).map(|k| {
                let (ignore_unknown, ignore_zeros) = knn_flags(&tokens, 2);
                let sim: Box<dyn UpdateableSimilarity> =
                    Box::new(CosineSimilarity::new(num_users));
                Box::new(UserKnnRecommender::new(
                    self.core(ground_truth, ignore_unknown),
                    sim,
                    k,
                    ignore_zeros,
                    self.seeds.explore,
                )) as Box<dyn InteractiveRecommender<'a> + 'a>
            }),

            "knnbandit" => {
                let parsed = tokens.get(1).and_then(|t| t.parse::<usize>().ok()).and_then(
                    |k| {
                        let alpha = tokens.get(2).and_then(|t| t.parse::<f64>().ok())?;
                        let beta = tokens.get(3).and_then(|t| t.parse::<f64>().ok())?;
                        Some((k, alpha, beta))
                    },
                );
                parsed.map(|(k, alpha, beta)| {
                    let (ignore_unknown, ignore_zeros) = knn_flags(&tokens, 4);
                    let sim: Box<dyn UpdateableSimilarity> = Box::new(
                        BetaStochasticSimilarity::new(num_users, alpha, beta, self.seeds.explore),
                    );
                    Box::new(UserKnnRecommender::new(
                        self.core(ground_truth, ignore_unknown),
                        sim,
                        k,
                        ignore_zeros,
                        self.seeds.explore,
                    )) as Box<dyn InteractiveRecommender<'a> + 'a>
                })
            }

            "mf" => {
                let parsed = tokens.get(1).and_then(|t| t.parse::<usize>().ok()).and_then(
                    |k| match tokens.get(2) {
                        Some(&"imf") => {
                            let alpha = tokens.get(3).and_then(|t| t.parse::<f64>().ok())?;
                            let lambda = tokens.get(4).and_then(|t| t.parse::<f64>().ok())?;
                            let num_iter =
                                tokens.get(5).and_then(|t| t.parse::<usize>().ok())?;
                            Some((k, AlsFactorizer::new(alpha, lambda, num_iter)))
                        }
                        Some(&"fastimf") | Some(&"plsa") => {
                            warn!(algorithm = line, "factorizer is not supported");
                            None
                        }
                        _ => None,
                    },
                );
                parsed.map(|(k, factorizer)| {
                    let ignore_unknown =
                        tokens.get(6).map_or(true, |t| t.eq_ignore_ascii_case("ignore"));
                    Box::new(MfRecommender::new(
                        self.core(ground_truth, ignore_unknown),
                        k,
                        factorizer,
                        self.seeds.explore,
                    )) as Box<dyn InteractiveRecommender<'a> + 'a>
                })
            }

            _ => None,
        };

        if recommender.is_none() {
            warn!(algorithm = line, "skipping unrecognized algorithm line");
        }
        Ok(recommender)
    }

    /// Reads one algorithm per line, keyed by the line itself.
    pub fn select_file<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Vec<(String, Box<dyn InteractiveRecommender<'a> + 'a>)>, SelectorError> {
        let reader = BufReader::new(File::open(path)?);

        let mut selected = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Some(recommender) = self.select(&line)? {
                selected.push((line.trim().to_string(), recommender));
            }
        }
        Ok(selected)
    }

    /// The bandit described by `tokens` and how many tokens it consumed.
    fn parse_bandit(
        &self,
        tokens: &[&str],
        num_items: usize,
    ) -> Option<(Box<dyn ItemBandit>, usize)> {
        match *tokens.first()? {
            "epsilon" => {
                let epsilon = tokens.get(1)?.parse::<f64>().ok()?;
                let (update_fn, used) = parse_update_function(&tokens[2..])?;
                Some((
                    Box::new(EpsilonGreedy::new(num_items, epsilon, update_fn, self.seeds)),
                    2 + used,
                ))
            }
            "epsilont" => {
                let slope = tokens.get(1)?.parse::<f64>().ok()?;
                let (update_fn, used) = parse_update_function(&tokens[2..])?;
                Some((
                    Box::new(EpsilonTGreedy::new(num_items, slope, update_fn, self.seeds)),
                    2 + used,
                ))
            }
            "ucb1" => Some((Box::new(Ucb1::new(num_items, self.seeds)), 1)),
            "ucb1tuned" => Some((Box::new(Ucb1Tuned::new(num_items, self.seeds)), 1)),
            "thompson" => {
                let alpha = tokens.get(1)?.parse::<f64>().ok()?;
                let beta = tokens.get(2)?.parse::<f64>().ok()?;
                Some((
                    Box::new(ThompsonSampling::with_prior(num_items, alpha, beta, self.seeds)),
                    3,
                ))
            }
            _ => None,
        }
    }
}

impl<'a> Default for AlgorithmSelector<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional `ignore` flags behind a cursor position, both defaulting to
/// true when absent.
fn knn_flags(tokens: &[&str], cursor: usize) -> (bool, bool) {
    if tokens.len() == cursor {
        (true, true)
    } else if tokens.len() == cursor + 1 {
        (tokens[cursor].eq_ignore_ascii_case("ignore"), true)
    } else {
        (
            tokens[cursor].eq_ignore_ascii_case("ignore"),
            tokens[cursor + 1].eq_ignore_ascii_case("ignore"),
        )
    }
}

fn parse_update_function(tokens: &[&str]) -> Option<(UpdateFunction, usize)> {
    match *tokens.first()? {
        "stationary" => Some((UpdateFunction::Stationary, 1)),
        "nonStationary" => {
            let gamma = tokens.get(1)?.parse::<f64>().ok()?;
            Some((UpdateFunction::NonStationary(gamma), 2))
        }
        "useAll" => Some((UpdateFunction::UseAll, 1)),
        "count" => Some((UpdateFunction::Count, 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::io::Write;

    fn configured(ground_truth: &Preferences) -> AlgorithmSelector<'_> {
        let mut selector = AlgorithmSelector::new();
        selector.configure(ground_truth, 0.5, Seeds::derive(42));
        selector
    }

    #[test]
    fn an_unconfigured_selector_refuses_to_work() {
        let selector = AlgorithmSelector::new();
        assert!(matches!(
            selector.select("random"),
            Err(SelectorError::NotConfigured)
        ));
    }

    #[test]
    fn recognizes_every_documented_algorithm() {
        let gt = Preferences::load(3, 4, &[(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)]);
        let selector = configured(&gt);

        let lines = [
            "random",
            "average",
            "average-ignore",
            "popularity",
            "itembandit-epsilon-0.2-stationary",
            "itembandit-epsilon-0.2-nonStationary-0.1",
            "itembandit-epsilon-0.2-useAll",
            "itembandit-epsilon-0.2-count-ignore",
            "itembandit-epsilont-1.0-stationary",
            "itembandit-ucb1",
            "itembandit-ucb1tuned",
            "itembandit-thompson-1-1",
            "ubknn-10",
            "ubknn-10-ignore",
            "ubknn-0-ignore-ignore",
            "knnbandit-10-1-1",
            "knnbandit-10-1-1-ignore-ignore",
            "mf-5-imf-1.0-0.1-10",
            "mf-5-imf-1.0-0.1-10-ignore",
        ];
        for line in &lines {
            let selected = selector.select(line).unwrap();
            assert!(selected.is_some(), "line was not recognized: {}", line);
        }
    }

    #[test]
    fn comments_blanks_and_garbage_are_skipped() {
        let gt = Preferences::load(2, 2, &[(0, 0, 1.0)]);
        let selector = configured(&gt);

        for line in &[
            "// a comment",
            "",
            "   ",
            "pagerank",
            "itembandit-epsilon-notanumber-stationary",
            "itembandit-epsilon-0.2-decay",
            "knnbandit-10-1",
            "mf-5-plsa-10",
            "mf-5-fastimf-1.0-0.1-10-true",
        ] {
            assert!(selector.select(line).unwrap().is_none(), "accepted: {}", line);
        }
    }

    #[test]
    fn selected_recommenders_are_usable() {
        let gt = Preferences::load(2, 3, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let selector = configured(&gt);

        let mut rec = selector.select("itembandit-thompson-1-1").unwrap().unwrap();
        let iidx = rec.next(0);
        assert!(iidx.is_some());
        rec.update(0, iidx.unwrap());
        assert_eq!(rec.core().availability().len_of(0), 2);
    }

    #[test]
    fn reads_a_configuration_file() {
        let gt = Preferences::load(2, 2, &[(0, 0, 1.0)]);
        let selector = configured(&gt);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("algorithms.txt");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "// algorithms under comparison").unwrap();
        writeln!(file, "random").unwrap();
        writeln!(file, "average").unwrap();
        writeln!(file, "not-a-thing").unwrap();
        drop(file);

        let selected = selector.select_file(&path).unwrap();
        let names: Vec<&str> = selected.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["random", "average"]);
    }
}
