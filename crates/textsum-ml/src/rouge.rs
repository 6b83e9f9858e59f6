//! ROUGE-1, ROUGE-2, ROUGE-L and ROUGE-Lsum F-measures.

use crate::text::{ngrams, words};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mean F-measures over a set of candidate/reference pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RougeScores {
    pub rouge1: f64,
    pub rouge2: f64,
    #[serde(rename = "rougeL")]
    pub rouge_l: f64,
    #[serde(rename = "rougeLsum")]
    pub rouge_lsum: f64,
}

impl RougeScores {
    pub const NAMES: [&'static str; 4] = ["rouge1", "rouge2", "rougeL", "rougeLsum"];

    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "rouge1" => Some(self.rouge1),
            "rouge2" => Some(self.rouge2),
            "rougeL" => Some(self.rouge_l),
            "rougeLsum" => Some(self.rouge_lsum),
            _ => None,
        }
    }
}

fn f_measure(overlap: usize, candidate_len: usize, reference_len: usize) -> f64 {
    if overlap == 0 || candidate_len == 0 || reference_len == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / candidate_len as f64;
    let recall = overlap as f64 / reference_len as f64;
    2.0 * precision * recall / (precision + recall)
}

fn rouge_n(candidate: &[String], reference: &[String], n: usize) -> f64 {
    let mut counts: HashMap<&[String], usize> = HashMap::new();
    let reference_grams = ngrams(reference, n);
    for gram in &reference_grams {
        *counts.entry(*gram).or_insert(0) += 1;
    }
    let candidate_grams = ngrams(candidate, n);
    let mut overlap = 0;
    for gram in &candidate_grams {
        if let Some(c) = counts.get_mut(*gram) {
            if *c > 0 {
                *c -= 1;
                overlap += 1;
            }
        }
    }
    f_measure(overlap, candidate_grams.len(), reference_grams.len())
}

fn lcs_table(a: &[String], b: &[String]) -> Vec<Vec<usize>> {
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }
    table
}

/// Reference positions (in `reference`) on one longest common subsequence.
fn lcs_hits(reference: &[String], candidate: &[String]) -> Vec<usize> {
    let table = lcs_table(reference, candidate);
    let (mut i, mut j) = (reference.len(), candidate.len());
    let mut hits = Vec::new();
    while i > 0 && j > 0 {
        if reference[i - 1] == candidate[j - 1] {
            hits.push(i - 1);
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    hits
}

fn rouge_l(candidate: &[String], reference: &[String]) -> f64 {
    let lcs = lcs_table(candidate, reference)[candidate.len()][reference.len()];
    f_measure(lcs, candidate.len(), reference.len())
}

/// Summary-level LCS: for every reference sentence, the union of its LCS
/// hits against each candidate sentence.
fn rouge_lsum(candidate: &str, reference: &str) -> f64 {
    let sentences = |text: &str| -> Vec<Vec<String>> {
        text.lines().map(words).filter(|w| !w.is_empty()).collect()
    };
    let candidate_sents = sentences(candidate);
    let reference_sents = sentences(reference);

    let mut candidate_counts: HashMap<&str, usize> = HashMap::new();
    for token in candidate_sents.iter().flatten() {
        *candidate_counts.entry(token.as_str()).or_insert(0) += 1;
    }
    let mut reference_counts: HashMap<&str, usize> = HashMap::new();
    for token in reference_sents.iter().flatten() {
        *reference_counts.entry(token.as_str()).or_insert(0) += 1;
    }

    let mut hits = 0;
    for reference_sent in &reference_sents {
        let mut union: Vec<usize> = candidate_sents
            .iter()
            .flat_map(|c| lcs_hits(reference_sent, c))
            .collect();
        union.sort_unstable();
        union.dedup();

        for pos in union {
            let token = reference_sent[pos].as_str();
            let (Some(c), Some(r)) = (candidate_counts.get(token), reference_counts.get(token)) else {
                continue;
            };
            if *c > 0 && *r > 0 {
                hits += 1;
                if let Some(c) = candidate_counts.get_mut(token) {
                    *c -= 1;
                }
                if let Some(r) = reference_counts.get_mut(token) {
                    *r -= 1;
                }
            }
        }
    }

    let candidate_len = candidate_sents.iter().map(Vec::len).sum();
    let reference_len = reference_sents.iter().map(Vec::len).sum();
    f_measure(hits, candidate_len, reference_len)
}

/// Scores each candidate against its reference and averages the F-measures.
/// Pairs beyond the shorter of the two slices are ignored.
pub fn rouge_scores<C, R>(candidates: &[C], references: &[R]) -> RougeScores
where
    C: AsRef<str>,
    R: AsRef<str>,
{
    let pairs = candidates.len().min(references.len());
    if pairs == 0 {
        return RougeScores::default();
    }

    let mut total = RougeScores::default();
    for (candidate, reference) in candidates.iter().zip(references) {
        let (candidate, reference) = (candidate.as_ref(), reference.as_ref());
        let c = words(candidate);
        let r = words(reference);
        total.rouge1 += rouge_n(&c, &r, 1);
        total.rouge2 += rouge_n(&c, &r, 2);
        total.rouge_l += rouge_l(&c, &r);
        total.rouge_lsum += rouge_lsum(candidate, reference);
    }

    let n = pairs as f64;
    RougeScores {
        rouge1: total.rouge1 / n,
        rouge2: total.rouge2 / n,
        rouge_l: total.rouge_l / n,
        rouge_lsum: total.rouge_lsum / n,
    }
}
