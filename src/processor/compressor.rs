//! Compression function seam and the built-in word-level compressor.
use std::collections::HashSet;
use std::fmt::Debug;

use crate::error::Result;

/// CPU-bound text compression. Called from the blocking pool.
pub trait Compressor: Send + Sync + Debug {
    fn compress(&self, context: &str, rate: f32, forced_tokens: &[String]) -> Result<String>;
}

/// Keeps roughly `rate` of the words, preferring longer words, and always
/// keeps words that contain a forced token. Original word order is kept.
///
/// Whitespace between kept words collapses to one space, except that a
/// forced `"\n"` survives as a line break.
#[derive(Clone, Copy, Debug, Default)]
pub struct WordRankCompressor;

impl Compressor for WordRankCompressor {
    fn compress(&self, context: &str, rate: f32, forced_tokens: &[String]) -> Result<String> {
        if !(0.0..=1.0).contains(&rate) || rate.is_nan() {
            return Err(crate::processing_error!(
                "compress rate {} outside 0.0..=1.0",
                rate
            ));
        }
        let keep_newlines = forced_tokens.iter().any(|t| t == "\n");
        let forced: Vec<&str> = forced_tokens
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .collect();

        let lines: Vec<Vec<&str>> = if keep_newlines {
            context.lines().map(|l| l.split_whitespace().collect()).collect()
        } else {
            vec![context.split_whitespace().collect()]
        };
        let words: Vec<(usize, usize, &str)> = lines
            .iter()
            .enumerate()
            .flat_map(|(li, ws)| ws.iter().enumerate().map(move |(wi, w)| (li, wi, *w)))
            .collect();
        if words.is_empty() {
            return Ok(String::new());
        }

        let budget = ((words.len() as f64) * f64::from(rate)).ceil() as usize;
        let mut keep: HashSet<(usize, usize)> = words
            .iter()
            .filter(|(_, _, w)| forced.iter().any(|t| w.contains(t)))
            .map(|(li, wi, _)| (*li, *wi))
            .collect();

        let mut ranked: Vec<&(usize, usize, &str)> = words.iter().collect();
        // longest first; ties go to the earlier word
        ranked.sort_by(|a, b| {
            b.2.chars()
                .count()
                .cmp(&a.2.chars().count())
                .then((a.0, a.1).cmp(&(b.0, b.1)))
        });
        for (li, wi, _) in ranked {
            if keep.len() >= budget {
                break;
            }
            keep.insert((*li, *wi));
        }

        let out: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(li, ws)| {
                ws.iter()
                    .enumerate()
                    .filter(|(wi, _)| keep.contains(&(li, *wi)))
                    .map(|(_, w)| *w)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|l| !l.is_empty())
            .collect();
        Ok(out.join("\n"))
    }
}
