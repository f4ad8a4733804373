use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

/// Time and dose written by the simulation into a dump file, e.g.
/// `# t= 3600.0 ... dose: 0.25`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    pub time: f64,
    pub dose: f64,
}

impl Metadata {
    pub const UNKNOWN: Metadata = Metadata {
        time: f64::NAN,
        dose: f64::NAN,
    };
}

/// Finds the first line matching a two-group pattern (time, dose). Results
/// are cached per file since one file may hold many frames.
pub struct HeaderScanner {
    pattern: Regex,
    cache: HashMap<PathBuf, Metadata>,
}

impl HeaderScanner {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() < 3 {
            return Err(anyhow!(
                "Header pattern needs two capture groups (time, dose): {pattern}"
            ));
        }
        Ok(Self {
            pattern,
            cache: HashMap::new(),
        })
    }

    pub fn scan_lines(&self, reader: impl BufRead) -> Result<Metadata> {
        for line in reader.lines() {
            let line = line?;
            let Some(captures) = self.pattern.captures(&line) else {
                continue;
            };
            let parse = |i: usize| {
                captures
                    .get(i)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            };
            return Ok(Metadata {
                time: parse(1),
                dose: parse(2),
            });
        }
        Ok(Metadata::UNKNOWN)
    }

    pub fn scan(&mut self, path: &Path) -> Result<Metadata> {
        if let Some(&metadata) = self.cache.get(path) {
            return Ok(metadata);
        }
        let file = File::open(path).with_context(|| format!("Reading {}", path.display()))?;
        let metadata = self.scan_lines(BufReader::new(file))?;
        self.cache.insert(path.to_path_buf(), metadata);
        Ok(metadata)
    }
}
