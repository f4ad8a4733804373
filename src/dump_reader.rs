use anyhow::{Context, Result};
use log::debug;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::dump_file::DumpParsingError;
use crate::dump_snapshot::{DumpSnapshot, HEADER_NUM_OF_ATOMS, HEADER_TIMESTEP};
use crate::frame::{Frame, FrameSource};

/// Blank lines and `#` comments may sit between snapshots, e.g. a
/// `# t= 3600.0 s, dose : 0.25 dpa` line written by the simulation.
fn is_comment(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

/// Streams snapshots out of a LAMMPS text dump one at a time.
///
/// After the first parsing error the reader is exhausted: the position in
/// the stream is no longer known.
pub struct DumpReader<R> {
    lines: io::Lines<R>,
    pending: Option<(u64, usize)>,
    failed: bool,
}

impl DumpReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Reading {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            pending: None,
            failed: false,
        }
    }

    fn next_line(&mut self) -> Option<Result<String, DumpParsingError>> {
        self.lines
            .next()
            .map(|line| line.map_err(DumpParsingError::IO))
    }

    fn read_header(&mut self) -> Option<Result<(u64, usize), DumpParsingError>> {
        let first = loop {
            match self.next_line()? {
                Ok(line) if is_comment(&line) => continue,
                Ok(line) => break line,
                Err(err) => return Some(Err(err)),
            }
        };
        let mut header = || -> Result<(u64, usize), DumpParsingError> {
            let step = match (first.trim() == HEADER_TIMESTEP, self.next_line().transpose()?) {
                (true, Some(line)) => line
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| DumpParsingError::InvalidOrMissingTimestep)?,
                _ => return Err(DumpParsingError::InvalidOrMissingTimestep),
            };
            let atoms_count = match (self.next_line().transpose()?, self.next_line().transpose()?) {
                (Some(header), Some(line)) if header.trim() == HEADER_NUM_OF_ATOMS => line
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| DumpParsingError::InvalidOrMissingNumberOfAtoms)?,
                _ => return Err(DumpParsingError::InvalidOrMissingNumberOfAtoms),
            };
            Ok((step, atoms_count))
        };
        Some(header())
    }

    fn take_header(&mut self) -> Option<Result<(u64, usize), DumpParsingError>> {
        if self.failed {
            return None;
        }
        if let Some(header) = self.pending.take() {
            return Some(Ok(header));
        }
        let header = self.read_header()?;
        self.failed = header.is_err();
        Some(header)
    }

    /// Timestep of the next snapshot without consuming it.
    pub fn peek_timestep(&mut self) -> Option<Result<u64, DumpParsingError>> {
        let header = match self.take_header()? {
            Ok(header) => header,
            Err(err) => return Some(Err(err)),
        };
        self.pending = Some(header);
        Some(Ok(header.0))
    }

    /// Skips the next snapshot without parsing its rows.
    pub fn skip_snapshot(&mut self) -> Option<Result<u64, DumpParsingError>> {
        let (step, atoms_count) = match self.take_header()? {
            Ok(header) => header,
            Err(err) => return Some(Err(err)),
        };
        // box header + 3 bounds + atoms header + rows
        for _ in 0..atoms_count + 5 {
            let err = match self.next_line() {
                Some(Ok(_)) => continue,
                Some(Err(err)) => err,
                None => DumpParsingError::InvalidOrMissingAtomRow,
            };
            self.failed = true;
            return Some(Err(err));
        }
        Some(Ok(step))
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<DumpSnapshot, DumpParsingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (step, atoms_count) = match self.take_header()? {
            Ok(header) => header,
            Err(err) => return Some(Err(err)),
        };
        let mut lines = self
            .lines
            .by_ref()
            .map(|line| line.map_err(DumpParsingError::IO));
        let snapshot = DumpSnapshot::read(&mut lines, step, atoms_count);
        self.failed = snapshot.is_err();
        Some(snapshot)
    }
}

/// Frames from a sequence of dump files, read in the given order.
///
/// A file that fails to open or parse is reported once and abandoned; the
/// trajectory continues with the next file.
pub struct DumpTrajectory {
    paths: VecDeque<PathBuf>,
    current: Option<(PathBuf, DumpReader<BufReader<File>>)>,
    species_key: String,
    frames: Option<usize>,
}

type OpenDump = (PathBuf, DumpReader<BufReader<File>>);

fn open_next<'a>(
    paths: &mut VecDeque<PathBuf>,
    current: &'a mut Option<OpenDump>,
) -> Option<Result<&'a mut OpenDump>> {
    if current.is_none() {
        let path = paths.pop_front()?;
        debug!("opening {}", path.display());
        match DumpReader::open(&path) {
            Ok(reader) => *current = Some((path, reader)),
            Err(err) => return Some(Err(err)),
        }
    }
    current.as_mut().map(Ok)
}

/// Number of snapshots in a dump, reading headers only. A file that cannot
/// be opened counts as one (unreadable) frame, as does a broken tail.
fn count_snapshots(path: &Path) -> usize {
    let Ok(mut reader) = DumpReader::open(path) else {
        return 1;
    };
    let mut count = 0;
    while let Some(skipped) = reader.skip_snapshot() {
        count += 1;
        if skipped.is_err() {
            break;
        }
    }
    count
}

impl DumpTrajectory {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>, species_key: &str) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            current: None,
            species_key: species_key.to_string(),
            frames: None,
        }
    }

    /// Counts the frames of every file up front so that progress can be
    /// reported as a percentage. Costs one pass over the files.
    pub fn with_frame_count(mut self) -> Self {
        let frames = self.paths.iter().map(|path| count_snapshots(path)).sum();
        debug!("{frames} frames in {} files", self.paths.len());
        self.frames = Some(frames);
        self
    }
}

impl FrameSource for DumpTrajectory {
    fn next_frame(&mut self) -> Option<Result<Frame>> {
        let Self {
            paths,
            current,
            species_key,
            ..
        } = self;
        loop {
            let (path, reader) = match open_next(paths, current)? {
                Ok(open) => open,
                Err(err) => return Some(Err(err)),
            };
            let result = match reader.next() {
                None => {
                    *current = None;
                    continue;
                }
                Some(Ok(snapshot)) => Frame::from_snapshot(&snapshot, species_key.as_str())
                    .map(|frame| frame.with_source(path.as_path()))
                    .with_context(|| format!("Timestep {} of {}", snapshot.step, path.display())),
                Some(Err(err)) => Err(err).with_context(|| format!("Parsing {}", path.display())),
            };
            return Some(result);
        }
    }

    fn skip_frame(&mut self) -> Option<Result<()>> {
        loop {
            let (path, reader) = match open_next(&mut self.paths, &mut self.current)? {
                Ok(open) => open,
                Err(err) => return Some(Err(err)),
            };
            match reader.skip_snapshot() {
                None => self.current = None,
                Some(Ok(_)) => return Some(Ok(())),
                Some(Err(err)) => {
                    return Some(Err(err).with_context(|| format!("Parsing {}", path.display())))
                }
            }
        }
    }

    fn frames_hint(&self) -> Option<usize> {
        self.frames
    }
}
