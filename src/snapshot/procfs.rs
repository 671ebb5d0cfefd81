use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{Frame, SnapshotProvider, ThreadSnapshot, ThreadState};

/// Linux snapshot provider backed by `/proc/self/task`.
///
/// Thread state comes from each task's `stat` file and the name from `comm`.
/// Frames are read best-effort from the task's kernel `stack` file; without
/// the privilege to read it the thread reports no frames and gets filtered
/// by the sampler. No lock or monitor metadata is touched.
pub struct ProcfsSnapshotProvider {
    task_root: PathBuf,
}

impl ProcfsSnapshotProvider {
    pub fn new() -> Self {
        Self {
            task_root: PathBuf::from("/proc/self/task"),
        }
    }

    /// Use an alternate task directory. Intended for tests.
    pub fn with_task_root(task_root: impl Into<PathBuf>) -> Self {
        Self {
            task_root: task_root.into(),
        }
    }
}

impl Default for ProcfsSnapshotProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProvider for ProcfsSnapshotProvider {
    fn snapshot(&self) -> Result<Vec<ThreadSnapshot>> {
        let entries = fs::read_dir(&self.task_root)
            .with_context(|| format!("reading task directory {}", self.task_root.display()))?;

        let mut threads = Vec::new();

        for entry in entries {
            let entry = entry.context("reading task directory entry")?;
            let Ok(tid) = entry.file_name().to_string_lossy().parse::<u64>() else {
                continue;
            };

            let dir = entry.path();

            // Threads may exit between read_dir and here; skip them quietly.
            let Ok(stat) = fs::read_to_string(dir.join("stat")) else {
                continue;
            };
            let state = parse_stat_state(&stat).unwrap_or(ThreadState::Unknown);

            let name = fs::read_to_string(dir.join("comm"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();

            let frames = read_kernel_stack(&dir.join("stack"));

            threads.push(ThreadSnapshot {
                tid,
                name,
                state,
                frames,
            });
        }

        Ok(threads)
    }
}

/// Extracts the single-letter state field from a `/proc/<pid>/task/<tid>/stat`
/// line and maps it onto [`ThreadState`].
fn parse_stat_state(stat: &str) -> Option<ThreadState> {
    // The comm field is parenthesized and may itself contain spaces or
    // parentheses, so scan from the last ')'.
    let rest = stat.rsplit_once(')')?.1;
    let code = rest.split_whitespace().next()?.chars().next()?;

    Some(match code {
        'R' => ThreadState::Running,
        // Uninterruptible sleep: blocked in the kernel, typically on I/O or
        // a contended lock. This is the actionable blocked time.
        'D' => ThreadState::BlockedOnLock,
        'S' | 'I' | 'T' | 't' => ThreadState::Waiting,
        'Z' | 'X' | 'x' => ThreadState::Terminated,
        _ => ThreadState::Unknown,
    })
}

/// Reads a task's kernel stack file, returning leaf-first frames.
/// Returns an empty list when the file is unreadable (needs privilege).
fn read_kernel_stack(path: &Path) -> Vec<Frame> {
    match fs::read_to_string(path) {
        Ok(text) => parse_kernel_stack(&text),
        Err(_) => Vec::new(),
    }
}

/// Parses `/proc/<pid>/task/<tid>/stack` content.
///
/// Lines look like `[<0>] futex_wait+0x88/0xf0`; the file lists the
/// innermost frame first, matching the leaf-first snapshot contract.
fn parse_kernel_stack(text: &str) -> Vec<Frame> {
    text.lines()
        .filter_map(|line| {
            let symbol = line.rsplit_once("] ").map_or(line, |(_, s)| s).trim();
            if symbol.is_empty() {
                return None;
            }
            // Strip the +0x<offset>/0x<size> suffix; offsets would split
            // identical call chains into distinct signatures.
            let function = symbol.split('+').next().unwrap_or(symbol);
            Some(Frame::new("", function))
        })
        .collect()
}
