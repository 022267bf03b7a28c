//! Bookkeeping for worker processes.

use std::collections::HashSet;

use nix::unistd::Pid;

/// Whether a worker serves the live configuration or is draining an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    Current,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRecord {
    pub pid: Pid,
    pub generation: Generation,
}

/// Live workers split by generation. A pid is never in both sets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerSet {
    current: HashSet<Pid>,
    stale: HashSet<Pid>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_current(&mut self, pid: Pid) {
        self.stale.remove(&pid);
        self.current.insert(pid);
    }

    /// Relabel every current worker as stale. Returns how many moved.
    pub fn retire_current(&mut self) -> usize {
        let retired = self.current.len();
        self.stale.extend(self.current.drain());
        retired
    }

    /// Forget `pid`, reporting which generation it belonged to.
    pub fn remove(&mut self, pid: Pid) -> Option<Generation> {
        if self.current.remove(&pid) {
            Some(Generation::Current)
        } else if self.stale.remove(&pid) {
            Some(Generation::Stale)
        } else {
            None
        }
    }

    pub fn generation_of(&self, pid: Pid) -> Option<Generation> {
        if self.current.contains(&pid) {
            Some(Generation::Current)
        } else if self.stale.contains(&pid) {
            Some(Generation::Stale)
        } else {
            None
        }
    }

    pub fn current_len(&self) -> usize {
        self.current.len()
    }

    pub fn stale_len(&self) -> usize {
        self.stale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.stale.is_empty()
    }

    /// All workers, ordered by pid.
    pub fn records(&self) -> Vec<WorkerRecord> {
        let current = self.current.iter().map(|&pid| WorkerRecord {
            pid,
            generation: Generation::Current,
        });
        let stale = self.stale.iter().map(|&pid| WorkerRecord {
            pid,
            generation: Generation::Stale,
        });
        let mut records: Vec<_> = current.chain(stale).collect();
        records.sort_by_key(|record| record.pid.as_raw());
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    #[test]
    fn retire_moves_everything_to_stale() {
        let mut set = WorkerSet::new();
        set.add_current(pid(10));
        set.add_current(pid(11));

        assert_eq!(set.retire_current(), 2);
        assert_eq!(set.current_len(), 0);
        assert_eq!(set.stale_len(), 2);
        assert_eq!(set.generation_of(pid(10)), Some(Generation::Stale));

        set.add_current(pid(12));
        assert_eq!(
            set.records(),
            vec![
                WorkerRecord { pid: pid(10), generation: Generation::Stale },
                WorkerRecord { pid: pid(11), generation: Generation::Stale },
                WorkerRecord { pid: pid(12), generation: Generation::Current },
            ]
        );
    }

    #[test]
    fn remove_reports_generation() {
        let mut set = WorkerSet::new();
        set.add_current(pid(1));
        set.retire_current();
        set.add_current(pid(2));

        assert_eq!(set.remove(pid(1)), Some(Generation::Stale));
        assert_eq!(set.remove(pid(2)), Some(Generation::Current));
        assert_eq!(set.remove(pid(3)), None);
        assert!(set.is_empty());
    }
}
