use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Routing table learned from PAT sections: PMT-carrying PID to program number.
///
/// Entries are only ever added or overwritten by the engine. The map is owned
/// by the caller and passed into every batch call, so independent sessions
/// never share routing state by accident.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramMap {
    programs: HashMap<u16, u16>,
}

impl ProgramMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `pid` as the PMT carrier of `program_number`, replacing any
    /// previous entry for `pid`.
    pub fn set(&mut self, pid: u16, program_number: u16) {
        if let Some(previous) = self.programs.insert(pid, program_number) {
            if previous != program_number {
                log::debug!(
                    "PMT PID {} moved from program {} to {}",
                    pid,
                    previous,
                    program_number
                );
            }
        }
    }

    pub fn get(&self, pid: u16) -> Option<u16> {
        self.programs.get(&pid).copied()
    }

    pub fn contains(&self, pid: u16) -> bool {
        self.programs.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Iterates `(pid, program_number)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.programs.iter().map(|(&pid, &program)| (pid, program))
    }

    /// Forgets every learned route.
    pub fn reset(&mut self) {
        self.programs.clear();
    }
}

/// Cloneable handle for callers that share one [`ProgramMap`] between threads.
///
/// The engine itself never locks; lock the handle and pass the guard in.
#[derive(Debug, Clone, Default)]
pub struct SharedProgramMap {
    inner: Arc<Mutex<ProgramMap>>,
}

impl SharedProgramMap {
    pub fn new(map: ProgramMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ProgramMap> {
        self.inner.lock()
    }

    /// Copies the current routing table out of the lock.
    pub fn snapshot(&self) -> ProgramMap {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let mut pm = ProgramMap::new();
        assert!(pm.is_empty());
        assert_eq!(pm.get(256), None);

        pm.set(256, 1);
        pm.set(257, 2);
        assert_eq!(pm.get(256), Some(1));
        assert_eq!(pm.get(257), Some(2));
        assert_eq!(pm.len(), 2);

        pm.set(256, 3);
        assert_eq!(pm.get(256), Some(3));
        assert_eq!(pm.len(), 2);

        let mut entries: Vec<_> = pm.iter().collect();
        entries.sort();
        assert_eq!(entries, vec![(256, 3), (257, 2)]);

        pm.reset();
        assert!(!pm.contains(256));
        assert!(pm.is_empty());
    }

    #[test]
    fn test_shared_map_across_threads() {
        let shared = SharedProgramMap::default();
        let handles: Vec<_> = (0..4u16)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || shared.lock().set(0x100 + i, i + 1))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.get(0x103), Some(4));
    }
}
