//! Per-method compilation statistics.

use std::fmt;
use std::ops::AddAssign;

/// A counted optimization event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stat {
    AttemptedCompilation,
    CompiledOptimized,
    FallbackUnoptimized,
    RemovedLoad,
    RemovedStore,
    RemovedNullCheck,
    RemovedDeadInstruction,
}

impl Stat {
    pub const ALL: [Stat; 7] = [
        Stat::AttemptedCompilation,
        Stat::CompiledOptimized,
        Stat::FallbackUnoptimized,
        Stat::RemovedLoad,
        Stat::RemovedStore,
        Stat::RemovedNullCheck,
        Stat::RemovedDeadInstruction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stat::AttemptedCompilation => "attempted_compilation",
            Stat::CompiledOptimized => "compiled_optimized",
            Stat::FallbackUnoptimized => "fallback_unoptimized",
            Stat::RemovedLoad => "removed_load",
            Stat::RemovedStore => "removed_store",
            Stat::RemovedNullCheck => "removed_null_check",
            Stat::RemovedDeadInstruction => "removed_dead_instruction",
        }
    }
}

/// Event counts for one method, or merged over many.
///
/// Each method owns its counters while it is compiled; the driver merges
/// them once compilation is done, so no counter is ever shared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MethodStats {
    counts: [u64; Stat::ALL.len()],
}

impl MethodStats {
    pub fn record(&mut self, stat: Stat, count: u64) {
        self.counts[stat as usize] += count;
    }

    pub fn get(&self, stat: Stat) -> u64 {
        self.counts[stat as usize]
    }

    pub fn merge(&mut self, other: &MethodStats) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts) {
            *mine += theirs;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }
}

impl AddAssign<&MethodStats> for MethodStats {
    fn add_assign(&mut self, rhs: &MethodStats) {
        self.merge(rhs);
    }
}

/// One `name: count` line per non-zero counter.
impl fmt::Display for MethodStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stat in Stat::ALL {
            let count = self.get(stat);
            if count > 0 {
                writeln!(f, "{}: {count}", stat.name())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_counters() {
        let mut a = MethodStats::default();
        a.record(Stat::RemovedLoad, 2);
        let mut b = MethodStats::default();
        b.record(Stat::RemovedLoad, 1);
        b.record(Stat::RemovedStore, 3);
        a += &b;

        assert_eq!(a.get(Stat::RemovedLoad), 3);
        assert_eq!(a.get(Stat::RemovedStore), 3);
        assert_eq!(a.to_string(), "removed_load: 3\nremoved_store: 3\n");
        assert!(MethodStats::default().is_empty());
    }
}
