use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use num_bigint::BigInt;
use num_traits::Zero;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::machine::{Machine, Output, Registers, Step, evaluate};
use crate::program::Program;

/// Tuning knobs for the quine search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// First candidate tried by the brute-force scan. The constructive search
    /// treats it as a lower bound on the reported seed.
    pub start: u64,
    /// Number of candidates the brute-force scan may try.
    pub max_attempts: u64,
    /// Candidates evaluated per parallel block.
    pub block_size: u64,
    /// Per-candidate step budget. `None` runs every candidate to completion,
    /// which never returns for a non-terminating program.
    pub step_limit: Option<u64>,
    /// Candidates between progress reports.
    pub progress_every: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start: 0,
            max_attempts: 1 << 32,
            block_size: 1 << 16,
            step_limit: Some(1 << 20),
            progress_every: 1 << 22,
        }
    }
}

/// Which search algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Build `A` one octal digit at a time, most significant first.
    Constructive,
    /// Try every `A` from `start` upward.
    BruteForce,
}

/// Periodic status handed to the progress callback.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Candidates evaluated so far.
    pub candidates: u64,
    /// The candidate most recently reached.
    pub current: BigInt,
    pub elapsed: Duration,
}

/// Run the chosen strategy.
pub fn search<F: FnMut(&Progress)>(
    program: &Program,
    strategy: Strategy,
    config: &SearchConfig,
    stop: &AtomicBool,
    progress: F,
) -> Result<BigInt> {
    match strategy {
        Strategy::Constructive => constructive(program, config, stop, progress),
        Strategy::BruteForce => brute_force(program, config, stop, progress),
    }
}

/// The smallest `A >= search_start` for which `program` prints itself.
pub fn find_self_reproducing_a(program: &Program, search_start: u64) -> Result<BigInt> {
    let config = SearchConfig {
        start: search_start,
        ..Default::default()
    };
    constructive(program, &config, &AtomicBool::new(false), |_| {})
}

/// Run `program` with `A = seed` and check that it prints itself.
///
/// Returns the output on success and [`Error::NotReproduced`] otherwise.
pub fn verify_seed(program: &Program, seed: &BigInt) -> Result<Output> {
    let output = evaluate(program, seed.clone())?;
    if !program.is_reproduced_by(output.digits()) {
        return Err(Error::NotReproduced {
            seed: seed.clone(),
            output: output.to_string(),
        });
    }
    Ok(output)
}

/// Run `machine` with `A = a` and report whether it emits exactly `target`.
///
/// Bails out on the first diverging digit, on a step-budget overrun, or on a
/// seed-dependent fault. Any other error is the program's fault and is
/// returned.
fn emits_exactly(
    machine: &mut Machine<'_>,
    a: &BigInt,
    target: &[u64],
    step_limit: Option<u64>,
) -> Result<bool> {
    machine.reset(Registers::with_a(a.clone()));
    let mut checked = 0;
    loop {
        if step_limit.is_some_and(|limit| machine.steps() >= limit) {
            trace!(%a, "candidate exceeded its step budget");
            return Ok(false);
        }
        let step = match machine.step() {
            Ok(step) => step,
            Err(err) if err.is_candidate_fault() => {
                trace!(%a, %err, "candidate faulted");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        let output = machine.output();
        // `out` appends at most one digit per step.
        if output.len() > checked {
            if output.len() > target.len() || output[checked] as u64 != target[checked] {
                return Ok(false);
            }
            checked = output.len();
        }
        if step == Step::Halted {
            return Ok(checked == target.len());
        }
    }
}

/// Depth-first search over octal digits of `A`.
///
/// In the loop shape this machine's programs use, each pass emits one digit
/// and then shifts `A` right by three bits, so the last `k` outputs depend
/// only on the top `k` octal digits of the seed. The search fixes those
/// digits from the most significant end and keeps a prefix only if running it
/// emits exactly the program's last `k` words. Digits are tried in ascending
/// order, so candidates are visited in numeric order and the first complete
/// match is the smallest.
///
/// Programs without that shape simply yield [`Error::NoSelfReproducingSeed`];
/// every reported seed has been confirmed by a full run.
pub fn constructive<F: FnMut(&Progress)>(
    program: &Program,
    config: &SearchConfig,
    stop: &AtomicBool,
    progress: F,
) -> Result<BigInt> {
    debug!(program = %program, floor = config.start, "constructive search");
    let mut search = DigitSearch {
        program,
        machine: Machine::load(program, Registers::default()),
        config,
        stop,
        progress,
        started: Instant::now(),
        candidates: 0,
        next_report: config.progress_every.max(1),
    };
    let found = search.descend(BigInt::zero(), 1)?;
    debug!(
        candidates = search.candidates,
        elapsed = ?search.started.elapsed(),
        found = found.is_some(),
        "constructive search finished"
    );
    found.ok_or(Error::NoSelfReproducingSeed)
}

struct DigitSearch<'a, F> {
    program: &'a Program,
    machine: Machine<'a>,
    config: &'a SearchConfig,
    stop: &'a AtomicBool,
    progress: F,
    started: Instant,
    candidates: u64,
    next_report: u64,
}

impl<F: FnMut(&Progress)> DigitSearch<'_, F> {
    /// Extend `prefix` by one octal digit; the extended seed must emit the
    /// last `depth` words of the program.
    fn descend(&mut self, prefix: BigInt, depth: usize) -> Result<Option<BigInt>> {
        let program = self.program;
        let words = program.words();
        let target = &words[words.len() - depth..];
        let remaining = words.len() - depth;
        let floor = BigInt::from(self.config.start);

        for digit in 0u32..8 {
            if self.stop.load(Ordering::Relaxed) {
                return Err(Error::Interrupted {
                    candidates: self.candidates,
                });
            }
            let candidate = &prefix * 8u32 + digit;
            if subtree_below(&candidate, remaining, &floor) {
                continue;
            }

            self.candidates += 1;
            if self.candidates >= self.next_report {
                self.next_report += self.config.progress_every.max(1);
                (self.progress)(&Progress {
                    candidates: self.candidates,
                    current: candidate.clone(),
                    elapsed: self.started.elapsed(),
                });
            }

            if !emits_exactly(&mut self.machine, &candidate, target, self.config.step_limit)? {
                continue;
            }
            trace!(depth, candidate = %candidate, "prefix matches suffix");
            if depth == words.len() {
                if candidate >= floor {
                    return Ok(Some(candidate));
                }
                continue;
            }
            if let Some(found) = self.descend(candidate, depth + 1)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

/// True when every seed that extends `candidate` by `remaining` more octal
/// digits is below `floor`.
fn subtree_below(candidate: &BigInt, remaining: usize, floor: &BigInt) -> bool {
    ((candidate + 1u32) << (3 * remaining)) <= *floor
}

/// Linear scan over `start..start + max_attempts`.
///
/// Candidates are evaluated in blocks of `block_size` on the rayon pool.
/// Within a block the workers share one best-so-far slot updated with
/// `fetch_min` and skip anything above it; blocks run in order, so the first
/// block with a hit holds the smallest seed.
pub fn brute_force<F: FnMut(&Progress)>(
    program: &Program,
    config: &SearchConfig,
    stop: &AtomicBool,
    mut progress: F,
) -> Result<BigInt> {
    let started = Instant::now();
    let end = config.start.saturating_add(config.max_attempts);
    let block = config.block_size.max(1);
    let every = config.progress_every.max(1);
    let target = program.words();
    debug!(program = %program, start = config.start, end, "brute-force search");

    let mut tried: u64 = 0;
    let mut next_report = every;
    let mut lo = config.start;
    while lo < end {
        if stop.load(Ordering::Relaxed) {
            return Err(Error::Interrupted { candidates: tried });
        }
        let hi = lo.saturating_add(block).min(end);
        let best = AtomicU64::new(u64::MAX);

        (lo..hi).into_par_iter().try_for_each_init(
            || Machine::load(program, Registers::default()),
            |machine, a| {
                if a >= best.load(Ordering::Relaxed) || stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                if emits_exactly(machine, &BigInt::from(a), target, config.step_limit)? {
                    best.fetch_min(a, Ordering::Relaxed);
                }
                Ok::<(), Error>(())
            },
        )?;

        // A raised flag may have skipped candidates below any hit.
        if stop.load(Ordering::Relaxed) {
            return Err(Error::Interrupted { candidates: tried });
        }
        let best = best.into_inner();
        if best != u64::MAX {
            debug!(seed = best, elapsed = ?started.elapsed(), "brute-force search finished");
            return Ok(BigInt::from(best));
        }

        tried += hi - lo;
        if tried >= next_report {
            next_report = tried - tried % every + every;
            progress(&Progress {
                candidates: tried,
                current: BigInt::from(hi),
                elapsed: started.elapsed(),
            });
        }
        lo = hi;
    }

    Err(Error::SearchExhausted {
        start: config.start,
        attempts: tried,
    })
}
