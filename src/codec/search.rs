//! Automatic LZSS parameter search.
//!
//! Coordinate descent over (window bits, length bits): sweep the window axis
//! from the largest useful window down, sweep the length axis at the best
//! window, then walk ±1 neighbourhoods until nothing improves. Sizes are
//! exact (the parser runs without building the stream) and memoised.

use std::collections::HashMap;

use crate::pool::parallel_map;

use super::bitstream::bits_for;
use super::lzss::{self, LzssParams, MAX_LENGTH_BITS, MAX_WINDOW_BITS};

/// Smallest window the search considers.
pub const SEARCH_MIN_WINDOW_BITS: u32 = 4;
/// Window sizes evaluated without improvement before the sweep stops.
const PATIENCE: usize = 3;
/// Window sizes evaluated per parallel batch; fixed so results do not depend on the thread count.
const WINDOW_BATCH: usize = 4;
const MAX_REFINE_ROUNDS: usize = 8;

/// Upper bounds for the search grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchLimits {
    pub max_window_bits: u32,
    pub max_length_bits: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_window_bits: MAX_WINDOW_BITS,
            max_length_bits: MAX_LENGTH_BITS,
        }
    }
}

/// The winning candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub params: LzssParams,
    /// Stream size in bits, excluding the container byte.
    pub bits: usize,
    pub evaluated: usize,
}

struct Search<'a> {
    data: &'a [u8],
    limits: SearchLimits,
    top_window_bits: u32,
    threads: usize,
    sizes: HashMap<(u32, u32), usize>,
}

impl<'a> Search<'a> {
    fn length_cap(&self, window_bits: u32) -> u32 {
        self.limits.max_length_bits.min(window_bits).max(1)
    }

    fn in_grid(&self, window_bits: u32, length_bits: u32) -> bool {
        (SEARCH_MIN_WINDOW_BITS.min(self.top_window_bits)..=self.top_window_bits)
            .contains(&window_bits)
            && (1..=self.length_cap(window_bits)).contains(&length_bits)
    }

    /// Evaluate candidates not seen yet, in parallel.
    fn evaluate(&mut self, candidates: &[(u32, u32)]) {
        let fresh: Vec<(u32, u32)> = candidates
            .iter()
            .copied()
            .filter(|c| !self.sizes.contains_key(c))
            .collect();
        let data = self.data;
        let sizes = parallel_map(&fresh, self.threads, |&(wb, lb)| {
            LzssParams::new(wb, lb).map(|params| lzss::estimate_bits(data, &params))
        });
        for (candidate, size) in fresh.into_iter().zip(sizes) {
            if let Ok(bits) = size {
                log::debug!(
                    "lzss candidate window_bits={} length_bits={}: {} bits",
                    candidate.0,
                    candidate.1,
                    bits
                );
                self.sizes.insert(candidate, bits);
            }
        }
    }

    /// Best evaluated candidate; ties go to the smaller window, then the shorter length.
    fn best(&self) -> Option<((u32, u32), usize)> {
        self.sizes
            .iter()
            .map(|(&candidate, &bits)| (candidate, bits))
            .min_by_key(|&(candidate, bits)| (bits, candidate))
    }

    fn sweep_windows(&mut self) {
        let top = self.top_window_bits;
        let bottom = SEARCH_MIN_WINDOW_BITS.min(top);
        let windows: Vec<u32> = (bottom..=top).rev().collect();

        let mut best = usize::MAX;
        let mut stale = 0;
        for chunk in windows.chunks(WINDOW_BATCH) {
            let candidates: Vec<(u32, u32)> = chunk
                .iter()
                .map(|&wb| (wb, self.length_cap(wb).min(8)))
                .collect();
            self.evaluate(&candidates);

            for candidate in &candidates {
                match self.sizes.get(candidate) {
                    Some(&bits) if bits < best => {
                        best = bits;
                        stale = 0;
                    }
                    _ => stale += 1,
                }
            }
            if stale >= PATIENCE {
                break;
            }
        }
    }

    fn sweep_lengths(&mut self, window_bits: u32) {
        let candidates: Vec<(u32, u32)> = (1..=self.length_cap(window_bits))
            .map(|lb| (window_bits, lb))
            .collect();
        self.evaluate(&candidates);
    }

    fn refine(&mut self) {
        for _ in 0..MAX_REFINE_ROUNDS {
            let Some(((wb, lb), _)) = self.best() else {
                return;
            };
            let mut neighbours = Vec::new();
            for dw in -1i32..=1 {
                for dl in -1i32..=1 {
                    let (w, l) = (wb as i32 + dw, lb as i32 + dl);
                    if w > 0 && l > 0 && self.in_grid(w as u32, l as u32) {
                        neighbours.push((w as u32, l as u32));
                    }
                }
            }
            self.evaluate(&neighbours);
            if self.best().map(|(c, _)| c) == Some((wb, lb)) {
                return;
            }
        }
    }
}

/// Find the (window, length) pair giving the smallest LZSS stream for `data`.
pub fn search(data: &[u8], limits: SearchLimits, threads: usize) -> SearchResult {
    let max_window = limits.max_window_bits.clamp(1, MAX_WINDOW_BITS);
    let limits = SearchLimits {
        max_window_bits: max_window,
        max_length_bits: limits.max_length_bits.clamp(1, MAX_LENGTH_BITS),
    };

    // A window wider than the payload buys nothing.
    let needed = bits_for(data.len().saturating_sub(1) as u64);
    let top_window_bits = needed.max(SEARCH_MIN_WINDOW_BITS).min(max_window);

    let mut search = Search {
        data,
        limits,
        top_window_bits,
        threads: threads.max(1),
        sizes: HashMap::new(),
    };

    search.sweep_windows();
    if let Some(((wb, _), _)) = search.best() {
        search.sweep_lengths(wb);
    }
    search.refine();

    let evaluated = search.sizes.len();
    let ((wb, lb), bits) = search
        .best()
        .unwrap_or(((top_window_bits, search.length_cap(top_window_bits)), usize::MAX));
    let params = LzssParams::new(wb, lb)
        .unwrap_or(LzssParams { window_bits: wb, length_bits: lb, min_match: 1 });

    log::info!(
        "lzss search over {} bytes: {} after {} candidates",
        data.len(),
        params,
        evaluated
    );

    SearchResult {
        params,
        bits,
        evaluated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhaustive(data: &[u8], limits: SearchLimits) -> usize {
        let top = bits_for(data.len().saturating_sub(1) as u64)
            .max(SEARCH_MIN_WINDOW_BITS)
            .min(limits.max_window_bits);
        let mut best = usize::MAX;
        for wb in SEARCH_MIN_WINDOW_BITS.min(top)..=top {
            for lb in 1..=limits.max_length_bits.min(wb) {
                let params = LzssParams::new(wb, lb).unwrap();
                best = best.min(lzss::estimate_bits(data, &params));
            }
        }
        best
    }

    fn sample(len: usize) -> Vec<u8> {
        let mut state = 0x1234_5678u32;
        let block: Vec<u8> = (0..97)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 24) as u8
            })
            .collect();
        block.iter().cycle().take(len).copied().collect()
    }

    #[test]
    fn test_search_respects_limits() {
        let data = sample(5000);
        let limits = SearchLimits {
            max_window_bits: 9,
            max_length_bits: 5,
        };
        let result = search(&data, limits, 2);
        assert!(result.params.window_bits <= 9);
        assert!(result.params.length_bits <= 5);
        assert!(result.params.length_bits <= result.params.window_bits);
    }

    #[test]
    fn test_search_window_fits_payload() {
        let data = sample(100);
        let result = search(&data, SearchLimits::default(), 1);
        assert!(result.params.window_bits <= 7);
    }

    #[test]
    fn test_search_close_to_exhaustive() {
        let data = sample(3000);
        let limits = SearchLimits {
            max_window_bits: 12,
            max_length_bits: 12,
        };
        let found = search(&data, limits, 4);
        let optimum = exhaustive(&data, limits);
        assert!(found.bits >= optimum);
        // Coordinate descent may miss the global optimum, but not by much
        assert!(
            found.bits as f64 <= optimum as f64 * 1.10,
            "search {} vs exhaustive {}",
            found.bits,
            optimum
        );
        assert!(found.evaluated < 12 * 12);
    }

    #[test]
    fn test_search_is_deterministic() {
        let data = sample(2000);
        let a = search(&data, SearchLimits::default(), 1);
        let b = search(&data, SearchLimits::default(), 8);
        assert_eq!(a.params, b.params);
        assert_eq!(a.bits, b.bits);
    }

    #[test]
    fn test_search_empty_input() {
        let result = search(&[], SearchLimits::default(), 2);
        assert_eq!(result.params.window_bits, SEARCH_MIN_WINDOW_BITS);
    }
}
