use std::collections::HashMap;

/// Sequences at least this long get their very common characters treated as
/// junk when seeding matches.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Similarity ratio `2 * M / T` over longest matching blocks, in `0.0..=1.0`.
///
/// `M` is the number of characters covered by the matching blocks found by
/// recursively taking the longest common run and recursing on either side of it;
/// `T` is the combined length of both strings. Two empty strings score `1.0`.
pub fn ratio(left: &str, right: &str) -> f64 {
    let a: Vec<char> = left.chars().collect();
    let b: Vec<char> = right.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matched = BlockMatcher::new(&a, &b).matched_len();
    2.0 * matched as f64 / total as f64
}

struct BlockMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    b_index: HashMap<char, Vec<usize>>,
}

impl<'a> BlockMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b_index: HashMap<char, Vec<usize>> = HashMap::new();
        for (position, ch) in b.iter().enumerate() {
            b_index.entry(*ch).or_default().push(position);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let popular_cutoff = b.len() / 100 + 1;
            b_index.retain(|_, positions| positions.len() <= popular_cutoff);
        }

        Self { a, b, b_index }
    }

    fn matched_len(&self) -> usize {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut matched = 0;

        while let Some((a_lo, a_hi, b_lo, b_hi)) = pending.pop() {
            let (i, j, size) = self.longest_match(a_lo, a_hi, b_lo, b_hi);
            if size == 0 {
                continue;
            }
            matched += size;
            if a_lo < i && b_lo < j {
                pending.push((a_lo, i, b_lo, j));
            }
            if i + size < a_hi && j + size < b_hi {
                pending.push((i + size, a_hi, j + size, b_hi));
            }
        }

        matched
    }

    /// Longest run with `a[i..i+size] == b[j..j+size]` inside the window,
    /// earliest in `a` then earliest in `b` on ties.
    fn longest_match(&self, a_lo: usize, a_hi: usize, b_lo: usize, b_hi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (a_lo, b_lo, 0);
        let mut run_lengths: HashMap<usize, usize> = HashMap::new();

        for i in a_lo..a_hi {
            let mut next_lengths = HashMap::new();
            if let Some(positions) = self.b_index.get(&self.a[i]) {
                for &j in positions {
                    if j < b_lo {
                        continue;
                    }
                    if j >= b_hi {
                        break;
                    }
                    let size = j
                        .checked_sub(1)
                        .and_then(|previous| run_lengths.get(&previous))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_lengths.insert(j, size);
                    if size > best_size {
                        best_i = i + 1 - size;
                        best_j = j + 1 - size;
                        best_size = size;
                    }
                }
            }
            run_lengths = next_lengths;
        }

        // Popular characters were left out of the index; grow the run over them.
        while best_i > a_lo && best_j > b_lo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < a_hi
            && best_j + best_size < b_hi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }
}
