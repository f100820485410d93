//! Hungarian (Kuhn-Munkres) solver for optimal detection-to-track assignment
//!
//! Works on rectangular float cost matrices. Every "find" runs a row-major
//! scan, so ties resolve deterministically to the first qualifying zero.

use ndarray::prelude::*;

/// Result of the assignment solve
#[derive(Debug, Clone)]
pub struct AssignmentResult {
    /// `assignment[i] = j` maps row i to column j; -1 means unassigned
    pub assignment: Vec<i32>,
    /// Inverse mapping: `assignment_reversed[j] = i`; -1 means unassigned
    pub assignment_reversed: Vec<i32>,
    /// Total cost of the assignment under the caller's matrix
    pub total_cost: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    None,
    Star,
    Prime,
}

/// Linear assignment problem solver
pub struct HungarianSolver;

impl HungarianSolver {
    /// Solve the assignment problem over `cost`, minimizing the total unless
    /// `maximize` is set
    ///
    /// Each row is assigned to at most one column and vice versa. Non-finite
    /// costs are undefined input.
    pub fn solve(cost: ArrayView2<f32>, maximize: bool) -> AssignmentResult {
        let (m, n) = cost.dim();
        debug_assert!(
            cost.iter().all(|v| v.is_finite()),
            "assignment cost must be finite"
        );

        if m == 0 || n == 0 {
            return AssignmentResult {
                assignment: vec![-1; m],
                assignment_reversed: vec![-1; n],
                total_cost: 0.0,
            };
        }

        // The reduction steps need at least as many columns as rows.
        let transposed = m > n;
        let mut working = if transposed {
            cost.t().to_owned()
        } else {
            cost.to_owned()
        };

        // Maximization minimizes the negated matrix; the reported total is
        // still read from the caller's matrix.
        if maximize {
            working.mapv_inplace(|v| -v);
        }

        let mut state = MunkresState::new(working.nrows(), working.ncols());
        state.reduce_rows(&mut working);
        state.star_initial_zeros(&working);

        loop {
            if state.cover_starred_columns() == state.rows {
                break;
            }
            let start = state.prime_uncovered_zeros(&mut working);
            state.augment_path(start);
        }

        let mut assignment = vec![-1i32; m];
        let mut assignment_reversed = vec![-1i32; n];
        let mut total_cost = 0.0f32;

        for i in 0..state.rows {
            for j in 0..state.cols {
                if state.marker(i, j) == Marker::Star {
                    let (row, col) = if transposed { (j, i) } else { (i, j) };
                    assignment[row] = col as i32;
                    assignment_reversed[col] = row as i32;
                    total_cost += cost[(row, col)];
                }
            }
        }

        AssignmentResult {
            assignment,
            assignment_reversed,
            total_cost,
        }
    }
}

struct MunkresState {
    rows: usize,
    cols: usize,
    markers: Vec<Marker>,
    covered_row: Vec<bool>,
    covered_col: Vec<bool>,
    path: Vec<(usize, usize)>,
}

impl MunkresState {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            markers: vec![Marker::None; rows * cols],
            covered_row: vec![false; rows],
            covered_col: vec![false; cols],
            path: Vec::with_capacity(rows),
        }
    }

    #[inline]
    fn marker(&self, i: usize, j: usize) -> Marker {
        self.markers[i * self.cols + j]
    }

    #[inline]
    fn set_marker(&mut self, i: usize, j: usize, marker: Marker) {
        self.markers[i * self.cols + j] = marker;
    }

    /// Step 1: subtract the row minimum from every row
    fn reduce_rows(&self, working: &mut Array2<f32>) {
        for mut row in working.rows_mut() {
            let min = row.iter().copied().fold(f32::INFINITY, f32::min);
            row.mapv_inplace(|v| v - min);
        }
    }

    /// Step 2: star zeros that have no starred zero in their column, one per row
    fn star_initial_zeros(&mut self, working: &Array2<f32>) {
        let mut starred_col = vec![false; self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                if !starred_col[j] && working[(i, j)] == 0.0 {
                    self.set_marker(i, j, Marker::Star);
                    starred_col[j] = true;
                    break;
                }
            }
        }
    }

    /// Step 3: cover every column containing a starred zero; returns the count
    fn cover_starred_columns(&mut self) -> usize {
        let mut covered = 0;
        for j in 0..self.cols {
            if (0..self.rows).any(|i| self.marker(i, j) == Marker::Star) {
                self.covered_col[j] = true;
                covered += 1;
            }
        }
        covered
    }

    /// Steps 4 and 6: prime uncovered zeros, adjusting the cost matrix
    /// whenever none is left, until a primed zero with no star in its row
    /// turns up
    fn prime_uncovered_zeros(&mut self, working: &mut Array2<f32>) -> (usize, usize) {
        loop {
            match self.find_uncovered_zero(working) {
                Some((i, j)) => {
                    self.set_marker(i, j, Marker::Prime);
                    if let Some(starred_col) = self.find_star_in_row(i) {
                        self.covered_row[i] = true;
                        self.covered_col[starred_col] = false;
                    } else {
                        return (i, j);
                    }
                }
                None => self.adjust_cost(working),
            }
        }
    }

    /// Step 5: alternate star/prime along the augmenting path rooted at the
    /// uncovered primed zero, then reset covers and primes
    fn augment_path(&mut self, start: (usize, usize)) {
        self.path.clear();
        self.path.push(start);

        let (mut i, mut j) = start;
        while let Some(star_row) = self.find_star_in_col(j) {
            i = star_row;
            self.path.push((i, j));

            if let Some(prime_col) = self.find_prime_in_row(i) {
                j = prime_col;
                self.path.push((i, j));
            } else {
                break;
            }
        }

        for (k, &(i, j)) in self.path.clone().iter().enumerate() {
            if k % 2 == 0 {
                // Star the primed zero
                self.set_marker(i, j, Marker::Star);
            } else {
                // Unstar the starred zero
                self.set_marker(i, j, Marker::None);
            }
        }

        for marker in self.markers.iter_mut() {
            if *marker == Marker::Prime {
                *marker = Marker::None;
            }
        }

        self.covered_row.fill(false);
        self.covered_col.fill(false);
    }

    /// Step 6: add the minimum uncovered cost to covered rows and subtract it
    /// from uncovered columns
    fn adjust_cost(&self, working: &mut Array2<f32>) {
        let mut min_uncovered = f32::INFINITY;
        for i in 0..self.rows {
            if self.covered_row[i] {
                continue;
            }
            for j in 0..self.cols {
                if !self.covered_col[j] {
                    min_uncovered = min_uncovered.min(working[(i, j)]);
                }
            }
        }

        for i in 0..self.rows {
            for j in 0..self.cols {
                if self.covered_row[i] {
                    working[(i, j)] += min_uncovered;
                }
                if !self.covered_col[j] {
                    working[(i, j)] -= min_uncovered;
                }
            }
        }
    }

    fn find_uncovered_zero(&self, working: &Array2<f32>) -> Option<(usize, usize)> {
        for i in 0..self.rows {
            if self.covered_row[i] {
                continue;
            }
            for j in 0..self.cols {
                if !self.covered_col[j] && working[(i, j)] == 0.0 {
                    return Some((i, j));
                }
            }
        }
        None
    }

    fn find_star_in_row(&self, i: usize) -> Option<usize> {
        (0..self.cols).find(|&j| self.marker(i, j) == Marker::Star)
    }

    fn find_star_in_col(&self, j: usize) -> Option<usize> {
        (0..self.rows).find(|&i| self.marker(i, j) == Marker::Star)
    }

    fn find_prime_in_row(&self, i: usize) -> Option<usize> {
        (0..self.cols).find(|&j| self.marker(i, j) == Marker::Prime)
    }
}
