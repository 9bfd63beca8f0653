//! Distance model.
//!
//! A symmetric address-to-address matrix built once from a (possibly triangular)
//! distance table. Lookups resolve the address to an index, then read the matrix.
//! Unknown addresses resolve to infinite distance so routing still terminates; the
//! miss is recorded as a [`Diagnostic::UnknownAddress`].

use std::collections::HashMap;

use crate::error::{Diagnostic, Diagnostics, DispatchError};

/// Symmetric distance matrix indexed by street address.
///
/// # Examples
///
/// ```
/// use parcel_dispatch::distance::DistanceMatrix;
///
/// // Lower-triangular table: blank cells are read from the mirrored cell.
/// let addresses = vec!["Hub".to_string(), "A".to_string(), "B".to_string()];
/// let table = vec![
///     vec![Some(0.0)],
///     vec![Some(2.5), Some(0.0)],
///     vec![Some(4.0), Some(1.5), Some(0.0)],
/// ];
/// let matrix = DistanceMatrix::from_table(addresses, &table).unwrap();
///
/// assert_eq!(matrix.lookup("Hub", "B"), Some(4.0));
/// assert_eq!(matrix.lookup("B", "Hub"), Some(4.0));
/// assert_eq!(matrix.lookup("Hub", "Nowhere"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DistanceMatrix {
    addresses: Vec<String>,
    index: HashMap<String, usize>,
    distances: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    /// Builds the matrix from positional rows.
    ///
    /// Cell `(i, j)` falls back to `(j, i)` when blank or missing; the diagonal
    /// defaults to zero and pairs blank on both sides become infinite. Negative and
    /// non-finite cells are rejected.
    pub fn from_table(addresses: Vec<String>, table: &[Vec<Option<f64>>]) -> Result<Self, DispatchError> {
        let n = addresses.len();
        if table.len() > n {
            return Err(DispatchError::MalformedRecord {
                line: (n + 1) as u64,
                reason: format!("distance table has {} rows for {} addresses", table.len(), n),
            });
        }

        for (i, row) in table.iter().enumerate() {
            for (j, value) in row.iter().copied().enumerate() {
                if let Some(value) = value.filter(|v| !v.is_finite()) {
                    return Err(DispatchError::MalformedRecord {
                        line: (i + 1) as u64,
                        reason: format!("non-finite distance {} in column {}", value, j + 1),
                    });
                }
            }
        }

        let cell = |i: usize, j: usize| table.get(i).and_then(|row| row.get(j)).copied().flatten();

        let mut distances = vec![vec![f64::INFINITY; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let value = cell(i, j)
                    .or_else(|| cell(j, i))
                    .unwrap_or(if i == j { 0.0 } else { f64::INFINITY });
                if value < 0.0 {
                    return Err(DispatchError::MalformedRecord {
                        line: (i + 1) as u64,
                        reason: format!("negative distance {} between '{}' and '{}'", value, addresses[i], addresses[j]),
                    });
                }
                distances[i][j] = value;
                distances[j][i] = value;
            }
        }

        let mut index = HashMap::with_capacity(n);
        for (i, address) in addresses.iter().enumerate() {
            index.entry(address.clone()).or_insert(i);
        }

        Ok(Self {
            addresses,
            index,
            distances,
        })
    }

    /// Builds the matrix from a distance function evaluated on every pair `i >= j`.
    pub fn from_fn(addresses: Vec<String>, distance: impl Fn(usize, usize) -> f64) -> Self {
        let n = addresses.len();
        let table: Vec<Vec<Option<f64>>> = (0..n)
            .map(|i| (0..=i).map(|j| Some(if i == j { 0.0 } else { distance(i, j) })).collect())
            .collect();
        // Rows match the address count and `distance` is trusted to be non-negative.
        Self::from_table(addresses, &table).unwrap_or_default()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn index_of(&self, address: &str) -> Option<usize> {
        self.index.get(address).copied()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    /// Raw lookup; `None` when either address is unknown.
    pub fn lookup(&self, from: &str, to: &str) -> Option<f64> {
        let i = self.index_of(from)?;
        let j = self.index_of(to)?;
        Some(self.distances[i][j])
    }

    /// Distance between two addresses, infinite (and recorded) when unknown.
    pub fn distance(&self, from: &str, to: &str, diagnostics: &mut Diagnostics) -> f64 {
        for address in [from, to] {
            if !self.contains(address) {
                diagnostics.push(Diagnostic::UnknownAddress {
                    address: address.to_string(),
                });
                return f64::INFINITY;
            }
        }
        self.lookup(from, to).unwrap_or(f64::INFINITY)
    }

    /// Closest candidate to `reference`.
    ///
    /// Candidates at zero (the reference itself) or negative distance are skipped.
    /// The comparison is non-strict, so among equidistant candidates the one scanned
    /// last wins. Returns `None` when no candidate is reachable.
    ///
    /// ```
    /// use parcel_dispatch::distance::DistanceMatrix;
    /// use parcel_dispatch::error::Diagnostics;
    ///
    /// let addresses: Vec<String> = ["Hub", "A", "B", "C"].iter().map(|s| s.to_string()).collect();
    /// let positions: [f64; 4] = [0.0, 2.0, 3.0, 4.0];
    /// let matrix = DistanceMatrix::from_fn(addresses, |i, j| (positions[i] - positions[j]).abs());
    ///
    /// let mut diagnostics = Diagnostics::new();
    /// // B is at distance 1 from both A and C: the later candidate wins.
    /// let nearest = matrix.nearest_neighbor("B", ["A", "B", "C"], &mut diagnostics);
    /// assert_eq!(nearest, Some("C"));
    /// ```
    pub fn nearest_neighbor<'a>(
        &self,
        reference: &str,
        candidates: impl IntoIterator<Item = &'a str>,
        diagnostics: &mut Diagnostics,
    ) -> Option<&'a str> {
        let mut nearest = None;
        let mut min_distance = f64::INFINITY;

        for candidate in candidates {
            let distance = self.distance(reference, candidate, diagnostics);
            if distance > 0.0 && distance.is_finite() && distance <= min_distance {
                min_distance = distance;
                nearest = Some(candidate);
            }
        }

        nearest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_blank_cells_resolve_from_counterpart() {
        // Upper-triangular input this time.
        let table = vec![
            vec![None, Some(3.0), Some(7.5)],
            vec![None, None, Some(4.5)],
            vec![None, None, None],
        ];
        let matrix = DistanceMatrix::from_table(names(&["Hub", "A", "B"]), &table).unwrap();

        assert_eq!(matrix.lookup("A", "Hub"), Some(3.0));
        assert_eq!(matrix.lookup("B", "A"), Some(4.5));
        assert_eq!(matrix.lookup("B", "B"), Some(0.0));
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let table = vec![
            vec![Some(0.0)],
            vec![Some(1.2), Some(0.0)],
            vec![Some(3.4), Some(2.2), Some(0.0)],
            vec![Some(5.0), None, Some(1.1), Some(0.0)],
        ];
        let addresses = names(&["Hub", "A", "B", "C"]);
        let matrix = DistanceMatrix::from_table(addresses.clone(), &table).unwrap();

        for a in &addresses {
            for b in &addresses {
                assert_eq!(matrix.lookup(a, b), matrix.lookup(b, a), "{} <-> {}", a, b);
            }
        }
        // Blank on both sides.
        assert_eq!(matrix.lookup("A", "C"), Some(f64::INFINITY));
    }

    #[test]
    fn test_unknown_address_is_infinite_and_reported() {
        let matrix = DistanceMatrix::from_fn(names(&["Hub", "A"]), |_, _| 1.0);
        let mut diagnostics = Diagnostics::new();

        let distance = matrix.distance("Hub", "Atlantis", &mut diagnostics);

        assert!(distance.is_infinite());
        assert_eq!(
            diagnostics.entries(),
            &[Diagnostic::UnknownAddress {
                address: "Atlantis".to_string()
            }]
        );
    }

    #[test]
    fn test_nearest_neighbor_skips_reference_and_unreachable() {
        let matrix = DistanceMatrix::from_fn(names(&["Hub", "A", "B"]), |i, j| (i + j) as f64);
        let mut diagnostics = Diagnostics::new();

        assert_eq!(matrix.nearest_neighbor("A", ["A"], &mut diagnostics), None);
        assert_eq!(matrix.nearest_neighbor("A", ["A", "Hub", "B"], &mut diagnostics), Some("Hub"));
        assert_eq!(matrix.nearest_neighbor("A", ["Ghost"], &mut diagnostics), None);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_rejects_negative_distance() {
        let table = vec![vec![Some(0.0)], vec![Some(-1.0), Some(0.0)]];
        assert!(DistanceMatrix::from_table(names(&["Hub", "A"]), &table).is_err());
    }

    #[test]
    fn test_rejects_non_finite_distance() {
        for bad in [f64::NAN, f64::INFINITY] {
            let table = vec![vec![Some(0.0)], vec![Some(bad), Some(0.0)]];
            let result = DistanceMatrix::from_table(names(&["Hub", "A"]), &table);
            assert!(
                matches!(result, Err(DispatchError::MalformedRecord { line: 2, .. })),
                "{} accepted",
                bad
            );
        }
    }
}
