/// A permutation of `0..n`.
///
/// `map[i]` is the position of the source element that ends up at position `i`,
/// so [`Permutation::apply_slice`] reads `slice[map[i]]` into slot `i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permutation {
    map: Vec<usize>,
}

impl Permutation {
    pub fn from_map(map: Vec<usize>) -> Self {
        Permutation { map }
    }

    pub fn apply_slice<T: Clone, S>(&self, slice: S) -> Vec<T>
    where
        S: AsRef<[T]>,
    {
        let s = slice.as_ref();
        self.map.iter().map(|&idx| s[idx].clone()).collect()
    }

    /// Sorting permutation of `slice`: applying it yields the sorted slice.
    pub fn sort<T, S>(slice: S) -> Permutation
    where
        T: Ord,
        S: AsRef<[T]>,
    {
        let s = slice.as_ref();
        let mut permutation: Vec<usize> = (0..s.len()).collect();
        permutation.sort_by_key(|&i| &s[i]);
        Self::from_map(permutation)
    }

    pub fn find_cycles(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.map.len()];
        let mut cycles = Vec::new();
        for i in 0..self.map.len() {
            if visited[i] {
                continue;
            }
            let mut cycle = Vec::new();
            let mut j = i;
            while !visited[j] {
                visited[j] = true;
                cycle.push(j);
                j = self.map[j];
            }
            if !cycle.is_empty() {
                cycles.push(cycle);
            }
        }
        cycles
    }

    /// A permutation is odd iff it decomposes into an odd number of transpositions.
    pub fn is_odd(&self) -> bool {
        self.find_cycles()
            .iter()
            .map(|c| c.len() - 1)
            .sum::<usize>()
            % 2
            == 1
    }

    pub fn myrvold_ruskey_unrank1(n: usize, mut rank: usize) -> Self {
        let mut p = (0..n).collect::<Vec<_>>();
        for i in (1..=n).rev() {
            let j = rank % i;
            rank /= i;
            p.swap(i - 1, j);
        }
        Permutation::from_map(p)
    }

    /// Every permutation of `0..n`, in Myrvold–Ruskey rank order.
    pub fn all(n: usize) -> impl Iterator<Item = Permutation> {
        let count: usize = (1..=n).product();
        (0..count).map(move |rank| Self::myrvold_ruskey_unrank1(n, rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_complete() {
        let mut images: Vec<Vec<usize>> = Permutation::all(4)
            .map(|p| p.apply_slice([0, 1, 2, 3]))
            .collect();
        assert_eq!(images.len(), 24);
        images.sort();
        images.dedup();
        assert_eq!(images.len(), 24);
        assert_eq!(Permutation::all(0).count(), 1);
    }

    #[test]
    fn parity() {
        assert!(!Permutation::from_map(vec![0, 1, 2]).is_odd());
        assert!(Permutation::from_map(vec![1, 0, 2]).is_odd());
        assert!(!Permutation::from_map(vec![1, 2, 0]).is_odd());
        let odd = Permutation::all(4).filter(|p| p.is_odd()).count();
        assert_eq!(odd, 12);
    }

    #[test]
    fn sort_and_apply() {
        let data = ['c', 'a', 'b'];
        let p = Permutation::sort(data);
        assert_eq!(p.apply_slice(data), vec!['a', 'b', 'c']);
        assert_eq!(p, Permutation::from_map(vec![1, 2, 0]));
        assert!(!p.is_odd());
    }
}
