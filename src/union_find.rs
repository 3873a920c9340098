/// Union-Find (Disjoint Sets) over stable record indices, used to take the
/// transitive closure of pairwise "same isoform" relations
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    /// Create a new UnionFind with n elements
    pub fn new(n: usize) -> Self {
        let parent = (0..n).collect();
        let rank = vec![0; n];
        UnionFind { parent, rank }
    }

    /// Find the root of element x with path compression
    pub fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    /// Union two sets containing x and y
    pub fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x != root_y {
            // Union by rank
            if self.rank[root_x] < self.rank[root_y] {
                self.parent[root_x] = root_y;
            } else if self.rank[root_x] > self.rank[root_y] {
                self.parent[root_y] = root_x;
            } else {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }

    /// Check if two elements are in the same set
    pub fn connected(&mut self, x: usize, y: usize) -> bool {
        self.find(x) == self.find(y)
    }

    /// All sets as ascending index lists, ordered by their smallest index
    pub fn get_sets(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut root_to_set: Vec<Option<usize>> = vec![None; n];
        let mut sets: Vec<Vec<usize>> = Vec::new();

        for i in 0..n {
            let root = self.find(i);
            match root_to_set[root] {
                Some(set) => sets[set].push(i),
                None => {
                    root_to_set[root] = Some(sets.len());
                    sets.push(vec![i]);
                }
            }
        }

        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitive_closure() {
        let mut uf = UnionFind::new(6);
        uf.union(4, 1);
        uf.union(1, 3);
        uf.union(5, 2);
        assert!(uf.connected(4, 3));
        assert!(!uf.connected(0, 1));
        assert_eq!(uf.get_sets(), vec![vec![0], vec![1, 3, 4], vec![2, 5]]);
    }

    #[test]
    fn test_sets_independent_of_union_order() {
        let mut a = UnionFind::new(5);
        a.union(0, 1);
        a.union(2, 3);
        a.union(1, 3);

        let mut b = UnionFind::new(5);
        b.union(3, 1);
        b.union(3, 2);
        b.union(1, 0);

        assert_eq!(a.get_sets(), b.get_sets());
    }
}
