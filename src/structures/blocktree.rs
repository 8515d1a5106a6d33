use std::collections::HashMap;

use crate::crypto::{hash_of_null, Hash};

/// A block's position: `[i]` selects position `i` on the current branch's
/// main spine; `[i, ...]` descends into sub-branch `i` (indexed within the
/// parent) before continuing to address the remainder.
pub type Address = Vec<usize>;

/// A branch of blocks, with any sub-branches forked off it.
///
/// The reference implementation also stores `parent`/`branch_index` back
/// pointers on each branch, but nothing ever reads them back — recursive
/// `add`/`get_path`/`swap` calls already know their own branch index from
/// the address being walked. They're dropped here.
struct BlockBranch {
    /// Index in the parent branch this branch forked from; `None` for the tree's root branch.
    root_block_index: Option<usize>,
    block_ids: Vec<Hash>,
    sub_branches: Vec<BlockBranch>,
}

impl BlockBranch {
    fn new(first_block_id: Hash, root_block_index: Option<usize>) -> Self {
        Self { root_block_index, block_ids: vec![first_block_id], sub_branches: Vec::new() }
    }

    /// Add a block extending the block at `prev_block_addr`. Returns the
    /// addresses of every block whose position changed (itself, plus any
    /// relocated by a reorg).
    fn add(&mut self, block_id: Hash, prev_block_addr: &[usize]) -> HashMap<Hash, Address> {
        if prev_block_addr.len() == 1 {
            let block_index = prev_block_addr[0];
            if block_index == self.block_ids.len() - 1 {
                self.block_ids.push(block_id);
                HashMap::from([(block_id, vec![block_index + 1])])
            } else {
                let branch_index = self.sub_branches.len();
                self.sub_branches.push(BlockBranch::new(block_id, Some(block_index)));
                HashMap::from([(block_id, vec![branch_index, 0])])
            }
        } else {
            let branch_index = prev_block_addr[0];
            let mut result = self.sub_branches[branch_index].add(block_id, &prev_block_addr[1..]);
            for addr in result.values_mut() {
                addr.insert(0, branch_index);
            }

            let sub = &self.sub_branches[branch_index];
            let remaining_main_suffix = self.block_ids.len() - sub.root_block_index.unwrap() - 1;
            if sub.block_ids.len() <= remaining_main_suffix {
                result
            } else {
                result.extend(self.swap(branch_index));
                result
            }
        }
    }

    /// Swap the main branch with sub-branch `index`, which has become
    /// strictly longer than the main suffix past its attachment point.
    fn swap(&mut self, index: usize) -> HashMap<Hash, Address> {
        let root_index = self.sub_branches[index].root_block_index.unwrap();
        let former_sub_ids = std::mem::take(&mut self.sub_branches[index].block_ids);
        let former_main_suffix = self.block_ids.split_off(root_index + 1);
        self.sub_branches[index].block_ids = former_main_suffix;
        self.block_ids.extend(former_sub_ids);

        let mut result = HashMap::new();
        for (i, id) in self.sub_branches[index].block_ids.iter().enumerate() {
            result.insert(*id, vec![index, i]);
        }
        for i in (root_index + 1)..self.block_ids.len() {
            result.insert(self.block_ids[i], vec![i]);
        }
        result
    }

    fn get_path(&self, block_addr: &[usize]) -> Vec<Hash> {
        if block_addr.len() == 1 {
            self.block_ids[..=block_addr[0]].to_vec()
        } else {
            let sub_branch = &self.sub_branches[block_addr[0]];
            let mut path = self.block_ids[..=sub_branch.root_block_index.unwrap()].to_vec();
            path.extend(sub_branch.get_path(&block_addr[1..]));
            path
        }
    }

    fn traverse(&self, out: &mut Vec<Hash>) {
        out.extend(self.block_ids.iter().copied());
        for sub in &self.sub_branches {
            sub.traverse(out);
        }
    }
}

/// A tree of blocks: a main branch with recursively forking sub-branches,
/// plus a flat index of every known block's current address.
pub struct BlockTree {
    main_branch: BlockBranch,
    addresses: HashMap<Hash, Address>,
}

impl BlockTree {
    pub fn new() -> Self {
        let null = hash_of_null();
        Self { main_branch: BlockBranch::new(null, None), addresses: HashMap::from([(null, vec![0])]) }
    }

    /// Add a block, given its id and its parent's id. `prev_id` must already
    /// be known to the tree.
    pub fn add(&mut self, block_id: Hash, prev_id: Hash) {
        let prev_addr = self.addresses[&prev_id].clone();
        let updates = self.main_branch.add(block_id, &prev_addr);
        self.addresses.extend(updates);
    }

    pub fn get_height(&self) -> usize {
        self.main_branch.block_ids.len() - 1
    }

    pub fn get_top_block(&self) -> Hash {
        *self.main_branch.block_ids.last().expect("main branch always has the null root")
    }

    pub fn has_block(&self, block_id: &Hash) -> bool {
        self.addresses.contains_key(block_id)
    }

    pub fn get_path(&self, block_id: &Hash) -> Vec<Hash> {
        self.main_branch.get_path(&self.addresses[block_id])
    }

    pub fn traverse(&self) -> Vec<Hash> {
        let mut out = Vec::new();
        self.main_branch.traverse(&mut out);
        out
    }

    pub fn address_of(&self, block_id: &Hash) -> Option<&Address> {
        self.addresses.get(block_id)
    }

    /// Block ids on the main spine, in order from the null root.
    pub fn main_spine(&self) -> &[Hash] {
        &self.main_branch.block_ids
    }
}

impl Default for BlockTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: u8) -> Hash {
        let mut h = [0u8; 32];
        h[0] = tag;
        h
    }

    #[test]
    fn linear_chain() {
        let mut tree = BlockTree::new();
        let null = hash_of_null();
        tree.add(id(1), null);
        tree.add(id(2), id(1));
        assert_eq!(tree.get_height(), 2);
        assert_eq!(tree.get_top_block(), id(2));
        assert_eq!(tree.get_path(&id(2)), vec![null, id(1), id(2)]);
    }

    #[test]
    fn fork_resolution_prefers_strictly_longer_branch() {
        let mut tree = BlockTree::new();
        let null = hash_of_null();
        tree.add(id(1), null);

        // F1: length 2 off block 1
        tree.add(id(10), id(1));
        tree.add(id(11), id(10));

        // F2: length 3 off block 1, becomes new main spine
        tree.add(id(20), id(1));
        tree.add(id(21), id(20));
        tree.add(id(22), id(21));

        assert_eq!(tree.get_top_block(), id(22));
        assert_eq!(tree.get_path(&id(22)), vec![null, id(1), id(20), id(21), id(22)]);
        assert!(tree.has_block(&id(10)));
        assert!(tree.has_block(&id(11)));
        // F1 blocks are no longer on the main spine
        assert_ne!(tree.address_of(&id(11)).unwrap(), &vec![3usize]);
    }

    #[test]
    fn equal_length_fork_keeps_incumbent() {
        let mut tree = BlockTree::new();
        let null = hash_of_null();
        tree.add(id(1), null);

        tree.add(id(10), id(1));
        tree.add(id(11), id(10));

        tree.add(id(20), id(1));
        tree.add(id(21), id(20));

        // Both forks have length 2: incumbent (F1) stays main.
        assert_eq!(tree.get_top_block(), id(11));
    }

    #[test]
    fn traverse_visits_every_known_block() {
        let mut tree = BlockTree::new();
        let null = hash_of_null();
        tree.add(id(1), null);
        tree.add(id(2), id(1));
        tree.add(id(3), id(1));

        let mut all = tree.traverse();
        all.sort();
        let mut expected = vec![null, id(1), id(2), id(3)];
        expected.sort();
        assert_eq!(all, expected);
    }
}
