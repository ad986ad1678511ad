//! Control-flow analyses: dominator tree and natural loops.
//!
//! The SPIR-V back end relies on this information to place the structured
//! control-flow merge instructions required by Vulkan. The earlier
//! structurization passes guarantee reducible control flow, so natural-loop
//! discovery from back edges is sufficient here.

use crate::{BlockIndex, Function, Terminator};
use bit_set::BitSet;

/// A natural loop: all blocks reachable from a back edge without passing
/// through the header.
#[derive(Debug)]
pub struct LoopAnalysis {
    /// The single entry block of the loop.
    pub header: BlockIndex,
    /// Every block belonging to the loop, the header included.
    pub blocks: BitSet,
    /// Sources of the back edges into the header.
    pub latches: Vec<BlockIndex>,
    /// Blocks outside the loop that are branched to from inside it.
    pub exits: Vec<BlockIndex>,
}

impl LoopAnalysis {
    pub fn contains(&self, block: BlockIndex) -> bool {
        self.blocks.contains(block as usize)
    }
}

/// Per-function control-flow facts.
#[derive(Debug)]
pub struct FlowInfo {
    pub successors: Vec<Vec<BlockIndex>>,
    pub predecessors: Vec<Vec<BlockIndex>>,
    /// Immediate dominator of each block; `None` for the entry block and for
    /// unreachable blocks.
    pub idom: Vec<Option<BlockIndex>>,
    /// Depth of each block in the dominator tree, entry at 0.
    pub dom_depth: Vec<u32>,
    /// Discovered natural loops, one per header.
    pub loops: Vec<LoopAnalysis>,
}

fn block_successors(terminator: &Terminator) -> Vec<BlockIndex> {
    match *terminator {
        Terminator::Branch { target } => vec![target],
        Terminator::BranchConditional { accept, reject, .. } => vec![accept, reject],
        Terminator::Return { .. } => Vec::new(),
        Terminator::Switch {
            default, ref cases, ..
        } => {
            let mut list = vec![default];
            list.extend(cases.iter().map(|&(_, target)| target));
            list
        }
    }
}

impl FlowInfo {
    pub fn new(fun: &Function) -> Self {
        let count = fun.blocks.len();
        let successors: Vec<Vec<BlockIndex>> = fun
            .blocks
            .iter()
            .map(|block| block_successors(&block.terminator))
            .collect();

        let mut predecessors = vec![Vec::new(); count];
        for (index, list) in successors.iter().enumerate() {
            for &succ in list {
                predecessors[succ as usize].push(index as BlockIndex);
            }
        }

        let (idom, dom_depth) = compute_dominators(count, &successors, &predecessors);

        let mut info = FlowInfo {
            successors,
            predecessors,
            idom,
            dom_depth,
            loops: Vec::new(),
        };
        info.loops = info.find_loops(count);
        info
    }

    /// Returns `true` if `a` dominates `b`. Dominance is reflexive.
    pub fn dominates(&self, a: BlockIndex, b: BlockIndex) -> bool {
        let mut finger = b;
        loop {
            if finger == a {
                return true;
            }
            match self.idom[finger as usize] {
                Some(up) => finger = up,
                None => return false,
            }
        }
    }

    /// Returns `true` if the edge `from -> to` is a back edge.
    pub fn is_back_edge(&self, from: BlockIndex, to: BlockIndex) -> bool {
        self.dominates(to, from)
    }

    /// Returns the loop headed by the given block, if any.
    pub fn loop_with_header(&self, header: BlockIndex) -> Option<&LoopAnalysis> {
        self.loops.iter().find(|lp| lp.header == header)
    }

    fn find_loops(&self, count: usize) -> Vec<LoopAnalysis> {
        let mut loops: Vec<LoopAnalysis> = Vec::new();
        for from in 0..count as BlockIndex {
            for &to in self.successors[from as usize].iter() {
                if !self.is_back_edge(from, to) {
                    continue;
                }
                // Flood backwards from the latch, stopping at the header.
                let mut blocks = BitSet::with_capacity(count);
                blocks.insert(to as usize);
                let mut stack = vec![from];
                while let Some(block) = stack.pop() {
                    if blocks.insert(block as usize) {
                        stack.extend(self.predecessors[block as usize].iter().copied());
                    }
                }
                match loops.iter_mut().find(|lp| lp.header == to) {
                    Some(lp) => {
                        lp.blocks.union_with(&blocks);
                        lp.latches.push(from);
                    }
                    None => loops.push(LoopAnalysis {
                        header: to,
                        blocks,
                        latches: vec![from],
                        exits: Vec::new(),
                    }),
                }
            }
        }
        for lp in loops.iter_mut() {
            let mut exits = Vec::new();
            for block in lp.blocks.iter() {
                for &succ in self.successors[block].iter() {
                    if !lp.blocks.contains(succ as usize) && !exits.contains(&succ) {
                        exits.push(succ);
                    }
                }
            }
            exits.sort_unstable();
            lp.exits = exits;
        }
        loops.sort_unstable_by_key(|lp| lp.header);
        loops
    }
}

/// Iterative dominator computation over a reverse postorder,
/// intersecting dominator chains through postorder numbers.
fn compute_dominators(
    count: usize,
    successors: &[Vec<BlockIndex>],
    predecessors: &[Vec<BlockIndex>],
) -> (Vec<Option<BlockIndex>>, Vec<u32>) {
    if count == 0 {
        return (Vec::new(), Vec::new());
    }

    // Depth-first postorder from the entry block.
    let mut postorder = Vec::with_capacity(count);
    let mut visited = BitSet::with_capacity(count);
    let mut stack = vec![(0 as BlockIndex, 0usize)];
    visited.insert(0);
    while let Some(top) = stack.last_mut() {
        let block = top.0;
        let succs = &successors[block as usize];
        if top.1 < succs.len() {
            let succ = succs[top.1];
            top.1 += 1;
            if visited.insert(succ as usize) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }
    let mut po_number = vec![usize::MAX; count];
    for (number, &block) in postorder.iter().enumerate() {
        po_number[block as usize] = number;
    }

    let mut idom: Vec<Option<BlockIndex>> = vec![None; count];
    let intersect = |idom: &[Option<BlockIndex>], mut a: BlockIndex, mut b: BlockIndex| {
        while a != b {
            while po_number[a as usize] < po_number[b as usize] {
                a = idom[a as usize].unwrap();
            }
            while po_number[b as usize] < po_number[a as usize] {
                b = idom[b as usize].unwrap();
            }
        }
        a
    };

    idom[0] = Some(0);
    let mut changed = true;
    while changed {
        changed = false;
        for &block in postorder.iter().rev() {
            if block == 0 {
                continue;
            }
            let mut new_idom: Option<BlockIndex> = None;
            for &pred in predecessors[block as usize].iter() {
                if idom[pred as usize].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    Some(current) => intersect(&idom, current, pred),
                    None => pred,
                });
            }
            if new_idom.is_some() && idom[block as usize] != new_idom {
                idom[block as usize] = new_idom;
                changed = true;
            }
        }
    }
    // The entry block has no immediate dominator.
    idom[0] = None;

    let mut dom_depth = vec![0u32; count];
    for &block in postorder.iter().rev() {
        if let Some(up) = idom[block as usize] {
            dom_depth[block as usize] = dom_depth[up as usize] + 1;
        }
    }
    (idom, dom_depth)
}

#[cfg(test)]
mod tests {
    use super::FlowInfo;
    use crate::{Arena, BasicBlock, Function, Terminator};

    fn function_with_blocks(terminators: Vec<Terminator>) -> Function {
        Function {
            name: "test".to_string(),
            arguments: Vec::new(),
            result: None,
            kernel: None,
            values: Arena::new(),
            blocks: terminators
                .into_iter()
                .map(|terminator| BasicBlock {
                    name: None,
                    body: Vec::new(),
                    terminator,
                })
                .collect(),
        }
    }

    #[test]
    fn straight_line() {
        let fun = function_with_blocks(vec![
            Terminator::Branch { target: 1 },
            Terminator::Return { value: None },
        ]);
        let flow = FlowInfo::new(&fun);
        assert_eq!(flow.idom, vec![None, Some(0)]);
        assert!(flow.dominates(0, 1));
        assert!(!flow.dominates(1, 0));
        assert!(flow.loops.is_empty());
    }

    #[test]
    fn diamond() {
        // 0 -> 1 | 2, both -> 3
        let mut fun = function_with_blocks(vec![
            Terminator::Branch { target: 1 },
            Terminator::Branch { target: 3 },
            Terminator::Branch { target: 3 },
            Terminator::Return { value: None },
        ]);
        let condition = fun.values.append(crate::Value::Argument(0));
        fun.blocks[0].terminator = Terminator::BranchConditional {
            condition,
            accept: 1,
            reject: 2,
        };
        let flow = FlowInfo::new(&fun);
        assert_eq!(flow.idom[3], Some(0));
        assert!(flow.loops.is_empty());
    }

    #[test]
    fn simple_loop() {
        // 0 -> 1 (header), 1 -> 2 (body) or 3 (exit), 2 -> 1
        let mut fun = function_with_blocks(vec![
            Terminator::Branch { target: 1 },
            Terminator::Branch { target: 2 },
            Terminator::Branch { target: 1 },
            Terminator::Return { value: None },
        ]);
        let condition = fun.values.append(crate::Value::Argument(0));
        fun.blocks[1].terminator = Terminator::BranchConditional {
            condition,
            accept: 2,
            reject: 3,
        };
        let flow = FlowInfo::new(&fun);
        assert!(flow.is_back_edge(2, 1));
        let lp = flow.loop_with_header(1).unwrap();
        assert_eq!(lp.latches, vec![2]);
        assert_eq!(lp.exits, vec![3]);
        assert!(lp.contains(1) && lp.contains(2) && !lp.contains(3));
    }

    #[test]
    fn self_loop() {
        let mut fun = function_with_blocks(vec![
            Terminator::Branch { target: 1 },
            Terminator::Branch { target: 1 },
            Terminator::Return { value: None },
        ]);
        let condition = fun.values.append(crate::Value::Argument(0));
        fun.blocks[1].terminator = Terminator::BranchConditional {
            condition,
            accept: 1,
            reject: 2,
        };
        let flow = FlowInfo::new(&fun);
        let lp = flow.loop_with_header(1).unwrap();
        assert_eq!(lp.latches, vec![1]);
        assert_eq!(lp.exits, vec![2]);
    }
}
